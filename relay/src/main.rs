use futures::StreamExt;
use log::{error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use xstream::{ChannelConfig, DEFAULT_INITIAL_CAPACITY, MemoryStream, ReaderLoop, SendStream};

const DEFAULT_ITEMS: usize = 16;
const PRODUCE_INTERVAL: Duration = Duration::from_millis(50);
const PRODUCERS: usize = 2;
/// Largest queue pre-allocation the relay asks for; the queue grows past it.
const MAX_CAPACITY_HINT: usize = DEFAULT_INITIAL_CAPACITY * 64;

#[derive(Debug)]
struct Event {
    source: &'static str,
    seq: usize,
    sent_at: Instant,
}

impl Event {
    fn new(source: &'static str, seq: usize) -> Self {
        Self {
            source,
            seq,
            sent_at: Instant::now(),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let items = parse_items(std::env::args().nth(1).as_deref());

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build reader runtime");
    runtime.block_on(run(items));
}

/// Item count per producer from the first CLI argument.
fn parse_items(arg: Option<&str>) -> usize {
    match arg {
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            warn!("Invalid item count {:?}, using {}", arg, DEFAULT_ITEMS);
            DEFAULT_ITEMS
        }),
        None => DEFAULT_ITEMS,
    }
}

/// Queue pre-allocation for `items` per producer, clamped to a sane size.
fn capacity_hint(items: usize) -> usize {
    items
        .checked_mul(PRODUCERS)
        .map_or(MAX_CAPACITY_HINT, |total| total.min(MAX_CAPACITY_HINT))
}

async fn run(items: usize) {
    let reader = ReaderLoop::current().expect("Reader runtime not running");
    let stream = MemoryStream::with_config(
        reader,
        ChannelConfig::default()
            .with_label("relay")
            .with_initial_capacity(capacity_hint(items)),
    );
    let cancel = CancellationToken::new();
    let remaining = Arc::new(AtomicUsize::new(PRODUCERS));

    // Producer task on the reader loop itself.
    let tx = stream.send_stream();
    let token = cancel.clone();
    let left = Arc::clone(&remaining);
    tokio::spawn(async move {
        produce("loop", &tx, items, &token).await;
        finish(&tx, &left);
    });

    // Blocking worker thread driving a runtime of its own.
    let tx = stream.send_stream();
    let token = cancel.clone();
    let left = Arc::clone(&remaining);
    let worker = thread::spawn(move || {
        match Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime.block_on(produce("worker", &tx, items, &token)),
            Err(e) => error!("Failed to build worker runtime: {}", e),
        }
        finish(&tx, &left);
    });

    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping producers");
            token.cancel();
        }
    });

    info!(
        "Relaying {} items from each of {} producers...",
        items, PRODUCERS
    );
    let start = Instant::now();
    let mut received = 0usize;
    let mut total_latency = Duration::ZERO;
    let mut worst_latency = Duration::ZERO;

    let mut events = stream.receive_stream().iter();
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                error!("Stream error: {}", e);
                break;
            }
        };
        let latency = event.sent_at.elapsed();
        info!("Received {}#{} after {:?}", event.source, event.seq, latency);

        received += 1;
        total_latency += latency;
        worst_latency = worst_latency.max(latency);
    }

    if worker.join().is_err() {
        error!("Worker thread panicked");
    }

    let elapsed = start.elapsed();
    let stats = stream.stats();
    info!("=== Relay Complete ===");
    info!("Total received: {} items", received);
    info!("Time: {:.2} seconds", elapsed.as_secs_f64());
    if received > 0 {
        let count = u32::try_from(received).unwrap_or(u32::MAX);
        info!("Mean latency: {:?}", total_latency / count);
        info!("Worst latency: {:?}", worst_latency);
    }
    info!(
        "Wakes: {} direct, {} marshalled",
        stats.direct_wakes, stats.marshalled_wakes
    );
    info!("Final state: {:?}", stream.state());
}

async fn produce(source: &'static str, tx: &SendStream<Event>, items: usize, token: &CancellationToken) {
    for seq in 0..items {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("[{}] Cancelled after {} items", source, seq);
                return;
            }
            _ = tokio::time::sleep(PRODUCE_INTERVAL) => {}
        }

        if let Err(e) = tx.send(Event::new(source, seq)) {
            error!("[{}] Send failed: {}", source, e);
            return;
        }
    }
    info!("[{}] Produced {} items", source, items);
}

/// Closes the stream once the last producer is done.
fn finish(tx: &SendStream<Event>, remaining: &AtomicUsize) {
    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        if let Err(e) = tx.close() {
            error!("Failed to close stream: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items() {
        assert_eq!(parse_items(None), DEFAULT_ITEMS);
        assert_eq!(parse_items(Some("3")), 3);
        assert_eq!(parse_items(Some("-1")), DEFAULT_ITEMS);
        assert_eq!(parse_items(Some("many")), DEFAULT_ITEMS);
    }

    #[test]
    fn test_capacity_hint_clamped() {
        assert_eq!(capacity_hint(0), 0);
        assert_eq!(capacity_hint(8), 8 * PRODUCERS);
        assert_eq!(capacity_hint(10_000_000_000), MAX_CAPACITY_HINT);
        // Would overflow `items * PRODUCERS`.
        assert_eq!(capacity_hint(usize::MAX), MAX_CAPACITY_HINT);
    }
}
