//! Worker pool: bounded-concurrency consumers that drain the inbound
//! payload queue, match against the current snapshot, and hand fan-out
//! publication back to the I/O side.
//!
//! Matching is CPU-bound and parallel-friendly; publishing is I/O-bound
//! and serialized with the bus client. Splitting the stages keeps the
//! worker count tunable independently of bus throughput.

use crate::bridge;
use crate::core::config::BinaryFormat;
use crate::matching::manager::SubscriptionManager;
use crate::matching::schema::Schema;
use crate::matching::snapshot::TreeSnapshot;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// How long a worker blocks on the queue before re-checking the stop
/// flag.
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Pipeline counters. Relaxed atomics: aggregate precision is not
/// required, only monotonicity.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    processed: AtomicU64,
    matched: AtomicU64,
    published: AtomicU64,
    match_failures: AtomicU64,
}

impl PipelineStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matched(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match_failure(&self) {
        self.match_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            match_failures: self.match_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters for the stats log line.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub received: u64,
    pub processed: u64,
    pub matched: u64,
    pub published: u64,
    pub match_failures: u64,
}

/// One matched message, moved from a worker to the publish side. Carries
/// the snapshot it was matched against so subject lookup uses the same
/// map that produced the match list.
pub struct PublishTask {
    pub payload: Vec<u8>,
    pub matches: Vec<u64>,
    pub snapshot: Arc<TreeSnapshot>,
}

/// Fixed pool of worker threads fed by an unbounded MPMC queue.
///
/// `enqueue` never blocks and never drops. Shutdown uses both a stop
/// flag (observed within the dequeue timeout) and one empty-payload
/// sentinel per thread.
pub struct WorkerPool {
    format: BinaryFormat,
    schema: Arc<Schema>,
    manager: Arc<SubscriptionManager>,
    publish_tx: UnboundedSender<PublishTask>,
    stats: Arc<PipelineStats>,
    thread_count: usize,
    running: Arc<AtomicBool>,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        thread_count: usize,
        format: BinaryFormat,
        schema: Arc<Schema>,
        manager: Arc<SubscriptionManager>,
        publish_tx: UnboundedSender<PublishTask>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            format,
            schema,
            manager,
            publish_tx,
            stats,
            thread_count: thread_count.max(1),
            running: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker threads. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut threads = self.threads.lock();
        threads.reserve(self.thread_count);
        for worker_id in 0..self.thread_count {
            let rx = self.rx.clone();
            let running = Arc::clone(&self.running);
            let manager = Arc::clone(&self.manager);
            let schema = Arc::clone(&self.schema);
            let stats = Arc::clone(&self.stats);
            let publish_tx = self.publish_tx.clone();
            let format = self.format;

            let handle = thread::Builder::new()
                .name(format!("sieve-worker-{worker_id}"))
                .spawn(move || {
                    worker_loop(
                        worker_id, &rx, &running, &manager, &schema, format, &publish_tx, &stats,
                    );
                })
                .expect("failed to spawn sieve worker");
            threads.push(handle);
        }
        info!(threads = self.thread_count, "worker pool started");
    }

    /// Signal workers to stop, enqueue one sentinel per thread, and join.
    /// Publish tasks already handed off are not affected.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for _ in 0..self.thread_count {
            let _ = self.tx.send(Vec::new());
        }

        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        info!("worker pool stopped");
    }

    /// Hand a payload to the pool. Non-blocking; the queue is unbounded
    /// by design and `queue_depth` surfaces saturation in the stats.
    pub fn enqueue(&self, payload: Vec<u8>) {
        let _ = self.tx.send(payload);
    }

    pub fn queue_depth(&self) -> usize {
        self.rx.len()
    }
}

fn worker_loop(
    worker_id: usize,
    rx: &Receiver<Vec<u8>>,
    running: &AtomicBool,
    manager: &SubscriptionManager,
    schema: &Schema,
    format: BinaryFormat,
    publish_tx: &UnboundedSender<PublishTask>,
    stats: &PipelineStats,
) {
    debug!(worker = worker_id, "worker started");

    while running.load(Ordering::Relaxed) {
        let payload = match rx.recv_timeout(DEQUEUE_TIMEOUT) {
            Ok(payload) => payload,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // Empty payload = shutdown sentinel.
        if payload.is_empty() {
            break;
        }

        let snapshot = manager.snapshot();
        let matches =
            bridge::deserialize_and_match(&snapshot.tree, schema, format, &payload);
        stats.record_processed();

        let Some(matches) = matches else {
            stats.record_match_failure();
            continue;
        };
        if matches.is_empty() {
            continue;
        }
        stats.record_matched();

        // The publish side only issues publishes; move everything it
        // needs, including the snapshot the match was computed against.
        if publish_tx
            .send(PublishTask {
                payload,
                matches,
                snapshot,
            })
            .is_err()
        {
            debug!(worker = worker_id, "publish channel closed, dropping task");
        }
    }

    debug!(worker = worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AttributeDef, AttributeType};

    fn fixture() -> (Arc<SubscriptionManager>, Arc<Schema>) {
        let attributes = vec![AttributeDef {
            name: "severity".to_string(),
            kind: AttributeType::Integer,
        }];
        let manager = Arc::new(SubscriptionManager::new(&attributes, "out").unwrap());
        let schema = Arc::new(Schema::new(&attributes));
        (manager, schema)
    }

    #[test]
    fn matched_payload_reaches_the_publish_channel() {
        let (manager, schema) = fixture();
        let id = manager.subscribe("severity = 5", "c1").unwrap();

        let (publish_tx, mut publish_rx) = tokio::sync::mpsc::unbounded_channel();
        let stats = Arc::new(PipelineStats::default());
        let pool = WorkerPool::new(
            2,
            BinaryFormat::Json,
            schema,
            Arc::clone(&manager),
            publish_tx,
            Arc::clone(&stats),
        );
        pool.start();

        pool.enqueue(br#"{"severity": 5}"#.to_vec());

        let task = publish_rx.blocking_recv().expect("publish task");
        assert_eq!(task.matches, vec![id]);
        assert_eq!(task.payload, br#"{"severity": 5}"#.to_vec());
        assert_eq!(
            task.snapshot.output_subjects.get(&id).unwrap(),
            &format!("out.{id}")
        );

        pool.stop();
        let s = stats.snapshot();
        assert_eq!(s.processed, 1);
        assert_eq!(s.matched, 1);
        assert_eq!(s.match_failures, 0);
    }

    #[test]
    fn undecodable_payload_counts_as_match_failure() {
        let (manager, schema) = fixture();
        manager.subscribe("severity = 5", "c1").unwrap();

        let (publish_tx, mut publish_rx) = tokio::sync::mpsc::unbounded_channel();
        let stats = Arc::new(PipelineStats::default());
        let pool = WorkerPool::new(
            1,
            BinaryFormat::Json,
            schema,
            manager,
            publish_tx,
            Arc::clone(&stats),
        );
        pool.start();

        pool.enqueue(b"garbage".to_vec());
        pool.enqueue(br#"{"severity": 1}"#.to_vec());

        // Wait until both payloads are drained, then stop and assert.
        while stats.snapshot().processed < 2 {
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.stop();

        let s = stats.snapshot();
        assert_eq!(s.processed, 2);
        assert_eq!(s.match_failures, 1);
        assert_eq!(s.matched, 0);
        assert!(publish_rx.try_recv().is_err());
    }

    #[test]
    fn stop_is_idempotent_and_joins_workers() {
        let (manager, schema) = fixture();
        let (publish_tx, _publish_rx) = tokio::sync::mpsc::unbounded_channel();
        let pool = WorkerPool::new(
            3,
            BinaryFormat::Json,
            schema,
            manager,
            publish_tx,
            Arc::new(PipelineStats::default()),
        );
        pool.start();
        pool.start();
        pool.stop();
        pool.stop();
    }
}
