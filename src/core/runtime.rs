//! Runtime orchestration: wires the subscription manager, worker pool,
//! lease manager, and control handlers to the NATS client, runs the
//! stats loop, and drives the shutdown ordering.

use crate::control;
use crate::core::config::Config;
use crate::leases::LeaseManager;
use crate::matching::manager::SubscriptionManager;
use crate::matching::schema::Schema;
use crate::net;
use crate::workers::{PipelineStats, PublishTask, WorkerPool};
use anyhow::{anyhow, Context, Result};
use async_nats::{Client, Subscriber};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// The sidecar engine. Owns the long-lived components and the shutdown
/// signal; everything bus-facing runs as spawned tasks.
pub struct Runtime {
    config: Config,
    manager: Arc<SubscriptionManager>,
    schema: Arc<Schema>,
    stats: Arc<PipelineStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let manager = Arc::new(SubscriptionManager::new(
            &config.attributes,
            &config.output_prefix,
        )?);
        let schema = Arc::new(Schema::new(&config.attributes));
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            manager,
            schema,
            stats: Arc::new(PipelineStats::default()),
            shutdown_tx,
        })
    }

    /// Connect, subscribe, start the pipeline, and block until a
    /// shutdown signal. Subscription failures on the input or control
    /// subjects are fatal; a lease-watch failure is not.
    pub async fn run(&self) -> Result<()> {
        info!(
            server = %format!("{}:{}", self.config.nats_address, self.config.nats_port),
            input = %self.config.input_subject,
            format = self.config.format.name(),
            output = %format!("{}.<id>", self.config.output_prefix),
            attributes = self.config.attributes.len(),
            workers = self.config.effective_worker_threads(),
            lease_bucket = %self.config.lease_bucket,
            lease_ttl_seconds = self.config.lease_ttl_seconds,
            "sieve starting"
        );

        let client = net::connect(&self.config).await?;

        let input_sub = match &self.config.input_queue_group {
            Some(group) => {
                client
                    .queue_subscribe(self.config.input_subject.clone(), group.clone())
                    .await
            }
            None => client.subscribe(self.config.input_subject.clone()).await,
        }
        .map_err(|e| {
            anyhow!(
                "cannot subscribe to input subject {}: {e}",
                self.config.input_subject
            )
        })?;
        info!(subject = %self.config.input_subject, "subscribed to input subject");

        let subscribe_sub = client
            .subscribe(self.config.subscribe_subject.clone())
            .await
            .map_err(|e| {
                anyhow!(
                    "cannot subscribe to control subject {}: {e}",
                    self.config.subscribe_subject
                )
            })?;
        info!(subject = %self.config.subscribe_subject, "listening for subscribe requests");

        let unsubscribe_sub = client
            .subscribe(self.config.unsubscribe_subject.clone())
            .await
            .map_err(|e| {
                anyhow!(
                    "cannot subscribe to control subject {}: {e}",
                    self.config.unsubscribe_subject
                )
            })?;
        info!(subject = %self.config.unsubscribe_subject, "listening for unsubscribe requests");

        let lease_manager =
            LeaseManager::new(&self.config.lease_bucket, Arc::clone(&self.manager));
        if let Err(err) = lease_manager.start(&client).await {
            warn!(error = %err, "lease manager failed to start - soft-state cleanup disabled");
        }

        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(WorkerPool::new(
            self.config.effective_worker_threads(),
            self.config.format,
            Arc::clone(&self.schema),
            Arc::clone(&self.manager),
            publish_tx,
            Arc::clone(&self.stats),
        ));
        pool.start();

        let publisher = tokio::spawn(publisher_loop(
            client.clone(),
            publish_rx,
            Arc::clone(&self.stats),
        ));

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(input_loop(
            input_sub,
            Arc::clone(&pool),
            Arc::clone(&self.stats),
            self.shutdown_tx.subscribe(),
        )));
        tasks.push(tokio::spawn(subscribe_loop(
            subscribe_sub,
            client.clone(),
            Arc::clone(&self.manager),
            self.config.clone(),
            self.shutdown_tx.subscribe(),
        )));
        tasks.push(tokio::spawn(unsubscribe_loop(
            unsubscribe_sub,
            client.clone(),
            Arc::clone(&self.manager),
            self.shutdown_tx.subscribe(),
        )));
        tasks.push(tokio::spawn(stats_loop(
            self.config.stats_interval_seconds,
            Arc::clone(&self.stats),
            Arc::clone(&self.manager),
            Arc::clone(&pool),
            self.shutdown_tx.subscribe(),
        )));

        wait_for_signal().await?;
        info!("shutting down");
        let _ = self.shutdown_tx.send(true);

        for task in tasks {
            let _ = task.await;
        }

        // Stop the workers: drains the inbound queue and joins the
        // threads, so every match they produced is already in the
        // publish channel.
        pool.stop();

        // Dropping the last pool handle closes the publish channel; the
        // publisher then drains in-flight tasks and exits.
        drop(pool);
        let _ = publisher.await;

        info!("sieve stopped");
        Ok(())
    }
}

/// Inbound data handler: count, skip empties, enqueue a copy.
fn handle_input(payload: &[u8], pool: &WorkerPool, stats: &PipelineStats) {
    stats.record_received();
    if payload.is_empty() {
        return;
    }
    pool.enqueue(payload.to_vec());
}

async fn input_loop(
    mut sub: Subscriber,
    pool: Arc<WorkerPool>,
    stats: Arc<PipelineStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            msg = sub.next() => {
                let Some(msg) = msg else { break };
                handle_input(&msg.payload, &pool, &stats);
            }
        }
    }
    debug!("input loop ended");
}

async fn subscribe_loop(
    mut sub: Subscriber,
    client: Client,
    manager: Arc<SubscriptionManager>,
    config: Config,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            msg = sub.next() => {
                let Some(msg) = msg else { break };
                let Some(reply) = msg.reply else {
                    warn!("subscribe request without reply subject, ignoring");
                    continue;
                };
                let response = control::handle_subscribe(&manager, &config, &msg.payload);
                if let Err(err) = client.publish(reply, response.into()).await {
                    warn!(error = %err, "failed to reply to subscribe request");
                }
            }
        }
    }
    debug!("subscribe loop ended");
}

async fn unsubscribe_loop(
    mut sub: Subscriber,
    client: Client,
    manager: Arc<SubscriptionManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            msg = sub.next() => {
                let Some(msg) = msg else { break };
                let response = control::handle_unsubscribe(&manager, &msg.payload);
                if let Some(reply) = msg.reply {
                    if let Err(err) = client.publish(reply, response.into()).await {
                        warn!(error = %err, "failed to reply to unsubscribe request");
                    }
                }
            }
        }
    }
    debug!("unsubscribe loop ended");
}

/// Issue one publish per matched subscription, in match order. The
/// subject map comes from the snapshot the match was computed against,
/// so the lookup cannot miss; the skip stays as a defensive check.
async fn publisher_loop(
    client: Client,
    mut rx: mpsc::UnboundedReceiver<PublishTask>,
    stats: Arc<PipelineStats>,
) {
    while let Some(task) = rx.recv().await {
        let payload = Bytes::from(task.payload);
        for id in &task.matches {
            let Some(subject) = task.snapshot.output_subjects.get(id) else {
                continue;
            };
            match client.publish(subject.clone(), payload.clone()).await {
                Ok(()) => stats.record_published(),
                Err(err) => warn!(subject = %subject, error = %err, "publish failed"),
            }
        }
    }
    debug!("publisher drained");
}

async fn stats_loop(
    interval_seconds: u64,
    stats: Arc<PipelineStats>,
    manager: Arc<SubscriptionManager>,
    pool: Arc<WorkerPool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the first report
    // covers a full interval.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let s = stats.snapshot();
                info!(
                    received = s.received,
                    processed = s.processed,
                    matched = s.matched,
                    published = s.published,
                    failures = s.match_failures,
                    subscriptions = manager.active_count(),
                    queue_depth = pool.queue_depth(),
                    "stats"
                );
            }
        }
    }
}

async fn wait_for_signal() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}
