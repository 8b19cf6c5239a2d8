//! Event forwarding pipeline
//!
//! Turns domain event envelopes into recipient-addressed forwarding events.
//!
//! Each envelope walks `Raised -> Resolving -> Forwarded | Dropped`:
//! - `raise` enqueues the envelope and returns immediately
//! - an operation queue asks the resolver for recipients, retrying on failure
//! - a non-empty audience produces exactly one `ForwardingEvent`, handed to the sink
//! - an empty audience or exhausted retries drop the envelope
//!
//! Envelopes are keyed by correlation id. A router keeps one short-lived
//! queue per key: events of one operation keep their raise order, while
//! every other operation is forwarded concurrently. A queue is opened on the
//! first envelope for its key and closed once it has nothing pending.
//! Every resolver call and sink delivery is bounded by a per-attempt timeout,
//! so a hung collaborator ends in a retry and then a drop.

use std::collections::hash_map::{Entry, HashMap};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use taskwire_contracts::{
    CorrelationContext, CorrelationId, DomainEventEnvelope, EventPattern, ForwardingEvent,
    Recipients,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, field, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{FabricError, Result};
use crate::resolver::RecipientResolver;
use crate::retry::RetryPolicy;

// ============================================================================
// EventSink
// ============================================================================

/// Transport boundary that delivers forwarding events to clients
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &ForwardingEvent) -> Result<()>;

    fn name(&self) -> &'static str {
        "EventSink"
    }
}

#[async_trait]
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    async fn deliver(&self, event: &ForwardingEvent) -> Result<()> {
        (**self).deliver(event).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Lifecycle state of one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingState {
    Raised,
    Resolving,
    Forwarded,
    Dropped,
}

/// Why an envelope was not forwarded
#[derive(Debug, Clone)]
pub enum DropReason {
    /// The resolver found nobody to tell
    NoRecipients,
    /// Resolution or delivery kept failing
    Failed(FabricError),
}

#[derive(Debug, Clone)]
pub enum Disposition {
    Forwarded(ForwardingEvent),
    Dropped(DropReason),
}

/// Terminal result for one envelope, published on the outcome channel
#[derive(Debug, Clone)]
pub struct ForwardingOutcome {
    pub envelope_id: Uuid,
    pub pattern: EventPattern,
    pub correlation: Option<CorrelationContext>,
    pub disposition: Disposition,
}

impl ForwardingOutcome {
    pub fn state(&self) -> ForwardingState {
        match self.disposition {
            Disposition::Forwarded(_) => ForwardingState::Forwarded,
            Disposition::Dropped(_) => ForwardingState::Dropped,
        }
    }

    pub fn forwarded(&self) -> Option<&ForwardingEvent> {
        match &self.disposition {
            Disposition::Forwarded(event) => Some(event),
            Disposition::Dropped(_) => None,
        }
    }

    /// The `ForwardingFailed` error, if the envelope was dropped by failure
    pub fn error(&self) -> Option<&FabricError> {
        match &self.disposition {
            Disposition::Dropped(DropReason::Failed(err)) => Some(err),
            _ => None,
        }
    }
}

/// Running totals since the pipeline started
#[derive(Debug, Default)]
pub struct PipelineStats {
    raised: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatsSnapshot {
    pub raised: u64,
    pub forwarded: u64,
    /// Dropped for lack of recipients
    pub dropped: u64,
    /// Dropped after exhausting retries
    pub failed: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            raised: self.raised.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resolver_retry: RetryPolicy,
    pub sink_retry: RetryPolicy,
    /// Upper bound on a single resolver call
    pub resolver_timeout: Duration,
    /// Upper bound on a single sink delivery
    pub sink_timeout: Duration,
    /// Outcomes buffered per subscriber before lagging ones miss some
    pub outcome_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolver_retry: RetryPolicy::resolver_default(),
            sink_retry: RetryPolicy::resolver_default(),
            resolver_timeout: Duration::from_secs(2),
            sink_timeout: Duration::from_secs(2),
            outcome_buffer: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn with_resolver_retry(mut self, policy: RetryPolicy) -> Self {
        self.resolver_retry = policy;
        self
    }

    pub fn with_sink_retry(mut self, policy: RetryPolicy) -> Self {
        self.sink_retry = policy;
        self
    }

    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout = timeout;
        self
    }

    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    pub fn with_outcome_buffer(mut self, capacity: usize) -> Self {
        self.outcome_buffer = capacity.max(1);
        self
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Entry point for building a forwarding pipeline
///
/// ```ignore
/// let handle = EventPipeline::builder(resolver, relay)
///     .config(PipelineConfig::default().with_resolver_timeout(Duration::from_secs(1)))
///     .spawn();
///
/// let publisher = handle.publisher();
/// publisher.raise(envelope)?;
///
/// handle.shutdown().await;
/// ```
pub struct EventPipeline;

impl EventPipeline {
    pub fn builder(
        resolver: Arc<dyn RecipientResolver>,
        sink: Arc<dyn EventSink>,
    ) -> EventPipelineBuilder {
        EventPipelineBuilder {
            resolver,
            sink,
            config: PipelineConfig::default(),
        }
    }
}

pub struct EventPipelineBuilder {
    resolver: Arc<dyn RecipientResolver>,
    sink: Arc<dyn EventSink>,
    config: PipelineConfig,
}

impl EventPipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the router. Must be called inside a tokio runtime.
    pub fn spawn(self) -> PipelineHandle {
        let (outcomes, _) = broadcast::channel(self.config.outcome_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(PipelineStats::default());

        let forwarder = Arc::new(Forwarder {
            resolver: self.resolver,
            sink: self.sink,
            resolver_retry: self.config.resolver_retry,
            sink_retry: self.config.sink_retry,
            resolver_timeout: self.config.resolver_timeout,
            sink_timeout: self.config.sink_timeout,
            outcomes: outcomes.clone(),
            stats: Arc::clone(&stats),
        });

        info!(
            resolver = forwarder.resolver.name(),
            sink = forwarder.sink.name(),
            resolver_timeout_ms = self.config.resolver_timeout.as_millis() as u64,
            "event pipeline started"
        );

        let router = tokio::spawn(run_router(intake_rx, Router::new(forwarder), shutdown_rx));

        PipelineHandle {
            publisher: EventPublisher {
                intake: intake_tx,
                closed: Arc::new(AtomicBool::new(false)),
                stats: Arc::clone(&stats),
            },
            outcomes,
            stats,
            shutdown_tx,
            router: Mutex::new(Some(router)),
        }
    }
}

/// Owner of a running pipeline
pub struct PipelineHandle {
    publisher: EventPublisher,
    outcomes: broadcast::Sender<ForwardingOutcome>,
    stats: Arc<PipelineStats>,
    shutdown_tx: watch::Sender<bool>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineHandle {
    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Receive every terminal outcome from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ForwardingOutcome> {
        self.outcomes.subscribe()
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop intake, forward everything already queued, then stop
    pub async fn shutdown(&self) {
        if self.publisher.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("event pipeline draining");
        let _ = self.shutdown_tx.send(true);

        let router = self.router.lock().take();
        if let Some(router) = router {
            if let Err(e) = router.await {
                error!(error = %e, "pipeline router panicked");
            }
        }

        let stats = self.stats.snapshot();
        info!(
            raised = stats.raised,
            forwarded = stats.forwarded,
            dropped = stats.dropped,
            failed = stats.failed,
            "event pipeline stopped"
        );
    }
}

/// Cloneable handle used by services to raise envelopes
#[derive(Clone)]
pub struct EventPublisher {
    intake: mpsc::UnboundedSender<DomainEventEnvelope>,
    closed: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
}

impl EventPublisher {
    /// Hand an envelope to the pipeline
    ///
    /// Never waits for resolution or delivery. Fails only once the pipeline
    /// has been shut down.
    pub fn raise(&self, envelope: DomainEventEnvelope) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FabricError::PipelineClosed);
        }

        debug!(
            event_id = %envelope.id,
            pattern = %envelope.pattern,
            state = ?ForwardingState::Raised,
            "envelope raised"
        );

        self.intake
            .send(envelope)
            .map_err(|_| FabricError::PipelineClosed)?;
        self.stats.raised.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// What orders envelopes relative to each other
///
/// Envelopes sharing a key are forwarded one after another in raise order.
/// Uncorrelated envelopes are keyed by their own id and order with nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderingKey {
    Correlation(CorrelationId),
    Event(Uuid),
}

impl OrderingKey {
    pub fn of(envelope: &DomainEventEnvelope) -> Self {
        match envelope.correlation_id() {
            Some(id) => OrderingKey::Correlation(id.clone()),
            None => OrderingKey::Event(envelope.id),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

struct OperationQueue {
    tx: mpsc::UnboundedSender<DomainEventEnvelope>,
    /// Envelopes sent to the queue whose outcome is not yet published
    pending: usize,
}

struct Router {
    forwarder: Arc<Forwarder>,
    queues: HashMap<OrderingKey, OperationQueue>,
    operations: JoinSet<()>,
    done_tx: mpsc::UnboundedSender<OrderingKey>,
    done_rx: mpsc::UnboundedReceiver<OrderingKey>,
}

impl Router {
    fn new(forwarder: Arc<Forwarder>) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            forwarder,
            queues: HashMap::new(),
            operations: JoinSet::new(),
            done_tx,
            done_rx,
        }
    }

    fn route(&mut self, envelope: DomainEventEnvelope) {
        let key = OrderingKey::of(&envelope);

        let envelope = match self.queues.get_mut(&key) {
            Some(queue) => match queue.tx.send(envelope) {
                Ok(()) => {
                    queue.pending += 1;
                    return;
                }
                // Queue task died; reopen below
                Err(mpsc::error::SendError(envelope)) => envelope,
            },
            None => envelope,
        };

        self.open(key, envelope);
    }

    fn open(&mut self, key: OrderingKey, envelope: DomainEventEnvelope) {
        let (tx, rx) = mpsc::unbounded_channel();
        // rx is alive until the task below drops it
        let _ = tx.send(envelope);

        self.operations.spawn(run_operation(
            key.clone(),
            rx,
            Arc::clone(&self.forwarder),
            self.done_tx.clone(),
        ));
        self.queues.insert(key, OperationQueue { tx, pending: 1 });
    }

    /// One envelope of `key` reached its outcome
    fn finished(&mut self, key: OrderingKey) {
        if let Entry::Occupied(mut entry) = self.queues.entry(key) {
            let queue = entry.get_mut();
            queue.pending = queue.pending.saturating_sub(1);
            if queue.pending == 0 {
                // Dropping the sender lets the queue task exit
                entry.remove();
            }
        }
    }

    fn reap(joined: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            error!(error = %e, "operation queue panicked");
        }
    }

    /// Close every queue and wait for queued envelopes to finish
    async fn drain(mut self) {
        self.queues.clear();
        while let Some(joined) = self.operations.join_next().await {
            Self::reap(joined);
        }
    }
}

async fn run_router(
    mut intake: mpsc::UnboundedReceiver<DomainEventEnvelope>,
    mut router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut watching = true;

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed(), if watching => {
                if changed.is_err() {
                    // Handle dropped without shutdown; keep serving publishers
                    watching = false;
                    continue;
                }
                break;
            }
            Some(key) = router.done_rx.recv() => router.finished(key),
            next = intake.recv() => match next {
                Some(envelope) => router.route(envelope),
                None => break,
            },
            Some(joined) = router.operations.join_next(), if !router.operations.is_empty() => {
                Router::reap(joined);
            }
        }
    }

    intake.close();
    while let Some(envelope) = intake.recv().await {
        router.route(envelope);
    }
    router.drain().await;

    debug!("pipeline router exited");
}

async fn run_operation(
    key: OrderingKey,
    mut rx: mpsc::UnboundedReceiver<DomainEventEnvelope>,
    forwarder: Arc<Forwarder>,
    done: mpsc::UnboundedSender<OrderingKey>,
) {
    while let Some(envelope) = rx.recv().await {
        forwarder.process(envelope).await;
        // Router may be draining and no longer counting
        let _ = done.send(key.clone());
    }
}

// ============================================================================
// Forwarder
// ============================================================================

struct Forwarder {
    resolver: Arc<dyn RecipientResolver>,
    sink: Arc<dyn EventSink>,
    resolver_retry: RetryPolicy,
    sink_retry: RetryPolicy,
    resolver_timeout: Duration,
    sink_timeout: Duration,
    outcomes: broadcast::Sender<ForwardingOutcome>,
    stats: Arc<PipelineStats>,
}

impl Forwarder {
    async fn process(&self, envelope: DomainEventEnvelope) {
        let span = info_span!(
            "pipeline.forward",
            event_id = %envelope.id,
            pattern = %envelope.pattern,
            correlation_id = field::Empty,
        );
        if let Some(id) = envelope.correlation_id() {
            span.record("correlation_id", field::display(id));
        }

        let outcome = self.forward(envelope).instrument(span).await;

        match outcome.disposition {
            Disposition::Forwarded(_) => self.stats.forwarded.fetch_add(1, Ordering::Relaxed),
            Disposition::Dropped(DropReason::NoRecipients) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed)
            }
            Disposition::Dropped(DropReason::Failed(_)) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed)
            }
        };

        // No subscribers is fine
        let _ = self.outcomes.send(outcome);
    }

    async fn resolve_once(&self, envelope: &DomainEventEnvelope) -> Result<BTreeSet<Uuid>> {
        let call = self
            .resolver
            .resolve(&envelope.entity, envelope.changes.as_ref());
        match tokio::time::timeout(self.resolver_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FabricError::resolver(format!(
                "{} did not answer within {:?}",
                self.resolver.name(),
                self.resolver_timeout
            ))),
        }
    }

    async fn deliver_once(&self, event: &ForwardingEvent) -> Result<()> {
        match tokio::time::timeout(self.sink_timeout, self.sink.deliver(event)).await {
            Ok(result) => result,
            Err(_) => Err(FabricError::transport(format!(
                "{} did not accept within {:?}",
                self.sink.name(),
                self.sink_timeout
            ))),
        }
    }

    async fn forward(&self, envelope: DomainEventEnvelope) -> ForwardingOutcome {
        let envelope_id = envelope.id;
        let pattern = envelope.pattern;
        let correlation = envelope.correlation.clone();
        let finish = |disposition| ForwardingOutcome {
            envelope_id,
            pattern,
            correlation: correlation.clone(),
            disposition,
        };

        debug!(state = ?ForwardingState::Resolving, resolver = self.resolver.name(), "resolving recipients");

        let resolved = self
            .resolver_retry
            .run("resolve recipients", |_| self.resolve_once(&envelope))
            .await;

        let ids = match resolved {
            Ok(ids) => ids,
            Err((err, attempts)) => {
                let failure = FabricError::forwarding(
                    envelope_id,
                    format!("resolver gave up after {attempts} attempts: {err}"),
                );
                error!(error = %failure, state = ?ForwardingState::Dropped, "forwarding failed");
                return finish(Disposition::Dropped(DropReason::Failed(failure)));
            }
        };

        let Ok(recipients) = Recipients::new(ids) else {
            debug!(state = ?ForwardingState::Dropped, "no recipients, dropping event");
            return finish(Disposition::Dropped(DropReason::NoRecipients));
        };

        let event = ForwardingEvent::from_envelope(envelope, recipients);

        let delivered = self
            .sink_retry
            .run("deliver forwarding event", |_| self.deliver_once(&event))
            .await;

        match delivered {
            Ok(()) => {
                debug!(
                    state = ?ForwardingState::Forwarded,
                    gateway_pattern = %event.pattern,
                    recipients = event.recipients.len(),
                    "event forwarded"
                );
                finish(Disposition::Forwarded(event))
            }
            Err((err, attempts)) => {
                let failure = FabricError::forwarding(
                    envelope_id,
                    format!("{} gave up after {attempts} attempts: {err}", self.sink.name()),
                );
                error!(error = %failure, state = ?ForwardingState::Dropped, "forwarding failed");
                finish(Disposition::Dropped(DropReason::Failed(failure)))
            }
        }
    }
}
