//! Background settlement of verified payments.
//!
//! Verified payments are settled on tasks that do not belong to the
//! request, so a client disconnecting never cancels a settlement. The
//! [`SettlementQueue`] bounds both the backlog and the number of concurrent
//! `/settle` calls, and counts every outcome.
//!
//! A full queue rejects new jobs instead of blocking the request. Failed
//! settlements are logged at `error` level with the network, transaction
//! and reason so they can be reconciled out of band.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use paygate::{PaymentPayload, PaymentRequirement};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::facilitator_client::FacilitatorClient;

/// When a verified payment is settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SettlementMode {
    /// Queue settlement and run the handler immediately.
    #[default]
    Background,
    /// Settle before running the handler and fail the request if settlement
    /// fails. The settlement result is returned in `X-Payment-Response`.
    BeforeExecution,
}

/// A verified payment waiting to be settled.
#[derive(Debug, Clone)]
pub struct SettlementJob {
    /// The client's payment.
    pub payload: PaymentPayload,
    /// The requirement it satisfied.
    pub requirement: PaymentRequirement,
}

/// Snapshot of settlement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementStats {
    /// Jobs accepted into the queue.
    pub submitted: u64,
    /// Jobs the facilitator settled.
    pub settled: u64,
    /// Jobs that failed to settle.
    pub failed: u64,
    /// Jobs refused because the queue was full or closed.
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    settled: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SettlementStats {
        SettlementStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            settled: self.settled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// A job could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The backlog is at capacity.
    #[error("settlement queue is full")]
    Full,
    /// The queue is shutting down.
    #[error("settlement queue is closed")]
    Closed,
}

/// Bounded pool settling payments in the background.
#[derive(Debug)]
pub struct SettlementQueue {
    tx: mpsc::Sender<SettlementJob>,
    counters: Arc<Counters>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl SettlementQueue {
    /// Starts the dispatcher.
    ///
    /// At most `workers` settlements run at once and at most `capacity`
    /// wait. Both are clamped to at least one. Must be called from within a
    /// tokio runtime.
    #[must_use]
    pub fn start(client: FacilitatorClient, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let dispatcher = Dispatcher {
            rx,
            client,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            counters: Arc::clone(&counters),
            tracker: tracker.clone(),
        };
        tracker.spawn(dispatcher.run(token.clone()));
        Self {
            tx,
            counters,
            token,
            tracker,
        }
    }

    /// Queues a job without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if the queue is full or shutting down. The
    /// rejection is counted and logged.
    pub fn submit(&self, job: SettlementJob) -> Result<(), SubmitError> {
        let network = job.requirement.network.clone();
        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                let err = match e {
                    mpsc::error::TrySendError::Full(_) => SubmitError::Full,
                    mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
                };
                tracing::error!(%network, error = %err, "Settlement rejected");
                Err(err)
            }
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SettlementStats {
        self.counters.snapshot()
    }

    /// Stops intake, settles everything already queued and waits for
    /// in-flight settlements to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

struct Dispatcher {
    rx: mpsc::Receiver<SettlementJob>,
    client: FacilitatorClient,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    tracker: TaskTracker,
}

impl Dispatcher {
    async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => self.dispatch(job).await,
                    None => return,
                },
            }
        }
        self.rx.close();
        while let Some(job) = self.rx.recv().await {
            self.dispatch(job).await;
        }
        tracing::debug!("Settlement queue drained");
    }

    async fn dispatch(&self, job: SettlementJob) {
        // The semaphore is never closed.
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };
        let client = self.client.clone();
        let counters = Arc::clone(&self.counters);
        self.tracker.spawn(async move {
            settle(&client, &job, &counters).await;
            drop(permit);
        });
    }
}

async fn settle(client: &FacilitatorClient, job: &SettlementJob, counters: &Counters) {
    let network = job.requirement.network.as_str();
    match client.settle(&job.payload, &job.requirement).await {
        Ok(response) if response.success => {
            counters.settled.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                network,
                transaction = %response.transaction,
                payer = response.payer.as_deref().unwrap_or_default(),
                "Payment settled"
            );
        }
        Ok(response) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                network,
                transaction = %response.transaction,
                amount = %job.requirement.max_amount_required,
                reason = response.error_reason.as_deref().unwrap_or("unknown"),
                "Settlement failed"
            );
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                network,
                amount = %job.requirement.max_amount_required,
                reason = %err,
                "Settlement failed"
            );
        }
    }
}
