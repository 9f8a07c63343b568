use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use release_relay_core::{NotificationFormatter, NotificationMessage, Release};
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::messaging::{DeliveryError, MessagingClient};

const INITIAL_CONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_CONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// Lifecycle of the messaging run-loop as seen by producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLoopState {
    Connecting,
    Ready,
    Stopped,
}

impl RunLoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
        }
    }
}

/// Reasons a notification could not be handed to the run-loop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("messaging run-loop is not ready yet")]
    NotReady,
    #[error("messaging run-loop has stopped")]
    Closed,
    #[error("relay queue is full")]
    QueueFull,
}

impl DispatchError {
    fn metric_label(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Closed => "closed",
            Self::QueueFull => "queue_full",
        }
    }
}

/// Notification waiting in the run-loop queue.
#[derive(Debug)]
pub struct ScheduledNotification {
    pub delivery_id: Uuid,
    pub tag_name: String,
    pub message: NotificationMessage,
    pub scheduled_at: DateTime<Utc>,
}

/// Producer half of the relay, shared by every webhook request.
///
/// Scheduling never waits: the notification is formatted, pushed onto a
/// bounded queue and the caller returns. The paired [`RelayWorker`] owns the
/// messaging client and is the only consumer of that queue.
#[derive(Clone)]
pub struct RelayDispatcher {
    formatter: NotificationFormatter,
    sender: mpsc::Sender<ScheduledNotification>,
    state: watch::Receiver<RunLoopState>,
    scheduled: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
}

impl RelayDispatcher {
    pub fn new(
        formatter: NotificationFormatter,
        client: Arc<dyn MessagingClient>,
        capacity: usize,
    ) -> (Self, RelayWorker) {
        let (sender, receiver) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(RunLoopState::Connecting);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = RelayWorker {
            client,
            receiver,
            state: state_tx,
            pending: pending.clone(),
            connect_backoff: INITIAL_CONNECT_BACKOFF,
        };
        let dispatcher = Self {
            formatter,
            sender,
            state: state_rx,
            scheduled: Arc::new(AtomicU64::new(0)),
            pending,
        };
        (dispatcher, worker)
    }

    /// Schedules delivery of `release` and logs, rather than returns, any failure.
    pub fn dispatch(&self, release: &Release) {
        match self.schedule(release) {
            Ok(delivery_id) => {
                info!(
                    stage = "dispatch",
                    %delivery_id,
                    tag = %release.tag_name,
                    channel_id = self.formatter.channel_id(),
                    "release notification scheduled"
                );
            }
            Err(err) => {
                error!(
                    stage = "dispatch",
                    tag = %release.tag_name,
                    error = %err,
                    "release notification dropped"
                );
            }
        }
    }

    /// Formats `release` and enqueues it for the run-loop.
    pub fn schedule(&self, release: &Release) -> Result<Uuid, DispatchError> {
        let result = self.try_schedule(release);
        let label = match &result {
            Ok(_) => "scheduled",
            Err(err) => err.metric_label(),
        };
        counter!("relay_dispatch_total", "result" => label).increment(1);
        result
    }

    fn try_schedule(&self, release: &Release) -> Result<Uuid, DispatchError> {
        match self.state() {
            RunLoopState::Connecting => return Err(DispatchError::NotReady),
            RunLoopState::Stopped => return Err(DispatchError::Closed),
            RunLoopState::Ready => {}
        }

        let delivery_id = Uuid::new_v4();
        let notification = ScheduledNotification {
            delivery_id,
            tag_name: release.tag_name.clone(),
            message: self.formatter.format(release),
            scheduled_at: Utc::now(),
        };

        // Counted before the send so the consumer never decrements below zero.
        let depth = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(err) = self.sender.try_send(notification) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(match err {
                TrySendError::Full(_) => DispatchError::QueueFull,
                TrySendError::Closed(_) => DispatchError::Closed,
            });
        }
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        gauge!("relay_queue_depth").set(depth as f64);

        Ok(delivery_id)
    }

    pub fn state(&self) -> RunLoopState {
        *self.state.borrow()
    }

    /// Waits until the run-loop leaves [`RunLoopState::Connecting`].
    #[cfg(test)]
    pub async fn wait_started(&self) -> RunLoopState {
        let mut state = self.state.clone();
        let started = state
            .wait_for(|current| *current != RunLoopState::Connecting)
            .await
            .map(|current| *current);
        started.unwrap_or(RunLoopState::Stopped)
    }

    /// Number of notifications successfully handed to the run-loop.
    pub fn scheduled_total(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Notifications scheduled but not yet picked up by the run-loop.
    pub fn queue_depth(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Single consumer that owns the messaging client.
pub struct RelayWorker {
    client: Arc<dyn MessagingClient>,
    receiver: mpsc::Receiver<ScheduledNotification>,
    state: watch::Sender<RunLoopState>,
    pending: Arc<AtomicUsize>,
    connect_backoff: Duration,
}

impl RelayWorker {
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    #[cfg(test)]
    fn with_connect_backoff(mut self, backoff: Duration) -> Self {
        self.connect_backoff = backoff;
        self
    }

    async fn run(mut self) {
        if !self.connect().await {
            self.state.send_replace(RunLoopState::Stopped);
            return;
        }
        self.state.send_replace(RunLoopState::Ready);

        // Ends once every dispatcher clone is dropped and the queue is drained.
        while let Some(notification) = self.receiver.recv().await {
            let depth = self.pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            gauge!("relay_queue_depth").set(depth as f64);
            self.deliver(notification).await;
        }

        self.state.send_replace(RunLoopState::Stopped);
        warn!(stage = "delivery", "relay run-loop stopped");
    }

    /// Connects the client, retrying transient failures with capped exponential backoff.
    ///
    /// Gives up when the credential is rejected or every producer has gone away.
    async fn connect(&self) -> bool {
        let mut backoff = self.connect_backoff;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.client.connect().await {
                Ok(identity) => {
                    info!(stage = "delivery", %identity, attempt, "messaging client ready");
                    return true;
                }
                Err(DeliveryError::Unauthorized(reason)) => {
                    error!(
                        stage = "delivery",
                        %reason,
                        "messaging credential rejected; relay disabled"
                    );
                    return false;
                }
                Err(err) => {
                    warn!(
                        stage = "delivery",
                        error = %err,
                        attempt,
                        retry_in_ms = backoff.as_millis() as u64,
                        "messaging client failed to connect; retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.state.closed() => {
                            warn!(
                                stage = "delivery",
                                "producers dropped before the client connected"
                            );
                            return false;
                        }
                    }
                    backoff = (backoff * 2).min(MAX_CONNECT_BACKOFF);
                }
            }
        }
    }

    async fn deliver(&self, notification: ScheduledNotification) {
        let ScheduledNotification {
            delivery_id,
            tag_name,
            message,
            scheduled_at,
        } = notification;
        let queued_ms = (Utc::now() - scheduled_at).num_milliseconds().max(0);
        histogram!("relay_queue_wait_seconds").record(queued_ms as f64 / 1000.0);

        match self.client.send(&message).await {
            Ok(()) => {
                counter!("relay_delivery_total", "result" => "delivered").increment(1);
                info!(
                    stage = "delivery",
                    %delivery_id,
                    tag = %tag_name,
                    channel_id = message.channel_id,
                    queued_ms,
                    "release notification delivered"
                );
            }
            Err(err) => {
                counter!("relay_delivery_total", "result" => err.metric_label()).increment(1);
                error!(
                    stage = "delivery",
                    %delivery_id,
                    tag = %tag_name,
                    channel_id = message.channel_id,
                    error = %err,
                    "release notification failed"
                );
            }
        }
    }
}
