//! Alarm delivery
//!
//! The mechanism that wakes the scheduler up once a trigger instant is reached. Every
//! reminder has at most one pending alarm, registering again replaces it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::items::Item;
use crate::reminders::Reminder;
use crate::reminders::ReminderId;

/// Longest single sleep, the wall clock is checked again after it
///
/// Keeps alarms on time when the wall clock jumps (suspend, manual change)
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// How precise an alarm is delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    /// At the trigger instant
    Exact,

    /// Best-effort, may be batched with other alarms and fire later
    Inexact,
}

/// Everything needed to show a reminder once it fires
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlarmPayload {
    /// The reminder that fired
    pub reminder_id: ReminderId,

    /// Name of the item
    pub item_name: String,

    /// Dose, with unit when known
    pub dose: Option<String>,

    /// Instructions of the item
    pub instructions: Option<String>,
}

impl AlarmPayload {
    /// Payload for a reminder of an item
    pub fn new(reminder: &Reminder, item: &Item) -> Self {
        Self {
            reminder_id: reminder.id,
            item_name: item.name.clone(),
            dose: item.dose_label(),
            instructions: item.instructions.clone(),
        }
    }
}

/// An alarm that went off
#[derive(Debug)]
pub struct Fired {
    /// The reminder that fired
    pub reminder_id: ReminderId,

    /// Trigger instant given at registration, before any batching
    pub at: DateTime<Utc>,

    /// Payload given at registration
    pub payload: AlarmPayload,
}

/// Delivery errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Not allowed to schedule with the requested precision
    #[error("Permission denied for {0:?} alarms")]
    PermissionDenied(Precision),

    /// The delivery mechanism can not take any alarms
    #[error("Alarm delivery unavailable: {0}")]
    Unavailable(String),
}

/// Mechanism that delivers alarms at their trigger instant
#[async_trait]
pub trait AlarmDelivery: Send + Sync {
    /// Register the alarm of a reminder, replacing any pending one
    async fn register(
        &self,
        reminder_id: ReminderId,
        at: DateTime<Utc>,
        payload: AlarmPayload,
        precision: Precision,
    ) -> Result<(), DeliveryError>;

    /// Cancel the pending alarm of a reminder, if any
    async fn cancel(&self, reminder_id: ReminderId);
}

/// Settings of the timer based delivery
#[derive(Clone, Debug)]
pub struct AlarmSettings {
    /// Are exact alarms granted?
    pub exact_allowed: bool,

    /// Inexact alarms fire at the first multiple of this window
    pub batch_window: Duration,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            exact_allowed: true,
            batch_window: Duration::from_secs(15 * 60),
        }
    }
}

/// A registered alarm waiting for its instant
struct PendingAlarm {
    /// Tells registrations for the same reminder apart
    generation: u64,

    /// Stops the waiting task
    token: CancellationToken,
}

/// Alarm delivery with in-process timers
///
/// Fired alarms are sent over the channel handed out by [`TimerDelivery::new`]. Pending
/// alarms do not survive a restart, the reconciliation pass registers them again.
pub struct TimerDelivery {
    /// Settings
    settings: AlarmSettings,

    /// Where fired alarms go
    fired: mpsc::UnboundedSender<Fired>,

    /// Pending alarms by reminder
    pending: Arc<Mutex<HashMap<ReminderId, PendingAlarm>>>,

    /// Last handed out generation
    generation: AtomicU64,
}

impl TimerDelivery {
    /// Create the delivery and the receiving end of fired alarms
    pub fn new(settings: AlarmSettings) -> (Self, mpsc::UnboundedReceiver<Fired>) {
        let (fired, receiver) = mpsc::unbounded_channel();

        let delivery = Self {
            settings,
            fired,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        };

        (delivery, receiver)
    }

    /// Number of alarms waiting to fire
    #[cfg(test)]
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl AlarmDelivery for TimerDelivery {
    async fn register(
        &self,
        reminder_id: ReminderId,
        at: DateTime<Utc>,
        payload: AlarmPayload,
        precision: Precision,
    ) -> Result<(), DeliveryError> {
        if precision == Precision::Exact && !self.settings.exact_allowed {
            return Err(DeliveryError::PermissionDenied(precision));
        }

        if self.fired.is_closed() {
            return Err(DeliveryError::Unavailable(
                "Nobody is listening for fired alarms".to_string(),
            ));
        }

        let deadline = match precision {
            Precision::Exact => at,
            Precision::Inexact => batched(at, self.settings.batch_window),
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        let previous = self.pending.lock().await.insert(
            reminder_id,
            PendingAlarm {
                generation,
                token: token.clone(),
            },
        );

        if let Some(previous) = previous {
            previous.token.cancel();
        }

        tracing::trace!("Alarm for reminder {reminder_id} set for {deadline}");

        tokio::spawn(wait_and_fire(
            Fired {
                reminder_id,
                at,
                payload,
            },
            generation,
            deadline,
            token,
            Arc::clone(&self.pending),
            self.fired.clone(),
        ));

        Ok(())
    }

    async fn cancel(&self, reminder_id: ReminderId) {
        if let Some(alarm) = self.pending.lock().await.remove(&reminder_id) {
            alarm.token.cancel();

            tracing::trace!("Alarm for reminder {reminder_id} cancelled");
        }
    }
}

/// Wait for the deadline and send the alarm, unless it got cancelled or replaced
async fn wait_and_fire(
    alarm: Fired,
    generation: u64,
    deadline: DateTime<Utc>,
    token: CancellationToken,
    pending: Arc<Mutex<HashMap<ReminderId, PendingAlarm>>>,
    fired: mpsc::UnboundedSender<Fired>,
) {
    tokio::select! {
        () = token.cancelled() => return,
        () = sleep_until(deadline) => {}
    }

    {
        let mut pending = pending.lock().await;

        match pending.get(&alarm.reminder_id) {
            Some(current) if current.generation == generation => {
                pending.remove(&alarm.reminder_id);
            }
            _ => return,
        }
    }

    let reminder_id = alarm.reminder_id;
    if fired.send(alarm).is_err() {
        tracing::warn!("Alarm for reminder {reminder_id} went off but nobody is listening");
    }
}

/// Sleep until the wall clock reaches the deadline
async fn sleep_until(deadline: DateTime<Utc>) {
    while let Ok(remaining) = (deadline - Utc::now()).to_std() {
        if remaining.is_zero() {
            break;
        }

        tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
    }
}

/// Round up to the next multiple of the batch window
fn batched(at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX).max(1);
    let seconds = at.timestamp() + i64::from(at.timestamp_subsec_nanos() > 0);

    let remainder = seconds.rem_euclid(window);
    if remainder == 0 {
        return DateTime::from_timestamp(seconds, 0).unwrap_or(at);
    }

    seconds
        .checked_add(window - remainder)
        .and_then(|rounded| DateTime::from_timestamp(rounded, 0))
        .unwrap_or(at)
}
