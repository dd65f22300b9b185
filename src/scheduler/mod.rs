//! Scheduler
//!
//! Keeps exactly one pending alarm per armed reminder. A reminder is armed only while both
//! the reminder and its item are active. Trigger instants are never persisted, after a
//! restart everything is armed again by the reconciliation pass.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::Clock;
use crate::delivery::AlarmDelivery;
use crate::delivery::AlarmPayload;
use crate::delivery::DeliveryError;
use crate::delivery::Precision;
use crate::items::Item;
use crate::items::ItemId;
use crate::notifications::Notifier;
use crate::notifications::build_message;
use crate::notifications::build_title;
use crate::reconcile::ReconcileReport;
use crate::recurrence::next_trigger;
use crate::reminders::Reminder;
use crate::reminders::ReminderId;
use crate::storage;
use crate::storage::Storage;

use self::locks::KeyedLocks;

mod locks;

/// Scheduler errors
#[derive(Debug, Error)]
pub enum Error {
    /// Reading from storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] storage::Error),

    /// Delivery refused the alarm, even without exact precision
    #[error("{0}")]
    Delivery(#[from] DeliveryError),
}

/// Result type of the scheduler
pub type Result<T> = core::result::Result<T, Error>;

/// What happened when an alarm went off
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    /// Notified and armed for the next occurrence
    Delivered,

    /// Reminder or item deleted or inactive, nothing to do
    Skipped,

    /// Something went wrong, see the logs
    Failed,
}

/// Armed state of a reminder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderState {
    /// No pending alarm
    Unarmed,

    /// Pending alarm
    Armed {
        /// Next trigger instant
        at: DateTime<Utc>,

        /// Precision the alarm got registered with
        precision: Precision,
    },
}

/// A pending alarm as far as the scheduler knows
#[derive(Clone, Copy, Debug)]
struct Arming {
    /// The item of the reminder
    item_id: ItemId,

    /// Trigger instant
    at: DateTime<Utc>,

    /// Registered precision
    precision: Precision,
}

/// Arms and disarms reminders with the alarm delivery
#[derive(Clone)]
pub struct Scheduler<S: Storage> {
    /// Storage with the current state of items and reminders
    storage: S,

    /// Delivery of the alarms
    delivery: Arc<dyn AlarmDelivery>,

    /// Shows the reminders once they fire
    notifier: Arc<dyn Notifier>,

    /// Current time
    clock: Arc<dyn Clock>,

    /// Currently armed reminders
    armed: Arc<DashMap<ReminderId, Arming>>,

    /// Serializes all work on the same reminder
    locks: KeyedLocks,
}

impl<S: Storage> Scheduler<S> {
    /// Create a scheduler without any armed reminders
    pub fn new(
        storage: S,
        delivery: Arc<dyn AlarmDelivery>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            delivery,
            notifier,
            clock,
            armed: Arc::new(DashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    /// Arm the next trigger of a reminder, replacing any pending one
    ///
    /// Disarms the reminder instead when it or its item is inactive.
    ///
    /// # Errors
    ///
    /// Will return `Err` when delivery refuses the alarm
    pub async fn arm(&self, reminder: &Reminder, item: &Item) -> Result<ReminderState> {
        let _guard = self.locks.lock(reminder.id).await;

        self.arm_locked(reminder, item).await
    }

    /// Cancel the pending alarm of a reminder, no-op when nothing is pending
    pub async fn disarm(&self, reminder_id: ReminderId) {
        let _guard = self.locks.lock(reminder_id).await;

        self.disarm_locked(reminder_id).await;
    }

    /// Disarm reminders that are gone from storage
    pub async fn disarm_all(&self, reminders: &[Reminder]) {
        for reminder in reminders {
            self.disarm(reminder.id).await;
            self.locks.forget(reminder.id);
        }
    }

    /// Handle a fired alarm: notify and arm the next occurrence
    ///
    /// `at` is the trigger instant the alarm was registered for. An alarm that got replaced
    /// after it went off is skipped. Storage is read again, deleted or inactive reminders
    /// are skipped. Never fails, the outcome is only there to be observed.
    pub async fn on_fire(&self, reminder_id: ReminderId, at: DateTime<Utc>) -> FireOutcome {
        let _guard = self.locks.lock(reminder_id).await;

        let replaced = self
            .armed
            .get(&reminder_id)
            .is_some_and(|arming| arming.at != at);
        if replaced {
            tracing::debug!("Alarm for reminder {reminder_id} at {at} got replaced, skipping");
            return FireOutcome::Skipped;
        }

        // the alarm is spent
        self.armed.remove(&reminder_id);

        let (reminder, item) = match self.load(reminder_id).await {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                tracing::debug!("Reminder {reminder_id} fired but it or its item no longer exists");
                return FireOutcome::Skipped;
            }
            Err(err) => {
                tracing::error!("Could not load fired reminder {reminder_id}: {err}");
                return FireOutcome::Failed;
            }
        };

        if !reminder.active || !item.active {
            tracing::debug!("Reminder {reminder_id} fired while inactive");
            return FireOutcome::Skipped;
        }

        let dose = item.dose_label();
        self.notifier.notify(
            reminder_id,
            &build_title(&item.name),
            &build_message(dose.as_deref(), item.instructions.as_deref()),
        );

        match self.arm_locked(&reminder, &item).await {
            Ok(_) => FireOutcome::Delivered,
            Err(err) => {
                tracing::error!("Could not arm reminder {reminder_id} again: {err}");
                FireOutcome::Failed
            }
        }
    }

    /// Arm every active reminder of every active item
    ///
    /// Pending alarms of reminders that should no longer be armed are cancelled. Every
    /// reminder is read again under its lock, changes made while the pass runs win. Failing
    /// reminders are counted and logged, they do not stop the others.
    ///
    /// # Errors
    ///
    /// Will return `Err` when the active reminders can not be listed
    pub async fn rearm_all(&self) -> Result<ReconcileReport> {
        let active = self
            .storage
            .find_active_reminders()
            .await?
            .into_iter()
            .map(|reminder| reminder.id)
            .collect::<BTreeSet<_>>();

        let stale = self
            .armed
            .iter()
            .map(|entry| *entry.key())
            .filter(|reminder_id| !active.contains(reminder_id))
            .collect::<Vec<_>>();

        let mut report = ReconcileReport::default();

        for reminder_id in stale {
            match self.refresh(reminder_id).await {
                Ok(ReminderState::Armed { .. }) => report.armed += 1,
                Ok(ReminderState::Unarmed) => {
                    tracing::debug!("Reminder {reminder_id} should not have been armed");
                }
                Err(err) => {
                    tracing::warn!("Could not check armed reminder {reminder_id}: {err}");
                    report.failed += 1;
                }
            }
        }

        for reminder_id in active {
            match self.refresh(reminder_id).await {
                Ok(ReminderState::Armed { .. }) => report.armed += 1,
                Ok(ReminderState::Unarmed) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!("Could not arm reminder {reminder_id}: {err}");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Bring the armed state of all reminders of an item in line with storage
    ///
    /// # Errors
    ///
    /// Will return `Err` when storage fails or the first reminder that could not be armed
    pub async fn sync_item(&self, item_id: ItemId) -> Result<()> {
        let mut reminder_ids = self
            .storage
            .find_reminders_by_item(item_id)
            .await?
            .into_iter()
            .map(|reminder| reminder.id)
            .collect::<BTreeSet<_>>();

        // armed ones that are gone from storage
        reminder_ids.extend(
            self.armed
                .iter()
                .filter(|entry| entry.value().item_id == item_id)
                .map(|entry| *entry.key()),
        );

        let mut first_error = None;
        for reminder_id in reminder_ids {
            if let Err(err) = self.refresh(reminder_id).await {
                tracing::warn!("Could not arm reminder {reminder_id}: {err}");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Current armed state of a reminder
    pub fn state(&self, reminder_id: ReminderId) -> ReminderState {
        self.armed
            .get(&reminder_id)
            .map_or(ReminderState::Unarmed, |arming| ReminderState::Armed {
                at: arming.at,
                precision: arming.precision,
            })
    }

    /// Retract the shown notification of a reminder
    pub fn dismiss(&self, reminder_id: ReminderId) {
        self.notifier.dismiss(reminder_id);
    }

    /// Arm or disarm a reminder according to what storage holds right now
    ///
    /// A pending alarm that is already due is left alone, [`Scheduler::on_fire`] arms the
    /// next occurrence once it is handled.
    async fn refresh(&self, reminder_id: ReminderId) -> Result<ReminderState> {
        let _guard = self.locks.lock(reminder_id).await;

        let Some((reminder, item)) = self.load(reminder_id).await? else {
            self.disarm_locked(reminder_id).await;
            return Ok(ReminderState::Unarmed);
        };

        if reminder.active && item.active {
            let now = self.clock.now().with_timezone(&Utc);
            let due = self
                .armed
                .get(&reminder_id)
                .filter(|arming| arming.at <= now)
                .map(|arming| ReminderState::Armed {
                    at: arming.at,
                    precision: arming.precision,
                });

            if let Some(due) = due {
                return Ok(due);
            }
        }

        self.arm_locked(&reminder, &item).await
    }

    /// Reminder and its item, `None` when either is gone
    async fn load(&self, reminder_id: ReminderId) -> storage::Result<Option<(Reminder, Item)>> {
        let Some(reminder) = self.storage.find_reminder(reminder_id).await? else {
            return Ok(None);
        };

        let item = self.storage.find_item(reminder.item_id).await?;

        Ok(item.map(|item| (reminder, item)))
    }

    /// Arm, the caller holds the lock of the reminder
    async fn arm_locked(&self, reminder: &Reminder, item: &Item) -> Result<ReminderState> {
        if !reminder.active || !item.active {
            self.disarm_locked(reminder.id).await;
            return Ok(ReminderState::Unarmed);
        }

        let at = next_trigger(&self.clock.now(), reminder.time, reminder.days).with_timezone(&Utc);
        let payload = AlarmPayload::new(reminder, item);

        let precision = match self
            .register(reminder.id, at, payload, Precision::Exact)
            .await
        {
            Ok(precision) => precision,
            Err(err) => {
                self.disarm_locked(reminder.id).await;
                return Err(err.into());
            }
        };

        self.armed.insert(
            reminder.id,
            Arming {
                item_id: item.id,
                at,
                precision,
            },
        );

        tracing::debug!("Reminder {} armed for {at} ({precision:?})", reminder.id);

        Ok(ReminderState::Armed { at, precision })
    }

    /// Register with delivery, without exact precision when that is not permitted
    async fn register(
        &self,
        reminder_id: ReminderId,
        at: DateTime<Utc>,
        payload: AlarmPayload,
        precision: Precision,
    ) -> core::result::Result<Precision, DeliveryError> {
        match self
            .delivery
            .register(reminder_id, at, payload.clone(), precision)
            .await
        {
            Ok(()) => Ok(precision),
            Err(DeliveryError::PermissionDenied(_)) if precision == Precision::Exact => {
                tracing::warn!("Exact alarms are not permitted, reminder {reminder_id} is inexact");

                self.delivery
                    .register(reminder_id, at, payload, Precision::Inexact)
                    .await?;

                Ok(Precision::Inexact)
            }
            Err(err) => Err(err),
        }
    }

    /// Disarm, the caller holds the lock of the reminder
    async fn disarm_locked(&self, reminder_id: ReminderId) {
        self.delivery.cancel(reminder_id).await;

        if self.armed.remove(&reminder_id).is_some() {
            tracing::debug!("Reminder {reminder_id} disarmed");
        }
    }
}
