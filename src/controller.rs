//! All changes to items and reminders
//!
//! Storage is always written before the scheduler is told, so an alarm firing at the same
//! moment reads the new state.

use std::slice;

use thiserror::Error;

use crate::items::Item;
use crate::items::ItemId;
use crate::items::normalize_name;
use crate::items::normalize_optional;
use crate::reconcile;
use crate::reconcile::ReconcileReport;
use crate::reconcile::Trigger;
use crate::recurrence::TimeOfDay;
use crate::recurrence::WeekMask;
use crate::reminders::Reminder;
use crate::reminders::ReminderId;
use crate::scheduler;
use crate::scheduler::ReminderState;
use crate::scheduler::Scheduler;
use crate::storage;
use crate::storage::CreateItemValues;
use crate::storage::CreateReminderValues;
use crate::storage::Storage;
use crate::storage::UpdateItemValues;
use crate::storage::UpdateReminderValues;

const ITEM_NOT_FOUND: &str = "Medication not found";
const REMINDER_NOT_FOUND: &str = "Reminder not found";

/// Errors of the controller, with a message fit for humans
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not acceptable, nothing is stored
    #[error("{0}")]
    Validation(String),

    /// Item or reminder does not exist
    #[error("{0}")]
    NotFound(&'static str),

    /// Storage failed
    #[error("Could not save the changes: {0}")]
    Storage(storage::Error),

    /// Stored, but the alarms could not be updated
    #[error("Could not update the alarms: {0}")]
    Scheduling(scheduler::Error),
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        match err {
            storage::Error::Missing {
                entity: "Reminder", ..
            } => Self::NotFound(REMINDER_NOT_FOUND),
            storage::Error::Missing { .. } => Self::NotFound(ITEM_NOT_FOUND),
            err => Self::Storage(err),
        }
    }
}

impl From<scheduler::Error> for Error {
    fn from(err: scheduler::Error) -> Self {
        Self::Scheduling(err)
    }
}

/// Result type of the controller
pub type Result<T> = core::result::Result<T, Error>;

/// Input for a new item
#[derive(Debug, Default)]
pub struct NewItem<'a> {
    /// Display name, required
    pub name: &'a str,

    /// Dose amount
    pub dose: Option<&'a str>,

    /// Unit of the dose
    pub unit: Option<&'a str>,

    /// Instructions
    pub instructions: Option<&'a str>,

    /// Notes
    pub notes: Option<&'a str>,
}

/// Changes to an item, `None` leaves a field alone
#[derive(Debug, Default)]
pub struct ItemChanges<'a> {
    /// New name
    pub name: Option<&'a str>,

    /// New dose, `Some(None)` clears it
    pub dose: Option<Option<&'a str>>,

    /// New unit, `Some(None)` clears it
    pub unit: Option<Option<&'a str>>,

    /// New instructions, `Some(None)` clears them
    pub instructions: Option<Option<&'a str>>,

    /// New notes, `Some(None)` clears them
    pub notes: Option<Option<&'a str>>,

    /// (De)activate the item and all its reminders
    pub active: Option<bool>,
}

/// Input for a new reminder
#[derive(Debug)]
pub struct NewReminder {
    /// Minutes since midnight
    pub minutes: i64,

    /// Day mask, every day when absent or empty
    pub days: Option<u8>,

    /// Start out active, defaults to `true`
    pub active: Option<bool>,
}

/// Changes to a reminder, `None` leaves a field alone
#[derive(Debug, Default)]
pub struct ReminderChanges {
    /// New minutes since midnight
    pub minutes: Option<i64>,

    /// New day mask, empty means every day
    pub days: Option<u8>,

    /// (De)activate the reminder
    pub active: Option<bool>,
}

/// Entry point for all changes made by the user
#[derive(Clone)]
pub struct Controller<S: Storage> {
    /// Where items and reminders live
    storage: S,

    /// Keeps the alarms in line with storage
    scheduler: Scheduler<S>,
}

impl<S: Storage> Controller<S> {
    pub fn new(storage: S, scheduler: Scheduler<S>) -> Self {
        Self { storage, scheduler }
    }

    /// All items ordered by name, only the ones matching `query` when not blank
    pub async fn list_items(&self, query: Option<&str>) -> Result<Vec<Item>> {
        let items = match query.map(str::trim).filter(|query| !query.is_empty()) {
            Some(query) => self.storage.search_items(query).await?,
            None => self.storage.find_all_items().await?,
        };

        Ok(items)
    }

    pub async fn get_item(&self, item_id: ItemId) -> Result<Item> {
        self.storage
            .find_item(item_id)
            .await?
            .ok_or(Error::NotFound(ITEM_NOT_FOUND))
    }

    /// Add an active item without reminders
    pub async fn add_item(&self, new_item: &NewItem<'_>) -> Result<Item> {
        let name = parse_name(new_item.name)?;
        let dose = normalize_optional(new_item.dose);
        let unit = normalize_optional(new_item.unit);
        let instructions = normalize_optional(new_item.instructions);
        let notes = normalize_optional(new_item.notes);

        let values = CreateItemValues {
            name: &name,
            dose: dose.as_deref(),
            unit: unit.as_deref(),
            instructions: instructions.as_deref(),
            notes: notes.as_deref(),
        };

        let item = self.storage.create_item(&values).await?;

        tracing::info!(r#"Item {} "{}" added"#, item.id, item.name);

        Ok(item)
    }

    /// Update an item, the alarms of all its reminders follow
    pub async fn update_item(&self, item_id: ItemId, changes: &ItemChanges<'_>) -> Result<Item> {
        let name = changes.name.map(parse_name).transpose()?;
        let dose = changes.dose.map(normalize_optional);
        let unit = changes.unit.map(normalize_optional);
        let instructions = changes.instructions.map(normalize_optional);
        let notes = changes.notes.map(normalize_optional);

        let item = self.get_item(item_id).await?;

        let values = UpdateItemValues {
            name: name.as_deref(),
            dose: dose.as_ref().map(Option::as_deref),
            unit: unit.as_ref().map(Option::as_deref),
            instructions: instructions.as_ref().map(Option::as_deref),
            notes: notes.as_ref().map(Option::as_deref),
            active: changes.active,
        };

        let item = self.storage.update_item(&item, &values).await?;

        self.scheduler.sync_item(item.id).await?;

        tracing::info!(r#"Item {} "{}" updated"#, item.id, item.name);

        Ok(item)
    }

    /// Delete an item together with its reminders
    pub async fn delete_item(&self, item_id: ItemId) -> Result<()> {
        let item = self.get_item(item_id).await?;
        let reminders = self.storage.find_reminders_by_item(item.id).await?;

        self.storage.delete_item(&item).await?;

        self.scheduler.disarm_all(&reminders).await;

        tracing::info!(r#"Item {} "{}" deleted"#, item.id, item.name);

        Ok(())
    }

    /// Reminders of an item, ordered by time of day
    pub async fn list_reminders(&self, item_id: ItemId) -> Result<Vec<Reminder>> {
        let item = self.get_item(item_id).await?;

        Ok(self.storage.find_reminders_by_item(item.id).await?)
    }

    pub async fn get_reminder(&self, item_id: ItemId, reminder_id: ReminderId) -> Result<Reminder> {
        self.storage
            .find_reminder(reminder_id)
            .await?
            .filter(|reminder| reminder.item_id == item_id)
            .ok_or(Error::NotFound(REMINDER_NOT_FOUND))
    }

    /// Add a reminder to an item, armed right away when both are active
    pub async fn add_reminder(&self, item_id: ItemId, new_reminder: &NewReminder) -> Result<Reminder> {
        let time = parse_time(new_reminder.minutes)?;
        let days = parse_days(new_reminder.days.unwrap_or(WeekMask::ALL_DAYS.bits()))?;

        let item = self.get_item(item_id).await?;

        let values = CreateReminderValues {
            time,
            days,
            active: new_reminder.active.unwrap_or(true),
        };

        let reminder = self.storage.create_reminder(&item, &values).await?;

        self.scheduler.arm(&reminder, &item).await?;

        tracing::info!(
            "Reminder {} at {} added to item {}",
            reminder.id,
            reminder.time,
            item.id
        );

        Ok(reminder)
    }

    /// Update a reminder, its alarm follows
    pub async fn update_reminder(
        &self,
        item_id: ItemId,
        reminder_id: ReminderId,
        changes: &ReminderChanges,
    ) -> Result<Reminder> {
        let time = changes.minutes.map(parse_time).transpose()?;
        let days = changes.days.map(parse_days).transpose()?;

        let item = self.get_item(item_id).await?;
        let reminder = self.get_reminder(item.id, reminder_id).await?;

        let values = UpdateReminderValues {
            time,
            days,
            active: changes.active,
        };

        let reminder = self.storage.update_reminder(&reminder, &values).await?;

        self.scheduler.arm(&reminder, &item).await?;

        tracing::info!("Reminder {} updated", reminder.id);

        Ok(reminder)
    }

    /// Delete a reminder and its alarm
    pub async fn delete_reminder(&self, item_id: ItemId, reminder_id: ReminderId) -> Result<()> {
        let reminder = self.get_reminder(item_id, reminder_id).await?;

        self.storage.delete_reminder(&reminder).await?;

        self.scheduler
            .disarm_all(slice::from_ref(&reminder))
            .await;

        tracing::info!("Reminder {} deleted", reminder.id);

        Ok(())
    }

    /// Armed state of a reminder
    pub fn reminder_state(&self, reminder_id: ReminderId) -> ReminderState {
        self.scheduler.state(reminder_id)
    }

    /// Retract the notification of a reminder, e.g. when the dose is taken
    pub async fn dismiss(&self, reminder_id: ReminderId) -> Result<()> {
        let reminder = self
            .storage
            .find_reminder(reminder_id)
            .await?
            .ok_or(Error::NotFound(REMINDER_NOT_FOUND))?;

        self.scheduler.dismiss(reminder.id);

        Ok(())
    }

    /// Run a reconciliation pass on request
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        Ok(reconcile::run(&self.scheduler, Trigger::Manual).await?)
    }
}

fn parse_name(name: &str) -> Result<String> {
    normalize_name(name)
        .ok_or_else(|| Error::Validation("The medication name is required".to_string()))
}

fn parse_time(minutes: i64) -> Result<TimeOfDay> {
    TimeOfDay::from_minutes(minutes).map_err(|_| {
        Error::Validation(format!(
            "Time of day must be between 00:00 and 23:59, got {minutes} minutes"
        ))
    })
}

/// Day mask, nothing selected means every day
fn parse_days(bits: u8) -> Result<WeekMask> {
    if bits > WeekMask::ALL_DAYS.bits() {
        return Err(Error::Validation(format!(
            "Days must be a combination of weekdays (0 to 127), got {bits}"
        )));
    }

    Ok(WeekMask::from_bits(bits).normalized())
}
