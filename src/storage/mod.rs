//! All things related to the storage of items and reminders

use async_trait::async_trait;
use thiserror::Error;

use crate::items::Item;
use crate::items::ItemId;
use crate::recurrence::TimeOfDay;
use crate::recurrence::WeekMask;
use crate::reminders::Reminder;
use crate::reminders::ReminderId;

pub use memory::Memory;
pub use sqlite::Sqlite;
pub use sqlite::SqliteConfig;

mod memory;
mod sqlite;

/// Which storage to use
pub enum StorageConfig {
    /// Keep everything in memory, gone on shutdown
    Memory,

    /// SQLite database at the given URL, e.g. `sqlite://pillbox.db`
    Sqlite(SqliteConfig),
}

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),

    /// The row to change no longer exists
    #[error("{entity} {id} no longer exists")]
    Missing {
        /// What kind of row
        entity: &'static str,

        /// ID of the row
        id: i64,
    },

    /// Stored data that does not fit the model
    #[error("Corrupted data: {0}")]
    Corrupted(String),
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Values to create an Item
///
/// Optional fields are expected to be normalized already, `None` when not specified
pub struct CreateItemValues<'a> {
    /// Display name
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

/// Values to update an Item
///
/// The outer `Option` tells if a field changes, the inner one if it is cleared
#[derive(Default)]
pub struct UpdateItemValues<'a> {
    /// New name
    pub name: Option<&'a str>,

    /// New dose
    pub dose: Option<Option<&'a str>>,

    /// New unit
    pub unit: Option<Option<&'a str>>,

    /// New instructions
    pub instructions: Option<Option<&'a str>>,

    /// New notes
    pub notes: Option<Option<&'a str>>,

    /// (De)activate the item
    pub active: Option<bool>,
}

/// Values to create a Reminder
pub struct CreateReminderValues {
    /// When during the day
    pub time: TimeOfDay,

    /// On which days, never empty
    pub days: WeekMask,

    /// Start out active?
    pub active: bool,
}

/// Values to update a Reminder
#[derive(Default)]
pub struct UpdateReminderValues {
    /// New time of day
    pub time: Option<TimeOfDay>,

    /// New days, never empty
    pub days: Option<WeekMask>,

    /// (De)activate the reminder
    pub active: Option<bool>,
}

/// Storage with all supported operations
#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    /// Find a single item by its ID
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>>;

    /// Find all items, ordered by name
    async fn find_all_items(&self) -> Result<Vec<Item>>;

    /// Find all items with a name containing `query`, ordered by name
    async fn search_items(&self, query: &str) -> Result<Vec<Item>>;

    /// Create an item
    async fn create_item(&self, values: &CreateItemValues) -> Result<Item>;

    /// Update an item
    async fn update_item(&self, item: &Item, values: &UpdateItemValues) -> Result<Item>;

    /// Delete an item, its reminders are deleted with it
    async fn delete_item(&self, item: &Item) -> Result<()>;

    /// Find a single reminder by its ID
    async fn find_reminder(&self, id: ReminderId) -> Result<Option<Reminder>>;

    /// Find all reminders of an item, ordered by time of day
    async fn find_reminders_by_item(&self, item_id: ItemId) -> Result<Vec<Reminder>>;

    /// Find all active reminders of active items, ordered by time of day
    async fn find_active_reminders(&self) -> Result<Vec<Reminder>>;

    /// Create a reminder for an item
    async fn create_reminder(&self, item: &Item, values: &CreateReminderValues)
    -> Result<Reminder>;

    /// Update a reminder
    async fn update_reminder(
        &self,
        reminder: &Reminder,
        values: &UpdateReminderValues,
    ) -> Result<Reminder>;

    /// Delete a reminder
    async fn delete_reminder(&self, reminder: &Reminder) -> Result<()>;
}
