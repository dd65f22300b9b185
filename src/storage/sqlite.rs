//! SQLite storage

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqlitePoolOptions;

use crate::items::Item;
use crate::items::ItemId;
use crate::recurrence::TimeOfDay;
use crate::recurrence::WeekMask;
use crate::reminders::Reminder;
use crate::reminders::ReminderId;

use super::CreateItemValues;
use super::CreateReminderValues;
use super::Error;
use super::Result;
use super::Storage;
use super::UpdateItemValues;
use super::UpdateReminderValues;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// SQLite configuration
#[derive(Clone, Debug)]
pub enum SqliteConfig {
    /// Connect to the database at this URL, creating it when missing
    Url(String),

    /// Use existing connection
    ExistingConnection(SqlitePool),
}

/// SQLite storage
#[derive(Clone, Debug)]
pub struct Sqlite {
    /// Pool of connections
    connection_pool: SqlitePool,
}

impl Sqlite {
    /// Create a new SQLite storage
    ///
    /// Migrations will be run
    pub async fn from_config(config: SqliteConfig) -> Result<Self> {
        match config {
            SqliteConfig::Url(url) => Self::new(&url).await,
            SqliteConfig::ExistingConnection(pool) => Self::new_with_pool(pool).await,
        }
    }

    /// Create SQLite storage
    ///
    /// Foreign keys are enforced, they take care of the cascading deletes
    async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(connection_error)?
            .create_if_missing(true)
            .foreign_keys(true);

        let connection_pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create SQLite storage with existing pool
    ///
    /// Migrations will be run
    async fn new_with_pool(connection_pool: SqlitePool) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(|err| Error::Connection(format!("Migrations could not run: {err}")))?;

        Ok(Self { connection_pool })
    }
}

/// `SQLx` version of item
#[derive(sqlx::FromRow)]
struct SqlxItem {
    id: i64,
    name: String,
    dose: Option<String>,
    unit: Option<String>,
    instructions: Option<String>,
    notes: Option<String>,
    active: bool,
    created_at: NaiveDateTime,
}

impl Item {
    /// Create item from `SQLx` version
    fn from_sqlx_item(item: SqlxItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            dose: item.dose,
            unit: item.unit,
            instructions: item.instructions,
            notes: item.notes,
            active: item.active,
            created_at: item.created_at,
        }
    }

    /// Create multiple items from `SQLx` version
    fn from_sqlx_item_multiple(items: Vec<SqlxItem>) -> Vec<Self> {
        items.into_iter().map(Self::from_sqlx_item).collect()
    }
}

/// `SQLx` version of reminder
#[derive(sqlx::FromRow)]
struct SqlxReminder {
    id: i64,
    item_id: i64,
    minutes_since_midnight: i64,
    week_mask: i64,
    active: bool,
    created_at: NaiveDateTime,
}

impl Reminder {
    /// Create reminder from `SQLx` version
    fn from_sqlx_reminder(reminder: SqlxReminder) -> Result<Self> {
        let time = TimeOfDay::from_minutes(reminder.minutes_since_midnight)
            .map_err(|err| Error::Corrupted(format!("Reminder {}: {err}", reminder.id)))?;

        let days = u8::try_from(reminder.week_mask)
            .map(WeekMask::from_bits)
            .map_err(|_| {
                Error::Corrupted(format!(
                    "Reminder {}: week mask {} out of range",
                    reminder.id, reminder.week_mask
                ))
            })?;

        Ok(Self {
            id: reminder.id,
            item_id: reminder.item_id,
            time,
            days,
            active: reminder.active,
            created_at: reminder.created_at,
        })
    }

    /// Maybe create reminder from `SQLx` version
    fn from_sqlx_reminder_optional(reminder: Option<SqlxReminder>) -> Result<Option<Self>> {
        reminder.map(Self::from_sqlx_reminder).transpose()
    }

    /// Create multiple reminders from `SQLx` version
    fn from_sqlx_reminder_multiple(reminders: Vec<SqlxReminder>) -> Result<Vec<Self>> {
        reminders
            .into_iter()
            .map(Self::from_sqlx_reminder)
            .collect()
    }
}

#[async_trait]
impl Storage for Sqlite {
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        let item = sqlx::query_as::<_, SqlxItem>(
            r"
            SELECT *
            FROM items
            WHERE id = ?
            LIMIT 1
            ",
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(item.map(Item::from_sqlx_item))
    }

    async fn find_all_items(&self) -> Result<Vec<Item>> {
        let items = sqlx::query_as::<_, SqlxItem>(
            r"
            SELECT *
            FROM items
            ORDER BY name ASC, id ASC
            ",
        )
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Item::from_sqlx_item_multiple(items))
    }

    async fn search_items(&self, query: &str) -> Result<Vec<Item>> {
        let items = sqlx::query_as::<_, SqlxItem>(
            r"
            SELECT *
            FROM items
            WHERE instr(lower(name), lower(?)) > 0
            ORDER BY name ASC, id ASC
            ",
        )
        .bind(query)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Item::from_sqlx_item_multiple(items))
    }

    async fn create_item(&self, values: &CreateItemValues) -> Result<Item> {
        let item = sqlx::query_as::<_, SqlxItem>(
            r"
            INSERT INTO items (name, dose, unit, instructions, notes, active, created_at)
            VALUES (?, ?, ?, ?, ?, TRUE, ?)
            RETURNING *
            ",
        )
        .bind(values.name)
        .bind(values.dose)
        .bind(values.unit)
        .bind(values.instructions)
        .bind(values.notes)
        .bind(Utc::now().naive_utc())
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Item::from_sqlx_item(item))
    }

    async fn update_item(&self, item: &Item, values: &UpdateItemValues) -> Result<Item> {
        let updated_item = sqlx::query_as::<_, SqlxItem>(
            r"
            UPDATE items
            SET name = COALESCE(?, name),
                dose = CASE WHEN ? THEN ? ELSE dose END,
                unit = CASE WHEN ? THEN ? ELSE unit END,
                instructions = CASE WHEN ? THEN ? ELSE instructions END,
                notes = CASE WHEN ? THEN ? ELSE notes END,
                active = COALESCE(?, active)
            WHERE id = ?
            RETURNING *
            ",
        )
        .bind(values.name)
        .bind(values.dose.is_some())
        .bind(values.dose.flatten())
        .bind(values.unit.is_some())
        .bind(values.unit.flatten())
        .bind(values.instructions.is_some())
        .bind(values.instructions.flatten())
        .bind(values.notes.is_some())
        .bind(values.notes.flatten())
        .bind(values.active)
        .bind(item.id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        updated_item
            .map(Item::from_sqlx_item)
            .ok_or(Error::Missing {
                entity: "Item",
                id: item.id,
            })
    }

    async fn delete_item(&self, item: &Item) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM items
            WHERE id = ?
            ",
        )
        .bind(item.id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn find_reminder(&self, id: ReminderId) -> Result<Option<Reminder>> {
        let reminder = sqlx::query_as::<_, SqlxReminder>(
            r"
            SELECT *
            FROM reminders
            WHERE id = ?
            LIMIT 1
            ",
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Reminder::from_sqlx_reminder_optional(reminder)
    }

    async fn find_reminders_by_item(&self, item_id: ItemId) -> Result<Vec<Reminder>> {
        let reminders = sqlx::query_as::<_, SqlxReminder>(
            r"
            SELECT *
            FROM reminders
            WHERE item_id = ?
            ORDER BY minutes_since_midnight ASC, id ASC
            ",
        )
        .bind(item_id)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Reminder::from_sqlx_reminder_multiple(reminders)
    }

    async fn find_active_reminders(&self) -> Result<Vec<Reminder>> {
        let reminders = sqlx::query_as::<_, SqlxReminder>(
            r"
            SELECT reminders.*
            FROM reminders
            INNER JOIN items ON reminders.item_id = items.id
            WHERE reminders.active = TRUE AND items.active = TRUE
            ORDER BY reminders.minutes_since_midnight ASC, reminders.id ASC
            ",
        )
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        // one broken row must not keep the others from being armed
        Ok(reminders
            .into_iter()
            .filter_map(|reminder| match Reminder::from_sqlx_reminder(reminder) {
                Ok(reminder) => Some(reminder),
                Err(err) => {
                    tracing::error!("Skipping active reminder: {err}");
                    None
                }
            })
            .collect())
    }

    async fn create_reminder(
        &self,
        item: &Item,
        values: &CreateReminderValues,
    ) -> Result<Reminder> {
        let reminder = sqlx::query_as::<_, SqlxReminder>(
            r"
            INSERT INTO reminders (item_id, minutes_since_midnight, week_mask, active, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            ",
        )
        .bind(item.id)
        .bind(i64::from(values.time.minutes()))
        .bind(i64::from(values.days.bits()))
        .bind(values.active)
        .bind(Utc::now().naive_utc())
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Reminder::from_sqlx_reminder(reminder)
    }

    async fn update_reminder(
        &self,
        reminder: &Reminder,
        values: &UpdateReminderValues,
    ) -> Result<Reminder> {
        let updated_reminder = sqlx::query_as::<_, SqlxReminder>(
            r"
            UPDATE reminders
            SET minutes_since_midnight = COALESCE(?, minutes_since_midnight),
                week_mask = COALESCE(?, week_mask),
                active = COALESCE(?, active)
            WHERE id = ?
            RETURNING *
            ",
        )
        .bind(values.time.map(|time| i64::from(time.minutes())))
        .bind(values.days.map(|days| i64::from(days.bits())))
        .bind(values.active)
        .bind(reminder.id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Reminder::from_sqlx_reminder_optional(updated_reminder)?.ok_or(Error::Missing {
            entity: "Reminder",
            id: reminder.id,
        })
    }

    async fn delete_reminder(&self, reminder: &Reminder) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM reminders
            WHERE id = ?
            ",
        )
        .bind(reminder.id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }
}

/// Convert `SQLx` to storage connection error
fn connection_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Connection(err.to_string())
}
