//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::items::Item;
use crate::items::ItemId;
use crate::reminders::Reminder;
use crate::reminders::ReminderId;

use super::CreateItemValues;
use super::CreateReminderValues;
use super::Error;
use super::Result;
use super::Storage;
use super::UpdateItemValues;
use super::UpdateReminderValues;

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug)]
pub struct Memory {
    /// All items in storage
    items: Arc<Mutex<HashMap<ItemId, Item>>>,

    /// All reminders in storage
    reminders: Arc<Mutex<HashMap<ReminderId, Reminder>>>,

    /// Last handed out item ID
    last_item_id: Arc<AtomicI64>,

    /// Last handed out reminder ID
    last_reminder_id: Arc<AtomicI64>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(HashMap::new())),
            reminders: Arc::new(Mutex::new(HashMap::new())),
            last_item_id: Arc::new(AtomicI64::new(0)),
            last_reminder_id: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_by_name(mut items: Vec<Item>) -> Vec<Item> {
    items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    items
}

fn sorted_by_time(mut reminders: Vec<Reminder>) -> Vec<Reminder> {
    reminders.sort_by(|a, b| a.time.cmp(&b.time).then(a.id.cmp(&b.id)));
    reminders
}

#[async_trait]
impl Storage for Memory {
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.items.lock().await.get(&id).cloned())
    }

    async fn find_all_items(&self) -> Result<Vec<Item>> {
        let items = self.items.lock().await.values().cloned().collect();

        Ok(sorted_by_name(items))
    }

    async fn search_items(&self, query: &str) -> Result<Vec<Item>> {
        let query = query.to_lowercase();

        let items = self
            .items
            .lock()
            .await
            .values()
            .filter(|item| item.name.to_lowercase().contains(&query))
            .cloned()
            .collect();

        Ok(sorted_by_name(items))
    }

    async fn create_item(&self, values: &CreateItemValues) -> Result<Item> {
        let item = Item {
            id: self.last_item_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: values.name.to_string(),
            dose: values.dose.map(ToString::to_string),
            unit: values.unit.map(ToString::to_string),
            instructions: values.instructions.map(ToString::to_string),
            notes: values.notes.map(ToString::to_string),
            active: true,
            created_at: Utc::now().naive_utc(),
        };

        self.items.lock().await.insert(item.id, item.clone());

        Ok(item)
    }

    async fn update_item(&self, item: &Item, values: &UpdateItemValues) -> Result<Item> {
        self.items
            .lock()
            .await
            .get_mut(&item.id)
            .map(|item| {
                if let Some(name) = values.name {
                    item.name = name.to_string();
                }

                if let Some(dose) = values.dose {
                    item.dose = dose.map(ToString::to_string);
                }

                if let Some(unit) = values.unit {
                    item.unit = unit.map(ToString::to_string);
                }

                if let Some(instructions) = values.instructions {
                    item.instructions = instructions.map(ToString::to_string);
                }

                if let Some(notes) = values.notes {
                    item.notes = notes.map(ToString::to_string);
                }

                if let Some(active) = values.active {
                    item.active = active;
                }

                item.clone()
            })
            .ok_or(Error::Missing {
                entity: "Item",
                id: item.id,
            })
    }

    async fn delete_item(&self, item: &Item) -> Result<()> {
        let mut items = self.items.lock().await;
        let mut reminders = self.reminders.lock().await;

        items.remove(&item.id);
        reminders.retain(|_, reminder| reminder.item_id != item.id);

        Ok(())
    }

    async fn find_reminder(&self, id: ReminderId) -> Result<Option<Reminder>> {
        Ok(self.reminders.lock().await.get(&id).cloned())
    }

    async fn find_reminders_by_item(&self, item_id: ItemId) -> Result<Vec<Reminder>> {
        let reminders = self
            .reminders
            .lock()
            .await
            .values()
            .filter(|reminder| reminder.item_id == item_id)
            .cloned()
            .collect();

        Ok(sorted_by_time(reminders))
    }

    async fn find_active_reminders(&self) -> Result<Vec<Reminder>> {
        let items = self.items.lock().await;

        let reminders = self
            .reminders
            .lock()
            .await
            .values()
            .filter(|reminder| {
                reminder.active
                    && items
                        .get(&reminder.item_id)
                        .is_some_and(|item| item.active)
            })
            .cloned()
            .collect();

        Ok(sorted_by_time(reminders))
    }

    async fn create_reminder(
        &self,
        item: &Item,
        values: &CreateReminderValues,
    ) -> Result<Reminder> {
        let items = self.items.lock().await;

        if !items.contains_key(&item.id) {
            return Err(Error::Missing {
                entity: "Item",
                id: item.id,
            });
        }

        let reminder = Reminder {
            id: self.last_reminder_id.fetch_add(1, Ordering::SeqCst) + 1,
            item_id: item.id,
            time: values.time,
            days: values.days,
            active: values.active,
            created_at: Utc::now().naive_utc(),
        };

        self.reminders
            .lock()
            .await
            .insert(reminder.id, reminder.clone());

        Ok(reminder)
    }

    async fn update_reminder(
        &self,
        reminder: &Reminder,
        values: &UpdateReminderValues,
    ) -> Result<Reminder> {
        self.reminders
            .lock()
            .await
            .get_mut(&reminder.id)
            .map(|reminder| {
                if let Some(time) = values.time {
                    reminder.time = time;
                }

                if let Some(days) = values.days {
                    reminder.days = days;
                }

                if let Some(active) = values.active {
                    reminder.active = active;
                }

                reminder.clone()
            })
            .ok_or(Error::Missing {
                entity: "Reminder",
                id: reminder.id,
            })
    }

    async fn delete_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.reminders.lock().await.remove(&reminder.id);

        Ok(())
    }
}
