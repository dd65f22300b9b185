//! Reminders, the recurring time-of-day rules of an item

use chrono::naive::NaiveDateTime;

use crate::items::ItemId;
use crate::recurrence::TimeOfDay;
use crate::recurrence::WeekMask;

/// Identity of a reminder
pub type ReminderId = i64;

/// A recurring reminder for an item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reminder {
    /// Reminder ID
    pub id: ReminderId,

    /// The item it belongs to, removed together with it
    pub item_id: ItemId,

    /// When during the day it fires
    pub time: TimeOfDay,

    /// On which days it fires
    pub days: WeekMask,

    /// Inactive reminders are never armed
    pub active: bool,

    /// Creation date
    pub created_at: NaiveDateTime,
}
