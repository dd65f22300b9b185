use axum::Extension;
use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::controller::Controller;
use crate::controller::NewReminder;
use crate::controller::ReminderChanges;
use crate::delivery::Precision;
use crate::items::ItemId;
use crate::reconcile::ReconcileReport;
use crate::reminders::Reminder;
use crate::reminders::ReminderId;
use crate::scheduler::ReminderState;
use crate::storage::Storage;

use super::Error;
use super::Form;
use super::PathParameters;
use super::Success;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderResponse {
    pub id: ReminderId,
    pub item_id: ItemId,
    /// Minutes since midnight
    pub minutes: u16,
    /// `HH:MM`
    pub time: String,
    pub days: u8,
    pub active: bool,
    /// Only when armed
    pub next_trigger: Option<DateTime<Utc>>,
    pub precision: Option<Precision>,
    pub created_at: NaiveDateTime,
}

impl ReminderResponse {
    fn from_reminder(reminder: Reminder, state: ReminderState) -> Self {
        let (next_trigger, precision) = match state {
            ReminderState::Armed { at, precision } => (Some(at), Some(precision)),
            ReminderState::Unarmed => (None, None),
        };

        Self {
            id: reminder.id,
            item_id: reminder.item_id,
            minutes: reminder.time.minutes(),
            time: reminder.time.to_string(),
            days: reminder.days.bits(),
            active: reminder.active,
            next_trigger,
            precision,
            created_at: reminder.created_at,
        }
    }

    fn with_state<S: Storage>(controller: &Controller<S>, reminder: Reminder) -> Self {
        let state = controller.reminder_state(reminder.id);

        Self::from_reminder(reminder, state)
    }
}

pub async fn list<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters(item_id): PathParameters<ItemId>,
) -> Result<Success<Vec<ReminderResponse>>, Error> {
    let reminders = controller.list_reminders(item_id).await?;

    Ok(Success::ok(
        reminders
            .into_iter()
            .map(|reminder| ReminderResponse::with_state(&controller, reminder))
            .collect(),
    ))
}

pub async fn single<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters((item_id, reminder_id)): PathParameters<(ItemId, ReminderId)>,
) -> Result<Success<ReminderResponse>, Error> {
    let reminder = controller.get_reminder(item_id, reminder_id).await?;

    Ok(Success::ok(ReminderResponse::with_state(
        &controller,
        reminder,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReminderForm {
    minutes: i64,
    days: Option<u8>,
    active: Option<bool>,
}

pub async fn create<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters(item_id): PathParameters<ItemId>,
    Form(form): Form<CreateReminderForm>,
) -> Result<Success<ReminderResponse>, Error> {
    let new_reminder = NewReminder {
        minutes: form.minutes,
        days: form.days,
        active: form.active,
    };

    let reminder = controller.add_reminder(item_id, &new_reminder).await?;

    Ok(Success::created(ReminderResponse::with_state(
        &controller,
        reminder,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReminderForm {
    minutes: Option<i64>,
    days: Option<u8>,
    active: Option<bool>,
}

pub async fn update<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters((item_id, reminder_id)): PathParameters<(ItemId, ReminderId)>,
    Form(form): Form<UpdateReminderForm>,
) -> Result<Success<ReminderResponse>, Error> {
    let changes = ReminderChanges {
        minutes: form.minutes,
        days: form.days,
        active: form.active,
    };

    let reminder = controller
        .update_reminder(item_id, reminder_id, &changes)
        .await?;

    Ok(Success::ok(ReminderResponse::with_state(
        &controller,
        reminder,
    )))
}

pub async fn delete<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters((item_id, reminder_id)): PathParameters<(ItemId, ReminderId)>,
) -> Result<Success<&'static str>, Error> {
    controller.delete_reminder(item_id, reminder_id).await?;

    Ok(Success::<&'static str>::no_content())
}

/// The dose got taken, retract the notification
pub async fn dismiss<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters(reminder_id): PathParameters<ReminderId>,
) -> Result<Success<&'static str>, Error> {
    controller.dismiss(reminder_id).await?;

    Ok(Success::<&'static str>::no_content())
}

pub async fn reconcile<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
) -> Result<Success<ReconcileReport>, Error> {
    let report = controller.reconcile().await?;

    Ok(Success::ok(report))
}
