//! Notifications shown when a reminder fires

use tokio::process::Command;

use crate::reminders::ReminderId;

/// Shown when an item has neither dose nor instructions
pub const GENERIC_MESSAGE: &str = "Es hora de tomar tu medicamento";

/// Title used when an item has no usable name
const FALLBACK_TITLE: &str = "Medicamento";

/// Separator between the parts of a message
const SEPARATOR: &str = " • ";

/// Renders notifications, fire-and-forget
pub trait Notifier: Send + Sync {
    /// Show a notification for a reminder
    fn notify(&self, reminder_id: ReminderId, title: &str, body: &str);

    /// Retract the notification of a reminder, if it is still shown
    fn dismiss(&self, reminder_id: ReminderId);
}

/// Title of the notification for an item
pub fn build_title(name: &str) -> String {
    let name = name.trim();

    if name.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        format!("Hora de tomar: {name}")
    }
}

/// Body of the notification, blank values count as absent
///
/// ```rust
/// assert_eq!(build_message(Some("500 mg"), Some("Con comida")), "Dosis: 500 mg • Con comida");
/// ```
pub fn build_message(dose: Option<&str>, instructions: Option<&str>) -> String {
    let dose = dose.map(str::trim).filter(|dose| !dose.is_empty());
    let instructions = instructions
        .map(str::trim)
        .filter(|instructions| !instructions.is_empty());

    let parts = dose
        .map(|dose| format!("Dosis: {dose}"))
        .into_iter()
        .chain(instructions.map(ToString::to_string))
        .collect::<Vec<_>>();

    if parts.is_empty() {
        GENERIC_MESSAGE.to_string()
    } else {
        parts.join(SEPARATOR)
    }
}

/// Notifier that only writes to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, reminder_id: ReminderId, title: &str, body: &str) {
        tracing::info!("Reminder {reminder_id}: {title} ({body})");
    }

    fn dismiss(&self, reminder_id: ReminderId) {
        tracing::info!("Reminder {reminder_id} dismissed");
    }
}

/// Notifier that runs a program as `<program> <title> <body>`
///
/// Dismissing runs nothing, the program owns whatever it shows.
#[derive(Clone, Debug)]
pub struct CommandNotifier {
    /// Program to run
    program: String,
}

impl CommandNotifier {
    /// Notifier for the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, reminder_id: ReminderId, title: &str, body: &str) {
        let mut command = Command::new(&self.program);
        command.arg(title).arg(body).kill_on_drop(false);

        let program = self.program.clone();
        tokio::spawn(async move {
            match command.status().await {
                Ok(status) if status.success() => {
                    tracing::debug!("Notified reminder {reminder_id} with `{program}`");
                }
                Ok(status) => {
                    tracing::warn!(
                        "Notifying reminder {reminder_id} with `{program}` exited with {status}"
                    );
                }
                Err(err) => {
                    tracing::error!("Could not run `{program}` for reminder {reminder_id}: {err}");
                }
            }
        });
    }

    fn dismiss(&self, reminder_id: ReminderId) {
        tracing::debug!("Reminder {reminder_id} dismissed, nothing to retract for `{}`", self.program);
    }
}
