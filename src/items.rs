//! Items, the medications reminders are attached to

use chrono::naive::NaiveDateTime;

/// Identity of an item
pub type ItemId = i64;

/// A medication
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Item ID
    pub id: ItemId,

    /// Display name, never blank
    pub name: String,

    /// Dose amount, e.g. "500"
    pub dose: Option<String>,

    /// Unit of the dose, e.g. "mg"
    pub unit: Option<String>,

    /// How to take it, e.g. "Take with food"
    pub instructions: Option<String>,

    /// Free-text notes
    pub notes: Option<String>,

    /// Inactive items have none of their reminders armed
    pub active: bool,

    /// Creation date
    pub created_at: NaiveDateTime,
}

impl Item {
    /// Dose together with its unit, when there is a dose at all
    ///
    /// ```rust
    /// assert_eq!(item.dose_label(), Some("500 mg".to_string()));
    /// ```
    pub fn dose_label(&self) -> Option<String> {
        let dose = self.dose.as_deref()?;

        Some(match self.unit.as_deref() {
            Some(unit) => format!("{dose} {unit}"),
            None => dose.to_string(),
        })
    }
}

/// Trim a required name, `None` when nothing is left
pub fn normalize_name(name: &str) -> Option<String> {
    let name = name.trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Trim an optional field, blank values mean "not specified"
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.and_then(normalize_name)
}
