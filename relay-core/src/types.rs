//! Domain types for the relay record store.
//!
//! [`Employee`] is the only record kind the engine propagates. Its `synced`
//! flag and `synced_at` timestamp are owned by the store and flipped only
//! through [`crate::RecordStore::mark_synced_by_ids`] and
//! [`crate::RecordStore::reset_synced`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Store-assigned identity of a record. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A registry employee as persisted by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: RecordId,
    pub personal_code: String,
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub department: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
    /// Text encoded into the employee's QR badge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_data: Option<String>,
    /// Rendered QR badge (PNG bytes). Never leaves the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Build a fresh unsynced record from an insert payload.
    pub fn from_new(id: RecordId, new: NewEmployee, now: DateTime<Utc>) -> Self {
        let personal_code = new
            .personal_code
            .filter(|code| !code.trim().is_empty())
            .unwrap_or_else(|| generate_personal_code(now));
        Self {
            id,
            personal_code,
            first_name: new.first_name,
            last_name: new.last_name,
            age: new.age,
            department: new.department,
            post: new.post,
            qr_code_data: new.qr_code_data,
            qr_code_image: new.qr_code_image,
            created_at: now,
            updated_at: now,
            synced: false,
            synced_at: None,
        }
    }

    pub(crate) fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.synced = true;
        self.synced_at = Some(at);
    }

    pub(crate) fn reset_synced(&mut self, at: DateTime<Utc>) {
        self.synced = false;
        self.synced_at = None;
        self.updated_at = at;
    }
}

/// Insert payload: everything the caller chooses, nothing the store owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    #[serde(default)]
    pub personal_code: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub department: String,
    #[serde(default)]
    pub post: Option<String>,
    #[serde(default)]
    pub qr_code_data: Option<String>,
    #[serde(default)]
    pub qr_code_image: Option<Vec<u8>>,
}

/// `EMP-<unix seconds>-<random hex>`, e.g. `EMP-1760000000-3FA9`.
pub fn generate_personal_code(now: DateTime<Utc>) -> String {
    let random = (Uuid::new_v4().as_u128() & 0xFFFF) as u16;
    format!("EMP-{}-{:X}", now.timestamp(), random)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn new_employee() -> NewEmployee {
        NewEmployee {
            first_name: "Ivan".to_string(),
            last_name: "Petrov".to_string(),
            age: 34,
            department: "IT".to_string(),
            ..NewEmployee::default()
        }
    }

    #[test]
    fn record_id_display() {
        assert_eq!(RecordId::from(42).to_string(), "42");
    }

    #[test]
    fn from_new_starts_unsynced_with_generated_code() {
        let now = Utc::now();
        let employee = Employee::from_new(RecordId(1), new_employee(), now);
        assert!(!employee.synced);
        assert!(employee.synced_at.is_none());
        assert!(employee.personal_code.starts_with("EMP-"));
        assert_eq!(employee.created_at, now);
        assert_eq!(employee.full_name(), "Ivan Petrov");
    }

    #[test]
    fn from_new_keeps_explicit_personal_code() {
        let mut new = new_employee();
        new.personal_code = Some("IJ-543210-A7F".to_string());
        let employee = Employee::from_new(RecordId(1), new, Utc::now());
        assert_eq!(employee.personal_code, "IJ-543210-A7F");
    }

    #[test]
    fn personal_code_embeds_timestamp() {
        let now = Utc::now();
        let code = generate_personal_code(now);
        assert!(code.starts_with(&format!("EMP-{}-", now.timestamp())));
    }

    #[test]
    fn image_bytes_are_omitted_when_absent() {
        let employee = Employee::from_new(RecordId(7), new_employee(), Utc::now());
        let json = serde_json::to_string(&employee).expect("serialize");
        assert!(!json.contains("qr_code_image"));
        let back: Employee = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, employee);
    }
}
