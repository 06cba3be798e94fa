//! Event wire format and routing key derivation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use relay_core::{Employee, RecordId};

/// Routing key for records without a department.
pub const DEFAULT_ROUTING_KEY: &str = "default";

/// Which path produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Single-entity path: a record was just created.
    EmployeeCreated,
    /// Drain-loop path: a record was propagated by bulk sync.
    EmployeeBulkSync,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::EmployeeCreated => write!(f, "EMPLOYEE_CREATED"),
            EventKind::EmployeeBulkSync => write!(f, "EMPLOYEE_BULK_SYNC"),
        }
    }
}

/// Transport view of an [`Employee`]: business fields only, no image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePayload {
    pub id: RecordId,
    pub personal_code: String,
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub department: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Employee> for EmployeePayload {
    fn from(employee: &Employee) -> Self {
        Self {
            id: employee.id,
            personal_code: employee.personal_code.clone(),
            first_name: employee.first_name.clone(),
            last_name: employee.last_name.clone(),
            age: employee.age,
            department: employee.department.clone(),
            post: employee.post.clone(),
            qr_code_data: employee.qr_code_data.clone(),
            created_at: employee.created_at,
            updated_at: employee.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeEvent {
    pub event_id: Uuid,
    pub event_type: EventKind,
    pub timestamp: DateTime<Utc>,
    pub employee: EmployeePayload,
    pub source_service: String,
}

impl EmployeeEvent {
    pub fn new(employee: &Employee, kind: EventKind, source_service: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: kind,
            timestamp: Utc::now(),
            employee: EmployeePayload::from(employee),
            source_service: source_service.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Routing key for a department: first 16 hex chars of its SHA-256.
///
/// Records of one department share a key, and therefore a partition.
pub fn routing_key(department: &str) -> String {
    let department = department.trim();
    if department.is_empty() {
        return DEFAULT_ROUTING_KEY.to_string();
    }
    let digest = Sha256::digest(department.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::NewEmployee;

    fn employee(id: u64, department: &str) -> Employee {
        let mut record = Employee::from_new(
            RecordId(id),
            NewEmployee {
                first_name: format!("first{id}"),
                last_name: "Last".to_string(),
                age: 28,
                department: department.to_string(),
                qr_code_data: Some(format!("PERSONAL_CODE:X-{id}")),
                ..NewEmployee::default()
            },
            Utc::now(),
        );
        record.qr_code_image = Some(vec![0x89, b'P', b'N', b'G']);
        record
    }

    #[test]
    fn same_department_same_key() {
        let a = employee(1, "Finance");
        let b = employee(2, "Finance");
        assert_eq!(routing_key(&a.department), routing_key(&b.department));
        assert_ne!(routing_key("Finance"), routing_key("Legal"));
        assert_eq!(routing_key("Finance").len(), 16);
    }

    #[test]
    fn blank_department_uses_default_key() {
        assert_eq!(routing_key(""), DEFAULT_ROUTING_KEY);
        assert_eq!(routing_key("   "), DEFAULT_ROUTING_KEY);
        assert_eq!(routing_key(" IT "), routing_key("IT"));
    }

    #[test]
    fn event_json_strips_image_bytes() {
        let record = employee(3, "IT");
        let event = EmployeeEvent::new(&record, EventKind::EmployeeBulkSync, "registry");
        let json: serde_json::Value =
            serde_json::from_slice(&event.to_bytes().expect("encode")).expect("decode");

        assert_eq!(json["event_type"], "EMPLOYEE_BULK_SYNC");
        assert_eq!(json["source_service"], "registry");
        assert_eq!(json["employee"]["id"], 3);
        assert_eq!(json["employee"]["qr_code_data"], "PERSONAL_CODE:X-3");
        assert!(json["employee"].get("qr_code_image").is_none());
        assert!(json["employee"].get("synced").is_none());
    }

    #[test]
    fn event_kind_display_matches_wire_name() {
        assert_eq!(EventKind::EmployeeCreated.to_string(), "EMPLOYEE_CREATED");
        let wire = serde_json::to_string(&EventKind::EmployeeCreated).expect("encode");
        assert_eq!(wire, "\"EMPLOYEE_CREATED\"");
    }
}
