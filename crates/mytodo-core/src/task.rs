use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::datetime::parse_deadline;

pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUS_DUE: &str = "Due to finish";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: u64,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub deadline: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub tag: String,

    #[serde(default)]
    pub is_done: bool,

    /// Selection state of the current list session; cleared on every reload.
    #[serde(default)]
    pub is_checked: bool,
}

impl Task {
    pub fn new(name: String, deadline: String, tag: String) -> Self {
        Self {
            id: 0,
            name,
            description: None,
            deadline,
            tag,
            is_done: false,
            is_checked: false,
        }
    }

    /// Blank editor draft with an unassigned id.
    pub fn draft() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }

    pub fn deadline_at(&self) -> Option<DateTime<Utc>> {
        parse_deadline(&self.deadline)
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_done {
            STATUS_COMPLETED
        } else {
            STATUS_DUE
        }
    }
}

// Records written by older imports may hold `null` where a string belongs.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_storage_field_names() {
        let mut task = Task::new(
            "Pay rent".to_string(),
            "2024-01-01".to_string(),
            "bills".to_string(),
        );
        task.id = 42;

        let json = serde_json::to_value(&task).expect("serialize");
        assert_eq!(json["id"], 42);
        assert_eq!(json["isDone"], false);
        assert_eq!(json["isChecked"], false);
        assert!(json.get("description").is_none());
    }

    #[test]
    fn missing_flags_and_nulls_take_defaults() {
        let task: Task = serde_json::from_str(
            r#"{"id":7,"name":null,"deadline":"2024-03-01","tag":"home"}"#,
        )
        .expect("deserialize");

        assert_eq!(task.id, 7);
        assert_eq!(task.name, "");
        assert_eq!(task.tag, "home");
        assert!(!task.is_done);
        assert!(!task.is_checked);
        assert!(task.description.is_none());
    }

    #[test]
    fn status_label_follows_done_flag() {
        let mut task = Task::draft();
        assert_eq!(task.status_label(), "Due to finish");
        task.is_done = true;
        assert_eq!(task.status_label(), "Completed");
    }
}
