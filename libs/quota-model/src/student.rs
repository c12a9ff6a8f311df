//! Student records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student and the remote project their quota lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystone_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystone_project_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Student {
    /// The remote project reference, if one has been provisioned.
    ///
    /// Blank values written by older provisioning runs count as absent.
    pub fn project_ref(&self) -> Option<&str> {
        self.keystone_project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(project: Option<&str>) -> Student {
        Student {
            student_id: "20231234".to_string(),
            name: "Kim".to_string(),
            email: "kim@example.edu".to_string(),
            department: "CS".to_string(),
            keystone_user_id: None,
            keystone_project_id: project.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_project_ref() {
        assert_eq!(student(Some("p-1")).project_ref(), Some("p-1"));
        assert_eq!(student(Some("  ")).project_ref(), None);
        assert_eq!(student(None).project_ref(), None);
    }
}
