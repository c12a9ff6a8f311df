//! Course records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::QuotaProfile;

/// A course and the entitlement it adds for every actively enrolled student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,
    pub title: String,
    pub department: String,
    pub semester: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub quota_profile: QuotaProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<CourseDefaults>,
    pub created_at: DateTime<Utc>,
}

impl Course {
    /// Whether `at` falls inside `[start_at, end_at)`.
    pub fn is_running_at(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at < self.end_at
    }
}

/// Provisioning hints attached to a course.
///
/// Stored and returned verbatim; reconciliation does not read them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flavor_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,
    #[serde(default)]
    pub boot_from_volume: bool,
    #[serde(
        rename = "rootVolumeGB",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub root_volume_gb: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_running_window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let course = Course {
            course_id: "CS101".to_string(),
            title: "Intro".to_string(),
            department: "CS".to_string(),
            semester: "2025-1".to_string(),
            start_at: start,
            end_at: end,
            quota_profile: QuotaProfile::default(),
            defaults: None,
            created_at: start,
        };

        assert!(course.is_running_at(start));
        assert!(!course.is_running_at(end));
    }

    #[test]
    fn test_defaults_deserialization() {
        let json = r#"{"imageId": "img-1", "flavorIds": ["m1.small"], "rootVolumeGB": 20}"#;
        let defaults: CourseDefaults = serde_json::from_str(json).unwrap();
        assert_eq!(defaults.image_id.as_deref(), Some("img-1"));
        assert_eq!(defaults.flavor_ids, vec!["m1.small".to_string()]);
        assert!(!defaults.boot_from_volume);
    }
}
