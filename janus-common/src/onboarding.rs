//! New-hire submissions as posted by the onboarding form webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A new-hire submission.
///
/// The form backend posts its row as JSON. Record metadata (`id`, timestamps)
/// is optional; the remaining fields drive provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingUser {
    #[serde(default, alias = "ID", alias = "Id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Chat handle, reused as the username on every platform.
    pub telegram_handle: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Email")]
    pub email: String,
    /// Comma separated skill tags.
    #[serde(default, rename = "skills")]
    pub raw_skills: String,
}

impl OnboardingUser {
    /// Skill tags, trimmed, with empty entries dropped.
    pub fn skills(&self) -> Vec<String> {
        self.raw_skills
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Split a full name into `(first, last)` on the last space.
///
/// A single word becomes the last name with an empty first name.
pub fn split_full_name(name: &str) -> (String, String) {
    match name.rsplit_once(' ') {
        Some((first, last)) => (first.to_string(), last.to_string()),
        None => (String::new(), name.to_string()),
    }
}
