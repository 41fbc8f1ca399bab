//! Clients for the three platforms Janus keeps in sync.
//!
//! Each platform sits behind an async trait so the provisioning workflow and
//! the bulk actions can run against fakes in tests. Every client reports
//! failures as a [`PlatformError`].

pub mod gitlab;
pub mod mailgun;
pub mod mattermost;

pub use gitlab::GitlabClient;
pub use mailgun::MailgunClient;
pub use mattermost::MattermostClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use janus_common::Pagination;
use serde::{Deserialize, Serialize};

/// Remote platform a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Gitlab,
    Mattermost,
    Mailgun,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Gitlab => write!(f, "gitlab"),
            Platform::Mattermost => write!(f, "mattermost"),
            Platform::Mailgun => write!(f, "mailgun"),
        }
    }
}

/// What went wrong talking to a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad base URL or endpoint.
    InvalidUrl,
    /// Connection, TLS or timeout failure before a response arrived.
    Transport,
    /// The platform answered with a non-success status.
    Api,
    /// The response body did not have the expected shape.
    Decode,
}

/// Failure of a single platform call.
///
/// `user_message` holds the platform's own structured error message when it
/// sent one that is safe to show to an operator.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{platform}: {cause}")]
pub struct PlatformError {
    pub platform: Platform,
    pub kind: ErrorKind,
    pub user_message: Option<String>,
    pub cause: String,
}

impl PlatformError {
    pub fn new(platform: Platform, kind: ErrorKind, cause: impl Into<String>) -> Self {
        Self {
            platform,
            kind,
            user_message: None,
            cause: cause.into(),
        }
    }

    pub fn with_user_message(mut self, message: Option<String>) -> Self {
        self.user_message = message;
        self
    }

    /// Text safe to show in the admin UI: the platform's structured message
    /// if there is one, the full error otherwise.
    pub fn sanitize(&self) -> String {
        match &self.user_message {
            Some(message) if !message.is_empty() => message.clone(),
            _ => self.to_string(),
        }
    }
}

// ============================================================================
// Code host (GitLab)
// ============================================================================

/// GitLab member access levels used by Janus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Guest,
    Developer,
}

impl AccessLevel {
    pub fn value(self) -> u32 {
        match self {
            AccessLevel::Guest => 10,
            AccessLevel::Developer => 30,
        }
    }
}

/// A code-host account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitlabUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    /// Only visible to admin tokens.
    #[serde(default)]
    pub email: String,
    /// "active", "blocked", "deactivated", ...
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Request body for creating a code-host account.
#[derive(Debug, Clone, Serialize)]
pub struct NewGitlabUser {
    pub email: String,
    pub username: String,
    pub name: String,
    pub reset_password: bool,
    pub skip_confirmation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpersonationTokenRequest {
    pub name: String,
    pub scopes: Vec<String>,
    pub expires_at: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImpersonationToken {
    pub id: u64,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMember {
    pub id: u64,
    #[serde(default)]
    pub username: String,
}

/// One page of code-host accounts.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<GitlabUser>,
    pub pagination: Pagination,
}

#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Server version, used as a startup connectivity check.
    async fn version(&self) -> Result<String, PlatformError>;

    async fn create_user(&self, user: &NewGitlabUser) -> Result<GitlabUser, PlatformError>;

    async fn get_user(&self, user_id: u64) -> Result<GitlabUser, PlatformError>;

    /// List accounts ordered by username.
    async fn list_users(&self, page: u32, per_page: u32) -> Result<UserPage, PlatformError>;

    async fn block_user(&self, user_id: u64) -> Result<(), PlatformError>;

    async fn unblock_user(&self, user_id: u64) -> Result<(), PlatformError>;

    async fn create_impersonation_token(
        &self,
        user_id: u64,
        request: &ImpersonationTokenRequest,
    ) -> Result<ImpersonationToken, PlatformError>;

    async fn revoke_impersonation_token(
        &self,
        user_id: u64,
        token_id: u64,
    ) -> Result<(), PlatformError>;

    /// Set the global notification level to "disabled" for the account that
    /// owns `user_token`.
    async fn disable_notifications(&self, user_token: &str) -> Result<(), PlatformError>;

    /// `group` is a numeric id or a full path.
    async fn add_group_member(
        &self,
        group: &str,
        user_id: u64,
        level: AccessLevel,
    ) -> Result<(), PlatformError>;

    /// `project` is a numeric id or a full path.
    async fn add_project_member(
        &self,
        project: &str,
        user_id: u64,
        level: AccessLevel,
    ) -> Result<(), PlatformError>;

    async fn remove_group_member(&self, group: &str, user_id: u64) -> Result<(), PlatformError>;

    async fn list_group_members(
        &self,
        group: &str,
        per_page: u32,
    ) -> Result<Vec<GroupMember>, PlatformError>;
}

// ============================================================================
// Chat platform (Mattermost)
// ============================================================================

/// Request body for creating a chat account.
///
/// Either `password` or the `auth_service`/`auth_data` pair is set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewChatUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn ping(&self) -> Result<String, PlatformError>;

    async fn create_user(&self, user: &NewChatUser) -> Result<ChatUser, PlatformError>;

    async fn add_team_member(&self, team_id: &str, user_id: &str) -> Result<(), PlatformError>;

    async fn add_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), PlatformError>;

    async fn get_user_by_username(&self, username: &str) -> Result<ChatUser, PlatformError>;

    async fn update_user_active(&self, user_id: &str, active: bool) -> Result<(), PlatformError>;
}

// ============================================================================
// Email delivery (Mailgun)
// ============================================================================

/// A templated message; variables are encoded to JSON as they are added.
#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub template: String,
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl WelcomeMessage {
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        to: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            template: template.into(),
            variables: serde_json::Map::new(),
        }
    }

    pub fn add_template_variable<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.variables.insert(name.to_string(), value);
        Ok(())
    }
}

/// Delivery acknowledgement; the message is queued, not yet delivered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendReceipt {
    pub id: String,
    #[serde(default)]
    pub message: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &WelcomeMessage) -> Result<SendReceipt, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_sanitize_uses_structured_message() {
        let err = PlatformError::new(
            Platform::Gitlab,
            ErrorKind::Api,
            "http://gitlab/api/v4/users: 409 Conflict {\"message\":\"Email has already been taken\"}",
        )
        .with_user_message(Some("Email has already been taken".to_string()));
        assert_eq!(err.sanitize(), "Email has already been taken");
    }

    #[test]
    fn test_sanitize_plain_error_is_full_text() {
        let err = PlatformError::new(Platform::Mattermost, ErrorKind::Transport, "connection refused");
        assert_eq!(err.sanitize(), "mattermost: connection refused");
        assert_eq!(err.sanitize(), err.to_string());
    }

    #[test]
    fn test_sanitize_ignores_empty_message() {
        let err = PlatformError::new(Platform::Gitlab, ErrorKind::Api, "500")
            .with_user_message(Some(String::new()));
        assert_eq!(err.sanitize(), "gitlab: 500");
    }

    #[test]
    fn test_access_levels() {
        assert_eq!(AccessLevel::Guest.value(), 10);
        assert_eq!(AccessLevel::Developer.value(), 30);
    }

    #[test]
    fn test_template_variables_are_json_encoded() {
        let mut msg = WelcomeMessage::new("from@x", "Welcome", "to@x", "welcome");
        msg.add_template_variable("name", "Ada").unwrap();
        msg.add_template_variable("gitlab_id", &42u64).unwrap();
        assert_eq!(msg.variables["name"], serde_json::json!("Ada"));
        assert_eq!(msg.variables["gitlab_id"], serde_json::json!(42));
    }

    #[test]
    fn test_template_variable_encoding_error() {
        let mut bad: BTreeMap<Vec<u8>, u8> = BTreeMap::new();
        bad.insert(vec![1], 1);
        let mut msg = WelcomeMessage::new("from@x", "Welcome", "to@x", "welcome");
        assert!(msg.add_template_variable("bad", &bad).is_err());
        assert!(msg.variables.is_empty());
    }

    #[test]
    fn test_new_chat_user_skips_unset_credentials() {
        let user = NewChatUser {
            username: "ada".to_string(),
            auth_service: Some("gitlab".to_string()),
            auth_data: Some("7".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["auth_service"], "gitlab");
    }
}
