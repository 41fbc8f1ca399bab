//! Fakes and fixtures shared by unit and integration tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use janus_common::Pagination;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};

use crate::auth::IdentityProvider;
use crate::config::{
    Config, GitlabConfig, LoggingConfig, MailgunConfig, MattermostConfig, OidcConfig,
    ProvisionerConfig, ServerConfig, UserAdminConfig,
};
use crate::platform::{
    AccessLevel, ChatPlatform, ChatUser, CodeHost, ErrorKind, GitlabUser, GroupMember,
    ImpersonationToken, ImpersonationTokenRequest, Mailer, NewChatUser, NewGitlabUser, Platform,
    PlatformError, SendReceipt, UserPage, WelcomeMessage,
};
use crate::AppState;

pub const TEST_ISSUER: &str = "https://id.test";
pub const TEST_KID: &str = "test-key";
pub const TEST_CLIENT_ID: &str = "janus";
pub const TEST_AUTHORIZE_URL: &str = "https://id.test/oauth/authorize";
pub const TEST_TOKEN_URL: &str = "https://id.test/oauth/token";
/// Id handed out to every account created on [`FakeGitlab`].
pub const NEW_GITLAB_ID: u64 = 100;

pub fn test_config() -> Config {
    Config {
        server: ServerConfig::default(),
        gitlab: GitlabConfig::default(),
        mattermost: MattermostConfig::default(),
        mailgun: MailgunConfig {
            domain: "mg.test".to_string(),
            from_addr: "onboarding@mg.test".to_string(),
            ..MailgunConfig::default()
        },
        oidc: OidcConfig {
            issuer: TEST_ISSUER.to_string(),
            client_id: Some(TEST_CLIENT_ID.to_string()),
            client_secret: Some("client-secret".to_string()),
            redirect_uri: Some("http://janus.test/auth/callback".to_string()),
            scope: "openid profile".to_string(),
            session_secret: Some("test-session-secret".to_string()),
            session_hours: 12,
            admin_group: "management".to_string(),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        provisioner: ProvisionerConfig {
            mailgun_welcome_template: "welcome".to_string(),
            ..ProvisionerConfig::default()
        },
        useradmin: UserAdminConfig::default(),
    }
}

/// Identity provider trusting `public_pem` under [`TEST_KID`], with the
/// sign-in endpoints at [`TEST_AUTHORIZE_URL`] and [`TEST_TOKEN_URL`].
pub fn test_identity(config: &Config, public_pem: &[u8]) -> IdentityProvider {
    let mut keys = HashMap::new();
    if let Ok(key) = DecodingKey::from_rsa_pem(public_pem) {
        keys.insert(TEST_KID.to_string(), key);
    }
    IdentityProvider::with_keys(&config.oidc, keys)
        .with_endpoints(TEST_AUTHORIZE_URL, TEST_TOKEN_URL)
}

pub fn test_state(
    config: Config,
    identity: IdentityProvider,
    gitlab: Arc<FakeGitlab>,
    chat: Arc<FakeMattermost>,
    mailer: Arc<FakeMailer>,
) -> Arc<AppState> {
    Arc::new(AppState::new(config, identity, gitlab, chat, mailer))
}

#[derive(serde::Serialize)]
struct TestClaims {
    sub: String,
    nickname: String,
    groups: Vec<String>,
    iss: String,
    aud: String,
    exp: u64,
    iat: u64,
}

/// Sign an ID token for `nickname` with the given group claims.
pub fn generate_test_jwt(
    sub: &str,
    nickname: &str,
    groups: &[&str],
    signing_key: &EncodingKey,
) -> String {
    generate_test_jwt_for(TEST_ISSUER, sub, nickname, groups, signing_key)
}

/// [`generate_test_jwt`] with a chosen `iss` claim.
pub fn generate_test_jwt_for(
    issuer: &str,
    sub: &str,
    nickname: &str,
    groups: &[&str],
    signing_key: &EncodingKey,
) -> String {
    let now = Utc::now();
    let claims = TestClaims {
        sub: sub.to_string(),
        nickname: nickname.to_string(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
        iss: issuer.to_string(),
        aud: TEST_CLIENT_ID.to_string(),
        exp: (now + chrono::Duration::hours(1)).timestamp() as u64,
        iat: now.timestamp() as u64,
    };

    let header = Header {
        alg: Algorithm::RS256,
        kid: Some(TEST_KID.to_string()),
        ..Default::default()
    };

    encode(&header, &claims, signing_key).expect("Failed to encode JWT")
}

fn fake_error(platform: Platform, op: &str) -> PlatformError {
    PlatformError::new(platform, ErrorKind::Api, format!("{} failed", op))
}

// ============================================================================
// Code host
// ============================================================================

/// In-memory code host that records every call.
///
/// Operations named with [`FakeGitlab::failing`] return an API error whose
/// structured message is `"<op> failed"`.
#[derive(Default)]
pub struct FakeGitlab {
    users: BTreeMap<u64, GitlabUser>,
    group_members: HashMap<u64, Vec<u64>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeGitlab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: u64, username: &str, state: &str, is_admin: bool) -> Self {
        self.users.insert(
            id,
            GitlabUser {
                id,
                username: username.to_string(),
                name: username.to_uppercase(),
                email: format!("{}@example.com", username),
                state: state.to_string(),
                is_admin,
            },
        );
        self
    }

    pub fn with_group_members(mut self, group_id: u64, members: &[u64]) -> Self {
        self.group_members.insert(group_id, members.to_vec());
        self
    }

    pub fn failing(mut self, op: &str) -> Self {
        self.failing.insert(op.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, op: &str, call: String) -> Result<(), PlatformError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing.contains(op) {
            return Err(fake_error(Platform::Gitlab, op)
                .with_user_message(Some(format!("{} failed", op))));
        }
        Ok(())
    }
}

#[async_trait]
impl CodeHost for FakeGitlab {
    async fn version(&self) -> Result<String, PlatformError> {
        self.record("version", "version".to_string())?;
        Ok("16.0.0-test".to_string())
    }

    async fn create_user(&self, user: &NewGitlabUser) -> Result<GitlabUser, PlatformError> {
        self.record("create_user", format!("create_user {}", user.username))?;
        Ok(GitlabUser {
            id: NEW_GITLAB_ID,
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            state: "active".to_string(),
            is_admin: false,
        })
    }

    async fn get_user(&self, user_id: u64) -> Result<GitlabUser, PlatformError> {
        self.record("get_user", format!("get_user {}", user_id))?;
        self.users.get(&user_id).cloned().ok_or_else(|| {
            PlatformError::new(
                Platform::Gitlab,
                ErrorKind::Api,
                format!("users/{} 404 Not Found", user_id),
            )
            .with_user_message(Some("404 User Not Found".to_string()))
        })
    }

    async fn list_users(&self, page: u32, per_page: u32) -> Result<UserPage, PlatformError> {
        self.record("list_users", format!("list_users {} {}", page, per_page))?;
        let mut users: Vec<GitlabUser> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(UserPage {
            users,
            pagination: Pagination::new(page, page, per_page),
        })
    }

    async fn block_user(&self, user_id: u64) -> Result<(), PlatformError> {
        self.record("block_user", format!("block_user {}", user_id))
    }

    async fn unblock_user(&self, user_id: u64) -> Result<(), PlatformError> {
        self.record("unblock_user", format!("unblock_user {}", user_id))
    }

    async fn create_impersonation_token(
        &self,
        user_id: u64,
        _request: &ImpersonationTokenRequest,
    ) -> Result<ImpersonationToken, PlatformError> {
        self.record(
            "create_impersonation_token",
            format!("create_impersonation_token {}", user_id),
        )?;
        Ok(ImpersonationToken {
            id: 9,
            token: "imp-token".to_string(),
        })
    }

    async fn revoke_impersonation_token(
        &self,
        user_id: u64,
        _token_id: u64,
    ) -> Result<(), PlatformError> {
        self.record(
            "revoke_impersonation_token",
            format!("revoke_impersonation_token {}", user_id),
        )
    }

    async fn disable_notifications(&self, _user_token: &str) -> Result<(), PlatformError> {
        self.record("disable_notifications", "disable_notifications".to_string())
    }

    async fn add_group_member(
        &self,
        group: &str,
        user_id: u64,
        level: AccessLevel,
    ) -> Result<(), PlatformError> {
        self.record(
            "add_group_member",
            format!("add_group_member {} {} {}", group, user_id, level.value()),
        )
    }

    async fn add_project_member(
        &self,
        project: &str,
        user_id: u64,
        level: AccessLevel,
    ) -> Result<(), PlatformError> {
        self.record(
            "add_project_member",
            format!("add_project_member {} {} {}", project, user_id, level.value()),
        )
    }

    async fn remove_group_member(&self, group: &str, user_id: u64) -> Result<(), PlatformError> {
        self.record(
            "remove_group_member",
            format!("remove_group_member {} {}", group, user_id),
        )
    }

    async fn list_group_members(
        &self,
        group: &str,
        _per_page: u32,
    ) -> Result<Vec<GroupMember>, PlatformError> {
        self.record("list_group_members", format!("list_group_members {}", group))?;
        let members = group
            .parse::<u64>()
            .ok()
            .and_then(|id| self.group_members.get(&id))
            .map(|ids| {
                ids.iter()
                    .map(|&id| GroupMember {
                        id,
                        username: String::new(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(members)
    }
}

// ============================================================================
// Chat platform
// ============================================================================

/// In-memory chat platform; account ids are `mm-<username>`.
#[derive(Default)]
pub struct FakeMattermost {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<NewChatUser>>,
}

impl FakeMattermost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, op: &str) -> Self {
        self.failing.insert(op.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn created_users(&self) -> Vec<NewChatUser> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, op: &str, call: String) -> Result<(), PlatformError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing.contains(op) {
            return Err(fake_error(Platform::Mattermost, op));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for FakeMattermost {
    async fn ping(&self) -> Result<String, PlatformError> {
        self.record("ping", "ping".to_string())?;
        Ok("OK".to_string())
    }

    async fn create_user(&self, user: &NewChatUser) -> Result<ChatUser, PlatformError> {
        let credential = match (&user.auth_service, &user.auth_data) {
            (Some(service), Some(data)) => format!("sso={}:{}", service, data),
            _ => "password".to_string(),
        };
        self.record(
            "create_user",
            format!("create_user {} {}", user.username, credential),
        )?;
        if let Ok(mut created) = self.created.lock() {
            created.push(user.clone());
        }
        Ok(ChatUser {
            id: format!("mm-{}", user.username),
            username: user.username.clone(),
        })
    }

    async fn add_team_member(&self, team_id: &str, user_id: &str) -> Result<(), PlatformError> {
        self.record(
            "add_team_member",
            format!("add_team_member {} {}", team_id, user_id),
        )
    }

    async fn add_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), PlatformError> {
        self.record(
            "add_channel_member",
            format!("add_channel_member {} {}", channel_id, user_id),
        )
    }

    async fn get_user_by_username(&self, username: &str) -> Result<ChatUser, PlatformError> {
        self.record(
            "get_user_by_username",
            format!("get_user_by_username {}", username),
        )?;
        Ok(ChatUser {
            id: format!("mm-{}", username),
            username: username.to_string(),
        })
    }

    async fn update_user_active(&self, user_id: &str, active: bool) -> Result<(), PlatformError> {
        self.record(
            "update_user_active",
            format!("update_user_active {} {}", user_id, active),
        )
    }
}

// ============================================================================
// Mailer
// ============================================================================

#[derive(Default)]
pub struct FakeMailer {
    fail: bool,
    delay: Option<Duration>,
    sent: Mutex<Vec<WelcomeMessage>>,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Answer only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<WelcomeMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, message: &WelcomeMessage) -> Result<SendReceipt, PlatformError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(fake_error(Platform::Mailgun, "send"));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(SendReceipt {
            id: "<20240101.1@mg.test>".to_string(),
            message: "Queued. Thank you.".to_string(),
        })
    }
}
