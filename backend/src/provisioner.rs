//! New-hire provisioning across the code host, chat platform and mailer.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Days, Utc};
use janus_common::{resolve_memberships, split_full_name, Membership, OnboardingUser};
use rand::{distributions::Alphanumeric, Rng};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::platform::{
    AccessLevel, ChatPlatform, CodeHost, ImpersonationTokenRequest, Mailer, NewChatUser,
    NewGitlabUser, PlatformError, WelcomeMessage,
};

const TOKEN_NAME: &str = "provisioning-token";
const WELCOME_SUBJECT: &str = "Welcome to our server";
const EMAIL_DEADLINE: Duration = Duration::from_secs(5);
const PASSWORD_LEN: usize = 12;
/// Appended to random passwords so they satisfy chat password policies.
const PASSWORD_SUFFIX: &str = "?a1Z";
const SSO_SERVICE: &str = "gitlab";

/// Step of the workflow that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GitlabCreate,
    GitlabToken,
    GitlabGroup,
    GitlabProject,
    MattermostCreate,
    MattermostTeam,
    MattermostChannel,
    Email,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::GitlabCreate => "gitlab-create",
            Stage::GitlabToken => "gitlab-token",
            Stage::GitlabGroup => "gitlab-group",
            Stage::GitlabProject => "gitlab-project",
            Stage::MattermostCreate => "mattermost-create",
            Stage::MattermostTeam => "mattermost-team",
            Stage::MattermostChannel => "mattermost-channel",
            Stage::Email => "email",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Bad request")]
    MissingBody,
    #[error("Bad payload")]
    BadPayload(String),
    #[error("{detail}")]
    Upstream {
        stage: Stage,
        detail: String,
        #[source]
        source: Option<PlatformError>,
    },
}

impl ProvisionError {
    fn upstream(stage: Stage, context: &str, source: PlatformError) -> Self {
        Self::Upstream {
            stage,
            detail: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProvisionError::Upstream { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProvisionError::MissingBody | ProvisionError::BadPayload(_) => StatusCode::BAD_REQUEST,
            ProvisionError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// What a successful run created.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub gitlab_id: u64,
    pub chat_user_id: String,
    pub memberships: Vec<Membership>,
    pub email_id: String,
}

/// Decode an onboarding submission from a request body.
pub fn parse_payload(body: &[u8]) -> Result<OnboardingUser, ProvisionError> {
    if body.is_empty() {
        return Err(ProvisionError::MissingBody);
    }
    let user: OnboardingUser =
        serde_json::from_slice(body).map_err(|e| ProvisionError::BadPayload(e.to_string()))?;
    if user.telegram_handle.trim().is_empty() {
        return Err(ProvisionError::BadPayload("empty handle".to_string()));
    }
    if user.email.trim().is_empty() {
        return Err(ProvisionError::BadPayload("empty email".to_string()));
    }
    Ok(user)
}

/// Runs the onboarding workflow for one new hire at a time.
pub struct Provisioner {
    config: Arc<Config>,
    code_host: Arc<dyn CodeHost>,
    chat: Arc<dyn ChatPlatform>,
    mailer: Arc<dyn Mailer>,
    email_deadline: Duration,
}

impl Provisioner {
    pub fn new(
        config: Arc<Config>,
        code_host: Arc<dyn CodeHost>,
        chat: Arc<dyn ChatPlatform>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            code_host,
            chat,
            mailer,
            email_deadline: EMAIL_DEADLINE,
        }
    }

    pub async fn provision(&self, user: &OnboardingUser) -> Result<ProvisionOutcome, ProvisionError> {
        let span = tracing::info_span!(
            "provision",
            run_id = %Uuid::new_v4(),
            handle = %user.telegram_handle
        );
        async {
            let gitlab_id = self.provision_gitlab(user).await?;
            let (chat_user_id, memberships) = self.provision_chat(user, gitlab_id).await?;
            let email_id = self.send_welcome_email(user, gitlab_id).await?;
            Ok(ProvisionOutcome {
                gitlab_id,
                chat_user_id,
                memberships,
                email_id,
            })
        }
        .instrument(span)
        .await
    }

    async fn provision_gitlab(&self, user: &OnboardingUser) -> Result<u64, ProvisionError> {
        let new_user = NewGitlabUser {
            email: user.email.clone(),
            username: user.telegram_handle.clone(),
            name: user.name.clone(),
            reset_password: true,
            skip_confirmation: true,
        };
        let created = self
            .code_host
            .create_user(&new_user)
            .await
            .map_err(|e| ProvisionError::upstream(Stage::GitlabCreate, "creating user", e))?;
        tracing::info!("Created gitlab user {} for {}", created.id, user.email);

        self.silence_notifications(created.id).await?;

        let provisioner = &self.config.provisioner;
        if !provisioner.gitlab_group.is_empty() {
            self.code_host
                .add_group_member(&provisioner.gitlab_group, created.id, AccessLevel::Developer)
                .await
                .map_err(|e| {
                    let context = format!("adding group member {}", created.id);
                    ProvisionError::upstream(Stage::GitlabGroup, &context, e)
                })?;
            tracing::info!(
                "Added gitlab user {} to group {:?}",
                created.id,
                provisioner.gitlab_group
            );
        }

        if !provisioner.gitlab_project.is_empty() {
            self.code_host
                .add_project_member(&provisioner.gitlab_project, created.id, AccessLevel::Developer)
                .await
                .map_err(|e| {
                    let context = format!("adding project member {}", created.id);
                    ProvisionError::upstream(Stage::GitlabProject, &context, e)
                })?;
            tracing::info!(
                "Added gitlab user {} to project {:?}",
                created.id,
                provisioner.gitlab_project
            );
        }

        Ok(created.id)
    }

    /// Impersonate the new account just long enough to turn off its
    /// notifications. The token is revoked exactly once after issuance.
    async fn silence_notifications(&self, user_id: u64) -> Result<(), ProvisionError> {
        let request = ImpersonationTokenRequest {
            name: TOKEN_NAME.to_string(),
            scopes: vec!["api".to_string()],
            expires_at: Utc::now().date_naive() + Days::new(1),
        };
        let token = self
            .code_host
            .create_impersonation_token(user_id, &request)
            .await
            .map_err(|e| {
                ProvisionError::upstream(Stage::GitlabToken, "creating impersonation token", e)
            })?;
        tracing::info!("Created impersonation token {} for user {}", token.id, user_id);

        match self.code_host.disable_notifications(&token.token).await {
            Ok(()) => tracing::info!("Disabled user {} notifications", user_id),
            Err(e) => tracing::warn!("Disabling user {} notifications: {}", user_id, e),
        }

        match self
            .code_host
            .revoke_impersonation_token(user_id, token.id)
            .await
        {
            Ok(()) => tracing::info!("Revoked impersonation token {} for user {}", token.id, user_id),
            Err(e) => tracing::warn!(
                "Revoking impersonation token {} for user {}: {}",
                token.id,
                user_id,
                e
            ),
        }

        Ok(())
    }

    async fn provision_chat(
        &self,
        user: &OnboardingUser,
        gitlab_id: u64,
    ) -> Result<(String, Vec<Membership>), ProvisionError> {
        let (first_name, last_name) = split_full_name(&user.name);
        let mut new_user = NewChatUser {
            username: user.telegram_handle.clone(),
            email: user.email.clone(),
            first_name,
            last_name,
            ..Default::default()
        };
        if self.config.mattermost.use_sso {
            new_user.auth_service = Some(SSO_SERVICE.to_string());
            new_user.auth_data = Some(gitlab_id.to_string());
        } else {
            new_user.password = Some(random_password());
        }

        let created = self
            .chat
            .create_user(&new_user)
            .await
            .map_err(|e| ProvisionError::upstream(Stage::MattermostCreate, "creating user", e))?;
        tracing::info!("Created mattermost user {} / {}", created.username, created.id);

        let memberships = resolve_memberships(&user.skills(), &self.config.provisioner.rules);
        for membership in &memberships {
            match membership {
                Membership::Team(team) => {
                    self.chat
                        .add_team_member(team, &created.id)
                        .await
                        .map_err(|e| {
                            let context = format!("adding user to team {:?}", team);
                            ProvisionError::upstream(Stage::MattermostTeam, &context, e)
                        })?;
                    tracing::info!("Added user to team {}", team);
                }
                Membership::Channel { channel, .. } => {
                    self.chat
                        .add_channel_member(channel, &created.id)
                        .await
                        .map_err(|e| {
                            let context = format!("adding user to channel {:?}", channel);
                            ProvisionError::upstream(Stage::MattermostChannel, &context, e)
                        })?;
                    tracing::info!("Added user to channel {}", channel);
                }
            }
        }

        Ok((created.id, memberships))
    }

    async fn send_welcome_email(
        &self,
        user: &OnboardingUser,
        gitlab_id: u64,
    ) -> Result<String, ProvisionError> {
        let mut message = WelcomeMessage::new(
            self.config.mailgun.from_addr.as_str(),
            WELCOME_SUBJECT,
            user.email.as_str(),
            self.config.provisioner.mailgun_welcome_template.as_str(),
        );

        let mut errors = Vec::new();
        let results = [
            message.add_template_variable("name", &user.name),
            message.add_template_variable("username", &user.telegram_handle),
            message.add_template_variable("email", &user.email),
            message.add_template_variable("gitlab_id", &gitlab_id),
        ];
        for result in results {
            if let Err(e) = result {
                errors.push(e.to_string());
            }
        }
        if !errors.is_empty() {
            return Err(ProvisionError::Upstream {
                stage: Stage::Email,
                detail: format!("template variables: {}", errors.join(", ")),
                source: None,
            });
        }

        let receipt = tokio::time::timeout(self.email_deadline, self.mailer.send(&message))
            .await
            .map_err(|_| ProvisionError::Upstream {
                stage: Stage::Email,
                detail: format!(
                    "sending email: no answer within {}s",
                    self.email_deadline.as_secs()
                ),
                source: None,
            })?
            .map_err(|e| ProvisionError::upstream(Stage::Email, "sending email", e))?;
        tracing::info!("Sent welcome email (resp: {}, id: {})", receipt.message, receipt.id);

        Ok(receipt.id)
    }
}

fn random_password() -> String {
    let mut password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect();
    password.push_str(PASSWORD_SUFFIX);
    password
}
