//! Mattermost REST API (v4) client.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ChatPlatform, ChatUser, ErrorKind, NewChatUser, Platform, PlatformError};

/// Client authenticated with a bot or admin access token.
pub struct MattermostClient {
    http_client: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    status: String,
}

/// Mattermost's `AppError` body.
#[derive(Debug, Deserialize)]
struct AppError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct TeamMemberRequest<'a> {
    team_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ChannelMemberRequest<'a> {
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ActiveRequest {
    active: bool,
}

impl MattermostClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, PlatformError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            PlatformError::new(
                Platform::Mattermost,
                ErrorKind::InvalidUrl,
                format!("invalid base URL {:?}: {}", base_url, e),
            )
        })?;
        Ok(Self {
            http_client: Client::new(),
            base_url,
            token: token.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PlatformError::new(
                    Platform::Mattermost,
                    ErrorKind::InvalidUrl,
                    format!("base URL {} cannot hold a path", self.base_url),
                )
            })?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, PlatformError> {
        let response = builder.send().await.map_err(|e| {
            PlatformError::new(Platform::Mattermost, ErrorKind::Transport, e.to_string())
        })?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<AppError>(&body) {
            Ok(app_error) if !app_error.message.is_empty() => {
                format!("{} ({})", app_error.message, app_error.id)
            }
            _ => body.trim().to_string(),
        };
        Err(PlatformError::new(
            Platform::Mattermost,
            ErrorKind::Api,
            format!("{} {}: {}", url, status, detail),
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, PlatformError> {
        self.send(builder).await?.json().await.map_err(|e| {
            PlatformError::new(Platform::Mattermost, ErrorKind::Decode, e.to_string())
        })
    }
}

#[async_trait]
impl ChatPlatform for MattermostClient {
    async fn ping(&self) -> Result<String, PlatformError> {
        let url = self.endpoint(&["system", "ping"])?;
        let ping: PingResponse = self.send_json(self.request(Method::GET, url)).await?;
        Ok(ping.status)
    }

    async fn create_user(&self, user: &NewChatUser) -> Result<ChatUser, PlatformError> {
        let url = self.endpoint(&["users"])?;
        self.send_json(self.request(Method::POST, url).json(user)).await
    }

    async fn add_team_member(&self, team_id: &str, user_id: &str) -> Result<(), PlatformError> {
        let url = self.endpoint(&["teams", team_id, "members"])?;
        let body = TeamMemberRequest { team_id, user_id };
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn add_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&["channels", channel_id, "members"])?;
        let body = ChannelMemberRequest { user_id };
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<ChatUser, PlatformError> {
        let url = self.endpoint(&["users", "username", username])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn update_user_active(&self, user_id: &str, active: bool) -> Result<(), PlatformError> {
        let url = self.endpoint(&["users", user_id, "active"])?;
        self.send(self.request(Method::PUT, url).json(&ActiveRequest { active }))
            .await?;
        Ok(())
    }
}
