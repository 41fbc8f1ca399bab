//! GitLab REST API (v4) client.

use async_trait::async_trait;
use janus_common::Pagination;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    AccessLevel, CodeHost, ErrorKind, GitlabUser, GroupMember, ImpersonationToken,
    ImpersonationTokenRequest, NewGitlabUser, Platform, PlatformError, UserPage,
};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Client authenticated with an admin personal access token.
pub struct GitlabClient {
    http_client: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Serialize)]
struct AddMemberRequest {
    user_id: u64,
    access_level: u32,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
    #[serde(default)]
    revision: String,
}

impl GitlabClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, PlatformError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            PlatformError::new(
                Platform::Gitlab,
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

    /// Build `{base}/api/v4/{segments...}`; each segment is percent-encoded,
    /// so group paths like `dev/backend` become `dev%2Fbackend`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PlatformError::new(
                    Platform::Gitlab,
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
        self.http_client
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, PlatformError> {
        let response = builder.send().await.map_err(|e| {
            PlatformError::new(Platform::Gitlab, ErrorKind::Transport, e.to_string())
        })?;
        check(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, PlatformError> {
        let response = self.send(builder).await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::new(Platform::Gitlab, ErrorKind::Decode, e.to_string()))
    }
}

/// Turn a non-success response into an error carrying GitLab's message.
async fn check(response: Response) -> Result<Response, PlatformError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::new(
        Platform::Gitlab,
        ErrorKind::Api,
        format!("{} {}: {}", url, status, body.trim()),
    )
    .with_user_message(parse_error_message(&body)))
}

/// Extract the human-readable part of a GitLab error body.
///
/// GitLab answers `{"message": "..."}`, `{"message": {"field": ["..."]}}`
/// or `{"error": "..."}` depending on the endpoint.
pub fn parse_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value.get("message").or_else(|| value.get("error"))?;
    let text = flatten_message(message);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn flatten_message(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(flatten_message)
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::Object(fields) => {
            let mut parts: Vec<String> = fields
                .iter()
                .map(|(field, v)| format!("{} {}", field, flatten_message(v)))
                .collect();
            parts.sort();
            parts.join(", ")
        }
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl CodeHost for GitlabClient {
    async fn version(&self) -> Result<String, PlatformError> {
        let url = self.endpoint(&["version"])?;
        let version: VersionResponse = self.send_json(self.request(Method::GET, url)).await?;
        if version.revision.is_empty() {
            Ok(version.version)
        } else {
            Ok(format!("{} ({})", version.version, version.revision))
        }
    }

    async fn create_user(&self, user: &NewGitlabUser) -> Result<GitlabUser, PlatformError> {
        let url = self.endpoint(&["users"])?;
        self.send_json(self.request(Method::POST, url).json(user)).await
    }

    async fn get_user(&self, user_id: u64) -> Result<GitlabUser, PlatformError> {
        let url = self.endpoint(&["users", &user_id.to_string()])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn list_users(&self, page: u32, per_page: u32) -> Result<UserPage, PlatformError> {
        let url = self.endpoint(&["users"])?;
        let builder = self.request(Method::GET, url).query(&[
            ("order_by", "username".to_string()),
            ("sort", "asc".to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ]);
        let response = self.send(builder).await?;

        let headers = response.headers();
        let this = header_u32(headers, "x-page").unwrap_or(page);
        let last = header_u32(headers, "x-total-pages").unwrap_or(this);
        let show = header_u32(headers, "x-per-page").unwrap_or(per_page);

        let users = response
            .json()
            .await
            .map_err(|e| PlatformError::new(Platform::Gitlab, ErrorKind::Decode, e.to_string()))?;

        Ok(UserPage {
            users,
            pagination: Pagination::new(this, last, show),
        })
    }

    async fn block_user(&self, user_id: u64) -> Result<(), PlatformError> {
        let url = self.endpoint(&["users", &user_id.to_string(), "block"])?;
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn unblock_user(&self, user_id: u64) -> Result<(), PlatformError> {
        let url = self.endpoint(&["users", &user_id.to_string(), "unblock"])?;
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn create_impersonation_token(
        &self,
        user_id: u64,
        request: &ImpersonationTokenRequest,
    ) -> Result<ImpersonationToken, PlatformError> {
        let url = self.endpoint(&["users", &user_id.to_string(), "impersonation_tokens"])?;
        self.send_json(self.request(Method::POST, url).json(request))
            .await
    }

    async fn revoke_impersonation_token(
        &self,
        user_id: u64,
        token_id: u64,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&[
            "users",
            &user_id.to_string(),
            "impersonation_tokens",
            &token_id.to_string(),
        ])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn disable_notifications(&self, user_token: &str) -> Result<(), PlatformError> {
        let url = self.endpoint(&["notification_settings"])?;
        let builder = self
            .http_client
            .put(url)
            .header(TOKEN_HEADER, user_token)
            .query(&[("level", "disabled")]);
        self.send(builder).await?;
        Ok(())
    }

    async fn add_group_member(
        &self,
        group: &str,
        user_id: u64,
        level: AccessLevel,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&["groups", group, "members"])?;
        let body = AddMemberRequest {
            user_id,
            access_level: level.value(),
        };
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn add_project_member(
        &self,
        project: &str,
        user_id: u64,
        level: AccessLevel,
    ) -> Result<(), PlatformError> {
        let url = self.endpoint(&["projects", project, "members"])?;
        let body = AddMemberRequest {
            user_id,
            access_level: level.value(),
        };
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn remove_group_member(&self, group: &str, user_id: u64) -> Result<(), PlatformError> {
        let url = self.endpoint(&["groups", group, "members", &user_id.to_string()])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn list_group_members(
        &self,
        group: &str,
        per_page: u32,
    ) -> Result<Vec<GroupMember>, PlatformError> {
        let url = self.endpoint(&["groups", group, "members"])?;
        let builder = self
            .request(Method::GET, url)
            .query(&[("per_page", per_page)]);
        self.send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_message() {
        let body = r#"{"message":"404 User Not Found"}"#;
        assert_eq!(parse_error_message(body), Some("404 User Not Found".to_string()));
    }

    #[test]
    fn test_parse_field_messages() {
        let body = r#"{"message":{"username":["has already been taken"],"email":["has already been taken","is invalid"]}}"#;
        assert_eq!(
            parse_error_message(body),
            Some("email has already been taken, is invalid, username has already been taken".to_string())
        );
    }

    #[test]
    fn test_parse_error_field() {
        let body = r#"{"error":"insufficient_scope"}"#;
        assert_eq!(parse_error_message(body), Some("insufficient_scope".to_string()));
    }

    #[test]
    fn test_parse_non_json_body() {
        assert_eq!(parse_error_message("<html>502 Bad Gateway</html>"), None);
        assert_eq!(parse_error_message(r#"{"message":null}"#), None);
    }

    #[test]
    fn test_endpoint_encodes_group_path() {
        let client = GitlabClient::new("http://gitlab.local:8929/", "t").unwrap();
        let url = client.endpoint(&["groups", "dev/backend", "members"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://gitlab.local:8929/api/v4/groups/dev%2Fbackend/members"
        );
    }

    #[test]
    fn test_endpoint_with_base_path() {
        let client = GitlabClient::new("https://example.com/gitlab", "t").unwrap();
        let url = client.endpoint(&["users", "5"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/gitlab/api/v4/users/5");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = GitlabClient::new("not a url", "t").err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidUrl);
    }
}
