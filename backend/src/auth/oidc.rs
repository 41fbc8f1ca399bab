use std::collections::HashMap;

use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::session::{read_cookie, AUTH_COOKIE};
use crate::config::OidcConfig;

/// `iss` claim of the session tokens Janus signs for itself.
pub const SESSION_ISSUER: &str = "janus";

/// Operator identity extracted from a validated ID token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// GitLab numeric user id, as a string (`sub` claim).
    pub sub: String,
    pub username: Option<String>,
    pub name: Option<String>,
    /// Group paths from the identity provider.
    pub groups: Vec<String>,
}

impl AuthUser {
    /// Check if the user belongs to a group (exact, case-sensitive).
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,
    #[error("Invalid Authorization header format")]
    InvalidFormat,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetchError(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
    #[error("Sign-in is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
}

/// JWKS key set response.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    authorization_endpoint: Option<String>,
    #[serde(default)]
    token_endpoint: Option<String>,
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

/// ID token claims. GitLab publishes group membership as `groups_direct`.
#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "groups_direct")]
    groups: Vec<String>,
    exp: u64,
}

/// Claims of the session cookie, copied from a validated ID token.
#[derive(Debug, Deserialize, Serialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
    iss: String,
    iat: u64,
    exp: u64,
}

struct Endpoints {
    authorization: String,
    token: String,
}

struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl SessionKeys {
    fn new(config: &OidcConfig) -> Self {
        let secret = match &config.session_secret {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => {
                tracing::warn!("No oidc.session_secret configured, sessions end on restart");
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(64)
                    .map(char::from)
                    .collect()
            }
        };
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: config.session_hours * 3600,
        }
    }
}

/// Runs the OIDC authorization-code flow and validates ID tokens against
/// the issuer's published keys.
///
/// Built once by the entry point and shared through `AppState`; there is no
/// process-wide provider registry.
pub struct IdentityProvider {
    issuer: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    scope: String,
    http_client: Client,
    jwks_uri: Option<String>,
    endpoints: Option<Endpoints>,
    keys: RwLock<HashMap<String, DecodingKey>>,
    session: SessionKeys,
}

impl IdentityProvider {
    fn from_config(config: &OidcConfig, keys: HashMap<String, DecodingKey>) -> Self {
        Self {
            issuer: config.issuer.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope.clone(),
            http_client: Client::new(),
            jwks_uri: None,
            endpoints: None,
            keys: RwLock::new(keys),
            session: SessionKeys::new(config),
        }
    }

    /// Fetch the issuer's discovery document and its signing keys.
    pub async fn discover(config: &OidcConfig) -> Result<Self, AuthError> {
        let mut provider = Self::from_config(config, HashMap::new());

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            config.issuer.trim_end_matches('/')
        );
        let discovery: DiscoveryDocument = provider
            .http_client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        provider.jwks_uri = Some(discovery.jwks_uri);
        match (discovery.authorization_endpoint, discovery.token_endpoint) {
            (Some(authorization), Some(token)) => {
                provider.endpoints = Some(Endpoints {
                    authorization,
                    token,
                })
            }
            _ => tracing::warn!("Issuer publishes no authorization/token endpoints"),
        }

        provider.refresh_keys().await?;

        Ok(provider)
    }

    /// Provider with a fixed key set and no discovery.
    pub fn with_keys(config: &OidcConfig, keys: HashMap<String, DecodingKey>) -> Self {
        Self::from_config(config, keys)
    }

    /// Use these endpoints for browser sign-in instead of discovered ones.
    pub fn with_endpoints(mut self, authorization: &str, token: &str) -> Self {
        self.endpoints = Some(Endpoints {
            authorization: authorization.to_string(),
            token: token.to_string(),
        });
        self
    }

    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Lifetime of a session cookie, in seconds.
    pub fn session_ttl_secs(&self) -> u64 {
        self.session.ttl_secs
    }

    /// Provider URL that starts a sign-in; `state` comes back on the callback.
    pub fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        let endpoints = self
            .endpoints
            .as_ref()
            .ok_or(AuthError::NotConfigured("no authorization endpoint"))?;
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(AuthError::NotConfigured("oidc.client_id is not set"))?;
        let redirect_uri = self
            .redirect_uri
            .as_deref()
            .ok_or(AuthError::NotConfigured("oidc.redirect_uri is not set"))?;

        let url = Url::parse_with_params(
            &endpoints.authorization,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", self.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|_| AuthError::NotConfigured("invalid authorization endpoint"))?;

        Ok(url.into())
    }

    /// Trade an authorization code for an ID token and validate it.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthUser, AuthError> {
        let endpoints = self
            .endpoints
            .as_ref()
            .ok_or(AuthError::NotConfigured("no token endpoint"))?;
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(AuthError::NotConfigured("oidc.client_id is not set"))?;
        let redirect_uri = self
            .redirect_uri
            .as_deref()
            .ok_or(AuthError::NotConfigured("oidc.redirect_uri is not set"))?;

        let response = self
            .http_client
            .post(&endpoints.token)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", client_id),
                ("client_secret", self.client_secret.as_deref().unwrap_or("")),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!("{}: {}", status, body)));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        self.validate(&tokens.id_token).await
    }

    async fn refresh_keys(&self) -> Result<(), AuthError> {
        let Some(jwks_uri) = &self.jwks_uri else {
            return Ok(());
        };
        tracing::info!("Fetching JWKS from {}", jwks_uri);

        let response: JwksResponse = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
                match DecodingKey::from_rsa_components(n, e) {
                    Ok(key) => {
                        keys.insert(jwk.kid.clone(), key);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse RSA key {}: {}", jwk.kid, e);
                    }
                }
            }
        }

        tracing::info!("Loaded {} JWKS keys", keys.len());
        Ok(())
    }

    /// Signing key for `kid`, refetching the JWKS once when it is unknown.
    async fn signing_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let keys = self.keys.read().await;
            if let Some(key) = keys.get(kid) {
                return Ok(key.clone());
            }
        }
        if self.jwks_uri.is_none() {
            return Err(AuthError::KeyNotFound(kid.to_string()));
        }

        tracing::info!("Unknown kid {}, refreshing JWKS", kid);
        self.refresh_keys().await?;

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    /// Validate a raw ID token.
    pub async fn validate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("Missing kid in token header".to_string()))?;

        let key = self.signing_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        match &self.client_id {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AuthUser {
            sub: token_data.claims.sub,
            username: token_data.claims.nickname,
            name: token_data.claims.name,
            groups: token_data.claims.groups,
        })
    }

    /// Sign a session token for `user`, valid for the configured hours.
    pub fn issue_session(&self, user: &AuthUser) -> Result<String, AuthError> {
        let now = Utc::now().timestamp() as u64;
        let claims = SessionClaims {
            sub: user.sub.clone(),
            nickname: user.username.clone(),
            name: user.name.clone(),
            groups: user.groups.clone(),
            iss: SESSION_ISSUER.to_string(),
            iat: now,
            exp: now + self.session.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.session.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Validate a session token issued by [`IdentityProvider::issue_session`].
    pub fn validate_session(&self, token: &str) -> Result<AuthUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.validate_aud = false;

        let token_data = decode::<SessionClaims>(token, &self.session.decoding, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AuthUser {
            sub: token_data.claims.sub,
            username: token_data.claims.nickname,
            name: token_data.claims.name,
            groups: token_data.claims.groups,
        })
    }

    /// Authenticate a request from its Bearer ID token or session cookie.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        match credential(headers)? {
            Credential::Bearer(token) => self.validate(&token).await,
            Credential::Session(token) => self.validate_session(&token),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Credential {
    Bearer(String),
    Session(String),
}

/// The request's credential: the Bearer header wins over the session cookie.
fn credential(headers: &HeaderMap) -> Result<Credential, AuthError> {
    if let Some(value) = headers.get("authorization") {
        let value = value.to_str().map_err(|_| AuthError::InvalidFormat)?;
        return value
            .strip_prefix("Bearer ")
            .map(|token| Credential::Bearer(token.to_string()))
            .ok_or(AuthError::InvalidFormat);
    }
    read_cookie(headers, AUTH_COOKIE)
        .map(Credential::Session)
        .ok_or(AuthError::MissingCredentials)
}
