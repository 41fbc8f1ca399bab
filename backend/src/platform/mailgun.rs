//! Mailgun messages API client.

use async_trait::async_trait;
use reqwest::Client;

use super::{ErrorKind, Mailer, Platform, PlatformError, SendReceipt, WelcomeMessage};

pub const DEFAULT_API_BASE: &str = "https://api.mailgun.net/v3";

/// Sends templated messages through one Mailgun domain.
pub struct MailgunClient {
    http_client: Client,
    api_base: String,
    domain: String,
    api_key: String,
}

impl MailgunClient {
    pub fn new(api_base: &str, domain: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            domain: domain.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.domain)
    }
}

/// Form fields for the messages endpoint. Template variables travel as a
/// JSON object in the `h:X-Mailgun-Variables` header field.
fn form_fields(message: &WelcomeMessage) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("from", message.from.clone()),
        ("to", message.to.clone()),
        ("subject", message.subject.clone()),
    ];
    if !message.template.is_empty() {
        fields.push(("template", message.template.clone()));
    }
    if !message.variables.is_empty() {
        let variables = serde_json::Value::Object(message.variables.clone());
        fields.push(("h:X-Mailgun-Variables", variables.to_string()));
    }
    fields
}

#[async_trait]
impl Mailer for MailgunClient {
    async fn send(&self, message: &WelcomeMessage) -> Result<SendReceipt, PlatformError> {
        let url = self.messages_url();
        tracing::debug!("Sending message to {} via {}", message.to, url);

        let response = self
            .http_client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&form_fields(message))
            .send()
            .await
            .map_err(|e| PlatformError::new(Platform::Mailgun, ErrorKind::Transport, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::new(
                Platform::Mailgun,
                ErrorKind::Api,
                format!("{}: {}", status, body.trim()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PlatformError::new(Platform::Mailgun, ErrorKind::Decode, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_url() {
        let client = MailgunClient::new("https://api.eu.mailgun.net/v3/", "mg.example.com", "key");
        assert_eq!(
            client.messages_url(),
            "https://api.eu.mailgun.net/v3/mg.example.com/messages"
        );
    }

    #[test]
    fn test_form_fields_include_variables() {
        let mut msg = WelcomeMessage::new("ops@example.com", "Welcome", "ada@example.com", "welcome");
        msg.add_template_variable("name", "Ada").unwrap();
        let fields = form_fields(&msg);
        assert!(fields.contains(&("template", "welcome".to_string())));
        assert!(fields.contains(&("h:X-Mailgun-Variables", r#"{"name":"Ada"}"#.to_string())));
    }

    #[test]
    fn test_form_fields_without_template() {
        let msg = WelcomeMessage::new("ops@example.com", "Welcome", "ada@example.com", "");
        let names: Vec<&str> = form_fields(&msg).iter().map(|(k, _)| *k).collect();
        assert_eq!(names, vec!["from", "to", "subject"]);
    }
}
