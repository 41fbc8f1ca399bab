use std::sync::Arc;

use janus_backend::config::{Config, DEFAULT_CONFIG_FILE};
use janus_backend::platform::{
    ChatPlatform, CodeHost, GitlabClient, MailgunClient, MattermostClient,
};
use janus_backend::{logging, routes, AppState, IdentityProvider};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("JANUS_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let config = Config::load(&config_path)?;

    logging::init(&config.logging.level);

    tracing::info!("Starting Janus with configuration {}", config_path);

    let identity = IdentityProvider::discover(&config.oidc).await?;

    let gitlab = GitlabClient::new(&config.gitlab.base_url, &config.gitlab.token)?;
    let version = gitlab.version().await?;
    tracing::info!("Connected to gitlab {} at {}", version, config.gitlab.base_url);

    let mattermost = MattermostClient::new(&config.mattermost.base_url, &config.mattermost.token)?;
    let status = mattermost.ping().await?;
    tracing::info!("Connected to mattermost at {} ({})", config.mattermost.base_url, status);

    let mailgun = MailgunClient::new(
        &config.mailgun.api_base,
        &config.mailgun.domain,
        &config.mailgun.api_key,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        identity,
        Arc::new(gitlab),
        Arc::new(mattermost),
        Arc::new(mailgun),
    ));

    let app = routes::app(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
