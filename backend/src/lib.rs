pub mod auth;
pub mod config;
pub mod logging;
pub mod platform;
pub mod provisioner;
pub mod routes;
pub mod test_util;
pub mod useradmin;
pub mod views;

pub use auth::{AuthUser, IdentityProvider};
pub use config::Config;
pub use provisioner::{ProvisionError, Provisioner};
pub use useradmin::{BulkAction, UserAdmin};

use std::sync::Arc;

use platform::{ChatPlatform, CodeHost, Mailer};

/// Shared application state.
pub struct AppState {
    pub config: Arc<Config>,
    pub identity: IdentityProvider,
    pub provisioner: Provisioner,
    pub user_admin: UserAdmin,
}

impl AppState {
    pub fn new(
        config: Config,
        identity: IdentityProvider,
        code_host: Arc<dyn CodeHost>,
        chat: Arc<dyn ChatPlatform>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let config = Arc::new(config);
        let user_admin = UserAdmin::new(
            config.useradmin.groups.clone(),
            code_host.clone(),
            chat.clone(),
        );
        let provisioner = Provisioner::new(config.clone(), code_host, chat, mailer);
        Self {
            config,
            identity,
            provisioner,
            user_admin,
        }
    }

    /// Path of the user listing page.
    pub fn admin_url(&self) -> String {
        format!("{}/", self.config.useradmin.prefix)
    }
}
