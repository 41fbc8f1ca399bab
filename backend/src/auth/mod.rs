//! Operator authentication for the admin pages.

pub mod oidc;
pub mod session;

pub use oidc::{AuthError, AuthUser, IdentityProvider};
