//! Janus Common Types
//!
//! Domain types shared by the gateway: onboarding submissions, the skill
//! rule engine, admin group mappings and the bulk-action audit log.

pub mod action_log;
pub mod groups;
pub mod onboarding;
pub mod rules;

pub use action_log::{ActionLog, ActionLogEntity, ActionLogEntry, EntryKind};
pub use groups::{Group, Pagination};
pub use onboarding::{split_full_name, OnboardingUser};
pub use rules::{resolve_memberships, Membership, MembershipSet, Rule};
