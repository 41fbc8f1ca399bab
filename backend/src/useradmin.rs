//! Bulk account administration and the user listing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use janus_common::{ActionLog, ActionLogEntity, Group, Pagination};

use crate::platform::{AccessLevel, ChatPlatform, CodeHost, GitlabUser, PlatformError};

const GROUP_MEMBERS_PER_PAGE: u32 = 1000;
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_SHOW: u32 = 25;

/// One of the supported bulk actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkAction {
    Block,
    Unblock,
    AddGroup(String),
    RemoveGroup(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported action.")]
pub struct UnknownAction(pub String);

impl BulkAction {
    /// Parse the form's `action` field; `param` is the group label.
    pub fn parse(action: &str, param: &str) -> Result<Self, UnknownAction> {
        match action {
            "block" => Ok(BulkAction::Block),
            "unblock" => Ok(BulkAction::Unblock),
            "addgroup" => Ok(BulkAction::AddGroup(param.to_string())),
            "removegroup" => Ok(BulkAction::RemoveGroup(param.to_string())),
            other => Err(UnknownAction(other.to_string())),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            BulkAction::Block => "Blocking users",
            BulkAction::Unblock => "Unblocking users",
            BulkAction::AddGroup(_) => "Adding users to group",
            BulkAction::RemoveGroup(_) => "Removing users from group",
        }
    }
}

/// A listed account with the labels of its configured groups.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub user: GitlabUser,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserListing {
    pub users: Vec<UserRow>,
    pub pagination: Pagination,
    pub tag_classes: BTreeMap<String, String>,
}

/// Parse a paging query value, falling back to `default`.
pub fn int_value(value: Option<&str>, default: u32) -> u32 {
    value
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub struct UserAdmin {
    groups: Vec<Group>,
    code_host: Arc<dyn CodeHost>,
    chat: Arc<dyn ChatPlatform>,
}

impl UserAdmin {
    pub fn new(groups: Vec<Group>, code_host: Arc<dyn CodeHost>, chat: Arc<dyn ChatPlatform>) -> Self {
        Self {
            groups,
            code_host,
            chat,
        }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Apply an action to each user in order. Failures are recorded per user
    /// and never stop the batch.
    pub async fn execute(&self, action: &BulkAction, user_ids: &[u64]) -> ActionLog {
        let mut log = ActionLog::new(action.title());
        match action {
            BulkAction::Block => self.set_blocked(&mut log, user_ids, true).await,
            BulkAction::Unblock => self.set_blocked(&mut log, user_ids, false).await,
            BulkAction::AddGroup(label) => self.change_group(&mut log, user_ids, label, true).await,
            BulkAction::RemoveGroup(label) => {
                self.change_group(&mut log, user_ids, label, false).await
            }
        }
        tracing::info!(
            action = action.title(),
            users = user_ids.len(),
            has_errors = log.has_errors(),
            "Bulk action finished"
        );
        log
    }

    /// Look up a user and open its log entity; `None` if the lookup failed.
    async fn open_entity<'a>(
        &self,
        log: &'a mut ActionLog,
        user_id: u64,
    ) -> Option<(GitlabUser, &'a mut ActionLogEntity)> {
        match self.code_host.get_user(user_id).await {
            Ok(user) => {
                let entity = log.add(format!("user {} (id {})", user.username, user_id));
                Some((user, entity))
            }
            Err(e) => {
                log.add(format!("user id {}", user_id))
                    .error(format!("getting user from gitlab: {}", e.sanitize()));
                None
            }
        }
    }

    async fn set_blocked(&self, log: &mut ActionLog, user_ids: &[u64], block: bool) {
        let (verb, refused_state) = if block {
            ("blocking", "blocked")
        } else {
            ("unblocking", "active")
        };

        for &user_id in user_ids {
            let Some((user, entity)) = self.open_entity(log, user_id).await else {
                continue;
            };
            if user.is_admin {
                entity.error(format!("{} gitlab admin account not allowed", verb));
                continue;
            }
            if user.state == refused_state {
                entity.error(format!("account was already {}", refused_state));
                continue;
            }
            entity.log(format!("account state was previously {:?}", user.state));

            let result = if block {
                self.code_host.block_user(user_id).await
            } else {
                self.code_host.unblock_user(user_id).await
            };
            if let Err(e) = result {
                entity.error(format!("{} gitlab account failed: {}", verb, e.sanitize()));
                continue;
            }
            entity.log(if block {
                "gitlab account is now blocked"
            } else {
                "gitlab account is now unblocked"
            });

            let chat_user = match self.chat.get_user_by_username(&user.username).await {
                Ok(chat_user) => chat_user,
                Err(e) => {
                    entity.error(format!("looking up mattermost user: {}", e.sanitize()));
                    continue;
                }
            };
            if let Err(e) = self.chat.update_user_active(&chat_user.id, !block).await {
                entity.error(format!("updating mattermost account: {}", e.sanitize()));
                continue;
            }
            entity.log(if block {
                "mattermost account is now disabled"
            } else {
                "mattermost account is now active"
            });
        }
    }

    async fn change_group(&self, log: &mut ActionLog, user_ids: &[u64], label: &str, add: bool) {
        let Some(group) = Group::find(&self.groups, label) else {
            log.add("internal server error")
                .error(format!("could not find group {:?}", label));
            return;
        };
        let group_id = group.gitlab_id.to_string();

        for &user_id in user_ids {
            let Some((user, entity)) = self.open_entity(log, user_id).await else {
                continue;
            };
            if user.state != "active" {
                entity.error("account is blocked, cannot make changes");
                continue;
            }

            if add {
                match self
                    .code_host
                    .add_group_member(&group_id, user_id, AccessLevel::Guest)
                    .await
                {
                    Ok(()) => entity.log(format!("user added to group {:?}", label)),
                    Err(e) => entity.error(format!("failed to add group: {}", e.sanitize())),
                }
            } else {
                match self.code_host.remove_group_member(&group_id, user_id).await {
                    Ok(()) => entity.log(format!("user removed from group {:?}", label)),
                    Err(e) => entity.error(format!("failed to remove group: {}", e.sanitize())),
                }
            }
        }
    }

    /// One page of accounts with their configured group labels.
    pub async fn list_users(&self, page: u32, per_page: u32) -> Result<UserListing, PlatformError> {
        let page_data = self.code_host.list_users(page, per_page).await?;

        let mut members: HashMap<String, HashSet<u64>> = HashMap::new();
        for group in &self.groups {
            members.insert(group.name.clone(), self.group_members(group).await);
        }

        let users = page_data
            .users
            .into_iter()
            .map(|user| {
                let groups = Group::labels_for_user(&members, user.id);
                UserRow { user, groups }
            })
            .collect();

        Ok(UserListing {
            users,
            pagination: page_data.pagination,
            tag_classes: Group::tag_classes(&self.groups),
        })
    }

    async fn group_members(&self, group: &Group) -> HashSet<u64> {
        match self
            .code_host
            .list_group_members(&group.gitlab_id.to_string(), GROUP_MEMBERS_PER_PAGE)
            .await
        {
            Ok(members) => members.into_iter().map(|m| m.id).collect(),
            Err(e) => {
                tracing::warn!("Could not fetch group {} members: {}", group.gitlab_id, e);
                HashSet::new()
            }
        }
    }
}
