//! HTML views rendered with askama.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use janus_common::{ActionLog, Pagination};

use crate::useradmin::UserListing;

/// Render a template, or a bare 500 if rendering fails.
pub fn render<T: Template>(status: StatusCode, template: &T) -> Response {
    match template.render() {
        Ok(body) => (status, Html(body)).into_response(),
        Err(e) => {
            tracing::error!("Rendering template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

pub fn error_page(status: StatusCode, message: &str) -> Response {
    render(
        status,
        &ErrorTemplate {
            message: message.to_string(),
        },
    )
}

#[derive(Template)]
#[template(path = "homepage.html")]
pub struct HomepageTemplate {
    pub admin_url: String,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub message: String,
}

pub struct TagView {
    pub name: String,
    pub class: String,
}

pub struct UserView {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub email: String,
    pub state: String,
    pub is_admin: bool,
    pub tags: Vec<TagView>,
}

#[derive(Template)]
#[template(path = "useradmin/listusers.html")]
pub struct ListUsersTemplate {
    pub admin_url: String,
    pub users: Vec<UserView>,
    pub pages: Pagination,
    pub group_names: Vec<String>,
}

impl ListUsersTemplate {
    pub fn new(admin_url: String, listing: UserListing) -> Self {
        let group_names = listing.tag_classes.keys().cloned().collect();
        let users = listing
            .users
            .into_iter()
            .map(|row| UserView {
                id: row.user.id,
                username: row.user.username,
                name: row.user.name,
                email: row.user.email,
                state: row.user.state,
                is_admin: row.user.is_admin,
                tags: row
                    .groups
                    .into_iter()
                    .map(|name| TagView {
                        class: listing.tag_classes.get(&name).cloned().unwrap_or_default(),
                        name,
                    })
                    .collect(),
            })
            .collect();
        Self {
            admin_url,
            users,
            pages: listing.pagination,
            group_names,
        }
    }
}

pub struct EntryView {
    pub kind: &'static str,
    pub text: String,
}

pub struct EntityView {
    pub name: String,
    pub has_errors: bool,
    pub entries: Vec<EntryView>,
}

#[derive(Template)]
#[template(path = "useradmin/actionlog.html")]
pub struct ActionLogTemplate {
    pub title: String,
    pub entities: Vec<EntityView>,
    pub back_url: String,
}

impl ActionLogTemplate {
    /// `fallback` is used when the log has no referer.
    pub fn new(log: &ActionLog, fallback: &str) -> Self {
        let entities = log
            .entities()
            .iter()
            .map(|entity| EntityView {
                name: entity.name().to_string(),
                has_errors: entity.has_errors(),
                entries: entity
                    .entries()
                    .iter()
                    .map(|entry| EntryView {
                        kind: entry.kind.as_str(),
                        text: entry.text.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            title: log.title().to_string(),
            entities,
            back_url: log
                .ref_url
                .clone()
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::GitlabUser;
    use crate::useradmin::UserRow;
    use std::collections::BTreeMap;

    #[test]
    fn test_action_log_rendering() {
        let mut log = ActionLog::new("Blocking users");
        log.add("user bob (id 7)").log("gitlab account is now blocked");
        log.add("user id 8").error("getting user from gitlab: 404 User Not Found");

        let view = ActionLogTemplate::new(&log, "/user/admin/");
        assert_eq!(view.back_url, "/user/admin/");
        assert!(!view.entities[0].has_errors);
        assert!(view.entities[1].has_errors);

        let html = view.render().unwrap();
        assert!(html.contains("Blocking users"));
        assert!(html.contains("user bob (id 7)"));
        assert!(html.contains("404 User Not Found"));
        assert!(html.contains("is-danger"));
    }

    #[test]
    fn test_action_log_back_url_prefers_referer() {
        let mut log = ActionLog::new("Blocking users");
        log.ref_url = Some("/user/admin/?page=2".to_string());
        let view = ActionLogTemplate::new(&log, "/user/admin/");
        assert_eq!(view.back_url, "/user/admin/?page=2");
    }

    #[test]
    fn test_entry_text_is_escaped() {
        let mut log = ActionLog::new("Adding users to group");
        log.add("user <script>").error("could not find group \"<b>\"");
        let html = ActionLogTemplate::new(&log, "/").render().unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_list_users_tags() {
        let mut tag_classes = BTreeMap::new();
        tag_classes.insert("management".to_string(), "is-danger".to_string());
        let listing = UserListing {
            users: vec![UserRow {
                user: GitlabUser {
                    id: 7,
                    username: "bob".to_string(),
                    name: "Bob".to_string(),
                    email: "bob@example.com".to_string(),
                    state: "active".to_string(),
                    is_admin: false,
                },
                groups: vec!["management".to_string()],
            }],
            pagination: Pagination::new(1, 3, 25),
            tag_classes,
        };

        let view = ListUsersTemplate::new("/user/admin/".to_string(), listing);
        assert_eq!(view.users[0].tags[0].class, "is-danger");
        assert_eq!(view.group_names, vec!["management"]);

        let html = view.render().unwrap();
        assert!(html.contains("bob@example.com"));
        assert!(html.contains("is-danger"));
        assert!(html.contains("page=2"));
    }

    #[test]
    fn test_error_page_status() {
        let response = error_page(StatusCode::NOT_IMPLEMENTED, "Unsupported action.");
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
