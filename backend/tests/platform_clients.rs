use chrono::NaiveDate;
use janus_backend::platform::{
    AccessLevel, ChatPlatform, CodeHost, ErrorKind, GitlabClient, ImpersonationTokenRequest,
    Mailer, MailgunClient, MattermostClient, NewChatUser, NewGitlabUser, Platform,
    WelcomeMessage,
};
use serde_json::json;
use wiremock::matchers::{
    bearer_token, body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn new_ada() -> NewGitlabUser {
    NewGitlabUser {
        email: "ada@example.com".to_string(),
        username: "ada".to_string(),
        name: "Ada Lovelace".to_string(),
        reset_password: true,
        skip_confirmation: true,
    }
}

#[tokio::test]
async fn test_gitlab_create_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/users"))
        .and(header("PRIVATE-TOKEN", "admin-token"))
        .and(body_partial_json(json!({
            "username": "ada",
            "reset_password": true,
            "skip_confirmation": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 42,
            "username": "ada",
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "state": "active",
            "is_admin": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GitlabClient::new(&server.uri(), "admin-token").unwrap();
    let user = client.create_user(&new_ada()).await.unwrap();
    assert_eq!(user.id, 42);
    assert_eq!(user.state, "active");
}

#[tokio::test]
async fn test_gitlab_error_message_is_sanitized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/users"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "Email has already been taken"})),
        )
        .mount(&server)
        .await;

    let client = GitlabClient::new(&server.uri(), "admin-token").unwrap();
    let err = client.create_user(&new_ada()).await.unwrap_err();
    assert_eq!(err.platform, Platform::Gitlab);
    assert_eq!(err.kind, ErrorKind::Api);
    assert_eq!(err.sanitize(), "Email has already been taken");
    assert!(err.to_string().contains("409"));
}

#[tokio::test]
async fn test_gitlab_list_users_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users"))
        .and(query_param("order_by", "username"))
        .and(query_param("page", "2"))
        .and(query_param("per_page", "25"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Page", "2")
                .insert_header("X-Total-Pages", "5")
                .insert_header("X-Per-Page", "25")
                .set_body_json(json!([
                    {"id": 1, "username": "ada", "state": "active"},
                    {"id": 2, "username": "bob", "state": "blocked", "is_admin": true}
                ])),
        )
        .mount(&server)
        .await;

    let client = GitlabClient::new(&server.uri(), "admin-token").unwrap();
    let page = client.list_users(2, 25).await.unwrap();
    assert_eq!(page.users.len(), 2);
    assert!(page.users[1].is_admin);
    assert_eq!(page.pagination.this, 2);
    assert_eq!(page.pagination.last, 5);
    assert_eq!(page.pagination.num_after, 3);
    assert_eq!(page.pagination.show, 25);
}

#[tokio::test]
async fn test_gitlab_impersonation_token_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/users/42/impersonation_tokens"))
        .and(body_partial_json(json!({
            "name": "provisioning-token",
            "scopes": ["api"],
            "expires_at": "2024-05-02"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 7,
            "token": "glpat-imp",
            "active": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v4/notification_settings"))
        .and(header("PRIVATE-TOKEN", "glpat-imp"))
        .and(query_param("level", "disabled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"level": "disabled"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v4/users/42/impersonation_tokens/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = GitlabClient::new(&server.uri(), "admin-token").unwrap();
    let request = ImpersonationTokenRequest {
        name: "provisioning-token".to_string(),
        scopes: vec!["api".to_string()],
        expires_at: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
    };
    let token = client.create_impersonation_token(42, &request).await.unwrap();
    assert_eq!(token.id, 7);
    client.disable_notifications(&token.token).await.unwrap();
    client.revoke_impersonation_token(42, token.id).await.unwrap();
}

#[tokio::test]
async fn test_gitlab_group_membership() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/groups/67/members"))
        .and(body_partial_json(json!({"user_id": 42, "access_level": 10})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/groups/67/members"))
        .and(query_param("per_page", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 42, "username": "ada"},
            {"id": 43, "username": "bob"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v4/groups/67/members/42"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Not found"})))
        .mount(&server)
        .await;

    let client = GitlabClient::new(&server.uri(), "admin-token").unwrap();
    client
        .add_group_member("67", 42, AccessLevel::Guest)
        .await
        .unwrap();

    let members = client.list_group_members("67", 1000).await.unwrap();
    let ids: Vec<u64> = members.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![42, 43]);

    let err = client.remove_group_member("67", 42).await.unwrap_err();
    assert_eq!(err.sanitize(), "404 Not found");
}

#[tokio::test]
async fn test_gitlab_transport_error() {
    let client = GitlabClient::new("http://127.0.0.1:1/", "admin-token").unwrap();
    let err = client.version().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
    assert!(err.user_message.is_none());
}

#[tokio::test]
async fn test_mattermost_create_and_join() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/users"))
        .and(bearer_token("mm-token"))
        .and(body_partial_json(json!({
            "username": "ada",
            "auth_service": "gitlab",
            "auth_data": "42"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "u1",
            "username": "ada"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v4/teams/T1/members"))
        .and(body_partial_json(json!({"team_id": "T1", "user_id": "u1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v4/channels/c1/members"))
        .and(body_partial_json(json!({"user_id": "u1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = MattermostClient::new(&server.uri(), "mm-token").unwrap();
    let user = client
        .create_user(&NewChatUser {
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            auth_service: Some("gitlab".to_string()),
            auth_data: Some("42".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(user.id, "u1");

    client.add_team_member("T1", &user.id).await.unwrap();
    client.add_channel_member("c1", &user.id).await.unwrap();
}

#[tokio::test]
async fn test_mattermost_deactivate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/username/bob"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u2",
            "username": "bob"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v4/users/u2/active"))
        .and(body_partial_json(json!({"active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = MattermostClient::new(&server.uri(), "mm-token").unwrap();
    let user = client.get_user_by_username("bob").await.unwrap();
    client.update_user_active(&user.id, false).await.unwrap();
}

#[tokio::test]
async fn test_mattermost_error_is_not_sanitized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/username/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "id": "app.user.missing_account.const",
            "message": "Unable to find the user.",
            "status_code": 404
        })))
        .mount(&server)
        .await;

    let client = MattermostClient::new(&server.uri(), "mm-token").unwrap();
    let err = client.get_user_by_username("ghost").await.unwrap_err();
    assert_eq!(err.platform, Platform::Mattermost);
    assert!(err.user_message.is_none());
    assert_eq!(err.sanitize(), err.to_string());
    assert!(err.sanitize().contains("Unable to find the user."));
}

#[tokio::test]
async fn test_mattermost_ping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/system/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .mount(&server)
        .await;

    let client = MattermostClient::new(&server.uri(), "mm-token").unwrap();
    assert_eq!(client.ping().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_mailgun_send_template() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .and(header("authorization", "Basic YXBpOmtleS0xMjM="))
        .and(body_string_contains("template=welcome"))
        .and(body_string_contains("to=ada%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "<20240501.1@mg.example.com>",
            "message": "Queued. Thank you."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MailgunClient::new(&server.uri(), "mg.example.com", "key-123");
    let mut message = WelcomeMessage::new(
        "onboarding@mg.example.com",
        "Welcome to our server",
        "ada@example.com",
        "welcome",
    );
    message.add_template_variable("username", "ada").unwrap();

    let receipt = client.send(&message).await.unwrap();
    assert_eq!(receipt.id, "<20240501.1@mg.example.com>");
    assert_eq!(receipt.message, "Queued. Thank you.");
}

#[tokio::test]
async fn test_mailgun_rejects_bad_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let client = MailgunClient::new(&server.uri(), "mg.example.com", "wrong");
    let message = WelcomeMessage::new("a@x", "Welcome to our server", "b@x", "welcome");
    let err = client.send(&message).await.unwrap_err();
    assert_eq!(err.platform, Platform::Mailgun);
    assert_eq!(err.kind, ErrorKind::Api);
    assert!(err.to_string().contains("401"));
}
