use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use authkit_accounts::NewRole;
use authkit_api::app::{build_app, services::AppServices};
use authkit_api::config::Settings;
use authkit_infra::{EmailSender, InMemoryStore, RecordingEmailSender, Store};

const SECRET: &str = "test-secret";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password-1";

struct TestServer {
    base_url: String,
    api: String,
    client: reqwest::Client,
    services: Arc<AppServices>,
    mail: Arc<RecordingEmailSender>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let settings = Settings {
            secret_key: Some(SECRET.to_string()),
            superuser_email: Some(ADMIN_EMAIL.to_string()),
            superuser_password: Some(ADMIN_PASSWORD.to_string()),
            ..Settings::default()
        };
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mail = Arc::new(RecordingEmailSender::new());
        let sender: Arc<dyn EmailSender> = mail.clone();

        let services = Arc::new(AppServices::new(settings, store, sender));
        services.bootstrap().await.expect("bootstrap failed");

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            api: format!("{}/api/v1", base_url),
            base_url,
            client: reqwest::Client::new(),
            services,
            mail,
            handle,
        }
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}{}", self.api, path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        read(req.send().await.unwrap()).await
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .put(format!("{}{}", self.api, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.api, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .delete(format!("{}{}", self.api, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn register(&self, email: &str, password: &str) -> Value {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({
                    "email": email,
                    "password": password,
                    "confirm_password": password,
                    "first_name": "Test",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn login(&self, email: &str, password: &str) -> Value {
        let (status, body) = self
            .post("/auth/login", None, json!({ "email": email, "password": password }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    async fn access_token(&self, email: &str, password: &str) -> String {
        self.login(email, password).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn admin_token(&self) -> String {
        self.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Token embedded in the latest email link sent to `to`.
    fn mailed_token(&self, to: &str) -> String {
        let message = self.mail.last_to(to).expect("no email recorded");
        let start = message.html.find("token=").expect("no token link") + "token=".len();
        message.html[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read(res: reqwest::Response) -> (StatusCode, Value) {
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    (status, body)
}

fn mint_jwt(secret: &str, sub: &str, kind: &str, ttl: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": sub,
        "type": kind,
        "iat": (now - ChronoDuration::minutes(1)).timestamp(),
        "exp": (now + ttl).timestamp(),
        "jti": "test",
    });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn root_and_health_are_public() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(format!("{}/", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Welcome to AuthKit User Management");
    assert_eq!(body["health_check"], "/health");

    let res = srv.client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "healthy");

    for (path, expected) in [("/health/live", "alive"), ("/health/ready", "ready"), ("/health/db", "healthy")] {
        let res = srv.client.get(format!("{}{}", srv.base_url, path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["status"], expected);
    }
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(format!("{}/auth/me", srv.api))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["www-authenticate"], "Bearer");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "Could not validate credentials");

    let forged = mint_jwt("other-secret", &uuid::Uuid::new_v4().to_string(), "access", ChronoDuration::minutes(5));
    let (status, _) = srv.get("/auth/me", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unknown_user = mint_jwt(SECRET, &uuid::Uuid::new_v4().to_string(), "access", ChronoDuration::minutes(5));
    let (status, _) = srv.get("/users/profile", &unknown_user).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_login_and_me_reflect_default_role() {
    let srv = TestServer::spawn().await;

    let user = srv.register(" Jane@Example.com", "password123").await;
    assert_eq!(user["email"], "jane@example.com");
    assert_eq!(user["is_verified"], false);
    assert_eq!(user["full_name"], "Test");
    assert!(user.get("hashed_password").is_none());

    let tokens = srv.login("jane@example.com", "password123").await;
    assert_eq!(tokens["token_type"], "bearer");
    assert_eq!(tokens["expires_in"], 1800);
    let token = tokens["access_token"].as_str().unwrap();

    let (status, me) = srv.get("/auth/me", token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["roles"], json!(["user"]));
    assert_eq!(me["permissions"], json!(["profile.update_own", "profile.view_own"]));
    assert!(me["last_login"].is_string());

    let (status, body) = srv
        .post("/auth/login", None, json!({ "email": "jane@example.com", "password": "wrong-pass" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid email or password");
}

#[tokio::test]
async fn duplicate_and_invalid_registrations_are_rejected() {
    let srv = TestServer::spawn().await;
    srv.register("dup@example.com", "password123").await;

    let (status, body) = srv
        .post(
            "/auth/register",
            None,
            json!({ "email": "DUP@example.com", "password": "password123", "confirm_password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "User with this email already exists");

    let (status, _) = srv
        .post(
            "/auth/register",
            None,
            json!({ "email": "short@example.com", "password": "short", "confirm_password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = srv.post("/auth/register", None, json!({ "email": "x@example.com" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn refresh_only_accepts_refresh_tokens() {
    let srv = TestServer::spawn().await;
    srv.register("r@example.com", "password123").await;
    let tokens = srv.login("r@example.com", "password123").await;
    let access = tokens["access_token"].as_str().unwrap();
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let (status, body) = srv.post("/auth/refresh", None, json!({ "refresh_token": access })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid refresh token");

    let (status, renewed) = srv.post("/auth/refresh", None, json!({ "refresh_token": refresh })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(renewed["access_token"].is_string());
    assert!(renewed["refresh_token"].is_string());

    // A refresh token cannot authenticate requests.
    let (status, _) = srv.get("/auth/me", refresh).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn email_verification_is_idempotent() {
    let srv = TestServer::spawn().await;
    srv.register("v@example.com", "password123").await;
    let token = srv.mailed_token("v@example.com");

    let (status, body) = srv.post("/auth/verify-email", None, json!({ "token": token })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Email verified successfully");
    let welcome = srv.mail.last_to("v@example.com").unwrap();
    assert!(welcome.subject.starts_with("Welcome to"));

    let (status, _) = srv.post("/auth/verify-email", None, json!({ "token": token })).await;
    assert_eq!(status, StatusCode::OK);

    let access = srv.access_token("v@example.com", "password123").await;
    let (_, me) = srv.get("/auth/me", &access).await;
    assert_eq!(me["is_verified"], true);

    let (status, body) = srv.post("/auth/verify-email", None, json!({ "token": "garbage" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid or expired verification token");
}

#[tokio::test]
async fn password_reset_token_works_once() {
    let srv = TestServer::spawn().await;
    srv.register("p@example.com", "password123").await;

    let (status, _) = srv
        .post("/auth/forgot-password", None, json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = srv
        .post("/auth/forgot-password", None, json!({ "email": "p@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = srv.mailed_token("p@example.com");

    let reset = json!({ "token": token, "new_password": "new-password-9", "confirm_password": "new-password-9" });
    let (status, _) = srv.post("/auth/reset-password", None, reset.clone()).await;
    assert_eq!(status, StatusCode::OK);
    srv.login("p@example.com", "new-password-9").await;

    let (status, body) = srv.post("/auth/reset-password", None, reset).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid or expired reset token");
}

#[tokio::test]
async fn change_password_checks_current_password() {
    let srv = TestServer::spawn().await;
    srv.register("c@example.com", "password123").await;
    let token = srv.access_token("c@example.com", "password123").await;

    let (status, body) = srv
        .post(
            "/auth/change-password",
            Some(token.as_str()),
            json!({ "current_password": "nope-nope", "new_password": "password456", "confirm_password": "password456" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Current password is incorrect");

    let (status, _) = srv
        .post(
            "/auth/change-password",
            Some(token.as_str()),
            json!({ "current_password": "password123", "new_password": "password456", "confirm_password": "password456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        srv.mail.last_to("c@example.com").unwrap().subject,
        "Password Changed Successfully"
    );
    srv.login("c@example.com", "password456").await;
}

#[tokio::test]
async fn profile_updates_enforce_unique_usernames() {
    let srv = TestServer::spawn().await;
    srv.register("a@example.com", "password123").await;
    srv.register("b@example.com", "password123").await;
    let a = srv.access_token("a@example.com", "password123").await;
    let b = srv.access_token("b@example.com", "password123").await;

    let (status, profile) = srv.put("/users/profile", &a, json!({ "username": "alice", "bio": "hi" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["display_name"], "alice");
    assert_eq!(profile["bio"], "hi");

    let (status, body) = srv.put("/users/profile", &b, json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "User with this username already exists");

    let (status, _) = srv.delete("/users/profile", &b).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv.get("/users/profile", &b).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn regular_users_cannot_administer() {
    let srv = TestServer::spawn().await;
    srv.register("u@example.com", "password123").await;
    let token = srv.access_token("u@example.com", "password123").await;

    for path in ["/users", "/users/stats/overview", "/roles", "/roles/permissions"] {
        let (status, body) = srv.get(path, &token).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
        assert_eq!(body["detail"], "Insufficient permissions");
    }

    let target = uuid::Uuid::new_v4();
    let (status, body) = srv.get(&format!("/rbac/users/{target}/manageable"), &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Missing required permissions: user.update");
}

#[tokio::test]
async fn admin_routes_refuse_regular_users_before_reading_input() {
    let srv = TestServer::spawn().await;
    srv.register("u@example.com", "password123").await;
    let token = srv.access_token("u@example.com", "password123").await;

    for path in ["/roles", "/roles/bulk-assign", "/roles/permissions"] {
        let (status, body) = srv.post(path, Some(token.as_str()), json!({ "unexpected": true })).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
        assert_eq!(body["detail"], "Insufficient permissions");
    }

    let (status, body) = srv.put("/users/not-a-uuid", &token, json!({ "is_active": "nope" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Insufficient permissions");

    let (status, _) = srv.get("/roles/not-a-uuid", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.get("/users?limit=0", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.get("/rbac/users/not-a-uuid/manageable", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Missing required permissions: user.update");

    // Own profile stays reachable without admin rights.
    let (status, _) = srv.get("/users/profile", &token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bulk_assign_reports_each_unknown_user() {
    let srv = TestServer::spawn().await;
    let user = srv.register("b@example.com", "password123").await;
    let user_id = user["id"].as_str().unwrap();
    let admin = srv.admin_token().await;

    let (status, role) = srv
        .post("/roles", Some(admin.as_str()), json!({ "name": "auditor", "priority": 15 }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{role}");
    let role_id = role["id"].as_str().unwrap();

    let first = uuid::Uuid::new_v4().to_string();
    let second = uuid::Uuid::new_v4().to_string();
    let (status, bulk) = srv
        .post(
            "/roles/bulk-assign",
            Some(admin.as_str()),
            json!({ "user_ids": [first, user_id, second], "role_ids": [role_id], "operation": "add" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bulk["success"], json!([user_id]));
    let failed = bulk["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["user_id"], first);
    assert_eq!(failed[1]["user_id"], second);
    assert!(failed.iter().all(|f| f["error"] == "User not found"));

    let (_, fetched) = srv.get(&format!("/roles/{role_id}"), &admin).await;
    assert_eq!(fetched["user_count"], 1);

    let token = srv.access_token("b@example.com", "password123").await;
    let (_, me) = srv.get("/rbac/me/permissions", &token).await;
    assert!(me["roles"].as_array().unwrap().contains(&json!("auditor")));
}

#[tokio::test]
async fn superuser_administers_users() {
    let srv = TestServer::spawn().await;
    let user = srv.register("m@example.com", "password123").await;
    let id = user["id"].as_str().unwrap();
    let admin = srv.admin_token().await;

    let (status, list) = srv.get("/users?search=m@ex&limit=10", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["per_page"], 10);
    assert_eq!(list["users"][0]["id"], id);

    let (status, _) = srv.get("/users?limit=0", &admin).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, updated) = srv.put(&format!("/users/{id}"), &admin, json!({ "is_active": false })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_active"], false);

    let (status, body) = srv
        .post("/auth/login", None, json!({ "email": "m@example.com", "password": "password123" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Account is deactivated");

    let (status, stats) = srv.get("/users/stats/overview", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["superusers"], 1);

    let (_, me) = srv.get("/auth/me", &admin).await;
    let admin_id = me["id"].as_str().unwrap().to_string();
    let (status, body) = srv.delete(&format!("/users/{admin_id}"), &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Cannot delete your own account");

    let (status, _) = srv.delete(&format!("/users/{id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = srv.get(&format!("/users/{id}"), &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "User not found");

    let (status, _) = srv.get("/users/not-a-uuid", &admin).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn superuser_manages_roles_and_assignments() {
    let srv = TestServer::spawn().await;
    let user = srv.register("r@example.com", "password123").await;
    let user_id = user["id"].as_str().unwrap();
    let admin = srv.admin_token().await;

    let (status, permission) = srv
        .post(
            "/roles/permissions",
            Some(admin.as_str()),
            json!({ "name": "Export reports", "codename": "report.export", "resource": "report", "action": "export" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{permission}");
    let permission_id = permission["id"].as_str().unwrap();

    let (status, body) = srv
        .post(
            "/roles/permissions",
            Some(admin.as_str()),
            json!({ "name": "Again", "codename": "report.export", "resource": "report", "action": "export" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Permission with this codename already exists");

    let unknown = uuid::Uuid::new_v4().to_string();
    let (status, role) = srv
        .post(
            "/roles",
            Some(admin.as_str()),
            json!({ "name": "reporter", "priority": 20, "permission_ids": [permission_id, unknown] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{role}");
    assert_eq!(role["permissions"].as_array().unwrap().len(), 1);
    assert_eq!(role["user_count"], 0);
    let role_id = role["id"].as_str().unwrap();

    let (status, _) = srv.post("/roles", Some(admin.as_str()), json!({ "name": "reporter" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = srv
        .post("/roles/assign", Some(admin.as_str()), json!({ "user_id": user_id, "role_ids": [role_id] }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let token = srv.access_token("r@example.com", "password123").await;
    let (_, me) = srv.get("/rbac/me/permissions", &token).await;
    assert_eq!(me["roles"], json!(["reporter"]));
    assert_eq!(me["permissions"], json!(["report.export"]));
    assert_eq!(me["highest_priority_role"]["name"], "reporter");

    let (status, check) = srv
        .post(
            "/roles/check-permission",
            Some(admin.as_str()),
            json!({ "user_id": user_id, "permission_codename": "report.export" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["has_permission"], true);
    assert_eq!(check["granted_by_roles"], json!(["reporter"]));

    let (_, fetched) = srv.get(&format!("/roles/{role_id}"), &admin).await;
    assert_eq!(fetched["user_count"], 1);

    let missing = uuid::Uuid::new_v4().to_string();
    let (status, bulk) = srv
        .post(
            "/roles/bulk-assign",
            Some(admin.as_str()),
            json!({ "user_ids": [user_id, missing], "role_ids": [role_id], "operation": "remove" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bulk["success"], json!([user_id]));
    assert_eq!(bulk["failed"][0]["user_id"], missing);
    assert_eq!(bulk["failed"][0]["error"], "User not found");

    let (status, _) = srv.delete(&format!("/roles/permissions/{permission_id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (_, fetched) = srv.get(&format!("/roles/{role_id}"), &admin).await;
    assert_eq!(fetched["permissions"], json!([]));

    let (status, stats) = srv.get("/roles/stats/overview", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_roles"], 6);
}

#[tokio::test]
async fn system_roles_are_immutable() {
    let srv = TestServer::spawn().await;
    let mut role = NewRole {
        name: "root".to_string(),
        description: None,
        is_default: false,
        is_active: true,
        priority: 100,
        permission_ids: Vec::new(),
    }
    .into_role(Vec::new(), Utc::now());
    role.is_system = true;
    srv.services.store.insert_role(&role).await.unwrap();
    let admin = srv.admin_token().await;

    let (status, body) = srv.put(&format!("/roles/{}", role.id), &admin, json!({ "priority": 5 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "Cannot modify system roles");

    let (status, body) = srv.delete(&format!("/roles/{}", role.id), &admin).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "Cannot delete system roles");
}

#[tokio::test]
async fn role_hierarchy_decides_manageability() {
    let srv = TestServer::spawn().await;
    let moderator = srv.register("mod@example.com", "password123").await;
    let manager = srv.register("mgr@example.com", "password123").await;
    let admin = srv.admin_token().await;

    let (_, roles) = srv.get("/roles?limit=100", &admin).await;
    let role_id = |name: &str| {
        roles["roles"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["name"] == name)
            .map(|r| r["id"].as_str().unwrap().to_string())
            .unwrap()
    };
    srv.post(
        "/roles/assign",
        Some(admin.as_str()),
        json!({ "user_id": moderator["id"], "role_ids": [role_id("moderator")] }),
    )
    .await;
    srv.post(
        "/roles/assign",
        Some(admin.as_str()),
        json!({ "user_id": manager["id"], "role_ids": [role_id("user_manager")] }),
    )
    .await;

    let mgr = srv.access_token("mgr@example.com", "password123").await;
    let mod_id = moderator["id"].as_str().unwrap();
    let (status, body) = srv.get(&format!("/rbac/users/{mod_id}/manageable"), &mgr).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["can_manage"], true);
    assert_eq!(body["actor_priority"], 80);
    assert_eq!(body["target_priority"], 60);

    let modt = srv.access_token("mod@example.com", "password123").await;
    let mgr_id = manager["id"].as_str().unwrap();
    let (status, body) = srv.get(&format!("/rbac/users/{mgr_id}/manageable"), &modt).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["can_manage"], false);
    assert_eq!(body["reason"], "Insufficient role priority to manage this user");
}
