//! shared fixtures for http api tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use keygate::{AppState, create_app, ensure_jump_host};
use keygate_access::AccessOrchestrator;
use keygate_db::KeygateDb;
use keygate_shell::test_utils::MemoryShell;
use keygate_types::{Config, JumpHostConfig, ServerId};

/// session timeout for the in-memory shell.
pub const SESSION_TIMEOUT: Duration = Duration::from_millis(500);

/// address of the jump host used by [`test_app_with_jump_host`].
pub const JUMP_ADDRESS: &str = "bastion.example.com:22";

pub struct TestApp {
    pub app: Router,
    pub db: KeygateDb,
    pub shell: MemoryShell,
    pub jump_host: Option<ServerId>,
}

impl TestApp {
    /// send a request and return the status with the decoded json body
    /// (`Value::Null` for empty bodies).
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self.app.clone().oneshot(request).await.expect("request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body is not json")
        };
        (status, value)
    }

    pub async fn create_user(&self, name: &str) -> u64 {
        let (status, body) = self
            .send(
                "POST",
                "/api/users",
                Some(serde_json::json!({ "name": name, "public_key": key_for(name) })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user failed: {body}");
        body["user"]["id"].as_u64().expect("user id")
    }

    pub async fn create_server(&self, host: &str) -> u64 {
        let (status, body) = self
            .send(
                "POST",
                "/api/servers",
                Some(serde_json::json!({ "host": host })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create server failed: {body}");
        body["server"]["id"].as_u64().expect("server id")
    }
}

/// a well-formed ed25519 line unique to `name`.
pub fn key_for(name: &str) -> String {
    format!("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5{name} {name}@laptop")
}

pub async fn test_app() -> TestApp {
    build(None).await
}

pub async fn test_app_with_jump_host() -> TestApp {
    build(Some(JumpHostConfig {
        host: "bastion.example.com".to_string(),
        port: 22,
        login: None,
    }))
    .await
}

async fn build(jump: Option<JumpHostConfig>) -> TestApp {
    let db = KeygateDb::new_in_memory()
        .await
        .expect("failed to create in-memory database");
    let shell = MemoryShell::new();

    let jump_host = match &jump {
        Some(jump) => Some(
            ensure_jump_host(&db, jump)
                .await
                .expect("failed to register jump host"),
        ),
        None => None,
    };

    let mut config = Config::default();
    config.gateway.jump_host = jump;

    let access = Arc::new(AccessOrchestrator::new(
        db.clone(),
        shell.clone(),
        SESSION_TIMEOUT,
    ));
    let app = create_app(AppState {
        db: db.clone(),
        access,
        config: Arc::new(config),
        jump_host,
    });

    TestApp {
        app,
        db,
        shell,
        jump_host,
    }
}
