//! Test utilities shared across unit and integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::{Value, json};
use sqlx::PgPool;

use crate::{
    AppState, BackgroundServices,
    config::{Config, EmailConfig, EmailTransportConfig},
    store::{MemoryRequestStore, RequestStore},
};

pub fn create_test_config() -> Config {
    // Use temp directory for test emails
    let temp_dir = std::env::temp_dir().join(format!("battlectl-test-emails-{}", std::process::id()));
    create_test_config_with_email_dir(&temp_dir)
}

pub fn create_test_config_with_email_dir(email_dir: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        base_url: "http://localhost:8080".to_string(),
        admin_email: "admin@test.com".to_string(),
        admin_api_key: Some("test-admin-key".to_string()),
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: email_dir.to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        twitch: crate::config::TwitchConfig {
            channel_name: "pelletion".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Test app backed by PostgreSQL (for `#[sqlx::test]` tests; migrations are
/// applied by the test harness).
pub async fn create_test_app(pool: PgPool) -> (TestServer, BackgroundServices) {
    let config = create_test_config();

    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

/// Test app over the in-memory store: exercises the full HTTP surface without
/// PostgreSQL. Emails land in `email_dir`.
pub struct MemoryTestApp {
    pub server: TestServer,
    pub email_dir: tempfile::TempDir,
    _bg_services: BackgroundServices,
}

impl MemoryTestApp {
    /// Wait until at least `count` emails have been written, returning their
    /// contents with quoted-printable soft line breaks removed.
    pub async fn wait_for_emails(&self, count: usize) -> Vec<String> {
        for _ in 0..50 {
            let contents: Vec<String> = std::fs::read_dir(self.email_dir.path())
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter_map(|e| std::fs::read_to_string(e.path()).ok())
                        .map(|raw| raw.replace("=\r\n", "").replace("=\n", ""))
                        .collect()
                })
                .unwrap_or_default();
            if contents.len() >= count {
                return contents;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Expected {count} emails to be written");
    }
}

pub async fn create_memory_test_app() -> MemoryTestApp {
    let email_dir = tempfile::tempdir().expect("Failed to create email temp dir");
    let config = create_test_config_with_email_dir(email_dir.path());

    let (outbox, bg_services) = crate::setup_background_services(&config).expect("Failed to start notification dispatcher");

    let state = AppState::builder()
        .store(Arc::new(MemoryRequestStore::new()) as Arc<dyn RequestStore>)
        .config(config)
        .outbox(outbox)
        .build();

    let router = crate::build_router(&state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");

    MemoryTestApp {
        server,
        email_dir,
        _bg_services: bg_services,
    }
}

/// A well-formed submission payload for the given slot.
pub fn submission(date: &str, time: &str) -> Value {
    json!({
        "name": "Ada",
        "email": "ada@example.com",
        "twitchUsername": "ada_plays",
        "game": "Street Fighter 6",
        "requestedDate": date,
        "requestedTime": time,
    })
}
