#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use clinicdesk::clock::{Clock, MockClock};
use clinicdesk::configuration::{
    ApplicationSettings, BillingSettings, BootstrapAdminSettings, DatabaseSettings, JwtSettings,
    MaintenanceSettings, Settings,
};
use clinicdesk::startup::{run, AppState};
use clinicdesk::storage::MemoryStorage;
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub storage: Arc<MemoryStorage>,
    pub clock: MockClock,
    pub client: reqwest::Client,
}

pub const ADMIN_EMAIL: &str = "owner@clinic.test";
pub const ADMIN_PASSWORD: &str = "OwnerPass123";

pub fn test_settings() -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "127.0.0.1".to_string(),
            database_name: "clinicdesk_test".to_string(),
            max_connections: 1,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        jwt: JwtSettings {
            secret: "integration-test-secret-key-0123456789".to_string(),
            access_token_expiry: 900,
            refresh_token_ttl_days: 7,
            issuer: "clinicdesk-test".to_string(),
        },
        billing: BillingSettings {
            tax_rate_bps: 1_000,
            ..BillingSettings::default()
        },
        maintenance: MaintenanceSettings {
            cleanup_interval_secs: 0,
        },
        bootstrap_admin: Some(BootstrapAdminSettings {
            email: ADMIN_EMAIL.to_string(),
            name: "Clinic Owner".to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
    }
}

pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let storage = Arc::new(MemoryStorage::new());
    let clock = MockClock::default();
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let settings = test_settings();
    let state = AppState::new(storage.clone(), shared_clock, &settings);
    if let Some(admin) = &settings.bootstrap_admin {
        state
            .auth
            .ensure_admin(&admin.email, &admin.name, &admin.password)
            .await
            .expect("Failed to seed admin");
    }

    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        storage,
        clock,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_authorized(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", &self.address, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_authorized(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(&format!("{}{}", &self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Self-register a receptionist and return the token pair body.
    pub async fn register(&self, email: &str) -> Value {
        let response = self
            .post_json(
                "/auth/register",
                &json!({
                    "name": "Test Staff",
                    "email": email,
                    "password": "SecurePass123"
                }),
            )
            .await;
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    /// Log in as the seeded admin and return the token pair body.
    pub async fn login_admin(&self) -> Value {
        let response = self
            .post_json(
                "/auth/login",
                &json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD}),
            )
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    /// Have the admin create a staff member with `role`, then log in as them.
    pub async fn create_staff(&self, email: &str, role: &str) -> Value {
        let admin = self.login_admin().await;
        let response = self
            .post_authorized(
                "/api/staff",
                &token(&admin, "access_token"),
                &json!({
                    "name": "Test Staff",
                    "email": email,
                    "password": "SecurePass123",
                    "role": role
                }),
            )
            .await;
        assert_eq!(201, response.status().as_u16());

        let response = self
            .post_json("/auth/login", &json!({"email": email, "password": "SecurePass123"}))
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }
}

pub fn token(body: &Value, key: &str) -> String {
    body[key].as_str().expect("missing token").to_string()
}
