use std::net::TcpListener;
use std::sync::Arc;

use clinicdesk::clock::SystemClock;
use clinicdesk::configuration::get_configuration;
use clinicdesk::maintenance::spawn_cleanup_task;
use clinicdesk::startup::{run, AppState};
use clinicdesk::storage::PgStorage;
use clinicdesk::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry("info");

    tracing::info!("Starting application");

    // 설정 로드 및 검증
    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    configuration.validate().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    tracing::info!("Configuration loaded successfully");

    // 데이터베이스 연결 및 마이그레이션
    let storage = PgStorage::connect(&configuration.database).await.map_err(|e| {
        tracing::error!("Failed to create connection pool: {}", e);
        startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
    })?;
    storage.migrate().await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        startup_error(std::io::ErrorKind::Other, "Database migration error")
    })?;
    let storage = Arc::new(storage);
    tracing::info!("Database ready");

    let state = AppState::new(storage.clone(), Arc::new(SystemClock), &configuration);

    // 최초 관리자 계정
    if let Some(admin) = &configuration.bootstrap_admin {
        state
            .auth
            .ensure_admin(&admin.email, &admin.name, &admin.password)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create bootstrap admin: {}", e);
                startup_error(std::io::ErrorKind::Other, "Bootstrap admin error")
            })?;
    }

    // 만료 토큰 정리 작업
    let cleanup_task = spawn_cleanup_task(
        state.auth.clone(),
        configuration.maintenance.cleanup_interval_secs,
    );

    // 서버 주소 설정
    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    // 서버 실행
    let result = run(listener, state)?.await;

    if let Some(task) = cleanup_task {
        task.abort();
    }
    storage.close().await;
    tracing::info!("Server stopped");

    result
}
