use sqlx::SqlitePool;
use std::sync::Arc;

use release_flow::adapters::sqlite::{create_migrated_test_pool, SqliteRequestRepository};
use release_flow::domain::models::WorkflowConfig;
use release_flow::services::RequestService;

/// Create an in-memory SQLite database with migrations applied.
///
/// Each call creates a completely isolated database instance.
pub async fn setup_test_db() -> SqlitePool {
    create_migrated_test_pool()
        .await
        .expect("failed to create test database")
}

/// Build a request service over a fresh database.
pub async fn setup_service(config: WorkflowConfig) -> (RequestService<SqliteRequestRepository>, SqlitePool) {
    let pool = setup_test_db().await;
    let repo = Arc::new(SqliteRequestRepository::new(pool.clone()));
    (RequestService::new(repo, config), pool)
}

/// Close the pool at the end of a test.
pub async fn teardown_test_db(pool: SqlitePool) {
    pool.close().await;
}
