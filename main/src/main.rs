use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::utils::config::get_config;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let http_port = config.http_port;

    let api_state = ApiState::new(config).await?;

    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{http_port}");
    let serve_address = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str) -> AppConfig {
        serde_json::from_value(serde_json::json!({
            "openai_api_key": "test-key",
            "openai_base_url": "https://example.com",
            "surrealdb_address": "mem://",
            "surrealdb_username": "root",
            "surrealdb_password": "root",
            "surrealdb_namespace": namespace,
            "surrealdb_database": database,
            "http_port": 0,
        }))
        .expect("config")
    }

    async fn build_test_app() -> Router {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);

        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.apply_migrations()
            .await
            .expect("failed to apply migrations");

        let llm = Arc::new(common::utils::llm::LlmClient::new(&config));

        let api_state = ApiState {
            db,
            llm,
            config: Arc::new(config),
            thread_locks: api_router::api_state::ThreadLocks::default(),
        };

        Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .with_state(api_state)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_health_check() {
        let app = build_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
