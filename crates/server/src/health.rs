use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use connecthub_db::{migrations::MIGRATOR, DbPool};
use serde::Serialize;
use tracing::{error, info};

const READY: &str = "ready";
const DEGRADED: &str = "degraded";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub schema: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Serves `/health` on its own port so health checks bypass the API's auth and tracing.
pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let schema = if database.status == READY {
        schema_check(&state.db_pool).await
    } else {
        HealthCheck { status: DEGRADED, detail: "skipped: database unreachable".to_string() }
    };
    let ready = database.status == READY && schema.status == READY;

    let payload = HealthResponse {
        status: if ready { READY } else { DEGRADED },
        service: HealthCheck {
            status: READY,
            detail: "connecthub-server runtime initialized".to_string(),
        },
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: READY, detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: DEGRADED, detail: format!("database query failed: {error}") }
        }
    }
}

async fn schema_check(pool: &DbPool) -> HealthCheck {
    let expected = MIGRATOR.iter().count() as i64;
    let applied = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await;

    match applied {
        Ok(applied) if applied >= expected => HealthCheck {
            status: READY,
            detail: format!("{applied} of {expected} migrations applied"),
        },
        Ok(applied) => HealthCheck {
            status: DEGRADED,
            detail: format!("{applied} of {expected} migrations applied; run `connecthub migrate`"),
        },
        Err(error) => HealthCheck {
            status: DEGRADED,
            detail: format!("migration history unavailable: {error}"),
        },
    }
}
