use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use unitcache_core::cache::LeaseCache;
use unitcache_core::error::LeaseError;
use unitcache_core::locator::DirectoryLocator;
use unitcache_core::manager::DataUnitManager;
use unitcache_core::sweeper::SweepDaemon;
use unitcache_core::types::{DataUnitRef, LeaseInfo, SweepReport};

use crate::handlers::*;
use crate::storage::{create_backend, Backend};

pub struct AppContext {
    pub manager: DataUnitManager,
    pub api_key: Option<String>,
    /// Bounds how many cold opens may queue on blocking threads at once.
    pub opens: Semaphore,
}

pub type AppState = Arc<AppContext>;

pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub working_dir: PathBuf,
    pub storage: String,
    pub sweep_interval: Duration,
    pub max_concurrent_opens: usize,
    pub api_key: Option<String>,
}

pub fn build_state(
    backend: Backend,
    working_dir: impl Into<PathBuf>,
    api_key: Option<String>,
    max_concurrent_opens: usize,
) -> AppState {
    let cache = Arc::new(LeaseCache::new(backend.pool));
    let manager = DataUnitManager::new(
        cache,
        Arc::new(DirectoryLocator::new(working_dir)),
        backend.factory,
    );
    Arc::new(AppContext {
        manager,
        api_key: api_key.filter(|key| !key.is_empty()),
        opens: Semaphore::new(max_concurrent_opens.max(1)),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health and probe are always open (no auth)
        .route("/health", get(health))
        .route("/probe", get(probe))
        // Protected routes
        .route("/leases", post(acquire_lease))
        .route("/leases", get(list_leases))
        .route("/leases/{id}", delete(release_lease))
        .route("/sweep", post(sweep))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: ServeConfig) -> std::io::Result<()> {
    let backend = create_backend(&config.storage, &config.working_dir);
    let state = build_state(
        backend,
        &config.working_dir,
        config.api_key.clone(),
        config.max_concurrent_opens,
    );
    let cache = Arc::clone(state.manager.cache());

    if state.api_key.is_some() {
        tracing::info!("🔐 API key authentication enabled");
    } else {
        tracing::warn!("⚠️  No UNITCACHE_API_KEY set, lease endpoints are open (dev mode)");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("📦 Data unit cache listening on http://{}", addr);

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(
        SweepDaemon::new(Arc::clone(&cache))
            .with_interval(config.sweep_interval)
            .run(shutdown.clone()),
    );

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Sweep daemon ended abnormally");
    }

    match tokio::task::spawn_blocking(move || cache.shutdown()).await {
        Ok(report) => tracing::info!(
            leases_closed = report.leases_closed,
            failed_releases = report.failed_releases,
            executions_released = report.executions_released.len(),
            "Data unit cache closed"
        ),
        Err(e) => tracing::error!(error = %e, "Closing the data unit cache failed"),
    }

    served
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Can't listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // If no API key is configured, allow all requests (dev mode)
    let Some(expected_key) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    if matches!(request.uri().path(), "/health" | "/probe") {
        return Ok(next.run(request).await);
    }

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth_header.strip_prefix("Bearer ").unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("🚫 Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

// The cache lock may be held across a cold open, never wait for it on an async worker.
async fn blocking<T, F>(f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "Blocking task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let cache = Arc::clone(state.manager.cache());
    match blocking(move || cache.len()).await {
        Ok(active_leases) => (
            StatusCode::OK,
            Json(ApiResponse::ok(HealthResponse {
                status: "ok".to_string(),
                active_leases,
                version: env!("CARGO_PKG_VERSION").to_string(),
            })),
        ),
        Err(status) => (status, Json(ApiResponse::err("health check failed"))),
    }
}

/// Round trip through the repository storage. Plain text for load balancers.
async fn probe(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let cache = Arc::clone(state.manager.cache());
    match blocking(move || cache.pool().probe()).await {
        Ok(Ok(())) => (StatusCode::OK, "OK"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "")
        }
        Err(status) => (status, ""),
    }
}

async fn acquire_lease(
    State(state): State<AppState>,
    Json(req): Json<AcquireLeaseRequest>,
) -> (StatusCode, Json<ApiResponse<LeaseResponse>>) {
    if let Err(e) = req.validate() {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::err(e)));
    }
    let execution = match req.execution_info() {
        Ok(execution) => execution,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::err(e))),
    };

    let Ok(_permit) = state.opens.acquire().await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::err("server is shutting down")),
        );
    };

    let ctx = Arc::clone(&state);
    let (dpu_instance_id, index, time_to_close) =
        (req.dpu_instance_id, req.data_unit_index, req.time_to_close());
    let result = blocking(move || -> Result<Option<Granted>, LeaseError> {
        let key = ctx.manager.resource_key(&DataUnitRef::new(
            execution.execution_id,
            dpu_instance_id,
            index,
        ))?;
        let previous = ctx.manager.cache().lease(&key).map(|lease| lease.id);
        let unit = ctx
            .manager
            .data_unit(&execution, dpu_instance_id, index, time_to_close)?;
        Ok(unit.map(|unit| Granted {
            uri: unit.uri().to_string(),
            lease: ctx.manager.cache().lease(&key),
            previous,
        }))
    })
    .await;

    match result {
        Ok(Ok(Some(Granted {
            uri,
            lease: Some(lease),
            previous,
        }))) => {
            let renewed = previous.as_deref() == Some(lease.id.as_str());
            tracing::info!(
                lease_id = %lease.id,
                execution_id = lease.execution_id,
                data_unit = %lease.data_unit,
                renewed,
                "Lease granted"
            );
            (
                if renewed { StatusCode::OK } else { StatusCode::CREATED },
                Json(ApiResponse::ok(LeaseResponse {
                    lease_id: lease.id,
                    resource_key: lease.resource_key,
                    execution_id: lease.execution_id,
                    data_unit: lease.data_unit,
                    uri,
                    expires_at: lease.expires_at,
                })),
            )
        }
        // Released between the open and the lookup
        Ok(Ok(Some(Granted { lease: None, .. }))) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::err("lease was closed before it could be reported")),
        ),
        Ok(Ok(None)) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!(
                "execution {} has no data unit {} for DPU {}",
                req.execution_id, req.data_unit_index, req.dpu_instance_id
            ))),
        ),
        Ok(Err(e @ LeaseError::InvalidArgument(_))) => {
            (StatusCode::BAD_REQUEST, Json(ApiResponse::err(e.to_string())))
        }
        Ok(Err(e @ LeaseError::ResourceOpen { .. })) => {
            tracing::error!(error = %e, "Can't open data unit");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
        }
        Err(status) => (status, Json(ApiResponse::err("lease request failed"))),
    }
}

struct Granted {
    uri: String,
    lease: Option<LeaseInfo>,
    /// Id of the lease cached for the key before this request, if any.
    previous: Option<String>,
}

async fn list_leases(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<Vec<LeaseInfo>>>) {
    let cache = Arc::clone(state.manager.cache());
    match blocking(move || cache.active_leases()).await {
        Ok(leases) => (StatusCode::OK, Json(ApiResponse::ok(leases))),
        Err(status) => (status, Json(ApiResponse::err("can't list leases"))),
    }
}

async fn release_lease(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    let cache = Arc::clone(state.manager.cache());
    let lease_id = id.clone();
    let released = blocking(move || cache.release_lease(&lease_id)).await;

    match released {
        Ok(true) => (
            StatusCode::OK,
            Json(ApiResponse::ok(format!("Lease '{}' released", id))),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("Lease '{}' not found", id))),
        ),
        Err(status) => (status, Json(ApiResponse::err("release failed"))),
    }
}

async fn sweep(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<SweepReport>>) {
    let cache = Arc::clone(state.manager.cache());
    match blocking(move || cache.sweep()).await {
        Ok(report) => {
            tracing::info!(evicted = report.evicted, "Manual sweep finished");
            (StatusCode::OK, Json(ApiResponse::ok(report)))
        }
        Err(status) => (status, Json(ApiResponse::err("sweep failed"))),
    }
}
