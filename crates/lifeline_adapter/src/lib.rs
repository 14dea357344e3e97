#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info, warn};

use lifeline_contracts::wire::{ApiMessage, IngestRequest, LoginOk, LoginRequest, StatusResponse};
use lifeline_contracts::{DeviceId, EpochTimeMs, PersonName, RecordPatch, UserId, Validate};
use lifeline_device::evaluator::{PeriodicEvaluator, TickOutcome};
use lifeline_server::pipeline::{IngestError, IngestPipeline};
use lifeline_server::retention::{run_retention_sweep_pass, SWEEP_INTERVAL_MS_DEFAULT};
use lifeline_server::{derive_user_id, mint_session_token, NotifierRuntime, RetentionSweepMetrics};
use lifeline_storage::{AuthDecision, RecordRepo, SessionStore, ShardedRecordStore};

pub const LOGIN_WINDOW_MS_DEFAULT: u64 = 15 * 60_000;
pub const LOGIN_MAX_ATTEMPTS_DEFAULT: u32 = 5;

pub fn epoch_now() -> EpochTimeMs {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    EpochTimeMs(ms)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind: String,
    pub session_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub login_window_ms: u64,
    pub login_max_attempts: u32,
}

impl AdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            session_ttl_ms: lifeline_storage::session::SESSION_TTL_MS_DEFAULT,
            sweep_interval_ms: SWEEP_INTERVAL_MS_DEFAULT,
            login_window_ms: LOGIN_WINDOW_MS_DEFAULT,
            login_max_attempts: LOGIN_MAX_ATTEMPTS_DEFAULT,
        }
    }

    pub fn from_env() -> Self {
        let bind = env::var("LIFELINE_HTTP_BIND")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let session_ttl_ms = env::var("LIFELINE_SESSION_TTL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (60_000..=7 * 24 * 3_600_000).contains(v))
            .unwrap_or(lifeline_storage::session::SESSION_TTL_MS_DEFAULT);
        let sweep_interval_ms = env::var("LIFELINE_SWEEP_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (60_000..=7 * 24 * 3_600_000).contains(v))
            .unwrap_or(SWEEP_INTERVAL_MS_DEFAULT);
        Self {
            bind,
            session_ttl_ms,
            sweep_interval_ms,
            login_window_ms: LOGIN_WINDOW_MS_DEFAULT,
            login_max_attempts: LOGIN_MAX_ATTEMPTS_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    RateLimited,
    Validation(String),
    MissingToken,
    InvalidToken,
    UnknownUser,
    Internal(String),
}

impl ApiFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::FORBIDDEN,
            Self::UnknownUser => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal detail stays in the server logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::RateLimited => "too many attempts, try again later".to_string(),
            Self::Validation(reason) => format!("invalid payload: {reason}"),
            Self::MissingToken => "access token required".to_string(),
            Self::InvalidToken => "invalid or expired token".to_string(),
            Self::UnknownUser => "user not found".to_string(),
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LoginWindow {
    window_start: EpochTimeMs,
    attempts: u32,
}

/// HTTP-edge facade over the stores and the ingest pipeline. All interior
/// state carries its own synchronization, so handlers share the runtime via
/// a plain `Arc`.
pub struct AdapterRuntime {
    store: Arc<ShardedRecordStore>,
    sessions: Arc<SessionStore>,
    pipeline: IngestPipeline<ShardedRecordStore>,
    login_limiter: Mutex<HashMap<IpAddr, LoginWindow>>,
    config: AdapterConfig,
}

impl AdapterRuntime {
    pub fn new(config: AdapterConfig, notifier: NotifierRuntime) -> Self {
        let store = Arc::new(ShardedRecordStore::new_in_memory());
        let sessions = Arc::new(SessionStore::new_in_memory());
        let pipeline = IngestPipeline::new(Arc::clone(&store), notifier);
        Self {
            store,
            sessions,
            pipeline,
            login_limiter: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn default_from_env() -> Self {
        Self::new(AdapterConfig::from_env(), NotifierRuntime::from_env_or_loopback())
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn handle_login(
        &self,
        source: IpAddr,
        request: LoginRequest,
        now: EpochTimeMs,
    ) -> Result<LoginOk, ApiFailure> {
        self.check_login_rate(source, now)?;
        request
            .validate()
            .map_err(|v| ApiFailure::Validation(v.to_string()))?;
        let device_id = DeviceId::new(request.device_id.as_str())
            .map_err(|v| ApiFailure::Validation(v.to_string()))?;

        let user_id = derive_user_id(&device_id);
        let user_name = PersonName::new(request.user_name.as_str())
            .map_err(|v| ApiFailure::Validation(v.to_string()))?;
        let patch = RecordPatch {
            user_name: Some(user_name),
            ..RecordPatch::default()
        };
        self.store
            .upsert(&user_id, &patch, now)
            .map_err(|err| self.internal(err.to_string()))?;

        let token = mint_session_token();
        self.sessions
            .issue(&user_id, token.clone(), now, self.config.session_ttl_ms)
            .map_err(|err| self.internal(err.to_string()))?;

        info!(user_id = %user_id.as_str(), "login accepted");
        Ok(LoginOk {
            success: true,
            token,
            message: "authentication succeeded".to_string(),
        })
    }

    pub fn handle_ingest(
        &self,
        bearer: Option<&str>,
        request: IngestRequest,
        now: EpochTimeMs,
    ) -> Result<ApiMessage, ApiFailure> {
        let user_id = self.authenticate(bearer, now)?;
        let patch = request
            .into_patch()
            .map_err(|v| ApiFailure::Validation(v.to_string()))?;
        match self.pipeline.submit(&user_id, &patch, now) {
            Ok(_) => Ok(ApiMessage::ok("data received")),
            Err(IngestError::UnknownUser) => Err(ApiFailure::UnknownUser),
            Err(IngestError::Storage(err)) => Err(self.internal(err.to_string())),
        }
    }

    pub fn handle_logout(
        &self,
        bearer: Option<&str>,
        now: EpochTimeMs,
    ) -> Result<ApiMessage, ApiFailure> {
        let user_id = self.authenticate(bearer, now)?;
        self.sessions
            .revoke_user(&user_id)
            .map_err(|err| self.internal(err.to_string()))?;
        Ok(ApiMessage::ok("logout complete"))
    }

    pub fn status_report(&self, now: EpochTimeMs) -> Result<StatusResponse, ApiFailure> {
        let users = self
            .store
            .user_count()
            .map_err(|err| self.internal(err.to_string()))?;
        Ok(StatusResponse {
            status: "online".to_string(),
            users: users as u64,
            timestamp: now.0,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub fn run_sweep_pass(&self, now: EpochTimeMs) -> Result<RetentionSweepMetrics, String> {
        run_retention_sweep_pass(self.store.as_ref(), self.sessions.as_ref(), now)
            .map_err(|err| err.to_string())
    }

    fn authenticate(&self, bearer: Option<&str>, now: EpochTimeMs) -> Result<UserId, ApiFailure> {
        let Some(token) = bearer else {
            return Err(ApiFailure::MissingToken);
        };
        match self.sessions.authenticate(token, now) {
            Ok(AuthDecision::Accepted(user_id)) => Ok(user_id),
            Ok(AuthDecision::Expired) | Ok(AuthDecision::Unknown) => {
                Err(ApiFailure::InvalidToken)
            }
            Err(err) => Err(self.internal(err.to_string())),
        }
    }

    fn check_login_rate(&self, source: IpAddr, now: EpochTimeMs) -> Result<(), ApiFailure> {
        let mut limiter = self
            .login_limiter
            .lock()
            .map_err(|_| self.internal("login limiter lock poisoned".to_string()))?;
        let window = limiter.entry(source).or_insert(LoginWindow {
            window_start: now,
            attempts: 0,
        });
        if now.age_since(window.window_start) >= self.config.login_window_ms {
            window.window_start = now;
            window.attempts = 0;
        }
        if window.attempts >= self.config.login_max_attempts {
            warn!(%source, "login rate limit hit");
            return Err(ApiFailure::RateLimited);
        }
        window.attempts += 1;
        Ok(())
    }

    fn internal(&self, detail: String) -> ApiFailure {
        error!(%detail, "internal failure");
        ApiFailure::Internal(detail)
    }
}

type Rejection = (StatusCode, Json<ApiMessage>);

fn reject(failure: ApiFailure) -> Rejection {
    (failure.status(), Json(ApiMessage::failure(failure.public_message())))
}

fn bearer_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn router(runtime: Arc<AdapterRuntime>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/receber-dados", post(receive_data))
        .route("/api/auth/logout", post(logout))
        .route("/api/status", get(status))
        .fallback(not_found)
        .with_state(runtime)
}

async fn login(
    State(runtime): State<Arc<AdapterRuntime>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginOk>, Rejection> {
    runtime
        .handle_login(addr.ip(), request, epoch_now())
        .map(Json)
        .map_err(reject)
}

async fn receive_data(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> Result<Json<ApiMessage>, Rejection> {
    runtime
        .handle_ingest(bearer_from(&headers), request, epoch_now())
        .map(Json)
        .map_err(reject)
}

async fn logout(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
) -> Result<Json<ApiMessage>, Rejection> {
    runtime
        .handle_logout(bearer_from(&headers), epoch_now())
        .map(Json)
        .map_err(reject)
}

async fn status(
    State(runtime): State<Arc<AdapterRuntime>>,
) -> Result<Json<StatusResponse>, Rejection> {
    runtime.status_report(epoch_now()).map(Json).map_err(reject)
}

async fn not_found() -> Rejection {
    (StatusCode::NOT_FOUND, Json(ApiMessage::failure("route not found")))
}

/// Idempotently re-armable evaluator schedule: arming cancels any prior
/// schedule first, so a service restart never double-arms the tick loop.
#[derive(Default)]
pub struct DeviceTicker {
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl DeviceTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn arm(&mut self, interval_ms: u64, evaluator: Arc<Mutex<PeriodicEvaluator>>) {
        self.disarm();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                ticker.tick().await;
                let outcome = match evaluator.lock() {
                    Ok(mut evaluator) => evaluator.run_tick(epoch_now()),
                    Err(_) => {
                        warn!("evaluator lock poisoned, skipping tick");
                        continue;
                    }
                };
                match outcome {
                    TickOutcome::Suppressed => info!("tick suppressed by quiet hours"),
                    TickOutcome::Skipped => info!("tick skipped, signals not stale enough"),
                    TickOutcome::Transmitted => info!("snapshot transmitted"),
                    TickOutcome::TransmitFailed { reason } => {
                        // no retry before the next tick
                        warn!(%reason, "snapshot transmission failed");
                    }
                }
            }
        });
        self.handle = Some(handle);
    }

    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for DeviceTicker {
    fn drop(&mut self) {
        self.disarm();
    }
}
