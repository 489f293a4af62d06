mod acl;
pub mod auth;
mod config;

use crate::engine::EngineError;
use crate::server::auth::AuthCtx;
use crate::storage::StorageError;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{get, post, put},
};
use bcrypt::verify;
pub use config::{AppConfig, ConfigError, FamilyConfig, MemberConfig, UserConfig};
use famscore_shared::api;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Self {
        Self {
            config,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let fam = "/api/v1/families/{family_id}";
    let private = Router::new()
        .route(fam, get(api_get_family))
        .route(&format!("{fam}/settings"), put(api_update_settings))
        .route(
            &format!("{fam}/members"),
            get(api_list_members).post(api_create_member),
        )
        .route(
            &format!("{fam}/members/{{member_id}}"),
            get(api_get_member).put(api_update_member),
        )
        .route(
            &format!("{fam}/members/{{member_id}}/scores"),
            get(api_member_scores),
        )
        .route(
            &format!("{fam}/members/{{member_id}}/streak"),
            get(api_member_streak),
        )
        .route(
            &format!("{fam}/members/{{member_id}}/adjustments"),
            post(api_add_adjustment),
        )
        .route(&format!("{fam}/leaderboard"), get(api_leaderboard))
        .route(&format!("{fam}/scores/recent"), get(api_recent_scores))
        .route(
            &format!("{fam}/scores/{{entry_id}}/reset"),
            post(api_reset_score),
        )
        .route(&format!("{fam}/today"), get(api_today))
        .route(
            &format!("{fam}/tasks"),
            get(api_list_tasks).post(api_create_task),
        )
        .route(
            &format!("{fam}/tasks/{{task_id}}"),
            put(api_update_task).delete(api_delete_task),
        )
        .route(&format!("{fam}/tasks/{{task_id}}/take"), post(api_take_task))
        .route(
            &format!("{fam}/tasks/{{task_id}}/release"),
            post(api_release_task),
        )
        .route(
            &format!("{fam}/tasks/{{task_id}}/complete"),
            post(api_complete_task),
        )
        .route(
            &format!("{fam}/sport-activities"),
            get(api_list_sport_activities).post(api_create_sport_activity),
        )
        .route(
            &format!("{fam}/sport-activities/{{activity_id}}"),
            put(api_update_sport_activity).delete(api_delete_sport_activity),
        )
        .route(
            &format!("{fam}/sport-activities/{{activity_id}}/complete"),
            post(api_complete_sport_activity),
        )
        .route(
            &format!("{fam}/school-tasks"),
            get(api_list_school_tasks).post(api_create_school_task),
        )
        .route(
            &format!("{fam}/school-tasks/{{task_id}}"),
            put(api_update_school_task).delete(api_delete_school_task),
        )
        .route(
            &format!("{fam}/school-tasks/{{task_id}}/complete"),
            post(api_complete_school_task),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            member_id = tracing::field::Empty,
            role = tracing::field::Empty,
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/version", get(api_version))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn api_version() -> Json<api::VersionDto> {
    Json(api::VersionDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("member_id", tracing::field::display(&auth.actor.member_id));
        span.record("role", tracing::field::display(auth.actor.role));
    }
    Ok(next.run(req).await)
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    // The linked member row must exist before a token is worth issuing.
    if state.store.load_actor(&user.member_id).await?.is_none() {
        tracing::error!(username=%body.username, member_id=%user.member_id,  "login: configured member missing from DB");
        return Err(AppError::internal("member not seeded"));
    }
    let token = auth::issue_jwt_for_user(&state, &user.username, &user.member_id).await?;
    Ok(Json(api::AuthResp { token }))
}

// ---- family ----

async fn api_get_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::FamilyDto>, AppError> {
    let family = state
        .store
        .get_family(&auth.actor.family_id)
        .await?
        .ok_or_else(|| AppError::not_found("Family not found"))?;
    Ok(Json(family.to_dto(&state.config.timezone)))
}

async fn api_update_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::UpdateFamilySettingsReq>,
) -> Result<Json<api::FamilyDto>, AppError> {
    let family = state
        .store
        .update_family_settings(&auth.actor, body.show_reset_button)
        .await?;
    Ok(Json(family.to_dto(&state.config.timezone)))
}

// ---- members ----

async fn api_list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::MemberDto>>, AppError> {
    Ok(Json(state.store.list_members(&auth.actor.family_id).await?))
}

async fn api_get_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, member_id)): Path<(String, String)>,
) -> Result<Json<api::MemberDto>, AppError> {
    let member = state
        .store
        .get_member(&auth.actor.family_id, &member_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;
    Ok(Json(member))
}

async fn api_create_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::NewMemberReq>,
) -> Result<Json<api::MemberDto>, AppError> {
    Ok(Json(state.store.create_member(&auth.actor, body).await?))
}

async fn api_update_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, member_id)): Path<(String, String)>,
    Json(body): Json<api::UpdateMemberReq>,
) -> Result<Json<api::MemberDto>, AppError> {
    Ok(Json(
        state
            .store
            .update_member(&auth.actor, &member_id, body)
            .await?,
    ))
}

#[derive(Deserialize)]
struct PageOpts {
    page: Option<u32>,
    per_page: Option<u32>,
}

async fn api_member_scores(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, member_id)): Path<(String, String)>,
    Query(opts): Query<PageOpts>,
) -> Result<Json<api::ScorePageDto>, AppError> {
    let page = state
        .store
        .member_scores_page(
            &auth.actor.family_id,
            &member_id,
            opts.page.unwrap_or(1),
            opts.per_page.unwrap_or(20),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;
    Ok(Json(page))
}

async fn api_member_streak(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, member_id)): Path<(String, String)>,
) -> Result<Json<api::StreakDto>, AppError> {
    let streak = state
        .store
        .get_member_streak(&auth.actor.family_id, &member_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;
    Ok(Json(streak))
}

async fn api_add_adjustment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, member_id)): Path<(String, String)>,
    Json(body): Json<api::AdjustmentReq>,
) -> Result<Json<api::ScoreEntryDto>, AppError> {
    Ok(Json(
        state
            .store
            .add_adjustment(&auth.actor, &member_id, body)
            .await?,
    ))
}

// ---- scores ----

#[derive(Deserialize)]
struct LeaderboardOpts {
    period: Option<api::LeaderboardPeriod>,
}

async fn api_leaderboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(opts): Query<LeaderboardOpts>,
) -> Result<Json<Vec<api::LeaderboardEntryDto>>, AppError> {
    let period = opts.period.unwrap_or(api::LeaderboardPeriod::All);
    Ok(Json(
        state
            .store
            .leaderboard(&auth.actor.family_id, period)
            .await?,
    ))
}

async fn api_recent_scores(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ScoreEntryDto>>, AppError> {
    Ok(Json(
        state.store.recent_activity(&auth.actor.family_id).await?,
    ))
}

async fn api_reset_score(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, entry_id)): Path<(String, String)>,
    Json(body): Json<api::ResetReq>,
) -> Result<StatusCode, AppError> {
    state.store.reset_score(&auth.actor, &entry_id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_today(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::TodayDto>, AppError> {
    Ok(Json(state.store.today_view(&auth.actor.family_id).await?))
}

// ---- house tasks ----

async fn api_list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::TaskDto>>, AppError> {
    Ok(Json(state.store.list_tasks(&auth.actor.family_id).await?))
}

async fn api_create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::NewTaskReq>,
) -> Result<Json<api::TaskDto>, AppError> {
    Ok(Json(state.store.create_task(&auth.actor, body).await?))
}

async fn api_update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
    Json(body): Json<api::UpdateTaskReq>,
) -> Result<Json<api::TaskDto>, AppError> {
    Ok(Json(
        state.store.update_task(&auth.actor, &task_id, body).await?,
    ))
}

async fn api_delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.store.delete_task(&auth.actor, &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_take_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
    Json(body): Json<api::TakeTaskReq>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .take_task(&auth.actor, &task_id, &body.assignee_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_release_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.store.release_task(&auth.actor, &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_complete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
) -> Result<Json<api::CompleteResp>, AppError> {
    let points = state.store.complete_task(&auth.actor, &task_id).await?;
    Ok(Json(api::CompleteResp { points }))
}

// ---- sport activities ----

async fn api_list_sport_activities(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::SportActivityDto>>, AppError> {
    Ok(Json(
        state
            .store
            .list_sport_activities(&auth.actor.family_id)
            .await?,
    ))
}

async fn api_create_sport_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::NewSportActivityReq>,
) -> Result<Json<api::SportActivityDto>, AppError> {
    Ok(Json(
        state.store.create_sport_activity(&auth.actor, body).await?,
    ))
}

async fn api_update_sport_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, activity_id)): Path<(String, String)>,
    Json(body): Json<api::UpdateSportActivityReq>,
) -> Result<Json<api::SportActivityDto>, AppError> {
    Ok(Json(
        state
            .store
            .update_sport_activity(&auth.actor, &activity_id, body)
            .await?,
    ))
}

async fn api_delete_sport_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, activity_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .delete_sport_activity(&auth.actor, &activity_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_complete_sport_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, activity_id)): Path<(String, String)>,
    body: Option<Json<api::CompleteSportReq>>,
) -> Result<Json<api::CompleteResp>, AppError> {
    let override_member = body.and_then(|Json(b)| b.member_id);
    let points = state
        .store
        .complete_sport_activity(&auth.actor, &activity_id, override_member)
        .await?;
    Ok(Json(api::CompleteResp { points }))
}

// ---- school tasks ----

async fn api_list_school_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::SchoolTaskDto>>, AppError> {
    Ok(Json(
        state.store.list_school_tasks(&auth.actor.family_id).await?,
    ))
}

async fn api_create_school_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::NewSchoolTaskReq>,
) -> Result<Json<api::SchoolTaskDto>, AppError> {
    Ok(Json(
        state.store.create_school_task(&auth.actor, body).await?,
    ))
}

async fn api_update_school_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
    Json(body): Json<api::UpdateSchoolTaskReq>,
) -> Result<Json<api::SchoolTaskDto>, AppError> {
    Ok(Json(
        state
            .store
            .update_school_task(&auth.actor, &task_id, body)
            .await?,
    ))
}

async fn api_delete_school_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.store.delete_school_task(&auth.actor, &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_complete_school_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((_family_id, task_id)): Path<(String, String)>,
) -> Result<Json<api::CompleteResp>, AppError> {
    let points = state
        .store
        .complete_school_task(&auth.actor, &task_id)
        .await?;
    Ok(Json(api::CompleteResp { points }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Unauthorized => AppError::Forbidden,
            EngineError::NotFound(m) => AppError::NotFound(m),
            EngineError::Conflict(m) => AppError::Conflict(m),
            EngineError::Validation(m) => AppError::BadRequest(m),
            EngineError::Database(e) => AppError::internal(e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Engine(e) => e.into(),
            other => AppError::internal(other),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}
