//! Purpose: Provide the HTTP/JSON server for the student registry.
//! Exports: `ServeConfig`, `serve`, `validate_config`.
//! Role: Axum-based loopback server exposing register and lookup routes.
//! Invariants: Each error kind maps to one HTTP status; error bodies use one envelope.
//! Invariants: ID allocation and insert happen under a single registry lock.
//! Invariants: Loopback-only unless explicitly allowed.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use student_registry::api::{
    Error, ErrorKind, RegisterRequest, Registry, StudentId, student_not_found,
};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

struct AppState {
    registry: Mutex<Registry>,
}

impl AppState {
    fn new(registry: Registry) -> Self {
        Self {
            registry: Mutex::new(registry),
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, Registry>, Error> {
        self.registry
            .lock()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("registry lock poisoned"))
    }
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let state = Arc::new(AppState::new(Registry::new()));
    let app = router(state, max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, "student registry listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/students/register", post(register_student))
        .route("/students/:student_id", get(get_student))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    include_grades: Option<String>,
    semester: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_id: Option<u64>,
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn register_student(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(json_rejection_error(rejection)),
    };
    let result = state.registry().and_then(|mut registry| {
        let registration = registry.register(request)?;
        tracing::info!(
            student_id = registration.student_id,
            students = registry.store().len(),
            "student registered"
        );
        Ok(registration)
    });
    match result {
        Ok(registration) => Json(registration).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_student(
    State(state): State<Arc<AppState>>,
    AxumPath(raw_id): AxumPath<String>,
    query: Result<Query<LookupQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return error_response(
                Error::new(ErrorKind::Validation).with_message(rejection.body_text()),
            );
        }
    };
    let student_id = match parse_student_id(&raw_id) {
        Ok(Some(student_id)) => student_id,
        // Negative or oversized IDs are never allocated.
        Ok(None) => return error_response(student_not_found()),
        Err(err) => return error_response(err),
    };
    let include_grades = match query.include_grades.as_deref() {
        Some(raw) => match parse_flag(raw) {
            Some(flag) => flag,
            None => {
                return error_response(
                    Error::new(ErrorKind::Validation)
                        .with_message("include_grades must be a boolean")
                        .with_field("include_grades")
                        .with_hint("Use include_grades=true or include_grades=false."),
                );
            }
        },
        None => {
            return error_response(
                Error::new(ErrorKind::Validation)
                    .with_message("include_grades is required")
                    .with_field("include_grades"),
            );
        }
    };

    let result = state.registry().and_then(|registry| {
        registry.lookup(student_id, include_grades, query.semester.as_deref())
    });
    match result {
        Ok(info) => {
            tracing::debug!(student_id, include_grades, "student lookup");
            Json(info).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Parses a path segment as a student ID.
///
/// Anything shaped like an integer (optional sign, then digits) is accepted;
/// `Ok(None)` means it is negative or beyond `StudentId` range.
fn parse_student_id(raw: &str) -> Result<Option<StudentId>, Error> {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("student_id must be an integer")
            .with_field("student_id"));
    }
    if raw.starts_with('-') {
        return Ok(None);
    }
    Ok(digits.parse::<StudentId>().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Some(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Some(false),
        _ => None,
    }
}

fn json_rejection_error(rejection: JsonRejection) -> Error {
    let hint = match &rejection {
        JsonRejection::MissingJsonContentType(_) => {
            Some("Send the body with Content-Type: application/json.")
        }
        JsonRejection::JsonDataError(_) => {
            Some("Provide name, email, age (integer), and courses (list of strings).")
        }
        _ => None,
    };
    let mut err = Error::new(ErrorKind::Validation).with_message(rejection.body_text());
    if let Some(hint) = hint {
        err = err.with_hint(hint);
    }
    err
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest | ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            field: err.field().map(str::to_string),
            student_id: err.student_id(),
        },
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{
        AppState, ErrorKind, LookupQuery, ServeConfig, get_student, parse_flag, parse_student_id,
        register_student, serve, status_for, validate_config,
    };
    use axum::Json;
    use axum::body::to_bytes;
    use axum::extract::{Path as AxumPath, Query, State};
    use axum::http::StatusCode;
    use axum::response::Response;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use student_registry::api::{RegisterRequest, Registry};

    fn config(bind: &str, allow_non_loopback: bool, max_body_bytes: u64) -> ServeConfig {
        ServeConfig {
            bind: bind.parse().expect("bind"),
            allow_non_loopback,
            max_body_bytes,
        }
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(Registry::new()))
    }

    fn ada() -> RegisterRequest {
        RegisterRequest {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.edu".to_string(),
            age: 36,
            courses: vec!["Analysis".to_string(), "Mechanics".to_string()],
        }
    }

    fn lookup(include_grades: Option<&str>, semester: Option<&str>) -> LookupQuery {
        LookupQuery {
            include_grades: include_grades.map(str::to_string),
            semester: semester.map(str::to_string),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn serve_rejects_non_loopback_bind() {
        let err = serve(config("0.0.0.0:0", false, 1024))
            .await
            .expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn non_loopback_requires_allow_flag() {
        let err = validate_config(&config("0.0.0.0:0", false, 1024)).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
        validate_config(&config("0.0.0.0:0", true, 1024)).expect("config ok");
        validate_config(&config("[::1]:0", false, 1024)).expect("ipv6 loopback ok");
    }

    #[test]
    fn body_limit_must_be_positive() {
        let err = validate_config(&config("127.0.0.1:0", false, 0)).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn flags_accept_lenient_spellings() {
        for raw in ["true", "True", "1", "yes", "ON", "t", "y"] {
            assert_eq!(parse_flag(raw), Some(true), "{raw}");
        }
        for raw in ["false", "FALSE", "0", "no", "off", "f", "n"] {
            assert_eq!(parse_flag(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn student_id_parsing() {
        assert_eq!(parse_student_id("1001").expect("id"), Some(1001));
        assert_eq!(parse_student_id("+1001").expect("plus sign"), Some(1001));
        assert_eq!(
            parse_student_id("18446744073709551615").expect("u64 max"),
            Some(u64::MAX)
        );
        assert_eq!(parse_student_id("-3").expect("negative"), None);
        assert_eq!(parse_student_id("-0").expect("negative zero"), None);
        assert_eq!(
            parse_student_id("99999999999999999999999").expect("oversized"),
            None
        );
        for raw in ["abc", "", "-", "+", "12a", "1.5", " 7", "--3"] {
            let err = parse_student_id(raw).expect_err(raw);
            assert_eq!(err.kind(), ErrorKind::Validation, "{raw:?}");
            assert_eq!(err.field(), Some("student_id"));
        }
    }

    #[test]
    fn error_kinds_have_distinct_statuses() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::BadRequest), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn register_then_get_round_trip() {
        let state = state();
        let response = register_student(State(state.clone()), Ok(Json(ada()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["student_id"], 1001);
        assert_eq!(body["message"], "Student registered successfully.");

        let response = get_student(
            State(state),
            AxumPath("1001".to_string()),
            Ok(Query(lookup(Some("false"), None))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({
                "student_id": 1001,
                "name": "Ada Lovelace",
                "email": "ada@example.edu",
                "semester": null,
            })
        );
    }

    #[tokio::test]
    async fn get_includes_grades_when_requested() {
        let state = state();
        register_student(State(state.clone()), Ok(Json(ada()))).await;
        let response = get_student(
            State(state),
            AxumPath("1001".to_string()),
            Ok(Query(lookup(Some("true"), Some("spring2025")))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["grades"], json!({}));
        assert_eq!(body["semester"], "spring2025");
    }

    #[tokio::test]
    async fn unknown_student_is_404_envelope() {
        let response = get_student(
            State(state()),
            AxumPath("1001".to_string()),
            Ok(Query(lookup(Some("true"), None))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "NotFound");
        assert_eq!(body["error"]["student_id"], 1001);
        assert!(body.get("name").is_none());
    }

    #[tokio::test]
    async fn out_of_range_integer_ids_are_404() {
        let cases = [
            ("9223372036854775808", Some(9_223_372_036_854_775_808_u64)),
            ("18446744073709551615", Some(u64::MAX)),
            ("18446744073709551616", None),
            ("-99999999999999999999", None),
            ("-1", None),
        ];
        for (raw, student_id) in cases {
            let response = get_student(
                State(state()),
                AxumPath(raw.to_string()),
                Ok(Query(lookup(Some("true"), None))),
            )
            .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{raw}");
            let body = body_json(response).await;
            assert_eq!(body["error"]["kind"], "NotFound", "{raw}");
            assert_eq!(body["error"]["message"], "student not found", "{raw}");
            assert_eq!(body["error"]["field"], "student_id", "{raw}");
            match student_id {
                Some(id) => assert_eq!(body["error"]["student_id"], id, "{raw}"),
                None => assert!(body["error"].get("student_id").is_none(), "{raw}"),
            }
        }
    }

    #[tokio::test]
    async fn bad_semester_is_400() {
        let state = state();
        register_student(State(state.clone()), Ok(Json(ada()))).await;
        let response = get_student(
            State(state),
            AxumPath("1001".to_string()),
            Ok(Query(lookup(Some("true"), Some("Spring2024")))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "BadRequest");
        assert_eq!(body["error"]["field"], "semester");
    }

    #[tokio::test]
    async fn missing_include_grades_is_422() {
        let state = state();
        register_student(State(state.clone()), Ok(Json(ada()))).await;
        let response = get_student(
            State(state),
            AxumPath("1001".to_string()),
            Ok(Query(lookup(None, None))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["field"], "include_grades");
    }

    #[tokio::test]
    async fn invalid_registration_is_422_and_store_untouched() {
        let state = state();
        let mut request = ada();
        request.courses = vec!["Analysis".to_string(); 2];
        let response = register_student(State(state.clone()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "Validation");
        assert_eq!(body["error"]["field"], "courses");
        assert_eq!(body["error"]["message"], "duplicate courses are not allowed");

        let response = register_student(State(state), Ok(Json(ada()))).await;
        let body = body_json(response).await;
        assert_eq!(body["student_id"], 1001);
    }
}
