//! Purpose: Provide an HTTP client for the student registry JSON API.
//! Exports: `RemoteClient`.
//! Role: Used by the CLI `register`/`show` commands and by integration tests.
//! Invariants: Error envelopes from the server map back to the same `ErrorKind`.
//! Invariants: Base URLs are http(s) with no path; routes are built from segments.
#![allow(clippy::result_large_err)]

use super::{RegisterRequest, Registration, StudentInfo};
use crate::core::error::{Error, ErrorKind};
use crate::core::store::StudentId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct RemoteClient {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: Option<String>,
    hint: Option<String>,
    field: Option<String>,
    student_id: Option<u64>,
}

#[derive(Deserialize)]
struct Health {
    ok: bool,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self { base_url, agent })
    }

    pub fn healthz(&self) -> ApiResult<bool> {
        let url = build_url(&self.base_url, &["healthz"])?;
        let response = self.agent.get(url.as_str()).call();
        let health: Health = read_response(response)?;
        Ok(health.ok)
    }

    pub fn register(&self, request: &RegisterRequest) -> ApiResult<Registration> {
        let url = build_url(&self.base_url, &["students", "register"])?;
        let payload = serde_json::to_string(request).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        let response = self
            .agent
            .post(url.as_str())
            .set("Accept", "application/json")
            .set("Content-Type", "application/json")
            .send_string(&payload);
        read_response(response)
    }

    pub fn lookup(
        &self,
        student_id: StudentId,
        include_grades: bool,
        semester: Option<&str>,
    ) -> ApiResult<StudentInfo> {
        let id = student_id.to_string();
        let url = build_url(&self.base_url, &["students", &id])?;
        let mut request = self
            .agent
            .get(url.as_str())
            .set("Accept", "application/json")
            .query("include_grades", if include_grades { "true" } else { "false" });
        if let Some(semester) = semester {
            request = request.query("semester", semester);
        }
        read_response(request.call())
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid server base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("server base url must use http or https scheme")
        );
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("server base url must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("server base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_response<R>(response: Result<ureq::Response, ureq::Error>) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    match response {
        Ok(resp) => read_json_response(resp),
        Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
        Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
            .with_message("request failed")
            .with_source(err)),
    }
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return error_from_remote(envelope.error);
    }
    let kind = error_kind_from_status(status);
    Error::new(kind).with_message(format!("server error status {status}"))
}

fn error_from_remote(remote: RemoteError) -> Error {
    let kind = parse_error_kind(&remote.kind);
    let mut err = Error::new(kind);
    if let Some(message) = remote.message {
        err = err.with_message(message);
    }
    if let Some(hint) = remote.hint {
        err = err.with_hint(hint);
    }
    if let Some(field) = remote.field {
        err = err.with_field(field);
    }
    if let Some(student_id) = remote.student_id {
        err = err.with_student_id(student_id);
    }
    err
}

fn parse_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "Internal" => ErrorKind::Internal,
        "Usage" => ErrorKind::Usage,
        "NotFound" => ErrorKind::NotFound,
        "Validation" => ErrorKind::Validation,
        "BadRequest" => ErrorKind::BadRequest,
        "Io" => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::BadRequest,
        404 => ErrorKind::NotFound,
        413 | 415 | 422 => ErrorKind::Validation,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}
