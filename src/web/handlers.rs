//! HTTP request handlers.

use crate::error::GraderError;
use crate::grade::grade;
use crate::output::{GradingReport, UploadedPdf};
use crate::report::{csv_report, text_report, CSV_REPORT_FILE, TEXT_REPORT_FILE};
use crate::web::auth::{verify_state, AuthClient, AuthError, UserInfo};
use crate::web::session::{expired_cookie, session_cookie, session_id, Session};
use crate::web::AppState;
use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything a handler can fail with; rendered as an HTML error page.
#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Grading(#[from] GraderError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Upload rejected: {detail}")]
    Upload { status: StatusCode, detail: String },

    #[error("Please log in first.")]
    Unauthorized,

    #[error("No grading results in this session.")]
    NoResults,

    #[error("Could not render page: {0}")]
    Render(String),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Grading(e) => match e {
                GraderError::MissingUpload { .. }
                | GraderError::NotAPdf { .. }
                | GraderError::CorruptPdf { .. }
                | GraderError::EmptyDocument { .. }
                | GraderError::NoExtractableText { .. } => StatusCode::BAD_REQUEST,
                GraderError::ProviderNotConfigured { .. }
                | GraderError::LlmApiError { .. }
                | GraderError::AllPagesFailed { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            WebError::Auth(e) => e.status(),
            WebError::Upload { status, .. } => *status,
            WebError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebError::NoResults => StatusCode::NOT_FOUND,
            WebError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self.status() {
            StatusCode::BAD_REQUEST => {
                Some("Please make sure all PDF files are valid and not corrupted.")
            }
            StatusCode::UNAUTHORIZED => Some("Log in again from the start page."),
            _ => None,
        }
    }
}

fn error_page(state: &AppState, err: WebError) -> Response {
    let status = err.status();
    let message = err.to_string();
    if status.is_server_error() {
        error!("{} {}", status, message);
    } else {
        warn!("{} {}", status, message);
    }
    match state.views.error(status, &message, err.hint()) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Error page failed to render: {}", e);
            (status, message).into_response()
        }
    }
}

/// The caller's session. Read-only until [`Visitor::ensure`] stores one.
struct Visitor {
    /// `None` for a visitor without a live session.
    id: Option<String>,
    session: Session,
    /// `Set-Cookie` to send when the session was just created.
    new_cookie: Option<String>,
}

impl Visitor {
    /// The existing session, or an empty stand-in that is never stored.
    async fn peek(state: &AppState, headers: &HeaderMap) -> Self {
        let existing = match session_id(headers) {
            Some(id) => state.sessions.get(&id).await.map(|s| (id, s)),
            None => None,
        };
        match existing {
            Some((id, session)) => Self {
                id: Some(id),
                session,
                new_cookie: None,
            },
            None => Self {
                id: None,
                session: Session::default(),
                new_cookie: None,
            },
        }
    }

    /// Store a session for this visitor if it has none yet.
    async fn ensure(mut self, state: &AppState) -> Self {
        if self.id.is_none() {
            let id = state.sessions.create().await;
            debug!("New session {}", id);
            self.new_cookie = Some(session_cookie(&id));
            self.id = Some(id);
        }
        self
    }

    async fn update(&self, state: &AppState, f: impl FnOnce(&mut Session)) {
        if let Some(id) = self.id.as_deref() {
            state.sessions.update(id, f).await;
        }
    }

    fn is_authorized(&self, state: &AppState) -> bool {
        state.auth.is_none() || self.session.user.is_some()
    }

    fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(cookie) = self.new_cookie.as_deref() {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Upload form for logged-in users, login prompt otherwise.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let visitor = Visitor::peek(&state, &headers).await;
    let page = if visitor.is_authorized(&state) {
        state.views.upload(
            visitor.session.user.as_ref(),
            visitor.session.results.is_some(),
        )
    } else {
        state.views.login()
    };
    match page {
        Ok(html) => visitor.respond(Html(html)),
        Err(e) => visitor.respond(error_page(&state, WebError::Render(e.to_string()))),
    }
}

/// Start the authorization-code flow.
pub async fn login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(auth) = state.auth.clone() else {
        return Redirect::to("/").into_response();
    };
    let visitor = Visitor::peek(&state, &headers).await.ensure(&state).await;
    let oauth_state = Uuid::new_v4().simple().to_string();
    visitor
        .update(&state, |s| s.oauth_state = Some(oauth_state.clone()))
        .await;
    visitor.respond(Redirect::to(&auth.config.authorize_url(&oauth_state)))
}

/// Query string of the provider's redirect back to us.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Finish login: check `state`, exchange the code, load the profile.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(auth) = state.auth.clone() else {
        return Redirect::to("/").into_response();
    };
    let visitor = Visitor::peek(&state, &headers).await;
    // The issued state is single-use.
    visitor.update(&state, |s| s.oauth_state = None).await;

    match finish_login(&auth, visitor.session.oauth_state.as_deref(), params).await {
        Ok(user) => {
            visitor.update(&state, |s| s.user = Some(user)).await;
            visitor.respond(Redirect::to("/"))
        }
        Err(e) => visitor.respond(error_page(&state, e.into())),
    }
}

async fn finish_login(
    auth: &AuthClient,
    expected_state: Option<&str>,
    params: CallbackParams,
) -> Result<UserInfo, AuthError> {
    if let Some(error) = params.error {
        return Err(AuthError::Denied(params.error_description.unwrap_or(error)));
    }
    verify_state(expected_state, params.state.as_deref())?;
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::MissingCode)?;
    auth.login(&code).await
}

/// Drop the session and, with login enabled, log out at the provider too.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.remove(&id).await;
    }
    let target = state
        .auth
        .as_ref()
        .map(|a| a.config.logout_redirect())
        .unwrap_or_else(|| "/".to_string());

    let mut response = Redirect::to(&target).into_response();
    if let Ok(value) = HeaderValue::from_str(&expired_cookie()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Run a grading batch from the upload form and show the results.
pub async fn grade_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let visitor = Visitor::peek(&state, &headers).await;
    if !visitor.is_authorized(&state) {
        return error_page(&state, WebError::Unauthorized);
    }
    let visitor = visitor.ensure(&state).await;

    match run_grading(&state, multipart).await {
        Ok(report) => {
            info!(
                "Batch graded: {}/{} students",
                report.stats.graded_students, report.stats.students
            );
            let report = Arc::new(report);
            visitor.update(&state, |s| s.results = Some(report)).await;
            visitor.respond(Redirect::to("/results"))
        }
        Err(e) => visitor.respond(error_page(&state, e)),
    }
}

/// Files and fields read from the upload form.
#[derive(Debug, Default)]
struct GradeForm {
    answer_key: Option<UploadedPdf>,
    students: Vec<UploadedPdf>,
    student_name: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<GradeForm, WebError> {
    fn rejected(e: axum::extract::multipart::MultipartError) -> WebError {
        WebError::Upload {
            status: e.status(),
            detail: e.body_text(),
        }
    }

    let mut form = GradeForm::default();
    while let Some(field) = multipart.next_field().await.map_err(rejected)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "answer_key" | "students" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(rejected)?;
                // An empty file input still submits a nameless, empty part.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                let file_name = if file_name.is_empty() {
                    format!("{}.pdf", name)
                } else {
                    file_name
                };
                let upload = UploadedPdf::new(file_name, bytes.to_vec());
                if name == "answer_key" {
                    form.answer_key = Some(upload);
                } else {
                    form.students.push(upload);
                }
            }
            "student_name" => {
                form.student_name = Some(field.text().await.map_err(rejected)?);
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }
    Ok(form)
}

async fn run_grading(state: &AppState, multipart: Multipart) -> Result<GradingReport, WebError> {
    let form = read_form(multipart).await?;
    let key = form.answer_key.ok_or(GraderError::MissingUpload {
        what: "answer key".to_string(),
    })?;
    if form.students.is_empty() {
        return Err(GraderError::MissingUpload {
            what: "student answer sheets".to_string(),
        }
        .into());
    }
    info!(
        "Grading request: key '{}' ({} bytes), {} student file(s)",
        key.file_name,
        key.bytes.len(),
        form.students.len()
    );

    Ok(grade(&key, &form.students, form.student_name.as_deref(), &state.grading).await?)
}

/// The results page for this session's last batch.
pub async fn results(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let visitor = Visitor::peek(&state, &headers).await;
    let report = match (&visitor.session.results, visitor.is_authorized(&state)) {
        (Some(report), true) => Arc::clone(report),
        _ => return visitor.respond(Redirect::to("/")),
    };
    match state.views.results(&report, visitor.session.user.as_ref()) {
        Ok(html) => visitor.respond(Html(html)),
        Err(e) => visitor.respond(error_page(&state, WebError::Render(e.to_string()))),
    }
}

async fn session_results(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<GradingReport>, WebError> {
    let visitor = Visitor::peek(state, headers).await;
    if !visitor.is_authorized(state) {
        return Err(WebError::Unauthorized);
    }
    visitor.session.results.ok_or(WebError::NoResults)
}

fn attachment(content_type: &str, file_name: &str, body: String) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file_name);
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition.as_str()),
        ],
        body,
    )
        .into_response()
}

/// `grading_results.txt`
pub async fn download_report(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match session_results(&state, &headers).await {
        Ok(report) => attachment(
            "text/plain; charset=utf-8",
            TEXT_REPORT_FILE,
            text_report(&report),
        ),
        Err(e) => error_page(&state, e),
    }
}

/// `student_scores.csv`
pub async fn download_scores(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let csv = match session_results(&state, &headers).await {
        Ok(report) => csv_report(&report).map_err(WebError::from),
        Err(e) => Err(e),
    };
    match csv {
        Ok(body) => attachment("text/csv; charset=utf-8", CSV_REPORT_FILE, body),
        Err(e) => error_page(&state, e),
    }
}
