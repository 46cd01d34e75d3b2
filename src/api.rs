//! HTTP routes. Every handler returns a JSON view model; the static page in
//! `static/index.html` does the drawing.

use std::path::PathBuf;
use std::sync::Arc;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{self, LoginRequest, RegisterRequest, SessionContext};
use crate::data::{self, Status};
use crate::database::{ClassifiedStudent, Database};
use crate::error::{Error, Result};
use crate::ingest;
use crate::model::Classifier;
use crate::report;

pub const SESSION_COOKIE: &str = "klasifikasi-session";

pub struct AppState {
    pub db: Database,
    pub classifier: Arc<dyn Classifier>,
    pub dataset: Option<PathBuf>,
}

pub fn session_middleware(key: Key) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE.to_string())
        .cookie_secure(false)
        .build()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(serve_homepage))
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api")
                .route("/register", web::post().to(register))
                .route("/login", web::post().to(login))
                .route("/logout", web::post().to(logout))
                .route("/session", web::get().to(session_info))
                .route("/classify", web::post().to(classify))
                .route("/dashboard", web::get().to(dashboard))
                .route("/students", web::get().to(search_students))
                .route("/students", web::delete().to(delete_all))
                .route("/students/status", web::get().to(students_by_status))
                .route("/report", web::get().to(get_report)),
        );
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StudentTable {
    pub status: Option<Status>,
    pub rows: Vec<ClassifiedStudent>,
    pub message: Option<String>,
}

impl StudentTable {
    fn new(status: Option<Status>, rows: Vec<ClassifiedStudent>, empty_message: String) -> Self {
        let message = rows.is_empty().then_some(empty_message);
        Self {
            status,
            rows,
            message,
        }
    }
}

async fn serve_homepage() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(include_str!("../static/index.html"))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Dropout classifier is running!")
}

async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    auth::register(&state.db, &body).await?;
    Ok(HttpResponse::Created().json(MessageResponse::new("Registration successful")))
}

async fn login(
    state: web::Data<AppState>,
    session: SessionContext,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let username = auth::log_in(&state.db, &body).await?;
    session.persist_user(&username)?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Logged in!")))
}

async fn logout(session: SessionContext) -> HttpResponse {
    session.log_out();
    HttpResponse::Ok().json(MessageResponse::new("Logged out!"))
}

async fn session_info(session: SessionContext) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(session.view()?))
}

async fn classify(
    state: web::Data<AppState>,
    session: SessionContext,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let user = session.require_user()?;
    info!(user = %user, bytes = body.len(), "Upload received");

    let view = ingest::classify_upload(&state.db, state.classifier.as_ref(), &body).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn dashboard(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse> {
    session.require_user()?;
    let path = state
        .dataset
        .clone()
        .ok_or_else(|| Error::NotFound("no reference dataset configured".to_string()))?;

    let batch = web::block(move || data::load_batch(&path))
        .await
        .map_err(|e| Error::Internal(format!("dataset loader failed: {e}")))??;
    let view = ingest::dashboard(state.classifier.as_ref(), batch)?;
    Ok(HttpResponse::Ok().json(view))
}

async fn search_students(
    state: web::Data<AppState>,
    session: SessionContext,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    session.require_user()?;
    let rows = state.db.fetch_all(query.q.as_deref()).await?;
    let table = StudentTable::new(
        None,
        rows,
        "Tidak ada data yang ditemukan untuk pencarian tersebut.".to_string(),
    );
    Ok(HttpResponse::Ok().json(table))
}

/// `status` is `DO`, `Tidak DO` or `Semua` (the default), which returns one
/// table per label.
async fn students_by_status(
    state: web::Data<AppState>,
    session: SessionContext,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse> {
    session.require_user()?;

    let requested = query.status.as_deref().map(str::trim).unwrap_or("Semua");
    let statuses: Vec<Status> = if requested == "Semua" {
        Status::ALL.iter().rev().copied().collect()
    } else {
        let status = Status::parse(requested)
            .ok_or_else(|| Error::InvalidInput(format!("unknown status '{requested}'")))?;
        vec![status]
    };

    let mut tables = Vec::with_capacity(statuses.len());
    for status in statuses {
        let rows = state.db.fetch_by_status(status).await?;
        tables.push(StudentTable::new(
            Some(status),
            rows,
            format!("Tidak ada data mahasiswa dengan status {status}."),
        ));
    }

    Ok(HttpResponse::Ok().json(tables))
}

async fn get_report(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse> {
    session.require_user()?;
    let counts = state.db.fetch_status_counts().await?;
    Ok(HttpResponse::Ok().json(report::build_report(&counts)))
}

async fn delete_all(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse> {
    let user = session.require_user()?;
    let deleted = state.db.delete_all().await?;
    info!(user = %user, deleted, "Bulk delete");
    Ok(HttpResponse::Ok().json(MessageResponse::new("All records have been deleted")))
}
