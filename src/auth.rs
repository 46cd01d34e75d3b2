//! Account registration, credential checks and the request session.
//!
//! Handlers never touch the raw cookie session; they go through
//! [`SessionContext`], which only knows how to remember, read and forget the
//! logged-in username.

use actix_session::Session;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

use crate::database::Database;
use crate::error::{Error, Result};

pub const USERNAME_KEY: &str = "username";

/// Roles accepted at registration.
pub const ROLES: [&str; 1] = ["operator"];

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    ROLES[0].to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub logged_in: bool,
    pub username: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn register(db: &Database, request: &RegisterRequest) -> Result<i64> {
    let username = request.username.trim();
    let email = request.email.trim();
    if username.is_empty() || email.is_empty() || request.password.is_empty() {
        return Err(Error::InvalidInput(
            "username, email and password are required".to_string(),
        ));
    }
    if !ROLES.contains(&request.role.as_str()) {
        return Err(Error::InvalidInput(format!("unknown role '{}'", request.role)));
    }

    let hash = hash_password(&request.password)?;
    let id = db.create_user(username, email, &hash, &request.role).await?;
    info!(username, "Registered user");
    Ok(id)
}

/// Checks credentials and returns the canonical username.
pub async fn log_in(db: &Database, request: &LoginRequest) -> Result<String> {
    let Some(user) = db.find_user(request.username.trim()).await? else {
        return Err(Error::Unauthorized("User not found".to_string()));
    };

    if !verify_password(&request.password, &user.password) {
        warn!(username = %user.username, "Rejected login");
        return Err(Error::Unauthorized(
            "Incorrect username or password".to_string(),
        ));
    }

    info!(username = %user.username, "Logged in");
    Ok(user.username)
}

/// Typed access to the cookie session.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    pub fn persist_user(&self, username: &str) -> Result<()> {
        self.0.renew();
        self.0
            .insert(USERNAME_KEY, username)
            .map_err(|e| Error::Internal(format!("failed to persist session: {e}")))
    }

    pub fn username(&self) -> Result<Option<String>> {
        self.0
            .get::<String>(USERNAME_KEY)
            .map_err(|e| Error::Internal(format!("failed to read session: {e}")))
    }

    /// Logged-in username, or `401 Unauthorized`.
    pub fn require_user(&self) -> Result<String> {
        self.username()?
            .ok_or_else(|| Error::Unauthorized("login required".to_string()))
    }

    pub fn log_out(&self) {
        self.0.purge();
    }

    pub fn view(&self) -> Result<SessionView> {
        let username = self.username()?;
        Ok(SessionView {
            logged_in: username.is_some(),
            username,
        })
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Session::from_request(req, payload);
        Box::pin(async move { fut.await.map(SessionContext::new) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "rahasia".to_string(),
            role: "operator".to_string(),
        }
    }

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("rahasia").unwrap();
        assert_ne!(hash, "rahasia");
        assert!(verify_password("rahasia", &hash));
        assert!(!verify_password("salah", &hash));
        assert!(!verify_password("rahasia", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn register_then_log_in() {
        let db = Database::in_memory().await.unwrap();
        register(&db, &registration("operator1", "op1@kampus.ac.id"))
            .await
            .unwrap();

        let ok = log_in(
            &db,
            &LoginRequest {
                username: "operator1".to_string(),
                password: "rahasia".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(ok, "operator1");
    }

    #[tokio::test]
    async fn login_failures_are_distinguished() {
        let db = Database::in_memory().await.unwrap();
        register(&db, &registration("operator1", "op1@kampus.ac.id"))
            .await
            .unwrap();

        let wrong = log_in(
            &db,
            &LoginRequest {
                username: "operator1".to_string(),
                password: "salah".to_string(),
            },
        )
        .await;
        match wrong {
            Err(Error::Unauthorized(msg)) => assert_eq!(msg, "Incorrect username or password"),
            other => panic!("expected unauthorized, got {other:?}"),
        }

        let unknown = log_in(
            &db,
            &LoginRequest {
                username: "ghost".to_string(),
                password: "rahasia".to_string(),
            },
        )
        .await;
        match unknown {
            Err(Error::Unauthorized(msg)) => assert_eq!(msg, "User not found"),
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_rejects_unknown_role_and_blank_fields() {
        let db = Database::in_memory().await.unwrap();

        let mut admin = registration("root", "root@kampus.ac.id");
        admin.role = "admin".to_string();
        assert!(matches!(register(&db, &admin).await, Err(Error::InvalidInput(_))));

        let blank = registration("  ", "x@kampus.ac.id");
        assert!(matches!(register(&db, &blank).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let db = Database::in_memory().await.unwrap();
        register(&db, &registration("operator1", "op1@kampus.ac.id"))
            .await
            .unwrap();
        let again = register(&db, &registration("operator1", "other@kampus.ac.id")).await;
        assert!(matches!(again, Err(Error::Conflict(_))));
    }
}
