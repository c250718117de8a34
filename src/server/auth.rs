//! HTTP basic authentication against a password file.
//!
//! The file holds one `user:bcrypt-hash` pair per line; blank lines and
//! lines starting with `#` are ignored. With auth configured, every request
//! must carry a valid pair or gets a 401 with a `WWW-Authenticate`
//! challenge naming the manager as the realm.

use crate::api::ApiError;
use crate::error::{Error, Result};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub struct AuthConfig {
    realm: String,
    /// Username to bcrypt hash.
    users: HashMap<String, String>,
}

impl AuthConfig {
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            users: HashMap::new(),
        }
    }

    /// Adds one credential with an already-computed bcrypt hash.
    pub fn add_user(&mut self, user: impl Into<String>, hash: impl Into<String>) {
        self.users.insert(user.into(), hash.into());
    }

    /// Hashes `password` and adds the credential; returns the hash so it
    /// can be echoed for the operator to store.
    pub fn add_password(&mut self, user: impl Into<String>, password: &str) -> Result<String> {
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| Error::Auth(format!("bcrypt: {}", e)))?;
        self.users.insert(user.into(), hash.clone());
        Ok(hash)
    }

    /// Loads `user:bcrypt` lines from a password file.
    pub fn load_passwd_file(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read_to_string(path)?;
        for (lineno, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((user, hash)) = line.split_once(':') else {
                return Err(Error::Auth(format!(
                    "{}:{}: expected user:hash",
                    path.display(),
                    lineno + 1
                )));
            };
            self.users.insert(user.to_string(), hash.to_string());
        }
        Ok(())
    }

    fn verify(&self, user: &str, password: &str) -> bool {
        match self.users.get(user) {
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            None => false,
        }
    }

    fn challenge(&self) -> Response {
        (
            [(
                header::WWW_AUTHENTICATE,
                format!("Basic realm=\"{}\"", self.realm),
            )],
            ApiError {
                code: 401,
                message: "Unauthorized".to_string(),
            },
        )
            .into_response()
    }
}

/// Axum middleware enforcing basic auth. Install with
/// `axum::middleware::from_fn_with_state(Arc::new(cfg), require_auth)`.
pub async fn require_auth(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Some((user, password)) = decode_basic(request.headers().get(header::AUTHORIZATION))
    else {
        return auth.challenge();
    };
    if !auth.verify(&user, &password) {
        return auth.challenge();
    }
    next.run(request).await
}

fn decode_basic(value: Option<&axum::http::HeaderValue>) -> Option<(String, String)> {
    let value = value?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
