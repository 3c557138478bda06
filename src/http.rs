//! The thin HTTP edge: cookie parsing, token extraction, Set-Cookie
//! construction and a request extractor. Routing and controllers stay
//! outside the crate; this module only bridges request/response headers
//! to the engine.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::AuthEngine;
use crate::db::User;
use crate::outcome::Reason;
use crate::strategy::{Authenticator, Credentials};

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract a bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Extract the access token from a request: Authorization header first,
/// then the configured query parameter.
pub fn token_from_parts(parts: &Parts, token_param: &str) -> Option<String> {
    if let Some(token) = bearer_token(&parts.headers) {
        return Some(token);
    }
    let query = parts.uri.query()?;
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == token_param && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// One cookie mutation to apply to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieChange {
    Set {
        name: String,
        value: String,
        max_age: i64,
    },
    Remove {
        name: String,
    },
}

/// Accumulated cookie mutations. The engine writes into this sink; the
/// caller renders it onto the response with [`apply`](Self::apply).
#[derive(Debug, Clone, Default)]
pub struct CookieChanges {
    changes: Vec<CookieChange>,
}

impl CookieChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: String, max_age: i64) {
        self.changes.push(CookieChange::Set {
            name: name.to_string(),
            value,
            max_age,
        });
    }

    pub fn remove(&mut self, name: &str) {
        self.changes.push(CookieChange::Remove {
            name: name.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[CookieChange] {
        &self.changes
    }

    /// Value of the most recent Set change, if any.
    pub fn last_set_value(&self) -> Option<String> {
        self.changes.iter().rev().find_map(|change| match change {
            CookieChange::Set { value, .. } => Some(value.clone()),
            CookieChange::Remove { .. } => None,
        })
    }

    /// Render the changes as Set-Cookie header values.
    pub fn header_values(&self, secure_cookies: bool) -> Vec<String> {
        let secure = if secure_cookies { "; Secure" } else { "" };
        self.changes
            .iter()
            .map(|change| match change {
                CookieChange::Set {
                    name,
                    value,
                    max_age,
                } => format!(
                    "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
                    name, value, max_age, secure
                ),
                CookieChange::Remove { name } => format!(
                    "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
                    name, secure
                ),
            })
            .collect()
    }

    /// Append the changes to a response header map.
    pub fn apply(&self, headers: &mut HeaderMap, secure_cookies: bool) {
        for value in self.header_values(secure_cookies) {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.append(header::SET_COOKIE, value);
            }
        }
    }
}

/// State types that can hand out the engine to the extractor.
pub trait HasAuthState {
    fn engine(&self) -> &AuthEngine;
}

/// Rejection for [`RequireUser`], rendered as JSON.
#[derive(Debug)]
pub enum AuthRejection {
    Unauthorized(&'static str),
    TooManyRequests { retry_after: i64 },
    Internal,
}

impl From<&Reason> for AuthRejection {
    fn from(reason: &Reason) -> Self {
        match reason {
            Reason::TooManyRequests { retry_after } => AuthRejection::TooManyRequests {
                retry_after: *retry_after,
            },
            other => AuthRejection::Unauthorized(other.as_str()),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        match self {
            AuthRejection::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse { error: message }),
            )
                .into_response(),
            AuthRejection::TooManyRequests { retry_after } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorResponse {
                        error: "too many requests",
                    }),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            AuthRejection::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error",
                }),
            )
                .into_response(),
        }
    }
}

/// Extractor requiring a valid access token. Stateless per request, like
/// the access-token strategy it runs.
pub struct RequireUser(pub User);

impl<S> FromRequestParts<S> for RequireUser
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let engine = state.engine();
        let token = token_from_parts(parts, &engine.config().token_param);

        let mut authenticator = engine.token(token);
        let outcome = authenticator
            .attempt(&Credentials::default())
            .await
            .map_err(|e| {
                error!("token authentication failed: {}", e);
                AuthRejection::Internal
            })?;

        if let Some(reason) = outcome.reason() {
            return Err(AuthRejection::from(reason));
        }
        outcome
            .into_user()
            .map(RequireUser)
            .ok_or(AuthRejection::Internal)
    }
}
