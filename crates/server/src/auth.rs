//! Basic-auth checks for both listeners.
//!
//! HTTP routes require an `Authorization: Basic` header. The WebSocket
//! registration also accepts `username`/`password` query parameters, since
//! some WebSocket clients cannot set headers. Empty configured credentials
//! admit every request.

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use tracing::debug;

use testsync_engine::Credentials;

use crate::http::error_response;
use crate::AppState;

/// Credentials carried in query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    /// `username` parameter
    pub username: Option<String>,
    /// `password` parameter
    pub password: Option<String>,
}

/// Decode an `Authorization: Basic` header into `(username, password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Check a request against the configured credentials.
///
/// The header wins when present; otherwise the query pair is used.
pub fn authorize(expected: &Credentials, headers: &HeaderMap, query: Option<&AuthQuery>) -> bool {
    if expected.is_empty() {
        return true;
    }

    let supplied = basic_credentials(headers).or_else(|| {
        let query = query?;
        let username = query.username.clone().unwrap_or_default();
        let password = query.password.clone().unwrap_or_default();
        if username.is_empty() && password.is_empty() {
            None
        } else {
            Some((username, password))
        }
    });

    match supplied {
        Some((username, password)) => expected.matches(&username, &password),
        None => {
            debug!(target: "testsync::auth", "No credentials supplied");
            false
        }
    }
}

/// 401 with a `WWW-Authenticate` challenge.
pub fn unauthorized() -> Response {
    let mut response = error_response(StatusCode::UNAUTHORIZED, "Request not authorized").into_response();
    response.headers_mut().insert(
        WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"testsync\""),
    );
    response
}

/// Middleware guarding the HTTP payload routes.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if authorize(&state.credentials, request.headers(), None) {
        next.run(request).await
    } else {
        debug!(target: "testsync::auth", uri = %request.uri(), "Rejected unauthorized request");
        unauthorized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            username: "runner".to_string(),
            password: "pw".to_string(),
        }
    }

    fn header(user_pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(user_pass));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn parse_basic_header() {
        assert_eq!(
            basic_credentials(&header("runner:pw")),
            Some(("runner".to_string(), "pw".to_string()))
        );
        assert_eq!(
            basic_credentials(&header("user:with:colon")),
            Some(("user".to_string(), "with:colon".to_string()))
        );
    }

    #[test]
    fn reject_other_schemes_and_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(basic_credentials(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(basic_credentials(&headers).is_none());

        assert!(basic_credentials(&HeaderMap::new()).is_none());
    }

    #[test]
    fn header_credentials_checked() {
        assert!(authorize(&creds(), &header("runner:pw"), None));
        assert!(!authorize(&creds(), &header("runner:wrong"), None));
        assert!(!authorize(&creds(), &HeaderMap::new(), None));
    }

    #[test]
    fn query_credentials_checked() {
        let good = AuthQuery {
            username: Some("runner".into()),
            password: Some("pw".into()),
        };
        let bad = AuthQuery {
            username: Some("runner".into()),
            password: Some("nope".into()),
        };
        assert!(authorize(&creds(), &HeaderMap::new(), Some(&good)));
        assert!(!authorize(&creds(), &HeaderMap::new(), Some(&bad)));
        assert!(!authorize(&creds(), &HeaderMap::new(), Some(&AuthQuery::default())));
    }

    #[test]
    fn empty_credentials_admit_everyone() {
        assert!(authorize(&Credentials::default(), &HeaderMap::new(), None));
    }
}
