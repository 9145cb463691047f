//! Administrator authentication.
//!
//! The authority sits behind a front end that authenticates users and
//! forwards the result in a trusted header. Admin endpoints additionally
//! require the user to be in the configured admin set.

use std::collections::HashSet;

use axum::http::HeaderMap;
use thiserror::Error;

/// Header carrying the authenticated username.
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub username: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("user '{0}' is not an administrator")]
    NotAdmin(String),
}

/// Extract the authenticated user from request headers.
pub fn authenticated_user(headers: &HeaderMap) -> Result<AuthInfo, AuthError> {
    let username = headers
        .get(AUTHENTICATED_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(AuthError::Unauthenticated)?;

    Ok(AuthInfo {
        username: username.to_string(),
    })
}

/// Extract the authenticated user and require admin rights.
pub fn authenticated_admin(
    headers: &HeaderMap,
    admin_users: &HashSet<String>,
) -> Result<AuthInfo, AuthError> {
    let auth = authenticated_user(headers)?;
    if !admin_users.contains(&auth.username) {
        return Err(AuthError::NotAdmin(auth.username));
    }
    Ok(auth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn admins() -> HashSet<String> {
        ["root".to_string()].into_iter().collect()
    }

    #[test]
    fn test_missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(
            authenticated_admin(&headers, &admins()),
            Err(AuthError::Unauthenticated)
        );
    }

    #[test]
    fn test_non_admin() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHENTICATED_USER_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(
            authenticated_admin(&headers, &admins()),
            Err(AuthError::NotAdmin("alice".to_string()))
        );
        assert_eq!(authenticated_user(&headers).unwrap().username, "alice");
    }

    #[test]
    fn test_admin() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHENTICATED_USER_HEADER, HeaderValue::from_static("root"));
        assert_eq!(authenticated_admin(&headers, &admins()).unwrap().username, "root");
    }
}
