use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use chrono::{DateTime, Utc};

use crate::error::DeploymentError;
use crate::model::{Credential, User};

/// Caller identity extracted from request headers
///
/// - X-User-Slug: Required namespace slug of the user
/// - X-User-Name: Optional username
/// - Authorization: Optional `Bearer <id token>` forwarded to the cluster
/// - X-Id-Token-Expires-At: Optional RFC 3339 expiry of that token
///
/// A missing token is not rejected here; operations that need the cluster
/// fail with an authentication error instead.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user: User,
    pub credential: Option<Credential>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = DeploymentError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers)
    }
}

fn identity_from_headers(headers: &HeaderMap) -> Result<RequestIdentity, DeploymentError> {
    let slug = extract_header_value(headers, "x-user-slug")
        .filter(|slug| !slug.trim().is_empty())
        .ok_or_else(|| DeploymentError::Authentication("missing x-user-slug header".to_string()))?;
    let user = User::with_username(slug.trim(), extract_header_value(headers, "x-user-name"));

    let expires_at = match extract_header_value(headers, "x-id-token-expires-at") {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| DeploymentError::Authentication(format!("invalid token expiry: {}", e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    let credential = extract_header_value(headers, AUTHORIZATION.as_str())
        .and_then(|value| value.strip_prefix("Bearer ").map(str::to_string))
        .map(|token| Credential {
            token,
            expires_at,
        });

    Ok(RequestIdentity { user, credential })
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}
