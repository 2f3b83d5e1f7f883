use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DeploymentError, Result};

/// Identity of the platform user a deployment belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Namespace-qualifying slug, e.g. `alice` for namespace `user-alice`.
    pub slug: String,
    pub username: Option<String>,
}

impl User {
    pub fn new(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            username: None,
        }
    }

    pub fn with_username(slug: &str, username: Option<String>) -> Self {
        Self {
            slug: slug.to_string(),
            username,
        }
    }

    pub fn namespace(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.slug)
    }

    pub fn release_name(&self, chart_name: &str) -> String {
        format!("{}-{}", chart_name, self.slug)
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.slug)
    }
}

/// Short-lived identity token forwarded to the cluster for authorization.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_at(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(expires_at),
        }
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<&Self> {
        if self.token.trim().is_empty() {
            return Err(DeploymentError::Authentication("empty token".to_string()));
        }
        match self.expires_at {
            Some(expires_at) if expires_at <= now => Err(DeploymentError::Authentication(
                format!("token expired at {}", expires_at.to_rfc3339()),
            )),
            _ => Ok(self),
        }
    }

    /// Validates an optional credential, treating absence as an authentication failure.
    pub fn require(credential: Option<&Credential>) -> Result<&Credential> {
        credential
            .ok_or_else(|| DeploymentError::Authentication("missing token".to_string()))?
            .validate(Utc::now())
    }
}

// Tokens never end up in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
