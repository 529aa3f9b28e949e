//! Session / Auth Boundary
//!
//! Authentication is delegated to a hosted provider. This module defines what
//! the rest of the system needs from it: who the caller is, and when their
//! credential should be refreshed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::UserId;

/// The caller, as vouched for by the auth provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: Option<String>,
}

/// A validated credential and its lifetime
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: AuthenticatedUser,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user: AuthenticatedUser, expires_at: DateTime<Utc>) -> Self {
        Self { user, expires_at }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Still valid, but inside the refresh window
    pub fn needs_refresh(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        !self.is_expired(now) && self.expires_at - now <= leeway
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Resolves bearer credentials into sessions
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a token and return the session it represents.
    ///
    /// Expired or malformed tokens fail with [`crate::CoreError::Auth`].
    async fn session(&self, token: &str) -> Result<Session>;

    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser> {
        Ok(self.session(token).await?.user)
    }
}
