use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth-style token pair (RFC 6749) with its absolute expiry moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds as issued.
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
    ) -> Self {
        Self::issued_at(access_token, refresh_token, expires_in, Utc::now())
    }

    pub fn issued_at(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
        issued: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in,
            expires_at: expiry(issued, expires_in),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// `issued + expires_in`, saturating at the representable range.
fn expiry(issued: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    let bound = if expires_in < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    };
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| issued.checked_add_signed(lifetime))
        .unwrap_or(bound)
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::new("", "", 0)
    }
}
