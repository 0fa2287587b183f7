//! Session model

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Login session, referenced by the `session` cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    pub user_id: i64,
    /// Mirror of the user's nickname for page headers
    pub nick_name: String,
    pub mobile: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for a user with a fresh random token
    pub fn start(user_id: i64, nick_name: &str, mobile: &str, lifetime: Duration) -> anyhow::Result<Self> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(lifetime)
            .context("Session lifetime out of range")?;
        Ok(Self {
            id: format!(
                "{}{}",
                uuid::Uuid::new_v4().simple(),
                uuid::Uuid::new_v4().simple()
            ),
            user_id,
            nick_name: nick_name.to_string(),
            mobile: mobile.to_string(),
            expires_at,
            created_at: now,
        })
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_session() {
        let session = Session::start(4, "nick", "13800001111", Duration::hours(1)).unwrap();
        assert_eq!(session.id.len(), 64);
        assert!(!session.is_expired());

        let other = Session::start(4, "nick", "13800001111", Duration::hours(1)).unwrap();
        assert_ne!(session.id, other.id);
    }

    #[test]
    fn test_expired_session() {
        let session = Session::start(4, "nick", "13800001111", Duration::seconds(-1)).unwrap();
        assert!(session.is_expired());
    }

    #[test]
    fn test_lifetime_past_calendar_range_is_rejected() {
        let result = Session::start(4, "nick", "13800001111", Duration::days(36_500_000));
        assert!(result.is_err());
    }
}
