//! User model
//!
//! A registered reader/author, identified by mobile number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::services::password::{hash_password, verify_password};

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Display name (unique); defaults to the mobile number
    pub nick_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// 11-digit mobile number (unique)
    pub mobile: String,
    /// Object-storage key of the avatar, without the domain prefix
    pub avatar_url: Option<String>,
    pub signature: Option<String>,
    pub gender: Gender,
    pub last_login: DateTime<Utc>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl User {
    /// Create a user for a freshly verified mobile number.
    ///
    /// The password must already be hashed; see [`User::set_password`].
    pub fn new(mobile: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            nick_name: mobile.clone(),
            password_hash,
            mobile,
            avatar_url: None,
            signature: None,
            gender: Gender::default(),
            last_login: now,
            create_time: now,
            update_time: now,
        }
    }

    /// Replace the stored hash with one derived from `password`
    pub fn set_password(&mut self, password: &str) -> anyhow::Result<()> {
        self.password_hash = hash_password(password)?;
        Ok(())
    }

    /// Check a plaintext password against the stored hash.
    ///
    /// A malformed stored hash counts as a mismatch.
    pub fn check_password(&self, password: &str) -> bool {
        match verify_password(password, &self.password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!("Unreadable password hash for user {}: {:#}", self.id, e);
                false
            }
        }
    }

    /// Public avatar URL, or an empty string when no avatar was uploaded
    pub fn avatar_link(&self, domain_prefix: &str) -> String {
        match self.avatar_url.as_deref() {
            Some(key) if !key.is_empty() => format!("{}{}", domain_prefix, key),
            _ => String::new(),
        }
    }

    /// Build the dictionary shape shown on profile pages and follow lists
    pub fn to_dict(&self, domain_prefix: &str, followers_count: i64, news_count: i64) -> UserDict {
        UserDict {
            id: self.id,
            nick_name: self.nick_name.clone(),
            avatar_url: self.avatar_link(domain_prefix),
            mobile: self.mobile.clone(),
            gender: self.gender,
            signature: self.signature.clone().unwrap_or_default(),
            followers_count,
            news_count,
        }
    }
}

/// Serialized user as rendered into templates and JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDict {
    pub id: i64,
    pub nick_name: String,
    pub avatar_url: String,
    pub mobile: String,
    pub gender: Gender,
    pub signature: String,
    pub followers_count: i64,
    pub news_count: i64,
}

/// Gender stored on the profile; only two values are accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    #[default]
    Man,
    Woman,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Man => write!(f, "MAN"),
            Gender::Woman => write!(f, "WOMAN"),
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    /// Exact match only: `man` or `Woman` are rejected like any other value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAN" => Ok(Gender::Man),
            "WOMAN" => Ok(Gender::Woman),
            _ => Err(anyhow::anyhow!("Invalid gender: {}", s)),
        }
    }
}

/// Fields accepted by the base-info form
#[derive(Debug, Clone)]
pub struct UpdateProfileInput {
    pub nick_name: String,
    pub signature: String,
    pub gender: Gender,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_user() -> User {
        let mut user = User::new("13800001111".to_string(), String::new());
        user.id = 7;
        user
    }

    #[test]
    fn test_new_user_defaults() {
        let user = sample_user();
        assert_eq!(user.nick_name, "13800001111");
        assert_eq!(user.gender, Gender::Man);
        assert!(user.avatar_url.is_none());
    }

    #[test]
    fn test_set_and_check_password() {
        let mut user = sample_user();
        user.set_password("secret123").unwrap();
        assert!(user.check_password("secret123"));
        assert!(!user.check_password("secret124"));
    }

    #[test]
    fn test_check_password_with_corrupt_hash() {
        let mut user = sample_user();
        user.password_hash = "not-a-hash".to_string();
        assert!(!user.check_password("anything"));
    }

    #[test]
    fn test_to_dict_without_avatar() {
        let user = sample_user();
        let dict = user.to_dict("http://cdn/", 3, 5);
        assert_eq!(dict.avatar_url, "");
        assert_eq!(dict.signature, "");
        assert_eq!(dict.followers_count, 3);
        assert_eq!(dict.news_count, 5);

        let json = serde_json::to_value(&dict).unwrap();
        assert_eq!(json["gender"], "MAN");
        assert_eq!(json["nick_name"], "13800001111");
    }

    #[test]
    fn test_to_dict_prefixes_avatar_key() {
        let mut user = sample_user();
        user.avatar_url = Some("FkAbc".to_string());
        let dict = user.to_dict("http://cdn/", 0, 0);
        assert_eq!(dict.avatar_url, "http://cdn/FkAbc");
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("MAN".parse::<Gender>().unwrap(), Gender::Man);
        assert_eq!("WOMAN".parse::<Gender>().unwrap(), Gender::Woman);
        assert!("man".parse::<Gender>().is_err());
        assert!("".parse::<Gender>().is_err());
    }

    proptest! {
        #[test]
        fn gender_accepts_only_two_values(s in "\\PC{0,8}") {
            let parsed = s.parse::<Gender>();
            prop_assert_eq!(parsed.is_ok(), s == "MAN" || s == "WOMAN");
            if let Ok(gender) = parsed {
                prop_assert_eq!(gender.to_string(), s);
            }
        }
    }
}
