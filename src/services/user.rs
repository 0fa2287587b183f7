//! User service
//!
//! Accounts, sessions, profile edits and the follow relation:
//! - Registration and login by mobile number, each starting a session
//! - Session resolution for the auth middleware
//! - Base info, avatar and password updates
//! - Followed-user listings and other users' profile pages

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{PageRequest, Paginated, Session, UpdateProfileInput, User, UserDict};
use crate::services::password::hash_password;
use crate::services::storage::ObjectStorage;
use anyhow::Context;
use chrono::Duration;
use std::str::FromStr;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Mobile number already registered: {0}")]
    UserExists(String),

    /// Unknown mobile or wrong password on login
    #[error("Invalid mobile or password")]
    InvalidCredentials,

    /// Old password did not verify on a password change
    #[error("Old password is incorrect")]
    WrongPassword,

    #[error("User not found")]
    NotFound,

    #[error("Users cannot follow themselves")]
    SelfFollow,

    #[error("Upload failed: {0}")]
    UploadFailed(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// `action` field of the follow endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowAction {
    Follow,
    Unfollow,
}

impl FromStr for FollowAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(FollowAction::Follow),
            "unfollow" => Ok(FollowAction::Unfollow),
            _ => Err(anyhow::anyhow!("Invalid follow action: {}", s)),
        }
    }
}

/// Profile data shown on another user's page
#[derive(Debug, Clone)]
pub struct OtherUserProfile {
    pub user: UserDict,
    /// Whether the viewer follows this user
    pub is_followed: bool,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    storage: Arc<dyn ObjectStorage>,
    session_lifetime: Duration,
    domain_prefix: String,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        storage: Arc<dyn ObjectStorage>,
        session_lifetime: Duration,
        domain_prefix: impl Into<String>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            storage,
            session_lifetime,
            domain_prefix: domain_prefix.into(),
        }
    }

    /// Create an account for a verified mobile number and log it in.
    ///
    /// The nickname starts out as the mobile number.
    pub async fn register(&self, mobile: &str, password: &str) -> Result<(User, Session), UserServiceError> {
        if self
            .user_repo
            .get_by_mobile(mobile)
            .await
            .context("Failed to check mobile")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(mobile.to_string()));
        }

        let password_hash = hash_password(password).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&User::new(mobile.to_string(), password_hash))
            .await
            .context("Failed to create user")?;

        let session = self.start_session(&user).await?;
        tracing::info!("Registered user {} ({})", user.id, user.mobile);

        Ok((user, session))
    }

    pub async fn login(&self, mobile: &str, password: &str) -> Result<(User, Session), UserServiceError> {
        let user = self
            .user_repo
            .get_by_mobile(mobile)
            .await
            .context("Failed to get user by mobile")?
            .ok_or(UserServiceError::InvalidCredentials)?;

        if !user.check_password(password) {
            tracing::info!("Failed login for user {}", user.id);
            return Err(UserServiceError::InvalidCredentials);
        }

        self.user_repo
            .touch_last_login(user.id)
            .await
            .context("Failed to update last login")?;

        let session = self.start_session(&user).await?;
        Ok((user, session))
    }

    /// Delete a session; unknown ids are ignored
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are deleted and resolve to `None`.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<(User, Session)>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get session user")?;

        Ok(user.map(|user| (user, session)))
    }

    /// Delete expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    /// Dictionary shape with follower and news counts filled in
    pub async fn user_dict(&self, user: &User) -> Result<UserDict, UserServiceError> {
        let followers = self
            .user_repo
            .followers_count(user.id)
            .await
            .context("Failed to count followers")?;
        let news = self
            .user_repo
            .news_count(user.id)
            .await
            .context("Failed to count news")?;
        Ok(user.to_dict(&self.domain_prefix, followers, news))
    }

    /// Update nickname, signature and gender. The user's sessions pick up
    /// the new nickname in the same transaction.
    pub async fn update_profile(&self, user_id: i64, input: &UpdateProfileInput) -> Result<(), UserServiceError> {
        self.user_repo
            .update_profile(user_id, input)
            .await
            .context("Failed to update profile")?;
        Ok(())
    }

    /// Upload a new avatar and return its public URL
    pub async fn update_avatar(&self, user_id: i64, data: Vec<u8>) -> Result<String, UserServiceError> {
        let key = self
            .storage
            .upload(data)
            .await
            .map_err(UserServiceError::UploadFailed)?;

        self.user_repo
            .update_avatar(user_id, &key)
            .await
            .context("Failed to save avatar")?;

        Ok(format!("{}{}", self.domain_prefix, key))
    }

    pub async fn change_password(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        if !user.check_password(old_password) {
            return Err(UserServiceError::WrongPassword);
        }

        let mut updated = user.clone();
        updated
            .set_password(new_password)
            .context("Failed to hash password")?;

        self.user_repo
            .update_password(user.id, &updated.password_hash)
            .await
            .context("Failed to save password")?;

        Ok(())
    }

    /// Users followed by `follower_id`, newest follow first
    pub async fn followed_users(
        &self,
        follower_id: i64,
        page: PageRequest,
    ) -> Result<Paginated<UserDict>, UserServiceError> {
        let users = self
            .user_repo
            .list_followed(follower_id, page)
            .await
            .context("Failed to list followed users")?;

        let mut items = Vec::with_capacity(users.items.len());
        for user in &users.items {
            items.push(self.user_dict(user).await?);
        }

        Ok(Paginated {
            items,
            total: users.total,
            page: users.page,
            per_page: users.per_page,
        })
    }

    /// Another user's profile as seen by `viewer_id`
    pub async fn other_profile(
        &self,
        viewer_id: Option<i64>,
        other_id: i64,
    ) -> Result<OtherUserProfile, UserServiceError> {
        let other = self
            .get_by_id(other_id)
            .await?
            .ok_or(UserServiceError::NotFound)?;

        let is_followed = match viewer_id {
            Some(viewer) => self
                .user_repo
                .is_following(viewer, other.id)
                .await
                .context("Failed to check follow relation")?,
            None => false,
        };

        Ok(OtherUserProfile {
            user: self.user_dict(&other).await?,
            is_followed,
        })
    }

    /// Follow or unfollow `target_id`; repeating an action is a no-op
    pub async fn set_follow(
        &self,
        follower_id: i64,
        target_id: i64,
        action: FollowAction,
    ) -> Result<(), UserServiceError> {
        if self.get_by_id(target_id).await?.is_none() {
            return Err(UserServiceError::NotFound);
        }
        if follower_id == target_id {
            return Err(UserServiceError::SelfFollow);
        }

        let result = match action {
            FollowAction::Follow => self.user_repo.follow(follower_id, target_id).await,
            FollowAction::Unfollow => self.user_repo.unfollow(follower_id, target_id).await,
        };
        result.context("Failed to update follow relation")?;

        Ok(())
    }

    async fn start_session(&self, user: &User) -> Result<Session, UserServiceError> {
        let session = Session::start(user.id, &user.nick_name, &user.mobile, self.session_lifetime)?;
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}
