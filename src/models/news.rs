//! News model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source label for news submitted by users
pub const USER_SUBMITTED_SOURCE: &str = "个人发布";

/// Format used for timestamps in list views
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// News entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct News {
    pub id: i64,
    pub title: String,
    pub source: String,
    pub digest: String,
    pub content: String,
    pub clicks: i64,
    /// Full public URL of the cover image
    pub index_image_url: Option<String>,
    pub category_id: i64,
    /// Author, if submitted by a user
    pub user_id: Option<i64>,
    pub status: NewsStatus,
    /// Rejection reason
    pub reason: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl News {
    /// Shape used in collection and author news lists
    pub fn to_basic_dict(&self) -> NewsBasicDict {
        NewsBasicDict {
            id: self.id,
            title: self.title.clone(),
            source: self.source.clone(),
            digest: self.digest.clone(),
            create_time: self.create_time.format(TIME_FORMAT).to_string(),
            index_image_url: self.index_image_url.clone().unwrap_or_default(),
            clicks: self.clicks,
        }
    }

    /// Shape used on the author's own submission list
    pub fn to_review_dict(&self) -> NewsReviewDict {
        NewsReviewDict {
            id: self.id,
            title: self.title.clone(),
            create_time: self.create_time.format(TIME_FORMAT).to_string(),
            status: self.status.code(),
            reason: self.reason.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsBasicDict {
    pub id: i64,
    pub title: String,
    pub source: String,
    pub digest: String,
    pub create_time: String,
    pub index_image_url: String,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsReviewDict {
    pub id: i64,
    pub title: String,
    pub create_time: String,
    pub status: i32,
    pub reason: String,
}

/// Review state of a news item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsStatus {
    Approved,
    #[default]
    Reviewing,
    Rejected,
}

impl NewsStatus {
    /// Integer stored in the `status` column
    pub fn code(self) -> i32 {
        match self {
            NewsStatus::Approved => 0,
            NewsStatus::Reviewing => 1,
            NewsStatus::Rejected => -1,
        }
    }

    pub fn from_code(code: i32) -> anyhow::Result<Self> {
        match code {
            0 => Ok(NewsStatus::Approved),
            1 => Ok(NewsStatus::Reviewing),
            -1 => Ok(NewsStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid news status: {}", code)),
        }
    }
}

impl fmt::Display for NewsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewsStatus::Approved => write!(f, "approved"),
            NewsStatus::Reviewing => write!(f, "reviewing"),
            NewsStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Input for a user news submission
#[derive(Debug, Clone)]
pub struct CreateNewsInput {
    pub title: String,
    pub digest: String,
    pub content: String,
    pub category_id: i64,
    pub user_id: i64,
    /// Full public URL of the uploaded cover
    pub index_image_url: String,
}
