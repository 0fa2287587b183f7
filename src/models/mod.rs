//! Data models
//!
//! Database entities (User, News, Category, Session), their serialized
//! dictionary shapes, and the shared pagination types.

mod category;
mod news;
mod pagination;
mod session;
mod user;

pub use category::Category;
pub use news::{
    CreateNewsInput, News, NewsBasicDict, NewsReviewDict, NewsStatus, USER_SUBMITTED_SOURCE,
};
pub use pagination::{total_pages, PageRequest, Paginated};
pub use session::Session;
pub use user::{Gender, UpdateProfileInput, User, UserDict};
