//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories:
//! - Implementing business rules
//! - Coordinating repositories, the cache and external collaborators
//! - Turning failures into typed errors the handlers can map

pub mod captcha;
pub mod news;
pub mod password;
pub mod sms;
pub mod storage;
pub mod user;
pub mod verification;

#[cfg(test)]
pub(crate) mod fakes;

pub use captcha::{Captcha, CaptchaGenerator, ImageCaptcha};
pub use news::{CollectAction, NewsService, NewsServiceError, PublishNewsInput};
pub use password::{hash_password, verify_password};
pub use sms::{create_sms_gateway, LogSmsGateway, RongLianSms, SmsGateway};
pub use storage::{create_storage, LocalStorage, ObjectStorage, QiniuStorage};
pub use user::{FollowAction, OtherUserProfile, UserService, UserServiceError};
pub use verification::{is_valid_mobile, VerificationError, VerificationService};
