//! Verification codes
//!
//! Image challenges and SMS codes, both kept in the cache with a short TTL
//! and consumed on first read:
//! - `ImageCode_<image_code_id>` holds the captcha text
//! - `SMSCode_<mobile>` holds the six-digit SMS code

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::config::VerificationConfig;
use crate::services::captcha::CaptchaGenerator;
use crate::services::sms::SmsGateway;

static MOBILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[3456789]\d{9}$").expect("mobile pattern is valid"));

/// Mainland mobile number: 11 digits, starting `13`-`19` except `12`
pub fn is_valid_mobile(mobile: &str) -> bool {
    MOBILE_RE.is_match(mobile)
}

pub fn image_code_key(image_code_id: &str) -> String {
    format!("ImageCode_{}", image_code_id)
}

pub fn sms_code_key(mobile: &str) -> String {
    format!("SMSCode_{}", mobile)
}

/// Random zero-padded six-digit code
pub fn generate_sms_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..=999_999u32))
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Invalid mobile number")]
    InvalidMobile,

    /// The cached code is missing or has expired
    #[error("Verification code expired")]
    Expired,

    #[error("Image code mismatch")]
    ImageCodeMismatch,

    #[error("SMS code mismatch")]
    SmsCodeMismatch,

    #[error("Failed to read verification code: {0}")]
    CacheRead(#[source] anyhow::Error),

    #[error("Failed to store verification code: {0}")]
    CacheWrite(#[source] anyhow::Error),

    #[error("Failed to generate captcha: {0}")]
    Captcha(#[source] anyhow::Error),

    /// The gateway could not be reached
    #[error("SMS gateway error: {0}")]
    Gateway(#[source] anyhow::Error),

    /// The gateway answered but did not accept the message
    #[error("SMS gateway rejected message with result {0}")]
    Rejected(i32),
}

pub struct VerificationService {
    cache: Arc<Cache>,
    captcha: Arc<dyn CaptchaGenerator>,
    sms: Arc<dyn SmsGateway>,
    config: VerificationConfig,
}

impl VerificationService {
    pub fn new(
        cache: Arc<Cache>,
        captcha: Arc<dyn CaptchaGenerator>,
        sms: Arc<dyn SmsGateway>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            cache,
            captcha,
            sms,
            config,
        }
    }

    /// Generate a captcha, remember its text under `image_code_id`, and
    /// return the JPEG bytes
    pub async fn issue_image_code(&self, image_code_id: &str) -> Result<Vec<u8>, VerificationError> {
        let captcha = self.captcha.generate().map_err(VerificationError::Captcha)?;

        self.cache
            .set(
                &image_code_key(image_code_id),
                &captcha.text,
                Duration::from_secs(self.config.image_code_ttl_seconds),
            )
            .await
            .map_err(VerificationError::CacheWrite)?;

        Ok(captcha.image)
    }

    /// Check the image challenge and text a fresh SMS code to `mobile`.
    ///
    /// The image entry is deleted as soon as it has been read, whether or
    /// not it matches.
    pub async fn send_sms_code(
        &self,
        mobile: &str,
        image_code: &str,
        image_code_id: &str,
    ) -> Result<(), VerificationError> {
        if !is_valid_mobile(mobile) {
            return Err(VerificationError::InvalidMobile);
        }

        let key = image_code_key(image_code_id);
        let expected: String = self
            .cache
            .get(&key)
            .await
            .map_err(VerificationError::CacheRead)?
            .ok_or(VerificationError::Expired)?;

        if let Err(e) = self.cache.delete(&key).await {
            tracing::error!("Failed to delete {}: {:#}", key, e);
        }

        if expected.to_lowercase() != image_code.to_lowercase() {
            return Err(VerificationError::ImageCodeMismatch);
        }

        let code = generate_sms_code();
        self.cache
            .set(
                &sms_code_key(mobile),
                &code,
                Duration::from_secs(self.config.sms_code_ttl_seconds),
            )
            .await
            .map_err(VerificationError::CacheWrite)?;

        let datas = [code, (self.config.sms_code_ttl_seconds / 60).to_string()];
        let result = self
            .sms
            .send_template_sms(mobile, &datas, self.config.sms_template_id)
            .await
            .map_err(VerificationError::Gateway)?;

        if result != 0 {
            return Err(VerificationError::Rejected(result));
        }

        tracing::info!("SMS code sent to {}", mobile);
        Ok(())
    }

    /// Check and consume the SMS code stored for `mobile`
    pub async fn consume_sms_code(&self, mobile: &str, sms_code: &str) -> Result<(), VerificationError> {
        let key = sms_code_key(mobile);
        let expected: String = self
            .cache
            .get(&key)
            .await
            .map_err(VerificationError::CacheRead)?
            .ok_or(VerificationError::Expired)?;

        if let Err(e) = self.cache.delete(&key).await {
            tracing::error!("Failed to delete {}: {:#}", key, e);
        }

        if expected != sms_code {
            return Err(VerificationError::SmsCodeMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::services::fakes::{FailingSms, FixedCaptcha, RecordingSms};
    use proptest::prelude::*;

    fn service_with(sms: Arc<dyn SmsGateway>) -> (VerificationService, Arc<Cache>) {
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let service = VerificationService::new(
            cache.clone(),
            Arc::new(FixedCaptcha::new("AB12")),
            sms,
            VerificationConfig::default(),
        );
        (service, cache)
    }

    async fn cached(cache: &Cache, key: &str) -> Option<String> {
        cache.get(key).await.unwrap()
    }

    #[tokio::test]
    async fn test_issue_image_code_caches_text() {
        let (service, cache) = service_with(Arc::new(RecordingSms::default()));

        let image = service.issue_image_code("x1").await.unwrap();

        assert!(!image.is_empty());
        assert_eq!(cached(&cache, "ImageCode_x1").await, Some("AB12".to_string()));
    }

    #[tokio::test]
    async fn test_send_sms_code_success() {
        let sms = Arc::new(RecordingSms::default());
        let (service, cache) = service_with(sms.clone());
        cache
            .set("ImageCode_x1", &"ab12".to_string(), Duration::from_secs(300))
            .await
            .unwrap();

        service.send_sms_code("13800001111", "AB12", "x1").await.unwrap();

        assert_eq!(cached(&cache, "ImageCode_x1").await, None);
        let code = cached(&cache, "SMSCode_13800001111").await.expect("code cached");
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let sent = sms.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "13800001111");
        assert_eq!(sent[0].1, vec![code, "5".to_string()]);
        assert_eq!(sent[0].2, 1);
    }

    #[tokio::test]
    async fn test_send_sms_code_without_image_entry() {
        let sms = Arc::new(RecordingSms::default());
        let (service, cache) = service_with(sms.clone());

        let err = service.send_sms_code("13800001111", "AB12", "x1").await.unwrap_err();

        assert!(matches!(err, VerificationError::Expired));
        assert_eq!(cached(&cache, "SMSCode_13800001111").await, None);
        assert!(sms.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mismatch_still_consumes_image_entry() {
        let sms = Arc::new(RecordingSms::default());
        let (service, cache) = service_with(sms.clone());
        cache
            .set("ImageCode_x1", &"AB12".to_string(), Duration::from_secs(300))
            .await
            .unwrap();

        let err = service.send_sms_code("13800001111", "ZZZZ", "x1").await.unwrap_err();
        assert!(matches!(err, VerificationError::ImageCodeMismatch));
        assert_eq!(cached(&cache, "ImageCode_x1").await, None);

        // A second attempt with the right code finds nothing
        let err = service.send_sms_code("13800001111", "AB12", "x1").await.unwrap_err();
        assert!(matches!(err, VerificationError::Expired));
        assert!(sms.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_mobile_leaves_image_entry() {
        let (service, cache) = service_with(Arc::new(RecordingSms::default()));
        cache
            .set("ImageCode_x1", &"AB12".to_string(), Duration::from_secs(300))
            .await
            .unwrap();

        let err = service.send_sms_code("12800001111", "AB12", "x1").await.unwrap_err();

        assert!(matches!(err, VerificationError::InvalidMobile));
        assert_eq!(cached(&cache, "ImageCode_x1").await, Some("AB12".to_string()));
    }

    #[tokio::test]
    async fn test_gateway_failures() {
        let (service, cache) = service_with(Arc::new(FailingSms::Transport));
        cache
            .set("ImageCode_x1", &"AB12".to_string(), Duration::from_secs(300))
            .await
            .unwrap();
        let err = service.send_sms_code("13800001111", "AB12", "x1").await.unwrap_err();
        assert!(matches!(err, VerificationError::Gateway(_)));

        let (service, cache) = service_with(Arc::new(FailingSms::Rejected));
        cache
            .set("ImageCode_x2", &"AB12".to_string(), Duration::from_secs(300))
            .await
            .unwrap();
        let err = service.send_sms_code("13800001111", "AB12", "x2").await.unwrap_err();
        assert!(matches!(err, VerificationError::Rejected(-1)));
    }

    #[tokio::test]
    async fn test_consume_sms_code() {
        let (service, cache) = service_with(Arc::new(RecordingSms::default()));
        cache
            .set("SMSCode_13800001111", &"012345".to_string(), Duration::from_secs(300))
            .await
            .unwrap();

        service.consume_sms_code("13800001111", "012345").await.unwrap();
        assert_eq!(cached(&cache, "SMSCode_13800001111").await, None);

        let err = service.consume_sms_code("13800001111", "012345").await.unwrap_err();
        assert!(matches!(err, VerificationError::Expired));
    }

    #[tokio::test]
    async fn test_consume_wrong_sms_code() {
        let (service, cache) = service_with(Arc::new(RecordingSms::default()));
        cache
            .set("SMSCode_13800001111", &"012345".to_string(), Duration::from_secs(300))
            .await
            .unwrap();

        let err = service.consume_sms_code("13800001111", "543210").await.unwrap_err();
        assert!(matches!(err, VerificationError::SmsCodeMismatch));
        assert_eq!(cached(&cache, "SMSCode_13800001111").await, None);
    }

    #[test]
    fn test_mobile_examples() {
        assert!(is_valid_mobile("13800001111"));
        assert!(is_valid_mobile("19912345678"));
        assert!(!is_valid_mobile("12800001111"));
        assert!(!is_valid_mobile("1380000111"));
        assert!(!is_valid_mobile("138000011112"));
        assert!(!is_valid_mobile(" 13800001111"));
        assert!(!is_valid_mobile("1380000111a"));
    }

    proptest! {
        #[test]
        fn valid_mobiles_match(second in "[3-9]", rest in "[0-9]{9}") {
            let mobile = format!("1{}{}", second, rest);
            prop_assert!(is_valid_mobile(&mobile));
        }

        #[test]
        fn wrong_length_never_matches(digits in "1[3-9][0-9]{0,8}|1[3-9][0-9]{10,14}") {
            prop_assert!(!is_valid_mobile(&digits));
        }

        #[test]
        fn sms_codes_are_six_digits(_seed in 0u8..50) {
            let code = generate_sms_code();
            prop_assert_eq!(code.len(), 6);
            prop_assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
