//! SMS gateway
//!
//! Template SMS delivery. `RongLianSms` talks to the RongLian (cloopen) REST
//! API; `LogSmsGateway` only writes the message to the log and is meant for
//! development.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use data_encoding::BASE64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{SmsConfig, SmsDriver};

/// Status code the RongLian API reports for an accepted message
const RONGLIAN_SUCCESS: &str = "000000";

/// The gateway expects timestamps in China Standard Time
const CST_OFFSET_SECONDS: i32 = 8 * 3600;

/// Sends template SMS messages
///
/// Returns `0` when the provider accepted the message and `-1` when it
/// rejected it. Transport failures are errors.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_template_sms(&self, mobile: &str, datas: &[String], template_id: u32) -> Result<i32>;
}

/// Build the gateway selected in configuration
pub fn create_sms_gateway(config: &SmsConfig) -> Result<Arc<dyn SmsGateway>> {
    match config.driver {
        SmsDriver::Log => Ok(Arc::new(LogSmsGateway)),
        SmsDriver::Ronglian => Ok(Arc::new(RongLianSms::new(config)?)),
    }
}

/// Development gateway that logs instead of sending
#[derive(Debug, Default, Clone)]
pub struct LogSmsGateway;

#[async_trait]
impl SmsGateway for LogSmsGateway {
    async fn send_template_sms(&self, mobile: &str, datas: &[String], template_id: u32) -> Result<i32> {
        tracing::info!(
            "SMS template {} to {}: {}",
            template_id,
            mobile,
            datas.join(", ")
        );
        Ok(0)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSmsRequest<'a> {
    to: &'a str,
    app_id: &'a str,
    template_id: String,
    datas: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSmsResponse {
    status_code: String,
    #[serde(default)]
    status_msg: Option<String>,
}

/// RongLian (cloopen) template SMS client
pub struct RongLianSms {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    app_id: String,
    base_url: String,
}

impl std::fmt::Debug for RongLianSms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RongLianSms")
            .field("account_sid", &self.account_sid)
            .field("app_id", &self.app_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RongLianSms {
    pub fn new(config: &SmsConfig) -> Result<Self> {
        if config.account_sid.is_empty() || config.auth_token.is_empty() || config.app_id.is_empty() {
            bail!("RongLian SMS requires account_sid, auth_token and app_id");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            app_id: config.app_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Request timestamp, `YYYYMMDDHHMMSS` in China Standard Time
    fn timestamp() -> Result<String> {
        let offset = FixedOffset::east_opt(CST_OFFSET_SECONDS)
            .ok_or_else(|| anyhow!("Invalid timezone offset"))?;
        Ok(Utc::now().with_timezone(&offset).format("%Y%m%d%H%M%S").to_string())
    }

    /// Upper-case hex MD5 of sid + token + timestamp
    fn signature(&self, timestamp: &str) -> String {
        let digest = md5::compute(format!("{}{}{}", self.account_sid, self.auth_token, timestamp));
        format!("{:X}", digest)
    }

    /// Base64 of `sid:timestamp`
    fn authorization(&self, timestamp: &str) -> String {
        BASE64.encode(format!("{}:{}", self.account_sid, timestamp).as_bytes())
    }

    fn endpoint(&self, timestamp: &str) -> String {
        format!(
            "{}/Accounts/{}/SMS/TemplateSMS?sig={}",
            self.base_url,
            self.account_sid,
            self.signature(timestamp)
        )
    }
}

#[async_trait]
impl SmsGateway for RongLianSms {
    async fn send_template_sms(&self, mobile: &str, datas: &[String], template_id: u32) -> Result<i32> {
        let timestamp = Self::timestamp()?;
        let body = TemplateSmsRequest {
            to: mobile,
            app_id: &self.app_id,
            template_id: template_id.to_string(),
            datas,
        };

        let response = self
            .client
            .post(self.endpoint(&timestamp))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json;charset=utf-8")
            .header("Authorization", self.authorization(&timestamp))
            .json(&body)
            .send()
            .await
            .context("Failed to reach SMS gateway")?;

        let result: TemplateSmsResponse = response
            .json()
            .await
            .context("Failed to parse SMS gateway response")?;

        if result.status_code == RONGLIAN_SUCCESS {
            Ok(0)
        } else {
            tracing::warn!(
                "SMS gateway rejected message to {}: {} {}",
                mobile,
                result.status_code,
                result.status_msg.unwrap_or_default()
            );
            Ok(-1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ronglian_config() -> SmsConfig {
        SmsConfig {
            driver: SmsDriver::Ronglian,
            account_sid: "8aaf0708".to_string(),
            auth_token: "token".to_string(),
            app_id: "app".to_string(),
            base_url: "https://app.cloopen.com:8883/2013-12-26/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_gateway_accepts() {
        let datas = vec!["123456".to_string(), "5".to_string()];
        let result = LogSmsGateway
            .send_template_sms("13800001111", &datas, 1)
            .await
            .unwrap();
        assert_eq!(result, 0);
    }

    #[test]
    fn test_ronglian_requires_credentials() {
        let config = SmsConfig {
            auth_token: String::new(),
            ..ronglian_config()
        };
        assert!(RongLianSms::new(&config).is_err());
        assert!(create_sms_gateway(&config).is_err());
    }

    #[test]
    fn test_signature_is_uppercase_md5() {
        let sms = RongLianSms::new(&ronglian_config()).unwrap();
        let sig = sms.signature("20180309140500");

        let expected = format!("{:X}", md5::compute("8aaf0708token20180309140500"));
        assert_eq!(sig, expected);
        assert_eq!(sig.len(), 32);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_authorization_header() {
        let sms = RongLianSms::new(&ronglian_config()).unwrap();
        let header = sms.authorization("20180309140500");
        let decoded = BASE64.decode(header.as_bytes()).unwrap();
        assert_eq!(decoded, b"8aaf0708:20180309140500");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let sms = RongLianSms::new(&ronglian_config()).unwrap();
        let url = sms.endpoint("20180309140500");
        assert!(url.starts_with(
            "https://app.cloopen.com:8883/2013-12-26/Accounts/8aaf0708/SMS/TemplateSMS?sig="
        ));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = RongLianSms::timestamp().unwrap();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_request_body_shape() {
        let datas = vec!["123456".to_string(), "5".to_string()];
        let body = TemplateSmsRequest {
            to: "13800001111",
            app_id: "app",
            template_id: "1".to_string(),
            datas: &datas,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["appId"], "app");
        assert_eq!(json["templateId"], "1");
        assert_eq!(json["datas"][0], "123456");
    }
}
