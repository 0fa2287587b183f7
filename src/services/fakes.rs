//! In-process stand-ins for the external collaborators, used by tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use crate::services::captcha::{Captcha, CaptchaGenerator};
use crate::services::sms::SmsGateway;
use crate::services::storage::ObjectStorage;

/// Always produces the same text
pub struct FixedCaptcha {
    text: String,
}

impl FixedCaptcha {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl CaptchaGenerator for FixedCaptcha {
    fn generate(&self) -> Result<Captcha> {
        Ok(Captcha {
            text: self.text.clone(),
            image: vec![0xFF, 0xD8, 0xFF, 0xD9],
        })
    }
}

type SentSms = (String, Vec<String>, u32);

/// Accepts every message and remembers it
#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<SentSms>>,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SmsGateway for RecordingSms {
    async fn send_template_sms(&self, mobile: &str, datas: &[String], template_id: u32) -> Result<i32> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push((mobile.to_string(), datas.to_vec(), template_id));
        Ok(0)
    }
}

pub enum FailingSms {
    /// The gateway cannot be reached
    Transport,
    /// The gateway answers with a non-zero result
    Rejected,
}

#[async_trait]
impl SmsGateway for FailingSms {
    async fn send_template_sms(&self, _mobile: &str, _datas: &[String], _template_id: u32) -> Result<i32> {
        match self {
            FailingSms::Transport => Err(anyhow!("connection refused")),
            FailingSms::Rejected => Ok(-1),
        }
    }
}

/// Keeps uploads in memory and hands out sequential keys
#[derive(Default)]
pub struct MemoryStorage {
    uploads: Mutex<Vec<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, data: Vec<u8>) -> Result<String> {
        let mut uploads = self.uploads.lock().map_err(|_| anyhow!("poisoned"))?;
        uploads.push(data);
        Ok(format!("key{}", uploads.len()))
    }
}

pub struct FailingStorage;

#[async_trait]
impl ObjectStorage for FailingStorage {
    async fn upload(&self, _data: Vec<u8>) -> Result<String> {
        Err(anyhow!("storage unavailable"))
    }
}
