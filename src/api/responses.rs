//! Shared API response types
//!
//! Successful JSON responses use the same envelope as errors, with `errno`
//! set to `"0"` and an optional `data` payload.

use axum::Json;
use serde::Serialize;

use crate::api::middleware::RetCode;
use crate::models::{NewsBasicDict, Paginated};

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub errno: &'static str,
    pub errmsg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub type JsonEnvelope<T = ()> = Json<Envelope<T>>;

/// `{"errno": "0", "errmsg": "OK"}`
pub fn ok() -> JsonEnvelope {
    ok_msg("OK")
}

pub fn ok_msg(errmsg: impl Into<String>) -> JsonEnvelope {
    Json(Envelope {
        errno: RetCode::Ok.errno(),
        errmsg: errmsg.into(),
        data: None,
    })
}

pub fn ok_with<T: Serialize>(data: T) -> JsonEnvelope<T> {
    Json(Envelope {
        errno: RetCode::Ok.errno(),
        errmsg: "OK".to_string(),
        data: Some(data),
    })
}

/// `data` of the pic_info upload
#[derive(Debug, Serialize)]
pub struct AvatarData {
    pub avatar_url: String,
}

/// `data` of the other-user news listing
#[derive(Debug, Serialize)]
pub struct NewsListData {
    pub news_list: Vec<NewsBasicDict>,
    pub total_page: i64,
    pub current_page: i64,
}

impl From<Paginated<NewsBasicDict>> for NewsListData {
    fn from(page: Paginated<NewsBasicDict>) -> Self {
        Self {
            total_page: page.total_pages(),
            current_page: page.page,
            news_list: page.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_omits_data() {
        let Json(envelope) = ok_msg("发送成功");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, serde_json::json!({"errno": "0", "errmsg": "发送成功"}));
    }

    #[test]
    fn test_ok_with_data() {
        let Json(envelope) = ok_with(AvatarData {
            avatar_url: "http://cdn.example/key1".to_string(),
        });
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["errno"], "0");
        assert_eq!(value["data"]["avatar_url"], "http://cdn.example/key1");
    }
}
