//! Common API utilities and shared types
//!
//! Query and form parsing shared by the passport, profile and news handlers.

use axum::extract::multipart::{Multipart, MultipartError};
use serde::Deserialize;
use std::collections::HashMap;

use crate::api::middleware::ApiError;

/// Page query shared by every listing: `?p=<page>`, default 1
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub p: Option<String>,
}

/// Parse the `p` query parameter.
///
/// Missing means the first page; anything that is not an integer is a
/// ParamErr. Out-of-range pages are clamped later by the repositories.
pub fn parse_page(p: Option<&str>) -> Result<i64, ApiError> {
    let raw = p.unwrap_or("1");
    raw.trim().parse::<i64>().map_err(|e| {
        tracing::debug!("Invalid page number {:?}: {}", raw, e);
        ApiError::param("参数类型错误")
    })
}

/// Treat a missing or empty string as absent
pub fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parse a required integer id: missing is ParamErr `missing_msg`, a
/// non-integer is ParamErr `参数类型错误`
pub fn parse_id(value: Option<&str>, missing_msg: &str) -> Result<i64, ApiError> {
    let raw = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::param(missing_msg))?;
    raw.parse::<i64>().map_err(|_| ApiError::param("参数类型错误"))
}

/// Integer id from a JSON body, sent either as a number or a string
pub fn json_id(value: Option<&serde_json::Value>, missing_msg: &str) -> Result<i64, ApiError> {
    match value {
        None | Some(serde_json::Value::Null) => Err(ApiError::param(missing_msg)),
        Some(serde_json::Value::String(s)) => parse_id(Some(s.as_str()), missing_msg),
        Some(serde_json::Value::Number(n)) => n.as_i64().ok_or_else(|| ApiError::param("参数类型错误")),
        Some(_) => Err(ApiError::param("参数类型错误")),
    }
}

/// Multipart form split into text fields and file parts
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub texts: HashMap<String, String>,
    pub files: HashMap<String, Vec<u8>>,
}

impl MultipartForm {
    /// Drain a multipart body. Parts carrying a file name are kept as bytes,
    /// the rest as text.
    pub async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }
            if field.file_name().is_some() {
                let data = field.bytes().await?.to_vec();
                form.files.insert(name, data);
            } else {
                let text = field.text().await?;
                form.texts.insert(name, text);
            }
        }

        Ok(form)
    }

    /// Non-empty text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Non-empty file part
    pub fn take_file(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name).filter(|data| !data.is_empty())
    }
}
