//! Newsdesk - account, profile and publishing service for a news site
//!
//! This library provides verification codes, sessions, profile editing,
//! news submission and the collect/follow relations behind the site's
//! user pages.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod templates;
