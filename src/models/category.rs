//! Category model

use serde::{Deserialize, Serialize};

/// News category.
///
/// The row with the lowest id is the "latest" pseudo-category shown on the
/// home page; it is never offered as a publishing target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}
