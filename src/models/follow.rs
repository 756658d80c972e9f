use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directed subscription: `user_id` follows `author_id`.
///
/// At most one row exists per pair and a user never follows themself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub id: i32,
    pub user_id: Uuid,
    pub author_id: Uuid,
}
