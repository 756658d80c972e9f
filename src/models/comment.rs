use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// A comment left under a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i32,
    pub post_id: i32,
    pub author_id: Uuid,
    pub text: String,
    pub created: DateTime<Utc>,
}

/// A comment together with its author's username.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentCard {
    pub comment: Comment,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i32,
    pub author_id: Uuid,
    pub text: String,
}

/// Comment form payload (`POST /posts/<id>/add_comment/`).
#[derive(Debug, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("Comment text cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn get_normalized_text(&self) -> String {
        self.text.trim().to_string()
    }
}
