use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::group::Group;

/// Number of characters of the text used as the post's display string.
pub const POST_DISPLAY_LEN: usize = 15;

/// Post entity: an authored text entry, optionally grouped and illustrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i32,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub author_id: Uuid,
    pub group_id: Option<i32>,
    /// Path relative to the media root, e.g. `posts/small.gif`.
    pub image: Option<String>,
}

/// A post joined with what every listing needs to render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostCard {
    pub post: Post,
    pub author: String,
    pub group: Option<Group>,
}

/// Input for inserting a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub text: String,
    pub group_id: Option<i32>,
    pub image: Option<String>,
}

/// Fields written by a post edit. `image: None` keeps the stored image.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub text: String,
    pub group_id: Option<i32>,
    pub image: Option<String>,
}

/// An image file received with the post form.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Post create/edit form as submitted.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    /// Raw value of the group select; empty means "no group".
    pub group: String,
    pub image: Option<UploadedImage>,
}

impl Post {
    /// First characters of the text, as shown in admin-like listings and logs.
    pub fn short_text(&self) -> String {
        self.text.chars().take(POST_DISPLAY_LEN).collect()
    }
}

impl PostCard {
    pub fn has_image(&self) -> bool {
        self.post.image.is_some()
    }

    pub fn image_path(&self) -> &str {
        self.post.image.as_deref().unwrap_or_default()
    }

    pub fn has_group(&self) -> bool {
        self.group.is_some()
    }

    pub fn group_slug(&self) -> &str {
        self.group.as_ref().map(|g| g.slug.as_str()).unwrap_or_default()
    }

    pub fn group_title(&self) -> &str {
        self.group.as_ref().map(|g| g.title.as_str()).unwrap_or_default()
    }
}

impl std::fmt::Display for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.short_text())
    }
}

impl PostForm {
    /// Form pre-filled from an existing post, for the edit page.
    pub fn from_post(post: &Post) -> Self {
        PostForm {
            text: post.text.clone(),
            group: post.group_id.map(|id| id.to_string()).unwrap_or_default(),
            image: None,
        }
    }

    /// Validate against the groups that currently exist.
    pub fn validate(&self, groups: &[Group]) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("Text is required".to_string());
        }

        let group = self.group.trim();
        if !group.is_empty() {
            let known = group
                .parse::<i32>()
                .ok()
                .map(|id| groups.iter().any(|g| g.id == id))
                .unwrap_or(false);
            if !known {
                return Err("Select a valid group".to_string());
            }
        }

        if let Some(ref image) = self.image {
            if image.bytes.is_empty() {
                return Err("The submitted image file is empty".to_string());
            }
            crate::media::detect_image_format(&image.bytes)?;
        }

        Ok(())
    }

    /// Trimmed text with the original inner formatting kept.
    pub fn get_normalized_text(&self) -> String {
        self.text.trim().to_string()
    }

    /// Selected group id, `None` when the select was left empty.
    pub fn get_group_id(&self) -> Option<i32> {
        self.group.trim().parse::<i32>().ok()
    }

    /// Whether the given group id is the selected one; used by the form template.
    pub fn is_selected(&self, group_id: &i32) -> bool {
        self.get_group_id() == Some(*group_id)
    }
}
