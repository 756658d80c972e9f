use serde::{Deserialize, Serialize};

/// A named category posts may belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// Input for creating a group.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title)
    }
}

impl NewGroup {
    pub fn new(title: impl Into<String>, slug: impl Into<String>, description: impl Into<String>) -> Self {
        NewGroup {
            title: title.into(),
            slug: slug.into(),
            description: description.into(),
        }
    }

    /// Title is required and capped at 200 characters; slug is 1..=50 of `[A-Za-z0-9_-]`.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Title cannot be empty".to_string());
        }

        if self.title.chars().count() > 200 {
            return Err("Title cannot exceed 200 characters".to_string());
        }

        if self.slug.is_empty() || self.slug.len() > 50 {
            return Err("Slug must be between 1 and 50 characters".to_string());
        }

        if !self
            .slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err("Slug may contain only latin letters, digits, hyphens and underscores".to_string());
        }

        Ok(())
    }
}
