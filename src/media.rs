// Media storage
// Uploaded post images written under the media root and served from /media/

use image::{ImageFormat, ImageReader};
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::UploadedImage;

/// Sub-directory of the media root holding post images.
pub const POSTS_DIR: &str = "posts";

/// Formats accepted as post illustrations.
const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

/// Identify an uploaded image from its bytes; the client's content type and
/// file name are not trusted. The header must parse as the detected format.
pub fn detect_image_format(bytes: &[u8]) -> Result<ImageFormat, String> {
    const INVALID: &str =
        "Upload a valid image. The file you uploaded was either not an image or a corrupted image";

    let format = image::guess_format(bytes).map_err(|_| INVALID.to_string())?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(INVALID.to_string());
    }

    ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|_| INVALID.to_string())?;

    Ok(format)
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MediaStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an uploaded image and return its path relative to the media root,
    /// e.g. `posts/small.gif`. The extension follows the detected format and a
    /// taken name gets a short random suffix.
    pub async fn save_post_image(&self, image: &UploadedImage) -> AppResult<String> {
        let format = detect_image_format(&image.bytes).map_err(AppError::Validation)?;

        let dir = self.root.join(POSTS_DIR);
        fs::create_dir_all(&dir).await?;

        let stem = file_stem(&image.file_name);
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let mut candidate = format!("{}.{}", stem, extension);
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&candidate))
                .await
            {
                Ok(mut file) => {
                    file.write_all(&image.bytes).await?;
                    file.flush().await?;
                    break;
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    let suffix = Uuid::new_v4().simple().to_string();
                    candidate = format!("{}_{}.{}", stem, &suffix[..7], extension);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let relative = format!("{}/{}", POSTS_DIR, candidate);
        info!("Stored uploaded image at {}", relative);
        Ok(relative)
    }
}

/// Keep the final path component and replace anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Sanitized file name without its extension.
fn file_stem(file_name: &str) -> String {
    let name = sanitize_file_name(file_name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00,
        0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C,
        0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00,
        0x3B,
    ];

    fn upload(name: &str, content_type: &str, bytes: &[u8]) -> UploadedImage {
        UploadedImage {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_save_post_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = MediaStorage::new(dir.path());

        let path = storage
            .save_post_image(&upload("small.gif", "image/gif", SMALL_GIF))
            .await
            .expect("save");

        assert_eq!(path, "posts/small.gif");
        let written = std::fs::read(dir.path().join(&path)).expect("read back");
        assert_eq!(written, SMALL_GIF);
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = MediaStorage::new(dir.path());
        let gif = upload("small.gif", "image/gif", SMALL_GIF);

        let first = storage.save_post_image(&gif).await.expect("save");
        let second = storage.save_post_image(&gif).await.expect("save");

        assert_ne!(first, second);
        assert!(second.starts_with("posts/small_"));
        assert!(second.ends_with(".gif"));
    }

    #[tokio::test]
    async fn test_extension_follows_detected_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = MediaStorage::new(dir.path());

        let path = storage
            .save_post_image(&upload("page.html", "text/html", SMALL_GIF))
            .await
            .expect("save");

        assert_eq!(path, "posts/page.gif");
    }

    #[tokio::test]
    async fn test_markup_is_never_stored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = MediaStorage::new(dir.path());

        let result = storage
            .save_post_image(&upload("x.html", "image/png", b"<script>alert(1)</script>"))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!dir.path().join("posts/x.html").exists());
    }

    #[test]
    fn test_detect_image_format() {
        assert_eq!(detect_image_format(SMALL_GIF), Ok(ImageFormat::Gif));
        assert!(detect_image_format(b"<html><body>hi</body></html>").is_err());
        assert!(detect_image_format(b"").is_err());
        // Right magic, truncated header
        assert!(detect_image_format(b"GIF89a").is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("small.gif"), "small.gif");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\photos\\my cat.png"), "my_cat.png");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(file_stem("x.html"), "x");
        assert_eq!(file_stem("noext"), "noext");
    }
}
