use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{AppError, AppResult};

const IMAGE_DIR: &str = "recipes/images";

const ALLOWED_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Writes decoded recipe images below `root` and hands back their public URL.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    url_prefix: String,
}

#[derive(Debug, PartialEq)]
pub struct DecodedImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub async fn save(&self, data_uri: &str) -> AppResult<String> {
        let image = decode_data_uri(data_uri)?;
        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), image.extension);

        let dir = self.root.join(IMAGE_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file_name), &image.bytes).await?;

        tracing::debug!(file = %file_name, size = image.bytes.len(), "stored recipe image");
        Ok(format!("{}/{IMAGE_DIR}/{file_name}", self.url_prefix))
    }

    /// Removes a file written by [`ImageStore::save`]. URLs this store did not
    /// hand out are ignored.
    pub async fn discard(&self, url: &str) {
        let prefix = format!("{}/{IMAGE_DIR}/", self.url_prefix);
        let Some(file_name) = url.strip_prefix(&prefix) else {
            return;
        };
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return;
        }

        if let Err(err) = tokio::fs::remove_file(self.root.join(IMAGE_DIR).join(file_name)).await {
            tracing::warn!(file = %file_name, "failed to remove recipe image: {err}");
        }
    }
}

/// Parses `data:image/<type>;base64,<payload>`. Only raster formats a browser
/// renders inline are accepted, and the payload must actually be one.
pub fn decode_data_uri(data_uri: &str) -> AppResult<DecodedImage> {
    let invalid = || AppError::validation("image must be a base64 encoded png, jpeg, gif or webp");

    let rest = data_uri.trim().strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;

    let declared = match mime.to_ascii_lowercase().as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        other => other.to_string(),
    };
    if !ALLOWED_TYPES.contains(&declared.as_str()) {
        return Err(invalid());
    }

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    let sniffed = infer::get(&bytes).ok_or_else(invalid)?;
    if sniffed.mime_type() != declared {
        return Err(invalid());
    }

    Ok(DecodedImage {
        extension: sniffed.extension().to_string(),
        bytes,
    })
}
