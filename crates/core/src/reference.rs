//! Reference images attached to a generation request.

use crate::error::CoreError;

/// Maximum number of reference images per request.
pub const MAX_REFERENCE_IMAGES: usize = 20;

/// An image the user attached to guide generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl ReferenceImage {
    /// Wrap raw file contents, sniffing the format from the header bytes.
    ///
    /// Files that are not a recognised image are rejected.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CoreError> {
        let file_name = file_name.into();
        let format = image::guess_format(&bytes).map_err(|_| {
            CoreError::Validation(format!("'{file_name}' is not a supported image file"))
        })?;
        Ok(Self {
            file_name,
            content_type: format.to_mime_type().to_string(),
            bytes,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Check that adding `adding` images to `existing` stays within the limit.
pub fn validate_reference_count(existing: usize, adding: usize) -> Result<(), CoreError> {
    if existing + adding > MAX_REFERENCE_IMAGES {
        return Err(CoreError::Validation(format!(
            "Maximum {MAX_REFERENCE_IMAGES} reference images allowed (already have {existing})"
        )));
    }
    Ok(())
}
