use std::path::Path;

use mime_guess::mime;
use stashtag_core::MediaKind;

use crate::{ClassificationError, ContentClassifier};

/// Classifies files by the MIME type registered for their extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeClassifier;

impl ContentClassifier for MimeClassifier {
    fn classify(&self, path: &Path) -> Result<MediaKind, ClassificationError> {
        let guess = mime_guess::from_path(path)
            .first()
            .ok_or_else(|| ClassificationError::Unknown(path.to_path_buf()))?;
        if guess.type_() == mime::VIDEO {
            Ok(MediaKind::Video)
        } else {
            Ok(MediaKind::Other)
        }
    }
}
