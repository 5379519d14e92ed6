use std::fs;
use std::path::Path;

use tutorchat_contracts::attachments::{check_size, InlineImage};

use crate::errors::{ChatError, ErrorKind};

/// Loads an image file as an inline attachment. The size cap is checked
/// from metadata before the file is read.
pub fn load_image_attachment(path: &Path) -> Result<InlineImage, ChatError> {
    let metadata = fs::metadata(path).map_err(|err| {
        ChatError::new(
            ErrorKind::InvalidAttachment,
            format!("Cannot read image {}: {err}", path.display()),
        )
    })?;
    if !metadata.is_file() {
        return Err(ChatError::new(
            ErrorKind::InvalidAttachment,
            format!("{} is not a file", path.display()),
        ));
    }
    check_size(metadata.len())?;

    let bytes = fs::read(path).map_err(|err| {
        ChatError::new(
            ErrorKind::InvalidAttachment,
            format!("Cannot read image {}: {err}", path.display()),
        )
    })?;
    let media_type = image::guess_format(&bytes)
        .ok()
        .map(|format| format.to_mime_type())
        .or_else(|| mime_for_path(path))
        .ok_or_else(|| {
            ChatError::new(
                ErrorKind::InvalidAttachment,
                format!("{} does not look like an image", path.display()),
            )
        })?;
    Ok(InlineImage::from_bytes(media_type, &bytes)?)
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::load_image_attachment;
    use crate::errors::ErrorKind;

    #[test]
    fn sniffs_media_type_from_content() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // Extension says jpeg, bytes say png.
        let path = temp.path().join("exercise.jpg");
        RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])).save_with_format(&path, ImageFormat::Png)?;

        let image = load_image_attachment(&path)?;
        assert_eq!(image.media_type(), "image/png");
        assert_eq!(image.byte_len(), fs::metadata(&path)?.len());
        Ok(())
    }

    #[test]
    fn falls_back_to_extension_for_unknown_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.heic");
        fs::write(&path, b"not really decodable")?;
        assert_eq!(load_image_attachment(&path)?.media_type(), "image/heic");
        Ok(())
    }

    #[test]
    fn rejects_oversized_and_non_image_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let big = temp.path().join("big.png");
        fs::write(&big, vec![0u8; 5 * 1024 * 1024 + 1])?;
        let err = load_image_attachment(&big).err().map(|err| err.kind());
        assert_eq!(err, Some(ErrorKind::PayloadTooLarge));

        let text = temp.path().join("notes.txt");
        fs::write(&text, "2x + 3 = 7")?;
        let err = load_image_attachment(&text).err().map(|err| err.kind());
        assert_eq!(err, Some(ErrorKind::InvalidAttachment));

        let missing = temp.path().join("missing.png");
        assert!(load_image_attachment(&missing).is_err());
        Ok(())
    }
}
