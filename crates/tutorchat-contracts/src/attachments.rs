use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

pub const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    TooLarge { bytes: u64, limit: u64 },
    Malformed(String),
    UnsupportedMediaType(String),
}

impl AttachmentError {
    pub fn is_too_large(&self) -> bool {
        matches!(self, AttachmentError::TooLarge { .. })
    }
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::TooLarge { bytes, limit } => write!(
                f,
                "Image is too large ({:.1} MB). Please choose an image under {} MB.",
                *bytes as f64 / (1024.0 * 1024.0),
                limit / (1024 * 1024)
            ),
            AttachmentError::Malformed(reason) => write!(f, "Invalid image attachment: {reason}"),
            AttachmentError::UnsupportedMediaType(media_type) => {
                write!(f, "Unsupported attachment type '{media_type}'; only images can be sent.")
            }
        }
    }
}

impl std::error::Error for AttachmentError {}

/// An image carried inline with a turn, kept in its transport encoding
/// (base64) so it can be shown, exported, or decoded on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    media_type: String,
    data: String,
    byte_len: u64,
}

impl InlineImage {
    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Result<Self, AttachmentError> {
        let media_type = normalize_media_type(media_type)?;
        let byte_len = bytes.len() as u64;
        check_size(byte_len)?;
        if bytes.is_empty() {
            return Err(AttachmentError::Malformed("image is empty".to_string()));
        }
        Ok(Self {
            media_type,
            data: BASE64.encode(bytes),
            byte_len,
        })
    }

    /// Parses `data:<mediaType>;base64,<data>`.
    pub fn from_data_url(raw: &str) -> Result<Self, AttachmentError> {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("data:") else {
            return Err(AttachmentError::Malformed(
                "expected a data URL starting with 'data:'".to_string(),
            ));
        };
        let Some((header, data)) = rest.split_once(";base64,") else {
            return Err(AttachmentError::Malformed(
                "data URL is not base64 encoded".to_string(),
            ));
        };
        let media_type = header.split(';').next().unwrap_or_default();
        let media_type = normalize_media_type(media_type)?;
        let data = data.trim();
        if data.is_empty() {
            return Err(AttachmentError::Malformed("image data is empty".to_string()));
        }
        let decoded = BASE64
            .decode(data.as_bytes())
            .map_err(|err| AttachmentError::Malformed(format!("base64 decode failed: {err}")))?;
        let byte_len = decoded.len() as u64;
        check_size(byte_len)?;
        Ok(Self {
            media_type,
            data: data.to_string(),
            byte_len,
        })
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn decode(&self) -> Result<Vec<u8>, AttachmentError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| AttachmentError::Malformed(format!("base64 decode failed: {err}")))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

pub fn check_size(bytes: u64) -> Result<(), AttachmentError> {
    if bytes > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            bytes,
            limit: MAX_ATTACHMENT_BYTES,
        });
    }
    Ok(())
}

fn normalize_media_type(raw: &str) -> Result<String, AttachmentError> {
    let media_type = raw.trim().to_ascii_lowercase();
    if media_type.is_empty() {
        return Err(AttachmentError::Malformed("media type is missing".to_string()));
    }
    if !media_type.starts_with("image/") {
        return Err(AttachmentError::UnsupportedMediaType(media_type));
    }
    Ok(media_type)
}

#[cfg(test)]
mod tests {
    use super::{AttachmentError, InlineImage, MAX_ATTACHMENT_BYTES};

    #[test]
    fn data_url_splits_media_type_and_data() {
        let image = InlineImage::from_data_url("data:image/png;base64,AAAA").unwrap();
        assert_eq!(image.media_type(), "image/png");
        assert_eq!(image.data(), "AAAA");
        assert_eq!(image.byte_len(), 3);
        assert_eq!(image.decode().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn data_url_ignores_extra_header_parameters() {
        let image = InlineImage::from_data_url("data:image/jpeg;name=hw.jpg;base64,/9j/").unwrap();
        assert_eq!(image.media_type(), "image/jpeg");
        assert_eq!(image.data(), "/9j/");
    }

    #[test]
    fn data_url_rejects_non_images_and_garbage() {
        assert_eq!(
            InlineImage::from_data_url("data:text/plain;base64,AAAA"),
            Err(AttachmentError::UnsupportedMediaType("text/plain".to_string()))
        );
        assert!(matches!(
            InlineImage::from_data_url("image/png;base64,AAAA"),
            Err(AttachmentError::Malformed(_))
        ));
        assert!(matches!(
            InlineImage::from_data_url("data:image/png,AAAA"),
            Err(AttachmentError::Malformed(_))
        ));
        assert!(matches!(
            InlineImage::from_data_url("data:image/png;base64,@@@"),
            Err(AttachmentError::Malformed(_))
        ));
    }

    #[test]
    fn oversized_bytes_are_rejected() {
        let bytes = vec![1u8; (MAX_ATTACHMENT_BYTES + 1) as usize];
        let err = InlineImage::from_bytes("image/png", &bytes).err();
        assert!(err.map(|value| value.is_too_large()).unwrap_or(false));

        let exact = vec![1u8; MAX_ATTACHMENT_BYTES as usize];
        assert!(InlineImage::from_bytes("image/png", &exact).is_ok());
    }

    #[test]
    fn from_bytes_round_trips_to_data_url() {
        let image = InlineImage::from_bytes("IMAGE/PNG", &[137, 80, 78, 71]).unwrap();
        let reparsed = InlineImage::from_data_url(&image.to_data_url()).unwrap();
        assert_eq!(reparsed, image);
        assert_eq!(reparsed.media_type(), "image/png");
    }

    #[test]
    fn too_large_message_mentions_limit() {
        let err = AttachmentError::TooLarge {
            bytes: 6 * 1024 * 1024,
            limit: MAX_ATTACHMENT_BYTES,
        };
        assert_eq!(
            err.to_string(),
            "Image is too large (6.0 MB). Please choose an image under 5 MB."
        );
    }
}
