//! Card-image upload handling: data-URL envelope in, storage object out.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// A decoded, format-verified upload ready for storage.
#[derive(Debug)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
    pub content_type: &'static str,
}

fn data_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^data:image/([a-z]+);base64,(.+)$").unwrap())
}

/// Decode a `data:image/...;base64,...` payload and verify it really is an
/// image. The declared subtype is ignored — the stored extension and content
/// type come from sniffing the decoded bytes.
pub fn decode_data_url(input: &str) -> Result<UploadedImage> {
    let captures = data_url_re()
        .captures(input)
        .ok_or_else(|| anyhow!("Invalid image format"))?;

    let bytes = BASE64
        .decode(captures.get(2).map(|m| m.as_str()).unwrap_or_default())
        .map_err(|e| anyhow!("Invalid base64 payload: {}", e))?;

    let format = image::guess_format(&bytes).map_err(|_| anyhow!("Unrecognized image data"))?;
    let (extension, content_type) = match format {
        ImageFormat::Png => ("png", "image/png"),
        ImageFormat::Jpeg => ("jpg", "image/jpeg"),
        ImageFormat::Gif => ("gif", "image/gif"),
        ImageFormat::WebP => ("webp", "image/webp"),
        ImageFormat::Bmp => ("bmp", "image/bmp"),
        other => return Err(anyhow!("Unsupported image format: {:?}", other)),
    };

    Ok(UploadedImage {
        bytes,
        extension,
        content_type,
    })
}

/// Unique storage key for an upload.
pub fn object_key(image: &UploadedImage) -> String {
    format!("{}.{}", Uuid::new_v4().simple(), image.extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn png_data_url() -> String {
        format!("data:image/png;base64,{}", BASE64.encode(PNG_MAGIC))
    }

    #[test]
    fn decodes_a_png_data_url() {
        let image = decode_data_url(&png_data_url()).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes, PNG_MAGIC);
    }

    #[test]
    fn sniffed_format_wins_over_declared_subtype() {
        // Claims jpeg, carries png bytes
        let url = format!("data:image/jpeg;base64,{}", BASE64.encode(PNG_MAGIC));
        let image = decode_data_url(&url).unwrap();
        assert_eq!(image.extension, "png");
    }

    #[test]
    fn rejects_a_bare_base64_string() {
        assert!(decode_data_url("aGVsbG8=").is_err());
    }

    #[test]
    fn rejects_non_image_payloads() {
        let url = format!("data:image/png;base64,{}", BASE64.encode(b"just text"));
        assert!(decode_data_url(&url).is_err());
    }

    #[test]
    fn object_keys_are_unique_and_carry_the_extension() {
        let image = decode_data_url(&png_data_url()).unwrap();
        let a = object_key(&image);
        let b = object_key(&image);
        assert_ne!(a, b);
        assert!(a.ends_with(".png"));
    }
}
