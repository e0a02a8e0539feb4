use crate::model::form::{FieldValue, Upload};
use serde::{Serialize, Serializer};

/// Public URL prefix under which stored images are served.
pub const MEDIA_URL: &str = "/media/";
/// Directory, relative to the media root, that post images are written to.
pub const POST_IMAGE_DIR: &str = "post_images";

pub const NOT_A_FILE: &str =
    "The submitted data was not a file. Check the encoding type on the form.";
pub const EMPTY_FILE: &str = "The submitted file is empty.";
pub const NO_FILE_NAME: &str = "No filename could be determined.";
pub const INVALID_IMAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
    Bmp,
}

impl ImageFormat {
    /// Formats accepted for upload; everything else the decoder knows is refused.
    #[must_use]
    pub fn from_decoder_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }

    #[must_use]
    pub fn decoder_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Gif => image::ImageFormat::Gif,
            Self::WebP => image::ImageFormat::WebP,
            Self::Bmp => image::ImageFormat::Bmp,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Bmp => "bmp",
        }
    }
}

/// Detects the format from the content and decodes the whole image, so a
/// valid header followed by garbage is refused.
pub fn decode_image(bytes: &[u8]) -> Result<ImageFormat, &'static str> {
    let format = image::guess_format(bytes)
        .ok()
        .and_then(ImageFormat::from_decoder_format)
        .ok_or(INVALID_IMAGE)?;
    image::load_from_memory_with_format(bytes, format.decoder_format())
        .map_err(|_| INVALID_IMAGE)?;

    Ok(format)
}

/// An uploaded file that has been checked to be an image.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ImageUpload {
    pub file_name: String,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn from_upload(upload: Upload) -> Result<Self, &'static str> {
        let file_name = upload
            .file_name
            .filter(|name| !name.is_empty())
            .ok_or(NO_FILE_NAME)?;
        if upload.bytes.is_empty() {
            return Err(EMPTY_FILE);
        }
        let format = decode_image(&upload.bytes)?;

        Ok(Self {
            file_name,
            format,
            bytes: upload.bytes,
        })
    }

    /// File stem reduced to `[A-Za-z0-9_-]`, used in the stored name.
    #[must_use]
    pub fn sanitized_stem(&self) -> String {
        let base = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
        let sanitized: String = stem
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
            .take(64)
            .collect();

        if sanitized.is_empty() {
            "image".to_owned()
        } else {
            sanitized
        }
    }
}

/// Parses the `image` field. `Ok(None)` means "no image".
pub fn image_field(value: FieldValue) -> Result<Option<ImageUpload>, String> {
    match value {
        FieldValue::Null => Ok(None),
        FieldValue::Text(text) if text.is_empty() => Ok(None),
        FieldValue::Text(_) | FieldValue::Unsupported => Err(NOT_A_FILE.to_owned()),
        FieldValue::File(upload) => ImageUpload::from_upload(upload)
            .map(Some)
            .map_err(str::to_owned),
    }
}

/// Name of a stored image relative to the media root, e.g.
/// `post_images/cat_1234.png`. Serialized as its public URL.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct StoredImage(String);

impl StoredImage {
    #[must_use]
    pub fn new(name: String) -> Self {
        Self(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("{MEDIA_URL}{}", self.0)
    }
}

impl Serialize for StoredImage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.url())
    }
}
