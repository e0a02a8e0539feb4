use crate::model::{
    Id,
    comment::Comment,
    form::{FormFields, ValidationErrors, optional_text, required_text},
    image::{ImageUpload, StoredImage, image_field},
    text::{Content, Title, Username},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub username: Username,
    #[serde(with = "time::serde::rfc3339")]
    pub created_datetime: OffsetDateTime,
    pub title: Title,
    pub content: Content,
    pub likes: u32,
    pub image: Option<StoredImage>,
    pub comments: Vec<Comment>,
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} by {}", self.title, self.username)
    }
}

/// A new post. `Image` is the raw upload until the api layer has stored it.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost<Image = ImageUpload> {
    pub username: Username,
    pub title: Title,
    pub content: Content,
    pub image: Option<Image>,
}

impl<Image> CreatePost<Image> {
    #[must_use]
    pub fn with_image<Stored>(self, image: Option<Stored>) -> CreatePost<Stored> {
        CreatePost {
            username: self.username,
            title: self.title,
            content: self.content,
            image,
        }
    }
}

impl CreatePost {
    pub fn from_fields(mut fields: FormFields) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let username = errors.collect(
            "username",
            required_text(fields.take("username"), Username::new),
        );
        let title = errors.collect("title", required_text(fields.take("title"), Title::new));
        let content = errors.collect(
            "content",
            required_text(fields.take("content"), Content::new),
        );
        let image = errors
            .collect(
                "image",
                fields.take("image").map(image_field).transpose(),
            )
            .flatten()
            .flatten();

        errors.finish(|| Self {
            username: username.unwrap_or_default(),
            title: title.unwrap_or_default(),
            content: content.unwrap_or_default(),
            image,
        })
    }
}

/// Partial update. `None` leaves a field untouched; `image: Some(None)` clears
/// the image.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdatePost<Image = ImageUpload> {
    pub username: Option<Username>,
    pub title: Option<Title>,
    pub content: Option<Content>,
    pub image: Option<Option<Image>>,
}

impl<Image> Default for UpdatePost<Image> {
    fn default() -> Self {
        Self {
            username: None,
            title: None,
            content: None,
            image: None,
        }
    }
}

impl<Image> UpdatePost<Image> {
    #[must_use]
    pub fn with_image<Stored>(self, image: Option<Option<Stored>>) -> UpdatePost<Stored> {
        UpdatePost {
            username: self.username,
            title: self.title,
            content: self.content,
            image,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.title.is_none()
            && self.content.is_none()
            && self.image.is_none()
    }
}

impl UpdatePost {
    pub fn from_fields(mut fields: FormFields) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let username = errors
            .collect(
                "username",
                optional_text(fields.take("username"), Username::new),
            )
            .flatten();
        let title = errors
            .collect("title", optional_text(fields.take("title"), Title::new))
            .flatten();
        let content = errors
            .collect(
                "content",
                optional_text(fields.take("content"), Content::new),
            )
            .flatten();
        let image = errors
            .collect(
                "image",
                fields.take("image").map(image_field).transpose(),
            )
            .flatten();

        errors.finish(|| Self {
            username,
            title,
            content,
            image,
        })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeStatus {
    Liked,
    Unliked,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct LikeResponse {
    pub status: LikeStatus,
    pub likes: u32,
}
