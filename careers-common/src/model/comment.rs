use crate::model::{
    Id,
    form::{FormFields, ValidationErrors, required_text},
    post::PostMarker,
    text::{Content, Username},
};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub username: Username,
    pub content: Content,
    #[serde(with = "time::serde::rfc3339")]
    pub created_datetime: OffsetDateTime,
    pub post: Id<PostMarker>,
}

/// The owning post is never read from the body; it comes from the path.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateComment {
    pub username: Username,
    pub content: Content,
}

impl CreateComment {
    pub fn from_fields(mut fields: FormFields) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let username = errors.collect(
            "username",
            required_text(fields.take("username"), Username::new),
        );
        let content = errors.collect(
            "content",
            required_text(fields.take("content"), Content::new),
        );

        errors.finish(|| Self {
            username: username.unwrap_or_default(),
            content: content.unwrap_or_default(),
        })
    }
}
