use careers_common::model::{
    Id, ModelValidationError,
    comment::Comment,
    image::StoredImage,
    post::Post,
    text::{Content, Title, Username},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub id: i64,
    pub username: String,
    pub title: String,
    pub content: String,
    pub created_datetime: i64,
    pub likes: i64,
    pub image: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub id: i64,
    pub post_id: i64,
    pub username: String,
    pub content: String,
    pub created_datetime: i64,
}

/// Timestamps are stored as whole microseconds since the unix epoch.
pub(crate) fn timestamp_to_db(time: OffsetDateTime) -> i64 {
    i64::try_from(time.unix_timestamp_nanos() / 1_000).unwrap_or(i64::MAX)
}

pub(crate) fn timestamp_from_db(micros: i64) -> Result<OffsetDateTime, ModelValidationError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|_| ModelValidationError::Timestamp(micros))
}

/// Current time at the precision it survives a database round trip with.
pub(crate) fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

fn username(value: String) -> Result<Username, ModelValidationError> {
    Username::new(value).map_err(|error| ModelValidationError::Text {
        field: "username",
        error,
    })
}

fn content(value: String) -> Result<Content, ModelValidationError> {
    Content::new(value).map_err(|error| ModelValidationError::Text {
        field: "content",
        error,
    })
}

impl PostRecord {
    pub fn into_post(self, comments: Vec<Comment>) -> Result<Post, ModelValidationError> {
        Ok(Post {
            id: Id::from_db(self.id),
            username: username(self.username)?,
            created_datetime: timestamp_from_db(self.created_datetime)?,
            title: Title::new(self.title).map_err(|error| ModelValidationError::Text {
                field: "title",
                error,
            })?,
            content: content(self.content)?,
            likes: u32::try_from(self.likes).map_err(|_| ModelValidationError::Likes(self.likes))?,
            image: self.image.filter(|name| !name.is_empty()).map(StoredImage::new),
            comments,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.id),
            username: username(value.username)?,
            content: content(value.content)?,
            created_datetime: timestamp_from_db(value.created_datetime)?,
            post: Id::from_db(value.post_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::record::{PostRecord, timestamp_from_db, timestamp_to_db};
    use careers_common::model::ModelValidationError;
    use time::macros::datetime;

    #[test]
    fn timestamps_round_trip_at_microsecond_precision() {
        let time = datetime!(2025-06-01 12:34:56.123456 UTC);
        assert_eq!(timestamp_from_db(timestamp_to_db(time)), Ok(time));
    }

    #[test]
    fn negative_likes_are_rejected() {
        let record = PostRecord {
            id: 1,
            username: "john_doe".into(),
            title: "Title".into(),
            content: "Content".into(),
            created_datetime: 0,
            likes: -1,
            image: None,
        };

        assert_eq!(
            record.into_post(Vec::new()),
            Err(ModelValidationError::Likes(-1))
        );
    }
}
