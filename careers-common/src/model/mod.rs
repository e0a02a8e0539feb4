pub mod comment;
pub mod form;
pub mod image;
pub mod post;
pub mod text;

use crate::{
    model::text::InvalidTextError,
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{OffsetDateTime, macros::datetime};

/// Raised when a stored record no longer satisfies the model's constraints.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error("Invalid {field}: {error}")]
    Text {
        field: &'static str,
        error: InvalidTextError,
    },
    #[error("Like counter was negative or too large: {0}")]
    Likes(i64),
    #[error("Timestamp was out of range: {0}")]
    Timestamp(i64),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CareersEpoch;
impl Epoch for CareersEpoch {
    const EPOCH_TIME: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);
}

pub type CareersSnowflake = Snowflake<CareersEpoch>;
pub type CareersSnowflakeGenerator = SnowflakeGenerator<CareersEpoch>;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(CareersSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: CareersSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> CareersSnowflake {
        self.0
    }

    /// The id as stored in a signed 64 bit database column.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<CareersSnowflake> for Id<Marker> {
    fn from(value: CareersSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(CareersSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}
