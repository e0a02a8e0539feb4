//! Snowflake ids for posts and comments.
//!
//! Layout, most significant bit first: 42 bits of milliseconds since the
//! epoch, 5 bits worker id, 5 bits process id, 12 bits per-millisecond
//! increment. Ids therefore sort by creation time.

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const TIMESTAMP_OFFSET: u32 = 22;
pub const TIMESTAMP_LENGTH: u32 = 42;
pub const WORKER_ID_OFFSET: u32 = 17;
pub const WORKER_ID_LENGTH: u32 = 5;
pub const PROCESS_ID_OFFSET: u32 = 12;
pub const PROCESS_ID_LENGTH: u32 = 5;
pub const INCREMENT_LENGTH: u32 = 12;

const fn mask(length: u32) -> u64 {
    (1 << length) - 1
}

pub trait Epoch {
    const EPOCH_TIME: OffsetDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Snowflake part was out of range: {0}")]
pub struct SnowflakePartOutOfRangeError(pub u64);

/// A worker id or process id, both of which are five bits wide.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8")]
pub struct NodePart(u8);

pub type WorkerId = NodePart;
pub type ProcessId = NodePart;

impl NodePart {
    #[must_use]
    pub fn new(id: u8) -> Option<Self> {
        (u64::from(id) <= mask(WORKER_ID_LENGTH)).then_some(Self(id))
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodePart {
    type Error = SnowflakePartOutOfRangeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(SnowflakePartOutOfRangeError(value.into()))
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds since the epoch.
    #[must_use]
    pub fn timestamp_millis(self) -> u64 {
        (self.0 >> TIMESTAMP_OFFSET) & mask(TIMESTAMP_LENGTH)
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        #[allow(clippy::cast_possible_truncation)]
        NodePart(((self.0 >> WORKER_ID_OFFSET) & mask(WORKER_ID_LENGTH)) as u8)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        #[allow(clippy::cast_possible_truncation)]
        NodePart(((self.0 >> PROCESS_ID_OFFSET) & mask(PROCESS_ID_LENGTH)) as u8)
    }

    #[must_use]
    pub fn increment(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let increment = (self.0 & mask(INCREMENT_LENGTH)) as u16;
        increment
    }

    #[must_use]
    pub fn created_at(self) -> OffsetDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(self.timestamp_millis().cast_signed())
    }

    fn from_parts(millis: u64, worker_id: WorkerId, process_id: ProcessId, increment: u16) -> Self {
        Self::new(
            millis << TIMESTAMP_OFFSET
                | u64::from(worker_id.get()) << WORKER_ID_OFFSET
                | u64::from(process_id.get()) << PROCESS_ID_OFFSET
                | u64::from(increment),
        )
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

pub fn millis_since_epoch<SnowflakeEpoch: Epoch>(
    time: OffsetDateTime,
) -> Result<u64, SnowflakeTimestampError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    let millis = u64::try_from(millis).map_err(|_| SnowflakeTimestampError::TimeBeforeEpoch)?;
    if millis > mask(TIMESTAMP_LENGTH) {
        return Err(SnowflakeTimestampError::TimestampTooLarge);
    }
    Ok(millis)
}

/// Hands out strictly increasing snowflakes for one worker/process pair.
///
/// When the 12 bit increment runs out within a millisecond, or the clock goes
/// backwards, the generator borrows from the next millisecond instead of
/// repeating an id.
#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last_millis: u64,
    next_increment: u16,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last_millis: 0,
            next_increment: 0,
            phantom_data: PhantomData,
        }
    }

    pub fn generate_at(
        &mut self,
        time: OffsetDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        let millis = millis_since_epoch::<SnowflakeEpoch>(time)?;

        if millis > self.last_millis {
            self.last_millis = millis;
            self.next_increment = 0;
        } else if u64::from(self.next_increment) > mask(INCREMENT_LENGTH) {
            self.last_millis += 1;
            self.next_increment = 0;
        }

        if self.last_millis > mask(TIMESTAMP_LENGTH) {
            return Err(SnowflakeTimestampError::TimestampTooLarge);
        }

        let increment = self.next_increment;
        self.next_increment += 1;

        Ok(Snowflake::from_parts(
            self.last_millis,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(OffsetDateTime::now_utc())
    }
}
