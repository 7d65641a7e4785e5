pub mod identity;
pub mod media;
pub mod post;
pub mod search;

use crate::{
    model::{identity::InvalidUsernameError, media::InvalidMediaKindError},
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData, net::AddrParseError, num::ParseIntError, str::FromStr};
use thiserror::Error;
use time::{OffsetDateTime, UtcDateTime, macros::utc_datetime};

/// A stored value that no longer satisfies the model's invariants.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    MediaKind(#[from] InvalidMediaKindError),
    #[error("Stored IP address is invalid: {0}")]
    IpAddress(#[from] AddrParseError),
}

/// Request input that was missing or malformed.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error("Username and comment text are required")]
    IncompleteComment,
    #[error("Search query is required")]
    MissingSearchQuery,
    #[error("At least one tag is required")]
    NoSearchTags,
    #[error("Invalid search type. Use: username, tags, or all")]
    InvalidSearchType,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct DevsphereEpoch;
impl Epoch for DevsphereEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type DevsphereSnowflake = Snowflake<DevsphereEpoch>;
pub type DevsphereSnowflakeGenerator = SnowflakeGenerator<DevsphereEpoch>;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(DevsphereSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: DevsphereSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> DevsphereSnowflake {
        self.0
    }

    /// The id as stored in a signed 64-bit database column.
    #[must_use]
    pub fn as_db(self) -> i64 {
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

impl<Marker> FromStr for Id<Marker> {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DevsphereSnowflake::from_str(s).map(Self::new)
    }
}

impl<Marker> From<DevsphereSnowflake> for Id<Marker> {
    fn from(value: DevsphereSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(DevsphereSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

/// Converts a generator timestamp into the offset-aware form that is stored and serialized.
///
/// Truncated to microseconds, the precision the database keeps.
#[must_use]
pub fn to_offset(time: UtcDateTime) -> OffsetDateTime {
    let time = OffsetDateTime::new_utc(time.date(), time.time());
    time.replace_nanosecond(time.nanosecond() / 1_000 * 1_000)
        .unwrap_or(time)
}
