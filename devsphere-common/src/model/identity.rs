//! IP-derived pseudo identities.
//!
//! There is no authentication: a client is whoever its IP address says it is,
//! and every address is bound to exactly one generated display name.

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{fmt::Display, net::IpAddr};
use thiserror::Error;
use time::OffsetDateTime;

pub const USERNAME_MAX_LEN: usize = 50;

/// Perturbed candidates tried after the first one collides.
pub const MAX_USERNAME_ATTEMPTS: u64 = 10;

const ADJECTIVES: [&str; 20] = [
    "Swift", "Bright", "Clever", "Happy", "Keen", "Lively", "Noble", "Quick", "Rare", "Smart",
    "Vivid", "Wise", "Bold", "Cool", "Daring", "Epic", "Fresh", "Grand", "Heroic", "Jolly",
];

const ANIMALS: [&str; 20] = [
    "Panda", "Eagle", "Tiger", "Wolf", "Fox", "Bear", "Lion", "Shark", "Phoenix", "Dragon",
    "Falcon", "Raven", "Owl", "Cheetah", "Penguin", "Dolphin", "Butterfly", "Hawk", "Lynx",
    "Otter",
];

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0:?}")]
pub struct InvalidUsernameError(String);

impl Username {
    /// Trims `name` and checks it is non-empty and at most [`USERNAME_MAX_LEN`] characters.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidUsernameError> {
        let name = name.into();
        let trimmed = name.trim();

        if trimmed.is_empty() || trimmed.chars().count() > USERNAME_MAX_LEN {
            return Err(InvalidUsernameError(name));
        }

        Ok(Username(trimmed.to_owned()))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub ip_address: IpAddr,
    pub username: Username,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Result of resolving the identity bound to an address.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum IdentityLookup {
    Existing(Identity),
    Created(Identity),
}

impl IdentityLookup {
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, IdentityLookup::Created(_))
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        match self {
            IdentityLookup::Existing(identity) | IdentityLookup::Created(identity) => identity,
        }
    }

    #[must_use]
    pub fn into_identity(self) -> Identity {
        match self {
            IdentityLookup::Existing(identity) | IdentityLookup::Created(identity) => identity,
        }
    }
}

fn address_components(ip: IpAddr) -> Vec<u64> {
    match ip {
        IpAddr::V4(v4) => v4.octets().into_iter().map(u64::from).collect(),
        IpAddr::V6(v6) => v6.segments().into_iter().map(u64::from).collect(),
    }
}

/// Seed for the `attempt`th candidate name of `ip`.
///
/// `None` is the unperturbed seed, the plain sum of the address components.
/// A retry appends the attempt digit to the last component (`4` becomes `40`, `41`, ...).
#[must_use]
pub fn username_seed(ip: IpAddr, attempt: Option<u64>) -> u64 {
    let mut components = address_components(ip);

    if let (Some(attempt), Some(last)) = (attempt, components.last_mut()) {
        *last = *last * 10 + attempt;
    }

    components.into_iter().sum()
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn username_from_seed(seed: u64) -> Username {
    let adjective = ADJECTIVES[(seed % 20) as usize];
    let animal = ANIMALS[(seed.wrapping_mul(7) % 20) as usize];
    let number = seed % 9999;

    Username(format!("{adjective}{animal}{number}"))
}

/// All names `ip` may be given, in the order they are tried.
pub fn username_candidates(ip: IpAddr) -> impl Iterator<Item = Username> {
    std::iter::once(None)
        .chain((0..MAX_USERNAME_ATTEMPTS).map(Some))
        .map(move |attempt| username_from_seed(username_seed(ip, attempt)))
}
