//! Composite entity identity: a numeric `pk` and a human-facing `sk`.
//!
//! Every persisted entity embeds one [`EntityIdentity`]. The `pk` is a
//! 12-digit number mixed from a random UUID and the wall clock, the `sk` is a
//! [`SurrogateKey`] like `a1b2c-d3e4f` which is short enough to read out over
//! the phone. Both are assigned at construction and never change.

use crate::tools::id_generator::generate_grouped_id;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

pub mod resolver;

pub use resolver::{IdKind, Identifier, PartitionedIds, partition, resolve};

/// Upper bound (exclusive) of generated primary keys, i.e. 12 decimal digits.
pub const PK_MODULUS: u64 = 1_000_000_000_000;

static GENERATED_SK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]{5}-[a-z0-9]{5}$").expect("Invalid regex"));

/// A short alternate key, stored as a plain string in every backend.
///
/// Equality and ordering are by string value only. Caller-supplied values are
/// wrapped as-is without format validation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(String);

impl SurrogateKey {
    /// Generates a fresh key in the `xxxxx-xxxxx` format.
    pub fn generate() -> Self {
        SurrogateKey(generate_grouped_id(2, 5))
    }

    /// Wraps a raw value without validation.
    pub fn new(value: impl Into<String>) -> Self {
        SurrogateKey(value.into())
    }

    /// Returns the wrapped string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Determines if the value matches the format produced by [`SurrogateKey::generate`].
    pub fn is_generated_format(&self) -> bool {
        GENERATED_SK_REGEX.is_match(&self.0)
    }

    /// Consumes the key and returns the wrapped string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for SurrogateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SurrogateKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SurrogateKey::new(s))
    }
}

impl From<String> for SurrogateKey {
    fn from(value: String) -> Self {
        SurrogateKey(value)
    }
}

impl From<&str> for SurrogateKey {
    fn from(value: &str) -> Self {
        SurrogateKey(value.to_owned())
    }
}

impl From<SurrogateKey> for String {
    fn from(value: SurrogateKey) -> Self {
        value.0
    }
}

impl AsRef<str> for SurrogateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The `(pk, sk)` pair every entity carries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityIdentity {
    pub pk: i64,
    pub sk: SurrogateKey,
}

impl EntityIdentity {
    /// Assigns a fresh `pk` and `sk`. Call once, when the entity is constructed.
    pub fn generate() -> Self {
        EntityIdentity {
            pk: generate_pk(),
            sk: SurrogateKey::generate(),
        }
    }

    /// Rebuilds an identity loaded from storage.
    pub fn new(pk: i64, sk: impl Into<SurrogateKey>) -> Self {
        EntityIdentity { pk, sk: sk.into() }
    }

    /// The `pk` as its canonical 12-digit string.
    pub fn pk_string(&self) -> String {
        format_pk(self.pk)
    }
}

/// Derives a primary key from a random UUID and the current epoch millis.
///
/// Computes `|msb - (lsb + millis)| mod 10^12` with two's complement
/// wrap-around, so the result always lies in `0..PK_MODULUS`.
pub fn generate_pk() -> i64 {
    let (msb, lsb) = uuid::Uuid::new_v4().as_u64_pair();
    mix_pk(msb as i64, lsb as i64, chrono::Utc::now().timestamp_millis())
}

fn mix_pk(msb: i64, lsb: i64, millis: i64) -> i64 {
    let mixed = msb.wrapping_sub(lsb.wrapping_add(millis));
    // Lossless: the remainder is below 10^12.
    (mixed.unsigned_abs() % PK_MODULUS) as i64
}

/// Formats a primary key as a zero-padded 12-digit string.
pub fn format_pk(pk: i64) -> String {
    format!("{:012}", pk)
}

/// Implemented by every entity that embeds an [`EntityIdentity`].
pub trait Identified {
    fn identity(&self) -> &EntityIdentity;

    fn pk(&self) -> i64 {
        self.identity().pk
    }

    fn sk(&self) -> &SurrogateKey {
        &self.identity().sk
    }
}

impl Identified for EntityIdentity {
    fn identity(&self) -> &EntityIdentity {
        self
    }
}
