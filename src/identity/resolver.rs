//! Disambiguation of raw identifier strings into `pk` or `sk` lookups.
//!
//! A string that parses as a signed 64-bit integer is a `pk`, everything
//! else is wrapped into a [`SurrogateKey`]. Every query tool goes through
//! [`resolve`] and [`partition`] so the rule cannot drift between backends.

use crate::identity::SurrogateKey;
use serde::Serialize;

/// Which half of the identity a raw string refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IdKind {
    Pk,
    Sk,
}

impl IdKind {
    /// The logical field name this kind filters on.
    pub fn field_name(self) -> &'static str {
        match self {
            IdKind::Pk => "pk",
            IdKind::Sk => "sk",
        }
    }
}

/// A resolved identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identifier {
    Pk(i64),
    Sk(SurrogateKey),
}

impl Identifier {
    pub fn kind(&self) -> IdKind {
        match self {
            Identifier::Pk(_) => IdKind::Pk,
            Identifier::Sk(_) => IdKind::Sk,
        }
    }

    /// The value as JSON, which is how document and search backends receive it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Identifier::Pk(pk) => serde_json::Value::from(*pk),
            Identifier::Sk(sk) => serde_json::Value::from(sk.as_str()),
        }
    }
}

/// Resolves a raw identifier. Never fails: non-integral input is an `sk`.
pub fn resolve(id: &str) -> Identifier {
    match id.parse::<i64>() {
        Ok(pk) => Identifier::Pk(pk),
        Err(_) => Identifier::Sk(SurrogateKey::new(id)),
    }
}

/// Raw identifiers split into their `pk` and `sk` halves, input order kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionedIds {
    pub pks: Vec<i64>,
    pub sks: Vec<SurrogateKey>,
}

impl PartitionedIds {
    pub fn is_empty(&self) -> bool {
        self.pks.is_empty() && self.sks.is_empty()
    }
}

/// Resolves every id and splits the results by kind.
pub fn partition<I, S>(ids: I) -> PartitionedIds
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = PartitionedIds::default();
    for id in ids {
        match resolve(id.as_ref()) {
            Identifier::Pk(pk) => result.pks.push(pk),
            Identifier::Sk(sk) => result.sks.push(sk),
        }
    }

    result
}
