//! Secret string handling with redacted display and serialization.
//!
//! Provides `RedactedString` for the SMTP password so it never shows up in logs,
//! debug output or a re-serialized configuration.

use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use validator::Validate;
use zeroize::Zeroize;

/// Placeholder text shown instead of the actual secret
pub static REDACTED_SECRET: &str = "###REDACTED###";

/// A string that gets redacted in debug output and serialization.
///
/// The backing memory is zeroed on drop.
#[derive(Validate, Clone, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[validate(length(min = 1))]
    #[builder(into)]
    inner: String,
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_SECRET)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_SECRET)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

pub struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::builder().inner(v).build())
    }
}
