//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a lecture identifier, in bytes.
pub const MAX_LECTURE_ID_LEN: usize = 128;

/// Validation errors for core types and inbound analytics events.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The identifier exceeded [`MAX_LECTURE_ID_LEN`].
    #[error("{field} is too long ({len} bytes, max {MAX_LECTURE_ID_LEN})")]
    TooLong { field: &'static str, len: usize },

    /// The identifier contained a character outside `[A-Za-z0-9_-]`.
    #[error("{field} contains invalid character {ch:?}")]
    InvalidCharacter { field: &'static str, ch: char },

    /// The attention score was NaN or infinite.
    #[error("attention score must be a finite number, got {value}")]
    NonFiniteScore { value: f64 },

    /// A watch-time delta was negative.
    #[error("watch-time delta cannot be negative, got {value}")]
    NegativeDelta { value: i64 },

    /// A watch-time delta exceeded the per-request limit.
    #[error("watch-time delta {value} exceeds the limit of {max} seconds")]
    DeltaTooLarge { value: i64, max: u32 },

    /// An attention sample fell outside the lecture timeline.
    #[error("second {second} is outside the lecture timeline (max {max})")]
    SecondOutOfRange { second: u32, max: u32 },
}

/// A validated lecture identifier.
///
/// Lecture ids come from the external catalog and are opaque here. They must be
/// non-empty, at most [`MAX_LECTURE_ID_LEN`] bytes, and use only ASCII
/// alphanumerics, `-` and `_`, which keeps them safe to embed in URL paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LectureId(String);

impl LectureId {
    /// Creates a new ID after validation.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        const FIELD: &str = "lecture ID";
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::Empty { field: FIELD });
        }
        if id.len() > MAX_LECTURE_ID_LEN {
            return Err(ValidationError::TooLong {
                field: FIELD,
                len: id.len(),
            });
        }
        if let Some(ch) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ValidationError::InvalidCharacter { field: FIELD, ch });
        }
        Ok(Self(id))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LectureId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LectureId> for String {
    fn from(id: LectureId) -> Self {
        id.0
    }
}

impl fmt::Display for LectureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for LectureId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for LectureId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// An attention score in the range \[0.0, 100.0\].
///
/// Scores arrive from an unreliable client, so out-of-range values are clamped
/// rather than rejected. Non-finite values are always rejected.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct AttentionScore(f64);

impl AttentionScore {
    /// The maximum score (100.0).
    pub const MAX: Self = Self(100.0);

    /// The minimum score (0.0).
    pub const MIN: Self = Self(0.0);

    /// Creates a score, clamping finite values to \[0.0, 100.0\].
    pub fn clamped(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteScore { value });
        }
        Ok(Self(value.clamp(Self::MIN.0, Self::MAX.0)))
    }

    /// Returns the inner value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for AttentionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

impl From<AttentionScore> for f64 {
    fn from(score: AttentionScore) -> Self {
        score.0
    }
}

impl Serialize for AttentionScore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttentionScore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        // Clamp on deserialization to be lenient with client data
        Self::clamped(value).map_err(serde::de::Error::custom)
    }
}
