//! User-facing classification of generation failures.
//!
//! Workers that report a structured `error_code` are classified from the
//! code alone. Older workers only send free text, so a phrase table maps
//! known substrings onto categories. The phrase table is a compatibility
//! shim; new failure kinds should be added as codes.

use std::fmt;

// ---------------------------------------------------------------------------
// FailureCategory
// ---------------------------------------------------------------------------

/// Coarse failure kind shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// The request or output was rejected by a safety filter.
    ContentPolicy,
    /// A reference image (body, face, garment) could not be used.
    InvalidReference,
    /// The generation service is throttling the account.
    RateLimited,
    /// The job did not finish in time.
    Timeout,
    /// The generation service is down or overloaded.
    ServiceUnavailable,
    Unknown,
}

impl FailureCategory {
    /// Structured code as sent by the worker.
    pub fn code(self) -> &'static str {
        match self {
            Self::ContentPolicy => "content_policy",
            Self::InvalidReference => "invalid_reference",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a structured code. Unrecognised codes return `None` so the
    /// caller can fall back to the message text.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "content_policy" => Some(Self::ContentPolicy),
            "invalid_reference" => Some(Self::InvalidReference),
            "rate_limited" => Some(Self::RateLimited),
            "timeout" => Some(Self::Timeout),
            "service_unavailable" => Some(Self::ServiceUnavailable),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Message presented to the user for this category.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::ContentPolicy => {
                "The image was blocked by the content filter. Try different photos."
            }
            Self::InvalidReference => {
                "One of your reference photos could not be used. Check that your body and face photos show a single person clearly."
            }
            Self::RateLimited => "Too many generations right now. Please wait a minute and try again.",
            Self::Timeout => "Generation is taking longer than expected. Please try again.",
            Self::ServiceUnavailable => {
                "The generation service is temporarily unavailable. Please try again later."
            }
            Self::Unknown => "Something went wrong while generating your image. Please try again.",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Phrase table
// ---------------------------------------------------------------------------

/// Lower-case substrings and the category they indicate. First match wins.
const FAILURE_PHRASES: &[(&str, FailureCategory)] = &[
    ("safety", FailureCategory::ContentPolicy),
    ("content policy", FailureCategory::ContentPolicy),
    ("nsfw", FailureCategory::ContentPolicy),
    ("no face", FailureCategory::InvalidReference),
    ("face not detected", FailureCategory::InvalidReference),
    ("no person", FailureCategory::InvalidReference),
    ("multiple people", FailureCategory::InvalidReference),
    ("invalid image", FailureCategory::InvalidReference),
    ("rate limit", FailureCategory::RateLimited),
    ("quota", FailureCategory::RateLimited),
    ("too many requests", FailureCategory::RateLimited),
    ("timed out", FailureCategory::Timeout),
    ("timeout", FailureCategory::Timeout),
    ("unavailable", FailureCategory::ServiceUnavailable),
    ("overloaded", FailureCategory::ServiceUnavailable),
    ("503", FailureCategory::ServiceUnavailable),
];

/// Classify a failure from its phrase alone.
pub fn classify_message(message: &str) -> FailureCategory {
    let lowered = message.to_lowercase();
    FAILURE_PHRASES
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
        .map(|(_, category)| *category)
        .unwrap_or(FailureCategory::Unknown)
}

/// Classify a failure, preferring the structured code when it is known.
pub fn classify_failure(code: Option<&str>, message: &str) -> FailureCategory {
    code.and_then(FailureCategory::from_code)
        .unwrap_or_else(|| classify_message(message))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
