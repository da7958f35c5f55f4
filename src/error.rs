use thiserror::Error;

/// Errors raised while extracting constraints or laying out a synthetic file.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid rule document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed integer function {function}: {reason}")]
    MalformedIntrinsic { function: String, reason: String },

    #[error("value {value} does not fit in {function}")]
    ValueOutOfRange { value: i128, function: String },

    #[error("layout incomplete: offset {offset} has no value")]
    IncompleteLayout { offset: usize },

    #[error("placement conflict: range {start}..{end} is already occupied")]
    PlacementConflict { start: usize, end: usize },

    #[error("output would grow to {size} bytes (limit: {limit} bytes)")]
    OutputTooLarge { size: usize, limit: usize },

    #[error("condition references undefined string {id}")]
    UnknownString { id: String },

    #[error("invalid string {id}: {reason}")]
    InvalidString { id: String, reason: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

pub type Result<T> = std::result::Result<T, SynthError>;

impl SynthError {
    pub fn malformed_intrinsic<S1: Into<String>, S2: Into<String>>(function: S1, reason: S2) -> Self {
        Self::MalformedIntrinsic { function: function.into(), reason: reason.into() }
    }

    pub fn value_out_of_range<S: Into<String>>(value: i128, function: S) -> Self {
        Self::ValueOutOfRange { value, function: function.into() }
    }

    pub fn placement_conflict(start: usize, end: usize) -> Self {
        Self::PlacementConflict { start, end }
    }

    pub fn output_too_large(size: usize, limit: usize) -> Self {
        Self::OutputTooLarge { size, limit }
    }

    pub fn unknown_string<S: Into<String>>(id: S) -> Self {
        Self::UnknownString { id: id.into() }
    }

    pub fn invalid_string<S1: Into<String>, S2: Into<String>>(id: S1, reason: S2) -> Self {
        Self::InvalidString { id: id.into(), reason: reason.into() }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns true if the error comes from the rule itself rather than from
    /// the caller's placement sequencing or the environment.
    pub fn is_rule_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedIntrinsic { .. }
                | Self::ValueOutOfRange { .. }
                | Self::OutputTooLarge { .. }
                | Self::UnknownString { .. }
                | Self::InvalidString { .. }
                | Self::Json(_)
        )
    }
}
