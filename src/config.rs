use crate::error::{Result, SynthError};

/// Size of the donor header copied verbatim to the start of the output.
pub const DEFAULT_HEADER_LEN: usize = 2048;

/// Decoy fragments longer than this get a function prologue/epilogue frame.
pub const DEFAULT_FRAME_THRESHOLD: usize = 10;

/// Largest file a synthesis run may produce.
pub const DEFAULT_MAX_OUTPUT_LEN: usize = 256 * 1024 * 1024; // 256MB

/// Smallest decoy that can hold both the prologue and the epilogue.
pub const MIN_FRAME_THRESHOLD: usize = 10;

/// Configuration for a synthesis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthConfig {
    /// Copy the donor header to offset 0 before anything else is placed
    pub include_header: bool,
    /// Length of the donor header region (never sampled for decoys)
    pub header_len: usize,
    /// Length above which decoys are framed as a function
    pub frame_threshold: usize,
    /// Seed for decoy sampling; `None` draws from OS entropy
    pub seed: Option<u64>,
    /// Offsets at or past this limit are rejected instead of grown into
    pub max_output_len: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            include_header: true,
            header_len: DEFAULT_HEADER_LEN,
            frame_threshold: DEFAULT_FRAME_THRESHOLD,
            seed: None,
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
        }
    }
}

impl SynthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    #[must_use]
    pub fn with_header_len(mut self, header_len: usize) -> Self {
        self.header_len = header_len;
        self
    }

    #[must_use]
    pub fn with_frame_threshold(mut self, frame_threshold: usize) -> Self {
        self.frame_threshold = frame_threshold;
        self
    }

    #[must_use]
    pub fn with_max_output_len(mut self, max_output_len: usize) -> Self {
        self.max_output_len = max_output_len;
        self
    }

    /// Validate the configuration and return errors for invalid settings
    pub fn validate(&self) -> Result<()> {
        if self.frame_threshold < MIN_FRAME_THRESHOLD {
            return Err(SynthError::configuration(format!(
                "frame_threshold must be at least {} (prologue + epilogue)",
                MIN_FRAME_THRESHOLD
            )));
        }

        if self.include_header && self.header_len == 0 {
            return Err(SynthError::configuration("header_len must be greater than 0 when the header is included"));
        }

        if self.include_header && self.header_len > self.max_output_len {
            return Err(SynthError::configuration(format!(
                "header_len ({}) exceeds max_output_len ({})",
                self.header_len, self.max_output_len
            )));
        }

        Ok(())
    }
}
