//! Decoy code synthesis.
//!
//! Filler is sampled from the donor body rather than generated, so unconstrained
//! regions look like real code. Fragments long enough are wrapped in a
//! 32-bit x86 function frame:
//!
//! ```text
//! 55                 push ebp
//! 89 e5              mov  ebp, esp
//! 83 ec NN           sub  esp, NN
//! ...
//! 89 ec              mov  esp, ebp
//! 5d                 pop  ebp
//! c3                 ret
//! ```

use crate::donor::Donor;
use rand::rngs::StdRng;
use rand::Rng;

/// Prologue without its trailing stack-frame size byte.
const PROLOGUE: [u8; 5] = [0x55, 0x89, 0xe5, 0x83, 0xec];
const EPILOGUE: [u8; 4] = [0x89, 0xec, 0x5d, 0xc3];

/// Stack frames are 4..=120 bytes in steps of 4.
const MAX_FRAME_SLOTS: u8 = 30;

/// Samples donor bytes and frames them as fake functions.
#[derive(Debug)]
pub struct DecoyGenerator {
    donor: Donor,
    rng: StdRng,
    frame_threshold: usize,
}

impl DecoyGenerator {
    pub fn new(donor: Donor, rng: StdRng, frame_threshold: usize) -> Self {
        Self { donor, rng, frame_threshold }
    }

    pub fn donor(&self) -> &Donor {
        &self.donor
    }

    /// Produce exactly `length` bytes of code-shaped filler.
    pub fn generate(&mut self, length: usize) -> Vec<u8> {
        if length == 0 {
            return Vec::new();
        }

        let sample = self.sample(length);
        if length <= self.frame_threshold {
            return sample;
        }

        let frame_size = 4 * self.rng.gen_range(1..=MAX_FRAME_SLOTS);
        let head = PROLOGUE.len() + 1;
        let tail = EPILOGUE.len();

        let mut out = Vec::with_capacity(length);
        out.extend_from_slice(&PROLOGUE);
        out.push(frame_size);
        out.extend_from_slice(&sample[head..length - tail]);
        out.extend_from_slice(&EPILOGUE);
        out
    }

    /// Contiguous window of the donor body, tiled when the tail past the
    /// chosen start is shorter than `length`.
    fn sample(&mut self, length: usize) -> Vec<u8> {
        let body = self.donor.body();

        if body.len() < length {
            let start = self.rng.gen_range(0..body.len());
            body[start..].iter().copied().cycle().take(length).collect()
        } else {
            let start = self.rng.gen_range(0..=body.len() - length);
            body[start..start + length].to_vec()
        }
    }
}
