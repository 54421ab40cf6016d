//! Join codes.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::GameError;

/// Uppercase letters and digits with the look-alikes `0`, `1`, `I`, `O`
/// removed. 32 symbols.
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Symbols per code.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// A short, human-typeable session code such as `"AB3X7Q"`.
///
/// Always stored normalized (trimmed, uppercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinCode(String);

impl JoinCode {
    /// Normalizes user input: surrounding whitespace dropped, letters
    /// uppercased. Does not check the alphabet; an unknown code simply
    /// won't be found.
    pub fn normalize(input: &str) -> Self {
        Self(input.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// CodeGenerator
// ---------------------------------------------------------------------------

/// Draws join codes uniformly from an alphabet.
///
/// The default is 32 symbols by 6 characters (about a billion codes). Tests
/// shrink both to force collisions.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    alphabet: Vec<char>,
    length: usize,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.chars().collect(),
            length: DEFAULT_CODE_LENGTH,
        }
    }
}

impl CodeGenerator {
    /// Builds a generator over a custom alphabet.
    ///
    /// # Errors
    /// Returns `GameError::InvalidSettings` if the alphabet is empty, has
    /// duplicates or lowercase letters, or `length` is zero.
    pub fn new(alphabet: &str, length: usize) -> Result<Self, GameError> {
        let mut symbols: Vec<char> = alphabet.chars().collect();
        if symbols.is_empty() || length == 0 {
            return Err(GameError::InvalidSettings(
                "code alphabet and length must be non-empty".into(),
            ));
        }
        if symbols.iter().any(|c| c.is_lowercase() || c.is_whitespace()) {
            return Err(GameError::InvalidSettings(
                "code alphabet must not contain lowercase or whitespace".into(),
            ));
        }
        let total = symbols.len();
        symbols.sort_unstable();
        symbols.dedup();
        if symbols.len() != total {
            return Err(GameError::InvalidSettings(
                "code alphabet has duplicate symbols".into(),
            ));
        }
        Ok(Self {
            alphabet: alphabet.chars().collect(),
            length,
        })
    }

    /// Number of distinct codes, saturating at `u64::MAX`.
    pub fn capacity(&self) -> u64 {
        (self.alphabet.len() as u64)
            .checked_pow(self.length as u32)
            .unwrap_or(u64::MAX)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Draws one code.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> JoinCode {
        let code = (0..self.length)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect();
        JoinCode(code)
    }
}
