//! Seed codec: human-editable seed tokens and their numeric value.
//!
//! Tokens count in bijective base 36, the way spreadsheet columns do:
//! `0`, `1`, ..., `z`, `00`, `01`, ..., `zz`, `000`. Every token maps to
//! exactly one number, so two seeds are equal exactly when their tokens are.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Seed alphabet, in counting order.
pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of freshly drawn seeds.
pub const DEFAULT_SEED_LENGTH: usize = 8;

/// Longest token whose value fits in a `u128`.
pub const MAX_DECODE_LENGTH: usize = 24;

const BASE: u128 = ALPHABET.len() as u128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeedError {
    #[error("invalid seed: empty token")]
    Empty,
    #[error("invalid seed: '{ch}' at position {position} is not a lowercase letter or digit")]
    InvalidChar { ch: char, position: usize },
    #[error("invalid seed: '{0}' has no predecessor")]
    NoPredecessor(String),
    #[error("invalid seed: '{0}' is too long to decode (max {MAX_DECODE_LENGTH} characters)")]
    Overflow(String),
    #[error("invalid seed: length must be at least 1")]
    ZeroLength,
}

/// Digit value of an alphabet character, 1-based.
fn digit(ch: char) -> Option<u8> {
    match ch {
        '0'..='9' => Some(ch as u8 - b'0' + 1),
        'a'..='z' => Some(ch as u8 - b'a' + 11),
        _ => None,
    }
}

fn char_for(digit: u8) -> char {
    ALPHABET[(digit - 1) as usize] as char
}

/// Trim, lowercase and validate a token.
pub fn normalize(token: &str) -> Result<String, SeedError> {
    let token = token.trim().to_ascii_lowercase();
    if token.is_empty() {
        return Err(SeedError::Empty);
    }
    for (position, ch) in token.chars().enumerate() {
        if digit(ch).is_none() {
            return Err(SeedError::InvalidChar { ch, position });
        }
    }
    Ok(token)
}

/// Decode a token into its value.
pub fn decode(token: &str) -> Result<u128, SeedError> {
    let token = normalize(token)?;
    if token.len() > MAX_DECODE_LENGTH {
        return Err(SeedError::Overflow(token));
    }
    let mut value: u128 = 0;
    for ch in token.chars() {
        let d = digit(ch).ok_or(SeedError::InvalidChar { ch, position: 0 })?;
        value = value * BASE + d as u128;
    }
    Ok(value)
}

/// Encode a value as a token. Zero is the empty token and encodes as an
/// error, since it is not a valid seed.
pub fn encode(mut value: u128) -> Result<String, SeedError> {
    if value == 0 {
        return Err(SeedError::Empty);
    }
    let mut chars = Vec::new();
    while value > 0 {
        // Bijective numeration: digits run 1..=BASE, never zero.
        let rem = ((value - 1) % BASE) as u8;
        chars.push(char_for(rem + 1));
        value = (value - 1) / BASE;
    }
    Ok(chars.into_iter().rev().collect())
}

/// The next token in counting order. `zz` becomes `000`.
pub fn increment(token: &str) -> Result<String, SeedError> {
    let mut digits = digits_of(token)?;
    let mut i = digits.len();
    loop {
        if i == 0 {
            digits.insert(0, 1);
            break;
        }
        i -= 1;
        if digits[i] < BASE as u8 {
            digits[i] += 1;
            break;
        }
        digits[i] = 1;
    }
    Ok(digits.into_iter().map(char_for).collect())
}

/// The previous token in counting order. `000` becomes `zz`; `0` has no
/// predecessor.
/// `increment(decrement(t)) == t` holds for every token except `0`.
pub fn decrement(token: &str) -> Result<String, SeedError> {
    let mut digits = digits_of(token)?;
    if digits.len() == 1 && digits[0] == 1 {
        return Err(SeedError::NoPredecessor(char_for(1).to_string()));
    }
    let mut i = digits.len();
    while i > 0 {
        i -= 1;
        if digits[i] > 1 {
            digits[i] -= 1;
            break;
        }
        digits[i] = BASE as u8;
        if i == 0 {
            // Borrowed out of the leading digit: the token shrinks.
            digits.remove(0);
        }
    }
    Ok(digits.into_iter().map(char_for).collect())
}

/// Draw a token of `length` characters from the thread-local RNG.
pub fn random(length: usize) -> Result<String, SeedError> {
    if length == 0 {
        return Err(SeedError::ZeroLength);
    }
    let mut rng = rand::thread_rng();
    Ok((0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect())
}

fn digits_of(token: &str) -> Result<Vec<u8>, SeedError> {
    let token = normalize(token)?;
    Ok(token.chars().filter_map(digit).collect())
}

/// A validated seed token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Seed {
    token: String,
}

impl Seed {
    pub fn new(token: &str) -> Result<Self, SeedError> {
        Ok(Self {
            token: normalize(token)?,
        })
    }

    /// A fresh seed of the default length.
    pub fn random() -> Self {
        Self::random_with_length(DEFAULT_SEED_LENGTH)
    }

    /// A fresh seed of `length` characters (at least one).
    pub fn random_with_length(length: usize) -> Self {
        let token = random(length.max(1)).unwrap_or_else(|_| char_for(1).to_string());
        Self { token }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Numeric value; fails for tokens longer than [`MAX_DECODE_LENGTH`].
    pub fn value(&self) -> Result<u128, SeedError> {
        decode(&self.token)
    }

    /// 1-based digit values, most significant first. This is the value in
    /// positional form and is defined for tokens of any length.
    pub fn digits(&self) -> impl Iterator<Item = u8> + '_ {
        self.token.chars().filter_map(digit)
    }

    pub fn next(&self) -> Self {
        // A validated token always has a successor.
        Self {
            token: increment(&self.token).unwrap_or_else(|_| self.token.clone()),
        }
    }

    pub fn prev(&self) -> Result<Self, SeedError> {
        Ok(Self {
            token: decrement(&self.token)?,
        })
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl FromStr for Seed {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Seed {
    type Error = SeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Seed> for String {
    fn from(seed: Seed) -> Self {
        seed.token
    }
}
