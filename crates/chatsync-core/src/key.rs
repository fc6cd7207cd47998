//! Push-style message keys
//!
//! A key is 20 characters: 8 encode the creation time in milliseconds and 12
//! are random. The alphabet is in ASCII order, so comparing two keys as
//! strings compares their creation order.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Key alphabet, sorted by ASCII value
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Length of a generated key
pub const KEY_LEN: usize = TIME_CHARS + RANDOM_CHARS;

/// Identifier of a message inside a collection
///
/// Generated keys are validated against the push alphabet. Keys read back from
/// a backend only need to be valid path segments, since other writers may use
/// their own scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageKey(String);

impl MessageKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();

        if key.is_empty() {
            return Err(Error::InvalidKey("key cannot be empty".into()));
        }

        if key
            .chars()
            .any(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_control())
        {
            return Err(Error::InvalidKey(format!(
                "key {:?} is not a valid path segment",
                key
            )));
        }

        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in a generated key, in milliseconds since epoch
    pub fn timestamp_ms(&self) -> Option<u64> {
        if self.0.len() != KEY_LEN {
            return None;
        }
        self.0.bytes().take(TIME_CHARS).try_fold(0u64, |acc, b| {
            let digit = PUSH_CHARS.iter().position(|&c| c == b)? as u64;
            Some((acc << 6) | digit)
        })
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MessageKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MessageKey> for String {
    fn from(key: MessageKey) -> Self {
        key.0
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_ms: u64,
    last_random: [u8; RANDOM_CHARS],
}

/// Generates strictly increasing push keys
///
/// Keys from one generator never repeat. Within the same millisecond, or when
/// the wall clock steps backwards, the random suffix of the previous key is
/// incremented instead of drawn fresh.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    state: Mutex<GeneratorState>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key stamped with the current wall clock
    pub fn generate(&self) -> MessageKey {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.generate_at(now)
    }

    /// Generate a key stamped with `now_ms`
    pub fn generate_at(&self, now_ms: u64) -> MessageKey {
        let mut state = self.state.lock();

        if now_ms > state.last_ms {
            state.last_ms = now_ms;
            state.last_random = random_digits();
        } else if !increment(&mut state.last_random) {
            // Suffix space for this millisecond is exhausted
            state.last_ms += 1;
            state.last_random = random_digits();
        }

        let mut key = String::with_capacity(KEY_LEN);
        let mut ms = state.last_ms;
        let mut time_chars = [0u8; TIME_CHARS];
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(ms % 64) as usize];
            ms /= 64;
        }
        key.extend(time_chars.iter().map(|&b| b as char));
        key.extend(state.last_random.iter().map(|&d| PUSH_CHARS[d as usize] as char));

        MessageKey(key)
    }
}

/// Twelve uniformly random base-64 digits
fn random_digits() -> [u8; RANDOM_CHARS] {
    // Bytes 6 and 8 carry the v4 version and variant bits
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let random = bytes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 6 && *i != 8)
        .map(|(_, byte)| byte % 64);
    let mut digits = [0u8; RANDOM_CHARS];
    for (digit, value) in digits.iter_mut().zip(random) {
        *digit = value;
    }
    digits
}

/// Add one to a base-64 number; false on overflow
fn increment(digits: &mut [u8; RANDOM_CHARS]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit < 63 {
            *digit += 1;
            return true;
        }
        *digit = 0;
    }
    false
}
