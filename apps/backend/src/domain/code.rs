//! Room codes.
//!
//! Codes are 8-character strings over Crockford's Base32 alphabet.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U
const CODE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameCode(String);

impl GameCode {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..CODE_LEN)
            .map(|_| CROCKFORD[rng.random_range(0..CROCKFORD.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GameCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GameCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
