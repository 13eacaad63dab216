//! # Secret Material
//!
//! Opaque byte buffer for tokens, passwords, and passphrases. The buffer is
//! zeroized when dropped and never printed: `Debug` renders `[REDACTED]` and
//! there is intentionally no `Display` implementation.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Secret bytes that are wiped from memory on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
  /// Wrap raw bytes
  pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
    Self(bytes.into())
  }

  /// Borrow the raw bytes. Callers must not copy them into long-lived values.
  pub fn expose(&self) -> &[u8] {
    &self.0
  }

  /// Borrow the secret as UTF-8 text, if it is valid UTF-8
  pub fn expose_str(&self) -> Option<&str> {
    std::str::from_utf8(&self.0).ok()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Whether `haystack` contains these secret bytes. Empty secrets never match.
  pub fn is_contained_in(&self, haystack: &str) -> bool {
    if self.0.is_empty() {
      return false;
    }
    haystack.as_bytes().windows(self.0.len()).any(|window| window == self.0.as_slice())
  }
}

impl fmt::Debug for Secret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Secret([REDACTED])")
  }
}

impl From<String> for Secret {
  fn from(value: String) -> Self {
    Self(value.into_bytes())
  }
}

impl From<&str> for Secret {
  fn from(value: &str) -> Self {
    Self(value.as_bytes().to_vec())
  }
}

impl From<Vec<u8>> for Secret {
  fn from(value: Vec<u8>) -> Self {
    Self(value)
  }
}

// Secrets are only ever serialized into the plaintext buffer that is about to
// be encrypted, so base64 keeps arbitrary bytes JSON-safe.
impl Serialize for Secret {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let encoded = Zeroizing::new(STANDARD.encode(&self.0));
    serializer.serialize_str(&encoded)
  }
}

impl<'de> Deserialize<'de> for Secret {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let encoded = Zeroizing::new(String::deserialize(deserializer)?);
    STANDARD
      .decode(encoded.as_bytes())
      .map(Secret)
      .map_err(|e| serde::de::Error::custom(format!("invalid secret encoding: {e}")))
  }
}
