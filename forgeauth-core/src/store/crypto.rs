//! Envelope encryption for the credential file.
//!
//! Layout: `[version u8][kdf rounds u32 BE][salt 16][nonce 12][ciphertext || tag]`.
//! Everything before the ciphertext is bound as AES-GCM associated data, so a
//! tampered header fails authentication just like a tampered body.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub(crate) const FORMAT_VERSION: u8 = 1;
pub(crate) const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = 1 + 4 + SALT_LEN + NONCE_LEN;
const TAG_LEN: usize = 16;

/// Upper bound on the PBKDF2 round count accepted from a file header or settings
pub const MAX_KDF_ROUNDS: u32 = 5_000_000;

pub(crate) type Salt = [u8; SALT_LEN];
pub(crate) type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum CryptoError {
  #[error("file is truncated")]
  Truncated,
  #[error("unsupported format version {0}")]
  UnsupportedVersion(u8),
  #[error("invalid key derivation round count")]
  InvalidRounds,
  #[error("authentication failed (wrong passphrase or tampered data)")]
  Authentication,
  #[error("encryption failed")]
  Encryption,
}

/// Parsed header of an encrypted file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
  pub rounds: u32,
  pub salt: Salt,
  nonce: [u8; NONCE_LEN],
}

impl Header {
  fn encode(&self) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0] = FORMAT_VERSION;
    out[1..5].copy_from_slice(&self.rounds.to_be_bytes());
    out[5..5 + SALT_LEN].copy_from_slice(&self.salt);
    out[5 + SALT_LEN..].copy_from_slice(&self.nonce);
    out
  }

  /// Split `bytes` into a header and the ciphertext that follows it
  pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), CryptoError> {
    let version = *bytes.first().ok_or(CryptoError::Truncated)?;
    if version != FORMAT_VERSION {
      return Err(CryptoError::UnsupportedVersion(version));
    }
    if bytes.len() < HEADER_LEN + TAG_LEN {
      return Err(CryptoError::Truncated);
    }

    let mut rounds = [0u8; 4];
    rounds.copy_from_slice(&bytes[1..5]);
    let rounds = u32::from_be_bytes(rounds);
    // The header is only authenticated after the key is derived, so the round
    // count has to be bounded before it is used
    if rounds == 0 || rounds > MAX_KDF_ROUNDS {
      return Err(CryptoError::InvalidRounds);
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes[5..5 + SALT_LEN]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&bytes[5 + SALT_LEN..HEADER_LEN]);

    Ok((Self { rounds, salt, nonce }, &bytes[HEADER_LEN..]))
  }
}

pub(crate) fn random_salt() -> Salt {
  let mut salt = [0u8; SALT_LEN];
  OsRng.fill_bytes(&mut salt);
  salt
}

/// PBKDF2-HMAC-SHA256 key derivation
pub(crate) fn derive_key(passphrase: &[u8], salt: &Salt, rounds: u32) -> DerivedKey {
  let mut key = Zeroizing::new([0u8; KEY_LEN]);
  pbkdf2_hmac::<Sha256>(passphrase, salt, rounds, &mut key[..]);
  key
}

/// Encrypt `plaintext` under `key` with a fresh nonce
pub(crate) fn seal(key: &DerivedKey, rounds: u32, salt: &Salt, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
  let mut nonce = [0u8; NONCE_LEN];
  OsRng.fill_bytes(&mut nonce);
  let header = Header {
    rounds,
    salt: *salt,
    nonce,
  }
  .encode();

  let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
  let ciphertext = cipher
    .encrypt(
      Nonce::from_slice(&nonce),
      Payload {
        msg: plaintext,
        aad: &header,
      },
    )
    .map_err(|_| CryptoError::Encryption)?;

  let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
  out.extend_from_slice(&header);
  out.extend_from_slice(&ciphertext);
  Ok(out)
}

/// Decrypt a sealed file body whose header was already parsed
pub(crate) fn open(key: &DerivedKey, header: &Header, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
  let aad = header.encode();
  let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
  cipher
    .decrypt(
      Nonce::from_slice(&header.nonce),
      Payload {
        msg: ciphertext,
        aad: &aad,
      },
    )
    .map(Zeroizing::new)
    .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
  use super::*;

  const ROUNDS: u32 = 1_000;

  fn sealed(passphrase: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let salt = random_salt();
    let key = derive_key(passphrase, &salt, ROUNDS);
    seal(&key, ROUNDS, &salt, plaintext).unwrap()
  }

  fn unseal(passphrase: &[u8], bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (header, body) = Header::parse(bytes)?;
    let key = derive_key(passphrase, &header.salt, header.rounds);
    open(&key, &header, body).map(|p| p.to_vec())
  }

  #[test]
  fn test_round_trip() {
    let bytes = sealed(b"correct horse", b"{\"entries\":[]}");
    assert_eq!(unseal(b"correct horse", &bytes).unwrap(), b"{\"entries\":[]}");
  }

  #[test]
  fn test_plaintext_not_visible() {
    let bytes = sealed(b"pw", b"ghp_plaintexttoken");
    assert!(!bytes.windows(b"ghp_plaintexttoken".len()).any(|w| w == b"ghp_plaintexttoken"));
  }

  #[test]
  fn test_wrong_passphrase_fails_authentication() {
    let bytes = sealed(b"right", b"data");
    assert_eq!(unseal(b"wrong", &bytes).unwrap_err(), CryptoError::Authentication);
  }

  #[test]
  fn test_tampered_header_or_body_fails() {
    let bytes = sealed(b"pw", b"data");

    let mut body = bytes.clone();
    let last = body.len() - 1;
    body[last] ^= 0x01;
    assert_eq!(unseal(b"pw", &body).unwrap_err(), CryptoError::Authentication);

    // Flipping a salt byte changes both the derived key and the AAD
    let mut header = bytes.clone();
    header[6] ^= 0x01;
    assert_eq!(unseal(b"pw", &header).unwrap_err(), CryptoError::Authentication);
  }

  #[test]
  fn test_truncated_and_unknown_version() {
    let bytes = sealed(b"pw", b"data");
    assert_eq!(unseal(b"pw", &bytes[..10]).unwrap_err(), CryptoError::Truncated);
    assert_eq!(unseal(b"pw", &[]).unwrap_err(), CryptoError::Truncated);

    let mut future = bytes;
    future[0] = 9;
    assert_eq!(unseal(b"pw", &future).unwrap_err(), CryptoError::UnsupportedVersion(9));
  }

  #[test]
  fn test_out_of_range_rounds_rejected_before_derivation() {
    let bytes = sealed(b"pw", b"data");

    let mut inflated = bytes.clone();
    inflated[1] ^= 0x40;
    assert_eq!(Header::parse(&inflated).unwrap_err(), CryptoError::InvalidRounds);

    let mut zeroed = bytes;
    zeroed[1..5].copy_from_slice(&0u32.to_be_bytes());
    assert_eq!(Header::parse(&zeroed).unwrap_err(), CryptoError::InvalidRounds);
  }

  #[test]
  fn test_nonce_differs_between_seals() {
    let salt = random_salt();
    let key = derive_key(b"pw", &salt, ROUNDS);
    let a = seal(&key, ROUNDS, &salt, b"same").unwrap();
    let b = seal(&key, ROUNDS, &salt, b"same").unwrap();
    assert_ne!(a, b);
  }
}
