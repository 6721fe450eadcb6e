//! Steam Guard two-factor codes.
//!
//! Standard TOTP (HMAC-SHA1, 30 second step, dynamic truncation) rendered as
//! five characters from Steam's own alphabet instead of decimal digits.

use crate::models::{FreebieError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

const CODE_ALPHABET: &[u8] = b"23456789BCDFGHJKMNPQRTVWXY";
const CODE_LENGTH: usize = 5;
const TIME_STEP_SECS: i64 = 30;

/// Generate the code valid at `unix_time` for a base64 shared secret.
pub fn auth_code_at(shared_secret: &str, unix_time: i64) -> Result<String> {
    let key = STANDARD
        .decode(shared_secret.trim())
        .map_err(|e| FreebieError::InvalidInput(format!("shared secret is not base64: {e}")))?;

    let counter = (unix_time.max(0) / TIME_STEP_SECS) as u64;
    let mut value = truncated_hmac(&key, counter)?;

    let mut code = String::with_capacity(CODE_LENGTH);
    for _ in 0..CODE_LENGTH {
        code.push(CODE_ALPHABET[(value as usize) % CODE_ALPHABET.len()] as char);
        value /= CODE_ALPHABET.len() as u32;
    }
    Ok(code)
}

/// Generate the code for the current time.
pub fn auth_code(shared_secret: &str) -> Result<String> {
    auth_code_at(shared_secret, chrono::Utc::now().timestamp())
}

/// RFC 4226 dynamic truncation of HMAC-SHA1(key, counter).
fn truncated_hmac(key: &[u8], counter: u64) -> Result<u32> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|e| FreebieError::InvalidInput(format!("unusable shared secret: {e}")))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let word = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    Ok(word & 0x7fff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    // "12345678901234567890", the RFC 4226 / RFC 6238 test key
    const RFC_SECRET: &str = "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=";

    #[test]
    fn test_truncation_matches_rfc_vector() {
        // RFC 6238 SHA1 at T=59 → 94287082 (8 digits of 1094287082)
        assert_eq!(
            truncated_hmac(b"12345678901234567890", 1).unwrap(),
            1_094_287_082
        );
    }

    #[test]
    fn test_code_for_rfc_secret() {
        assert_eq!(auth_code_at(RFC_SECRET, 59).unwrap(), "PV9M4");
        // Same 30 second window
        assert_eq!(auth_code_at(RFC_SECRET, 30).unwrap(), "PV9M4");
    }

    #[test]
    fn test_code_shape() {
        let code = auth_code(RFC_SECRET).unwrap();
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(matches!(
            auth_code_at("not base64!!", 0),
            Err(FreebieError::InvalidInput(_))
        ));
    }
}
