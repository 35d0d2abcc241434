//! Small helpers for input validation, passcodes and session tokens.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of digits in a passcode.
pub const CODE_LENGTH: usize = 6;

/// Normalize an email for lookup/uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn valid_username(username_normalized: &str) -> bool {
    Regex::new(r"^[a-z0-9_.-]{3,32}$").is_ok_and(|regex| regex.is_match(username_normalized))
}

pub fn valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= 100
}

/// Trim a submitted passcode and check it is exactly six ASCII digits.
pub fn normalize_code(code: &str) -> Option<&str> {
    let trimmed = code.trim();
    (trimmed.len() == CODE_LENGTH && trimmed.bytes().all(|b| b.is_ascii_digit())).then_some(trimmed)
}

/// Generate a zero-padded six digit passcode.
pub fn generate_code() -> String {
    let value: u32 = OsRng.gen_range(0..1_000_000);
    format!("{value:06}")
}

/// Hash a passcode so the raw value never touches the database.
pub fn hash_code(code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.finalize().to_vec()
}

/// Create a new session token for a browser context.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn username_rules() {
        assert!(valid_username("john_doe"));
        assert!(valid_username("j.d-1"));
        assert!(!valid_username("jd"));
        assert!(!valid_username("john doe"));
        assert!(!valid_username(&"x".repeat(33)));
    }

    #[test]
    fn normalize_code_requires_six_digits() {
        assert_eq!(normalize_code(" 482913 "), Some("482913"));
        assert_eq!(normalize_code("48291"), None);
        assert_eq!(normalize_code("4829134"), None);
        assert_eq!(normalize_code("48a913"), None);
        assert_eq!(normalize_code("٤٨٢٩١٣"), None);
    }

    #[test]
    fn generated_codes_are_valid() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(normalize_code(&code), Some(code.as_str()));
        }
    }

    #[test]
    fn hash_code_stable() {
        assert_eq!(hash_code("482913"), hash_code("482913"));
        assert_ne!(hash_code("482913"), hash_code("482914"));
    }

    #[test]
    fn session_token_is_32_bytes() {
        let decoded_len = generate_session_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }
}
