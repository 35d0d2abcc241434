//! # Najeekai (Marketplace Accounts)
//!
//! `najeekai` creates marketplace accounts and proves email ownership with
//! one-time passcodes. Authentication is passwordless: signing up and logging
//! in both end with a six-digit code sent to the account's email.
//!
//! ## Workflow
//!
//! - **Signup:** the form is validated, a passcode is issued, and the pending
//!   registration is held in the caller's browser context until the code is
//!   submitted.
//! - **Verification:** the code must match the most recent passcode issued for
//!   the registration session and must not be expired. A verified code creates
//!   the identity (or loads it for a returning user) and opens a session.
//! - **Resend:** a new code can be requested only after the countdown (10
//!   minutes by default) reaches zero.
//!
//! ## Roles
//!
//! Every identity is either a `client` or a `provider`. Email and username are
//! unique across both roles; for a returning user the stored role always wins.
//!
//! ## Browser contexts
//!
//! The HTTP layer keeps per-browser state on the server, keyed by the
//! `najeekai_ctx` cookie. Two browsers never share pending registrations,
//! sessions or countdowns.

pub mod api;
pub mod cli;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
