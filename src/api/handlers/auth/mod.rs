//! Auth handlers and supporting modules.
//!
//! Every auth request runs against a browser context: a server-held
//! key/value store named by the `najeekai_ctx` cookie. The context carries the
//! pending registration between signup and verification, the session and user
//! after verification, and the resend countdown.
//!
//! ## Passcode flow
//!
//! - `POST /v1/auth/signup` validates the form, asks the issuer for a code and
//!   holds the pending registration.
//! - `POST /v1/auth/login` does the same for a known email and always answers
//!   `202` so unknown addresses are not revealed.
//! - `POST /v1/auth/verify-otp` checks the code, creates or loads the identity
//!   and establishes the session.
//! - `POST /v1/auth/resend-otp` is refused until the countdown reaches zero.

pub(crate) mod context;
pub(crate) mod login;
pub(crate) mod session;
pub(crate) mod signup;
mod state;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use state::{AuthBackends, AuthConfig, AuthState};
