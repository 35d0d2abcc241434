//! Account creation and passcode verification.
//!
//! Signup holds a [`PendingRegistration`] in the browser context and asks the
//! issuer for a code. Submitting the code runs the [`VerificationController`],
//! which creates or loads the identity and hands a session to the
//! [`SessionManager`]. Nothing in this module knows about HTTP.

pub mod clock;
pub mod countdown;
pub mod error;
pub mod issuer;
pub mod model;
pub mod passcode;
pub mod rate_limit;
pub mod retry;
pub mod routes;
pub mod session;
pub mod storage;
pub mod store;
pub mod validate;
pub mod verification;

pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::{RESEND_COUNTDOWN_SECONDS, ResendGate};
pub use error::{AuthError, ValidationError};
pub use issuer::{
    EmailSender, HttpPasscodeIssuer, LocalPasscodeIssuer, LogEmailSender, PasscodeIssuer,
};
pub use model::{
    IdentityRecord, NewIdentity, PasscodeRecord, PendingRegistration, Role, Session, SessionUser,
    SignupForm,
};
pub use passcode::PasscodeService;
pub use retry::{CallError, RetryPolicy};
pub use routes::{Route, RouteDecision, View, guard};
pub use session::SessionManager;
pub use storage::{ContextStorage, MemoryContextStorage, RegistrationCache};
pub use verification::{OutcomeKind, VerificationController, VerificationOutcome};
