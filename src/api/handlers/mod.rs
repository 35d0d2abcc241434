//! API handlers for Najeekai.
//!
//! Auth handlers drive the signup and passcode workflow; navigation exposes
//! the route guards to the browser; health reports database reachability.

pub mod auth;
pub mod health;
pub mod navigation;
