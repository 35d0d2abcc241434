//! Browser contexts: server-held storage for one browser, keyed by a cookie.
//!
//! A context owns the pending registration, the session/user pair and the
//! resend countdown for that browser. Idle contexts are evicted after the
//! configured TTL; eviction drops the countdown, which stops its timer task.

use axum::http::{HeaderMap, HeaderValue, header::InvalidHeaderValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use ulid::Ulid;

use super::state::AuthConfig;
use crate::identity::{AuthError, MemoryContextStorage, ResendGate, countdown::format_remaining};

pub(crate) const CONTEXT_COOKIE_NAME: &str = "najeekai_ctx";

pub(crate) struct BrowserContext {
    storage: MemoryContextStorage,
    gate: StdMutex<Option<ResendGate>>,
    actions: Mutex<()>,
    last_seen: StdMutex<Instant>,
}

impl BrowserContext {
    fn new() -> Self {
        Self {
            storage: MemoryContextStorage::new(),
            gate: StdMutex::new(None),
            actions: Mutex::new(()),
            last_seen: StdMutex::new(Instant::now()),
        }
    }

    pub(crate) fn storage(&self) -> &MemoryContextStorage {
        &self.storage
    }

    /// Serialize state-changing actions within one context.
    pub(crate) async fn lock_actions(&self) -> MutexGuard<'_, ()> {
        self.actions.lock().await
    }

    /// Replace the countdown with a fresh one; the old timer task stops when dropped.
    pub(crate) fn restart_countdown(&self, seconds: u64) {
        let gate = ResendGate::start(seconds);
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate);
    }

    pub(crate) fn stop_countdown(&self) {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Seconds left before resend is allowed; zero when no countdown runs.
    pub(crate) fn remaining_seconds(&self) -> u64 {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, ResendGate::remaining)
    }

    /// Allow a resend only once the countdown has reached zero (or never started).
    pub(crate) fn check_resend(&self) -> Result<(), AuthError> {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(Ok(()), ResendGate::check)
    }

    pub(crate) fn countdown_display(&self) -> String {
        format_remaining(self.remaining_seconds())
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

pub(crate) struct BrowserContexts {
    ttl: Duration,
    contexts: Mutex<HashMap<String, Arc<BrowserContext>>>,
}

impl BrowserContexts {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the context named by the request cookie without creating one.
    pub(crate) async fn find(&self, headers: &HeaderMap) -> Option<Arc<BrowserContext>> {
        let id = extract_context_id(headers)?;
        let mut contexts = self.contexts.lock().await;
        self.evict_idle(&mut contexts);
        let context = contexts.get(&id)?.clone();
        context.touch();
        Some(context)
    }

    /// Look up the context named by the request cookie, creating one when missing or evicted.
    pub(crate) async fn resolve(&self, headers: &HeaderMap) -> (String, Arc<BrowserContext>) {
        let mut contexts = self.contexts.lock().await;
        self.evict_idle(&mut contexts);
        if let Some(id) = extract_context_id(headers)
            && let Some(context) = contexts.get(&id)
        {
            context.touch();
            return (id, context.clone());
        }

        let id = Ulid::new().to_string();
        let context = Arc::new(BrowserContext::new());
        contexts.insert(id.clone(), context.clone());
        (id, context)
    }

    pub(crate) async fn len(&self) -> usize {
        self.contexts.lock().await.len()
    }

    fn evict_idle(&self, contexts: &mut HashMap<String, Arc<BrowserContext>>) {
        contexts.retain(|_, context| context.idle_for() < self.ttl);
    }
}

/// Build the `HttpOnly` cookie naming the browser context.
pub(crate) fn context_cookie(config: &AuthConfig, id: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.context_ttl_seconds();
    let mut cookie = format!(
        "{CONTEXT_COOKIE_NAME}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    // Only mark cookies secure when the frontend is served over HTTPS.
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_context_id(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(axum::http::header::COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == CONTEXT_COOKIE_NAME && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}
