//! The passcode issuer generates a code for an email, delivers it out of band,
//! and can later confirm an `(email, otp, session_id)` triple.
//!
//! Two implementations ship with the crate:
//! - [`HttpPasscodeIssuer`] talks to an external issuer over REST
//!   (`POST {base}/sendOtp`, `POST {base}/verifyOtp`).
//! - [`LocalPasscodeIssuer`] generates codes in-process, hands them to an
//!   [`EmailSender`], and answers verify requests from the local stores.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info, info_span};
use ulid::Ulid;
use url::Url;

use super::clock::Clock;
use super::model::Role;
use super::store::{BoxFuture, IdentityStore, PasscodeStore};
use super::validate::hash_code;

/// Result of asking the issuer to send a code.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCode {
    pub session_id: String,
    #[serde(default)]
    pub otp: Option<String>,
}

/// The issuer's answer to a verify request.
///
/// `is_registered` and `role` are hints; the identity store stays authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerVerdict {
    pub success: bool,
    #[serde(default)]
    pub is_registered: bool,
    #[serde(default)]
    pub role: Option<Role>,
}

pub trait PasscodeIssuer: Send + Sync {
    fn send<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<IssuedCode>>;

    fn verify<'a>(
        &'a self,
        email: &'a str,
        otp: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<IssuerVerdict>>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    email: &'a str,
    otp: &'a str,
    session_id: &'a str,
}

/// REST client for an external passcode issuer.
#[derive(Clone)]
pub struct HttpPasscodeIssuer {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl HttpPasscodeIssuer {
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).context("invalid issuer URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build issuer HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base_url
            .join(name)
            .with_context(|| format!("invalid issuer endpoint: {name}"))
    }

    async fn post<B, T>(&self, name: &'static str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(name)?;
        let span = info_span!("issuer.request", http.method = "POST", url = %url);
        let mut request = self.client.post(url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let response = request.send().instrument(span).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("issuer {name} failed: {status} {body}"));
        }

        response
            .json()
            .await
            .with_context(|| format!("issuer {name} returned an unexpected body"))
    }
}

impl PasscodeIssuer for HttpPasscodeIssuer {
    fn send<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<IssuedCode>> {
        Box::pin(async move { self.post("sendOtp", &SendRequest { email }).await })
    }

    fn verify<'a>(
        &'a self,
        email: &'a str,
        otp: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<IssuerVerdict>> {
        Box::pin(async move {
            self.post(
                "verifyOtp",
                &VerifyRequest {
                    email,
                    otp,
                    session_id,
                },
            )
            .await
        })
    }
}

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// The passcode email sent on signup, login and resend.
    #[must_use]
    pub fn passcode(to_email: &str, code: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            subject: "Your verification code".to_string(),
            body: format!(
                "Your verification code is: {code}\n\nThis code will expire in 10 minutes.\n\nIf you did not request this code, you can ignore this email."
            ),
        }
    }
}

/// Email delivery abstraction used by the local issuer.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can retry.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            "passcode email send stub"
        );
        Ok(())
    }
}

/// In-process issuer: six-digit codes, ULID session ids, delivery through an [`EmailSender`].
pub struct LocalPasscodeIssuer {
    sender: Arc<dyn EmailSender>,
    identities: Arc<dyn IdentityStore>,
    passcodes: Arc<dyn PasscodeStore>,
    clock: Arc<dyn Clock>,
    generate: fn() -> String,
}

impl LocalPasscodeIssuer {
    #[must_use]
    pub fn new(
        sender: Arc<dyn EmailSender>,
        identities: Arc<dyn IdentityStore>,
        passcodes: Arc<dyn PasscodeStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sender,
            identities,
            passcodes,
            clock,
            generate: super::validate::generate_code,
        }
    }

    /// Replace the code generator, e.g. with a fixed code in tests.
    #[must_use]
    pub fn with_generator(mut self, generate: fn() -> String) -> Self {
        self.generate = generate;
        self
    }
}

impl PasscodeIssuer for LocalPasscodeIssuer {
    fn send<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<IssuedCode>> {
        Box::pin(async move {
            let otp = (self.generate)();
            let session_id = Ulid::new().to_string();
            self.sender
                .send(&EmailMessage::passcode(email, &otp))
                .context("failed to deliver passcode email")?;
            Ok(IssuedCode {
                session_id,
                otp: Some(otp),
            })
        })
    }

    fn verify<'a>(
        &'a self,
        email: &'a str,
        otp: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<IssuerVerdict>> {
        Box::pin(async move {
            let record = self
                .passcodes
                .find_latest(session_id, &hash_code(otp))
                .await?;
            let success = record.is_some_and(|record| {
                record.email == email && !record.is_expired(self.clock.now())
            });
            if !success {
                return Ok(IssuerVerdict {
                    success: false,
                    is_registered: false,
                    role: None,
                });
            }

            let existing = self.identities.find_by_email(email).await?;
            Ok(IssuerVerdict {
                success: true,
                is_registered: existing.is_some(),
                role: existing.map(|identity| identity.role),
            })
        })
    }
}
