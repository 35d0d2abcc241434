use super::handlers::{auth, health, navigation};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and documented. Routes added in `api::app` (like `OPTIONS /health`) are not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(navigation::navigate))
        .routes(routes!(auth::signup::signup, auth::signup::cancel_signup))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::verification::verify_otp))
        .routes(routes!(auth::verification::resend_otp))
        .routes(routes!(auth::verification::otp_status))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::logout));

    let mut najeekai_tag = Tag::new("najeekai");
    najeekai_tag.description = Some("Marketplace account service".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Signup, passcode verification and sessions".to_string());

    let mut navigation_tag = Tag::new("navigation");
    navigation_tag.description = Some("Route guard decisions".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and database health".to_string());

    router.get_openapi_mut().tags = Some(vec![najeekai_tag, auth_tag, navigation_tag, health_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_author<'a>(author: &'a str) -> (Option<&'a str>, Option<&'a str>) {
    let non_empty = |value: &'a str| -> Option<&'a str> {
        let value = value.trim();
        (!value.is_empty()).then_some(value)
    };
    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}
