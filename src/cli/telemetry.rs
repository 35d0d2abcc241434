//! Log output and optional OTLP trace export.
//!
//! Everything is configured from [`logging::Options`]: the level applies to
//! this crate and its HTTP layer, third-party crates stay at ERROR (sqlx at
//! WARN so slow statements show), and traces go to the collector named by
//! `--otlp-endpoint` tagged with the deployment environment and instance id.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose};
use once_cell::sync::OnceCell;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
};
use std::time::Duration;
use tonic::{
    metadata::{AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

use crate::cli::commands::logging::{LogFormat, Options};

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// `RUST_LOG` is honoured for anything the crate directives don't name.
fn env_filter(level: Level) -> Result<EnvFilter> {
    let level = level.as_str().to_ascii_lowercase();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .from_env_lossy()
        .add_directive(format!("{}={level}", env!("CARGO_CRATE_NAME")).parse()?)
        .add_directive(format!("tower_http={level}").parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);
    Ok(filter)
}

fn resource(options: &Options) -> Resource {
    let instance_id = options
        .instance_id
        .clone()
        .unwrap_or_else(|| Ulid::new().to_string());
    Resource::builder_empty()
        .with_attributes([
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", instance_id),
            KeyValue::new("deployment.environment.name", options.environment.clone()),
            KeyValue::new("vcs.ref.head.revision", crate::GIT_COMMIT_HASH),
        ])
        .build()
}

/// gRPC metadata for the exporter; `-bin` keys carry base64 values.
fn export_metadata(headers: &[(String, String)]) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());
    for (key, value) in headers {
        if key.ends_with("-bin") {
            let bytes = general_purpose::STANDARD
                .decode(value)
                .with_context(|| format!("OTLP header {key} is not valid base64"))?;
            let key = BinaryMetadataKey::from_bytes(key.as_bytes())
                .with_context(|| format!("invalid OTLP header name {key}"))?;
            metadata.insert_bin(key, MetadataValue::from_bytes(&bytes));
        } else {
            let name = AsciiMetadataKey::from_bytes(key.as_bytes())
                .with_context(|| format!("invalid OTLP header name {key}"))?;
            let value: AsciiMetadataValue = value
                .parse()
                .with_context(|| format!("invalid value for OTLP header {key}"))?;
            metadata.insert(name, value);
        }
    }
    Ok(metadata)
}

/// Collectors are reached over TLS unless the endpoint says `http://`.
fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

fn tls_domain(endpoint: &str) -> Option<&str> {
    endpoint
        .strip_prefix("https://")
        .and_then(|rest| rest.split(['/', ':']).next())
        .filter(|host| !host.is_empty())
}

fn init_tracer(endpoint: &str, options: &Options) -> Result<Tracer> {
    let endpoint = normalize_endpoint(endpoint);
    let mut builder = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT);
    if let Some(host) = tls_domain(&endpoint) {
        builder = builder.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(host.to_string())
                .with_native_roots(),
        );
    }
    if !options.otlp_headers.is_empty() {
        builder = builder.with_metadata(export_metadata(&options.otlp_headers)?);
    }

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(builder.build()?)
        .with_resource(resource(options))
        .build();
    let _ = TRACER_PROVIDER.set(provider.clone());

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));
    debug!(%endpoint, environment = %options.environment, "exporting traces");

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Install the global subscriber.
///
/// # Errors
/// Returns an error if the exporter cannot be built or a subscriber is already set.
pub fn init(options: &Options) -> Result<()> {
    let filter = env_filter(options.level.unwrap_or(Level::ERROR))?;

    let fmt_layer = match options.format {
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .pretty()
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    };

    let otel_layer = match options.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = init_tracer(endpoint, options)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Flush pending spans; a no-op when export was never enabled.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = provider.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{Key, Value};

    fn options() -> Options {
        Options {
            level: None,
            format: LogFormat::Pretty,
            otlp_endpoint: None,
            otlp_headers: Vec::new(),
            environment: "staging".to_string(),
            instance_id: Some("api-1".to_string()),
        }
    }

    #[test]
    fn filter_scopes_level_to_the_crate() -> Result<()> {
        let directives = temp_env::with_var_unset("RUST_LOG", || env_filter(Level::DEBUG))?
            .to_string()
            .to_ascii_lowercase();
        assert!(directives.contains("najeekai=debug"), "{directives}");
        assert!(directives.contains("tower_http=debug"), "{directives}");
        assert!(directives.contains("sqlx=warn"), "{directives}");
        Ok(())
    }

    #[test]
    fn resource_carries_deployment_attributes() {
        let resource = resource(&options());
        let get = |key: &'static str| resource.get(&Key::from_static_str(key));
        assert_eq!(get("service.name"), Some(Value::from("najeekai")));
        assert_eq!(get("service.instance.id"), Some(Value::from("api-1")));
        assert_eq!(get("deployment.environment.name"), Some(Value::from("staging")));
        assert_eq!(
            get("vcs.ref.head.revision"),
            Some(Value::from(crate::GIT_COMMIT_HASH))
        );
    }

    #[test]
    fn resource_generates_an_instance_id() {
        let options = Options {
            instance_id: None,
            ..options()
        };
        let id = resource(&options).get(&Key::from_static_str("service.instance.id"));
        assert!(id.is_some_and(|id| id.as_str().len() == 26));
    }

    #[test]
    fn export_metadata_ascii_and_binary() -> Result<()> {
        let metadata = export_metadata(&[
            ("authorization".to_string(), "Bearer t0ken".to_string()),
            // base64 of [1, 2]
            ("x-tenant-bin".to_string(), "AQI=".to_string()),
        ])?;
        assert_eq!(metadata.len(), 2);
        assert_eq!(
            metadata.get("authorization").and_then(|value| value.to_str().ok()),
            Some("Bearer t0ken")
        );
        assert!(metadata.get_bin("x-tenant-bin").is_some());
        Ok(())
    }

    #[test]
    fn export_metadata_rejects_bad_base64() {
        let result = export_metadata(&[("x-tenant-bin".to_string(), "%%%".to_string())]);
        assert!(
            result
                .err()
                .is_some_and(|err| err.to_string().contains("not valid base64"))
        );
    }

    #[test]
    fn endpoints_default_to_tls() {
        assert_eq!(normalize_endpoint("http://localhost:4317/"), "http://localhost:4317");
        let endpoint = normalize_endpoint(" otel.najeekai.dev:4317 ");
        assert_eq!(endpoint, "https://otel.najeekai.dev:4317");
        assert_eq!(tls_domain(&endpoint), Some("otel.najeekai.dev"));
        assert_eq!(tls_domain("http://localhost:4317"), None);
    }

    #[test]
    fn shutdown_without_export_is_a_noop() {
        shutdown_tracer();
    }
}
