use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Request, Response,
    fairing::{Fairing, Info, Kind},
};
use std::time::Instant;
use tonic::metadata::MetadataMap;
use tracing::info_span;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "OpenTelemetry",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let uri = request.uri().to_string();

        let start_time = Instant::now();

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, uri),
            http.method = method,
            http.uri = uri,
            http.route = request.route().map(|r| r.uri.to_string()),
        );

        request.local_cache(|| (span, start_time));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let (span, start_time) = request.local_cache(|| {
            let span = info_span!("http_request");
            (span, Instant::now())
        });

        let duration = start_time.elapsed();

        span.record("http.status_code", response.status().code);
        span.record("http.duration_ms", duration.as_millis() as i64);

        let _entered = span.enter();
        tracing::info!(
            "Completed request in {}ms with status {}",
            duration.as_millis(),
            response.status().code
        );
    }
}

fn resource() -> Resource {
    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, "develop"),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_tracer_provider(endpoint: &str) -> SdkTracerProvider {
    let mut metadata = MetadataMap::new();
    if let Ok(api_key) = std::env::var("HONEYCOMB_API_KEY") {
        metadata.insert("x-honeycomb-team", api_key.parse().unwrap());
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata)
        .build()
        .unwrap();

    SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build()
}

/// Registers the fmt subscriber, plus an OTLP export layer when
/// OTEL_EXPORTER_OTLP_ENDPOINT is configured.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .map(|endpoint| {
            let provider = init_tracer_provider(&endpoint);
            let tracer = provider.tracer("training-tracker");
            let _ = TRACER_PROVIDER.set(provider);
            OpenTelemetryLayer::new(tracer)
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();
}

pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}
