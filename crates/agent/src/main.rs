use std::sync::Arc;

use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use tm_agent::cli::{self, Cli, Command, ConfigCommand};
use tm_domain::config::ObservabilityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to run when no subcommand is given.
        None | Some(Command::Run) => {
            let (config, _config_path) = cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability);
            let result = tm_agent::agent::run(Arc::new(config)).await;
            if let Some(provider) = tracer_provider {
                if let Err(e) = provider.shutdown() {
                    eprintln!("otel shutdown error: {e}");
                }
            }
            result
        }
        Some(Command::Touch { json }) => {
            init_cli_tracing();
            let (config, _config_path) = cli::load_config()?;
            cli::session::touch(&config, json).await
        }
        Some(Command::Show) => {
            init_cli_tracing();
            let (config, _config_path) = cli::load_config()?;
            cli::session::show(&config).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("tidemark {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize tracing for the long-running agent.
///
/// Logs go to stderr.  When `otlp_endpoint` is set, spans are also exported
/// over OTLP/gRPC and the returned provider must be shut down on exit.
fn init_tracing(
    obs: &ObservabilityConfig,
) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let json_layer = obs.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!obs.json_logs).then(|| {
        tracing_subscriber::fmt::layer().with_writer(std::io::stderr)
    });

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer);

    let Some(endpoint) = &obs.otlp_endpoint else {
        registry.init();
        return None;
    };

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!(
                "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                 starting without OpenTelemetry"
            );
            registry.init();
            return None;
        }
    };

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(obs.service_name.clone())
        .build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
            obs.sample_rate,
        ))
        .with_resource(resource)
        .build();

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("tidemark"));

    registry.with(otel_layer).init();

    Some(tracer_provider)
}

/// Compact stderr-only tracing for one-shot commands.
///
/// Defaults to `warn` so diagnostics stay off stdout.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
