use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use tb_agent::cli::run::RunOptions;
use tb_agent::cli::{Cli, Command, ConfigCommand};
use tb_domain::config::ObservabilityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            query,
            stream,
            model,
            max_rounds,
            json,
        } => {
            let (config, _) = tb_agent::cli::load_config(cli.config)?;
            let tracer_provider = init_tracing(&config.observability, cli.log_json);
            let opts = RunOptions {
                stream,
                model,
                max_rounds,
                json,
            };
            let result = tb_agent::cli::run::run(config, query, opts).await;
            shutdown_tracing(tracer_provider);
            result
        }
        Command::Tools => {
            let (config, _) = tb_agent::cli::load_config(cli.config)?;
            let tracer_provider = init_tracing(&config.observability, cli.log_json);
            let result = tb_agent::cli::tools::list(config).await;
            shutdown_tracing(tracer_provider);
            result
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = tb_agent::cli::load_config(cli.config)?;
            if !tb_agent::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = tb_agent::cli::load_config(cli.config)?;
            print!("{}", tb_agent::cli::config::show(&config)?);
            Ok(())
        }
        Command::Version => {
            println!("toolbridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout carries only the answer. `RUST_LOG`
/// overrides the default `warn` filter.
fn init_tracing(
    obs: &ObservabilityConfig,
    log_json: bool,
) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let json_layer = log_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let compact_layer = (!log_json).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let tracer_provider = obs.otlp_endpoint.as_deref().and_then(|endpoint| {
        let exporter = match opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
        {
            Ok(e) => e,
            Err(e) => {
                eprintln!("warning: OTLP exporter for {endpoint} unavailable ({e}); tracing locally only");
                return None;
            }
        };
        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(obs.service_name.clone())
            .build();
        Some(
            opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
                    obs.effective_sample_rate(),
                ))
                .with_resource(resource)
                .build(),
        )
    });

    let otel_layer = tracer_provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("toolbridge")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(compact_layer)
        .with(otel_layer)
        .init();

    tracer_provider
}

fn shutdown_tracing(provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("warning: flushing traces failed: {e}");
        }
    }
}
