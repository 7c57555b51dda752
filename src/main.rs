use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use quote_responder::channels::{EmailConfig, ImapMailbox};
use quote_responder::config::QuoteConfig;
use quote_responder::error::CONFIG_EXIT_CODE;
use quote_responder::geo::{GeoConfig, NominatimProvider, OsrmProvider};
use quote_responder::llm::{LlmConfig, create_provider};
use quote_responder::pipeline::{Orchestrator, ReplyComposer, RunOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let orchestrator = match build_orchestrator() {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(CONFIG_EXIT_CODE);
        }
    };

    match orchestrator.run().await {
        RunOutcome::Done(summary) => {
            eprintln!(
                "   Quoted {} km to {} for {}{}",
                summary.distance,
                summary.destination,
                summary.recipient,
                if summary.receipt.is_none() { " (dry run)" } else { "" }
            );
            ExitCode::SUCCESS
        }
        outcome @ RunOutcome::Aborted { .. } => ExitCode::from(outcome.exit_code()),
    }
}

/// Load every config section from the environment and wire the collaborators.
fn build_orchestrator() -> anyhow::Result<Orchestrator> {
    let config = QuoteConfig::from_env().context("quote settings")?;
    let email = EmailConfig::from_env().context("email settings")?;
    let geo = GeoConfig::from_env().context("geo settings")?;
    let llm_config = LlmConfig::from_env().context("LLM settings")?;

    eprintln!("📦 Quote Responder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Base location: {}", config.base_location);
    eprintln!("   Mailbox: {} ({})", email.imap_host, config.inbox_folder);
    eprintln!("   Geocoder: {}", geo.nominatim_url);
    eprintln!("   Router: {}", geo.osrm_url);
    eprintln!(
        "   Allowed senders: {}",
        if config.allowed_senders.iter().any(|s| s == "*") {
            "everyone".to_string()
        } else if config.allowed_senders.is_empty() {
            "none (deny all)".to_string()
        } else {
            config.allowed_senders.join(", ")
        }
    );
    if config.dry_run {
        eprintln!("   Dry run: replies are logged, not sent");
    }
    eprintln!();

    let llm = create_provider(&llm_config).context("LLM provider")?;
    let composer = ReplyComposer::new(llm)
        .with_max_tokens(llm_config.max_tokens)
        .with_temperature(llm_config.temperature);

    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(ImapMailbox::new(email)),
        Arc::new(NominatimProvider::new(&geo).context("geocoder")?),
        Arc::new(OsrmProvider::new(&geo).context("router")?),
        composer,
    )
    .context("pipeline")?;

    Ok(orchestrator)
}
