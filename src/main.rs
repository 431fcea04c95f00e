// Usage:
//   metric-collectors delete-companies [--no-confirm] SYMBOL...
//   metric-collectors create-models [METRIC_NAME...]
// Config comes from CONFIG_FILE (default ./config.toml).

use anyhow::Result;
use metric_collectors::api_client::{ApiClient, MonitoringApi};
use metric_collectors::collector_repo::CollectorRepo;
use metric_collectors::company_deleter::{CompanyDeleter, ConfirmationPolicy, DeletionRequest};
use metric_collectors::confirmation::PromptConfirmation;
use metric_collectors::flusher::DataPathFlusher;
use metric_collectors::models::MetricsCatalog;
use metric_collectors::publisher::RabbitMqHttpBus;
use metric_collectors::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        anyhow::bail!("usage: metric-collectors <delete-companies|create-models> [ARGS...]");
    };

    let app_config = config::AppConfig::load()?;
    let api = Arc::new(ApiClient::new(
        &app_config.api.host,
        app_config.api.api_key.clone(),
        app_config.retry.clone(),
    )?);
    tracing::info!(version = version::VERSION, server = %api.server(), "starting");

    match command.as_str() {
        "delete-companies" => delete_companies(&app_config, api, rest).await,
        "create-models" => create_models(&app_config, api.as_ref(), rest).await,
        other => anyhow::bail!("unknown command: {}", other),
    }
}

async fn delete_companies(
    app_config: &config::AppConfig,
    api: Arc<ApiClient>,
    args: &[String],
) -> Result<()> {
    let skip_prompt = args.iter().any(|a| a == "--no-confirm") || !app_config.confirmation.enabled;
    let ticker_symbols: Vec<String> = args.iter().filter(|a| !a.starts_with("--")).cloned().collect();
    anyhow::ensure!(!ticker_symbols.is_empty(), "no ticker symbols given");

    let repo = Arc::new(
        CollectorRepo::connect(&app_config.database.path, app_config.database.max_pool_size)
            .await?,
    );
    repo.init().await?;

    let bus = Arc::new(RabbitMqHttpBus::new(&app_config.message_bus)?);
    let flusher = DataPathFlusher::new(
        api.clone(),
        bus,
        app_config.message_bus.queue.clone(),
        app_config.message_bus.batch_size,
        &app_config.flusher,
    );
    let deleter = CompanyDeleter::new(
        api,
        flusher,
        repo,
        Arc::new(PromptConfirmation::console()),
    );

    let confirmation = if skip_prompt {
        ConfirmationPolicy::Skip
    } else {
        ConfirmationPolicy::Prompt {
            timeout: Duration::from_secs(app_config.confirmation.timeout_secs),
        }
    };
    let summary = deleter
        .delete_companies(&DeletionRequest {
            ticker_symbols,
            confirmation,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&summary.deleted_metrics)?);
    Ok(())
}

async fn create_models(
    app_config: &config::AppConfig,
    api: &ApiClient,
    args: &[String],
) -> Result<()> {
    let catalog = MetricsCatalog::load(&app_config.catalog_path)?;
    let filter = (!args.is_empty()).then_some(args);
    let models = model_setup::create_all_models(api, &catalog, filter).await?;
    println!("{}", serde_json::to_string_pretty(&models)?);
    Ok(())
}
