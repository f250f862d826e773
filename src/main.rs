use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use forecast_dispatch::config::{Config, EnvConfig};
use forecast_dispatch::data::csv_input::load_csv_file;
use forecast_dispatch::forecast::npts::NptsPredictorFactory;
use forecast_dispatch::forecast::quantile::{HttpQuantileBackend, QuantileTableAdapter};
use forecast_dispatch::forecast::sample::SampleMatrixAdapter;
use forecast_dispatch::forecast::{
    BackendOptions, Dispatcher, ForecastRequest, ForecastResponse, ForecastService, ForecastStatus,
    Frequency, ModelRegistry,
};
use forecast_dispatch::monitoring::compare::{anomaly_count, compare, evaluate_bounds};
use forecast_dispatch::monitoring::export::{export_forecast, write_comparison_csv, RunLogger};
use forecast_dispatch::monitoring::telegram::TelegramNotifier;
use forecast_dispatch::store::ForecastStore;

#[derive(Parser)]
#[command(name = "forecast-dispatch", version, about = "Zero-shot time-series forecasting")]
struct Cli {
    /// Path to config.toml (defaults are used when it does not exist)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Forecast a series from a CSV file
    Forecast {
        input: PathBuf,
        #[arg(long)]
        model: Option<String>,
        #[arg(long = "id-column")]
        id_column: String,
        #[arg(long = "timestamp-column")]
        timestamp_column: String,
        #[arg(long = "target-column")]
        target_column: String,
        #[arg(long)]
        horizon: Option<usize>,
        /// Frequency code such as D, H, 15min, W, MS
        #[arg(long)]
        freq: Option<String>,
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        #[arg(long = "num-samples")]
        num_samples: Option<usize>,
        #[arg(long = "context-length")]
        context_length: Option<usize>,
        /// Write the forecast table to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the response as JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Skip saving the forecast to the database
        #[arg(long = "no-save")]
        no_save: bool,
    },
    /// List model identifiers
    Models,
    /// Compare real observations against the latest saved forecast
    Compare {
        /// Record an observation before comparing (needs --value)
        #[arg(long, requires = "value")]
        date: Option<NaiveDate>,
        #[arg(long, requires = "date")]
        value: Option<f64>,
        /// Write the comparison table to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check a real value against forecast bounds and optionally alert
    Check {
        #[arg(long)]
        real: f64,
        #[arg(long)]
        p10: f64,
        #[arg(long)]
        p50: f64,
        #[arg(long)]
        p90: f64,
        #[arg(long, default_value = "")]
        dataset: String,
        /// Send the result to every configured Telegram chat
        #[arg(long)]
        notify: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::load_or_default(&cli.config)?;
    let env = EnvConfig::load();

    match cli.command {
        Command::Forecast {
            input,
            model,
            id_column,
            timestamp_column,
            target_column,
            horizon,
            freq,
            checkpoint,
            num_samples,
            context_length,
            output,
            json,
            no_save,
        } => {
            let model = model.unwrap_or_else(|| config.forecast.default_model.clone());
            let horizon = horizon.unwrap_or(config.forecast.horizon);
            let frequency = Frequency::parse(freq.as_deref().unwrap_or(&config.forecast.frequency))?;

            let upload = load_csv_file(&input)
                .with_context(|| format!("Failed to load {}", input.display()))?;
            let source = upload
                .filename
                .clone()
                .unwrap_or_else(|| input.display().to_string());

            let request = ForecastRequest::new(
                model.clone(),
                id_column,
                timestamp_column,
                target_column,
                horizon,
            )
            .with_frequency(frequency)
            .with_options(BackendOptions {
                checkpoint_path: checkpoint,
                num_samples,
                context_length,
                ..BackendOptions::default()
            });

            let service = Arc::new(build_service(&config, &env)?);
            let rows = upload.rows;
            let response = tokio::task::spawn_blocking(move || service.forecast(&rows, &request))
                .await
                .context("Forecast task panicked")??;

            if config.monitoring.csv_logging {
                RunLogger::new(&config.monitoring.csv_log_path)?
                    .log_run(&model, &source, horizon, &response)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response_table(&response);
            }

            if response.status() == ForecastStatus::Failed {
                bail!("{} produced no forecast", model);
            }

            if let Some(path) = output {
                export_forecast(&response.forecast, &path)?;
                tracing::info!("Forecast written to {}", path.display());
            }

            if !no_save {
                let store = ForecastStore::open(&config.storage.database_path)?;
                let id = store.save_forecast(
                    &config.storage.user_id,
                    &model,
                    Some(&source),
                    &response.forecast,
                )?;
                tracing::info!("Saved forecast #{}", id);
            }
        }
        Command::Models => {
            let service = build_service(&config, &env)?;
            for (id, kind) in service.models() {
                println!("{:<28} {}", id, kind);
            }
        }
        Command::Compare {
            date,
            value,
            output,
        } => {
            let store = ForecastStore::open(&config.storage.database_path)?;
            let user = &config.storage.user_id;

            let forecast = match store.load_latest_forecast(user)? {
                Some(table) => table,
                None => bail!("No saved forecast yet; run `forecast` first"),
            };

            if let (Some(date), Some(value)) = (date, value) {
                if !store.add_real_observation(user, date, value)? {
                    tracing::warn!("An observation for {} already exists; keeping the first", date);
                }
            }

            let rows = compare(&forecast, &store.real_observations(user)?);
            write_comparison_csv(&rows, std::io::stdout())?;
            tracing::info!("{} of {} observations are anomalies", anomaly_count(&rows), rows.len());

            if let Some(path) = output {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                write_comparison_csv(&rows, file)?;
            }
        }
        Command::Check {
            real,
            p10,
            p50,
            p90,
            dataset,
            notify,
        } => {
            let check = evaluate_bounds(real, p10, p50, p90);
            let message = check.alert_message(&dataset, Local::now().naive_local());
            println!("{}", message);

            if notify {
                if !config.monitoring.telegram_enabled {
                    tracing::warn!("Telegram is disabled in config; not sending");
                } else {
                    let notifier =
                        TelegramNotifier::new(env.telegram_bot_token.clone(), env.telegram_chat_ids.clone());
                    let results = notifier.notify_all(&message).await;
                    let delivered = results.values().filter(|ok| **ok).count();
                    println!("Notification sent to {} of {} chats", delivered, results.len());
                }
            }
        }
    }

    Ok(())
}

fn build_service(config: &Config, env: &EnvConfig) -> Result<ForecastService> {
    let capture_level = config.capture_level()?;
    let url = env
        .quantile_backend_url
        .clone()
        .unwrap_or_else(|| config.quantile_backend.url.clone());

    let quantile = QuantileTableAdapter::new(HttpQuantileBackend::new(url))
        .with_time_limit(config.quantile_backend.time_limit())
        .with_mean_source(config.quantile_backend.mean_source)
        .with_capture_level(capture_level);
    let sample = SampleMatrixAdapter::new(NptsPredictorFactory)
        .with_defaults(config.sample_backend.defaults())
        .with_capture_level(capture_level);

    Ok(ForecastService::new(Dispatcher::new(ModelRegistry::with_defaults(
        quantile, sample,
    ))))
}

fn print_response_table(response: &ForecastResponse) {
    if response.forecast.is_empty() {
        eprintln!("No forecast produced. Log:\n{}", response.log_preview());
        return;
    }

    println!("{:<20} {:>12} {:>12} {:>12}", "timestamp", "mean", "p10", "p90");
    for row in response.forecast.rows() {
        println!(
            "{:<20} {:>12.3} {:>12.3} {:>12.3}",
            row.timestamp.format("%Y-%m-%d %H:%M:%S"),
            row.mean,
            row.p10,
            row.p90
        );
    }
}
