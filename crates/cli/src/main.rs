//! Sentinel CLI
//!
//! A command-line tool for triggering anomaly detection runs, browsing
//! anomaly alerts and checking the health of a sentinel agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, detect, health};

use crate::config::Config;
use crate::output::{print_error, print_info, print_success, OutputFormat};

/// Algorithm used when neither the flag nor the config file names one
const DEFAULT_ALGORITHM: &str = "statistical";

/// Sentinel CLI
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(
    author,
    version,
    about = "CLI for the Sentinel anomaly detection agent",
    long_about = None
)]
pub struct Cli {
    /// API endpoint URL (can also be set via SENTINEL_API_URL env var)
    #[arg(long, env = "SENTINEL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run anomaly detection (all active metrics unless filtered)
    Detect {
        /// Analyze a single metric
        #[arg(long, short)]
        metric: Option<u64>,

        /// Analyze the active metrics of one device
        #[arg(long, short)]
        device: Option<u64>,

        /// Detection algorithm (statistical, z_score, isolation_forest)
        #[arg(long, short)]
        algorithm: Option<String>,

        /// Sensitivity between 0 and 1; higher reports more anomalies
        #[arg(long, short, default_value = "0.5", value_parser = parse_sensitivity)]
        sensitivity: f64,
    },

    /// List anomaly alerts
    Alerts {
        /// Filter by device
        #[arg(long, short)]
        device: Option<u64>,

        /// Time period (e.g., 1h, 24h, 7d)
        #[arg(long, default_value = "7d")]
        since: String,
    },

    /// Summarize anomaly alerts by severity, algorithm, metric and device
    Analysis {
        /// Filter by device
        #[arg(long, short)]
        device: Option<u64>,

        /// Time period (e.g., 1h, 24h, 7d)
        #[arg(long, default_value = "7d")]
        since: String,
    },

    /// Show agent health and readiness
    Health,

    /// Manage CLI defaults
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the stored defaults
    Show,

    /// Store new defaults
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default output format
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Default detection algorithm
        #[arg(long)]
        algorithm: Option<String>,
    },
}

fn parse_sensitivity(value: &str) -> Result<f64, String> {
    let sensitivity: f64 = value
        .parse()
        .map_err(|_| format!("{:?} is not a number", value))?;
    if (0.0..=1.0).contains(&sensitivity) {
        Ok(sensitivity)
    } else {
        Err(format!("sensitivity must be between 0 and 1, got {}", sensitivity))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let format = config.resolve_format(cli.format);
    let api_url = cli.api_url;
    let verbose = cli.verbose;

    // Client creation is deferred so `config set` works with a broken stored URL
    let connect = |config: &Config| -> Result<client::ApiClient> {
        let url = config.resolve_api_url(api_url.clone());
        if verbose {
            print_info(&format!("Using agent at {}", url));
        }
        client::ApiClient::new(&url)
    };

    // Execute command
    match cli.command {
        Commands::Detect {
            metric,
            device,
            algorithm,
            sensitivity,
        } => {
            let client = connect(&config)?;
            let algorithm = algorithm
                .or_else(|| config.default_algorithm.clone())
                .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string());
            detect::run_detection(&client, metric, device, algorithm, sensitivity, format).await?;
        }
        Commands::Alerts { device, since } => {
            alerts::list_alerts(&connect(&config)?, device, &since, format).await?;
        }
        Commands::Analysis { device, since } => {
            alerts::show_analysis(&connect(&config)?, device, &since, format).await?;
        }
        Commands::Health => {
            health::show_health(&connect(&config)?, format).await?;
        }
        Commands::Config(config_cmd) => {
            manage_config(config, config_cmd, format)?;
        }
    }

    Ok(())
}

fn manage_config(mut config: Config, command: ConfigCommands, format: OutputFormat) -> Result<()> {
    match command {
        ConfigCommands::Show => match format {
            OutputFormat::Json => output::print_json(&config),
            OutputFormat::Table => {
                println!("Config file:        {}", Config::config_path()?.display());
                println!("API URL:            {}", config.resolve_api_url(None));
                println!("Output format:      {:?}", config.resolve_format(None));
                println!(
                    "Default algorithm:  {}",
                    config.default_algorithm.as_deref().unwrap_or(DEFAULT_ALGORITHM)
                );
            }
        },
        ConfigCommands::Set {
            api_url,
            format,
            algorithm,
        } => {
            if api_url.is_some() {
                config.api_url = api_url;
            }
            if format.is_some() {
                config.default_format = format;
            }
            if algorithm.is_some() {
                config.default_algorithm = algorithm;
            }
            let path = config.save()?;
            print_success(&format!("Saved defaults to {}", path.display()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sensitivity_bounds() {
        assert_eq!(parse_sensitivity("0.8"), Ok(0.8));
        assert!(parse_sensitivity("1.5").is_err());
        assert!(parse_sensitivity("high").is_err());
    }

    #[test]
    fn test_detect_arguments() {
        let cli = Cli::try_parse_from([
            "sentinel", "detect", "--device", "7", "--algorithm", "z_score", "-s", "0.9",
        ])
        .unwrap();

        match cli.command {
            Commands::Detect {
                metric,
                device,
                algorithm,
                sensitivity,
            } => {
                assert_eq!(metric, None);
                assert_eq!(device, Some(7));
                assert_eq!(algorithm.as_deref(), Some("z_score"));
                assert_eq!(sensitivity, 0.9);
            }
            _ => panic!("expected detect"),
        }
    }
}
