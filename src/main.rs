use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use showtimes_lib::{
    utils, AppConfig, Cinema, CinemaError, KeywordKind, KeywordQuery, ScheduleQuery,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "showtimes", version, about = "Cinema showtimes across chains")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the enabled provider adapters.
    Providers,
    /// List every city the providers serve.
    Cities,
    /// Resolve free text to a city, theatre or film name.
    Resolve {
        keyword: String,
        /// city, theatre or film
        #[arg(long)]
        kind: Option<KeywordKind>,
        /// Print every candidate instead of picking one.
        #[arg(long)]
        all: bool,
    },
    /// Load a city and print its schedule for a film or a theatre.
    Schedule {
        city: String,
        #[arg(long, conflicts_with = "theatre", required_unless_present = "theatre")]
        film: Option<String>,
        #[arg(long)]
        theatre: Option<String>,
        #[arg(long)]
        variant: Option<String>,
        /// YYYY-MM-DD, defaults to today.
        #[arg(long)]
        date: Option<String>,
        /// HH:MM on the given date.
        #[arg(long)]
        time: Option<String>,
        /// Only each chain's latest published day.
        #[arg(long)]
        latest: bool,
    },
    /// Print the effective configuration.
    Config,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    if let Command::Config = cli.command {
        tracing::info!(path = %utils::config_path().display(), "config file");
        return print_json(&config);
    }

    let cinema = Cinema::from_config(&config)?;
    match cli.command {
        Command::Providers => print_json(&cinema.list_providers())?,
        Command::Cities => {
            cinema.init().await?;
            print_json(&cinema.get_city_names()?)?;
        }
        Command::Resolve { keyword, kind, all } => {
            cinema.init().await?;
            let mut query = KeywordQuery::new(keyword);
            query.kind = kind;
            query.allow_ambiguous = all;
            print_json(&cinema.resolve_keyword(&query)?)?;
        }
        Command::Schedule {
            city,
            film,
            theatre,
            variant,
            date,
            time,
            latest,
        } => {
            match cinema.load_city(&city).await {
                Err(CinemaError::CityNotFound(city)) => {
                    tracing::warn!(city = city.as_str(), "no provider serves this city");
                    return print_json(&serde_json::json!({}));
                }
                other => other?,
            }
            let query = ScheduleQuery {
                city_name: Some(city),
                theatre_name: theatre,
                film_title: film,
                variant,
                date,
                time,
                latest_day_only: latest,
            };
            print_json(&cinema.get_schedule_tree(&query)?)?;
        }
        Command::Config => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "command failed");
            ExitCode::FAILURE
        }
    }
}
