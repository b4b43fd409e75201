//! Dispatch console - Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rd_core::{ClinicalInput, GeoPoint};
use tracing::info;

/// Operator console for the ambulance dispatch client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via RD_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, load and follow real-time updates until Ctrl-C (default)
    Run,
    /// Sign in and store the session; the password is read from RD_PASSWORD
    Login {
        #[arg(short, long)]
        username: String,
    },
    /// Drop the stored session
    Logout,
    /// Clinical decision support lookup; prints the assessment as JSON
    Assess {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        heart_rate: Option<u32>,
        #[arg(long)]
        spo2: Option<u32>,
        #[arg(long)]
        glasgow: Option<u8>,
        /// Repeat for each symptom
        #[arg(long = "symptom")]
        symptoms: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any wss:// connection
    rd_hub::init_crypto();

    let args = Args::parse();

    rd_telemetry::init_logging()?;

    info!("Starting dispatch console v{}", env!("CARGO_PKG_VERSION"));

    let config = rd_console::AppConfig::load(args.config)?;
    info!(
        gateway_url = %config.gateway_url,
        push_url = %config.push_url,
        "Configuration loaded"
    );

    let app = rd_console::Application::new(config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => app.run().await?,
        Command::Login { username } => {
            let password =
                std::env::var("RD_PASSWORD").context("RD_PASSWORD must be set to sign in")?;
            let user = app.login(&username, &password).await?;
            info!(username = %user.username, "Session stored");
        }
        Command::Logout => app.logout(),
        Command::Assess {
            lat,
            lon,
            age,
            heart_rate,
            spo2,
            glasgow,
            symptoms,
        } => {
            let mut input = ClinicalInput::new(GeoPoint::new(lat, lon));
            input.age = age;
            input.symptoms = symptoms;
            input.vitals.heart_rate = heart_rate;
            input.vitals.spo2 = spo2;
            input.vitals.glasgow = glasgow;

            let assessment = app.assess(input).await?;
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
    }

    Ok(())
}
