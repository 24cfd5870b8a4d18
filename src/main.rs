use anyhow::Result;
use clap::Parser;
use geolocate::{
    commands::{OutputFormat, locate},
    config::{ConfigOverrides, LocationConfig},
    location::HttpLocationLookup,
    runtime::RealRuntime,
};

/// geolocate - look up the city and country of an IP address
///
/// The geolocation service is configured through LOCATION_API_URL and
/// LOCATION_API_KEY, or the matching flags. Failed requests are retried
/// with a fixed delay before giving up.
///
/// Examples:
///   geolocate              # Locate this machine's public address
///   geolocate 1.2.3.4      # Locate a specific address
#[derive(Parser, Debug)]
#[command(author, version = env!("GEOLOCATE_VERSION"), about)]
struct Cli {
    /// IP address to locate (defaults to the caller's own address)
    #[arg(value_name = "IP")]
    pub ip: Option<String>,

    /// Base URL of the geolocation API (overrides LOCATION_API_URL)
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: Option<String>,

    /// API token sent as the `token` query parameter (overrides LOCATION_API_KEY)
    #[arg(long = "token", value_name = "TOKEN")]
    pub token: Option<String>,

    /// Total attempts per lookup (overrides LOCATION_MAX_ATTEMPTS, default 3)
    #[arg(long = "attempts", value_name = "N")]
    pub attempts: Option<u32>,

    /// Delay between attempts in milliseconds (overrides LOCATION_RETRY_DELAY_MS, default 2000)
    #[arg(long = "delay-ms", value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Per-request timeout in seconds (overrides LOCATION_TIMEOUT_SECS, default 10)
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.api_url.clone(),
            api_key: self.token.clone(),
            max_attempts: self.attempts,
            retry_delay_ms: self.delay_ms,
            timeout_secs: self.timeout,
        }
    }

    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = LocationConfig::resolve(&RealRuntime, &cli.overrides())?;
    let lookup = HttpLocationLookup::new(config);

    let mut stdout = std::io::stdout().lock();
    locate(&lookup, cli.ip.as_deref(), cli.format(), &mut stdout).await
}
