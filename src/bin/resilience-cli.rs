use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "resilience-cli")]
#[command(about = "Management CLI for the resilience admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081/api/resilience")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overall health with breaker and error snapshots
    Health,
    /// List every circuit breaker
    Breakers,
    /// Show one circuit breaker
    Breaker { key: String },
    /// Force a circuit breaker closed
    Reset { key: String },
    /// Show error statistics
    Errors,
    /// Clear error statistics
    ClearErrors,
    /// Show the defaults new breakers and retries use
    Config,
    /// Run a self-test: circuit-breaker, retry or error-handling
    SelfTest {
        feature: String,
        #[arg(long)]
        should_fail: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)),
        Commands::Breakers => client.get(format!("{}/circuit-breakers", base)),
        Commands::Breaker { key } => client.get(format!("{}/circuit-breakers/{}", base, key)),
        Commands::Reset { key } => client.post(format!("{}/circuit-breakers/{}/reset", base, key)),
        Commands::Errors => client.get(format!("{}/errors", base)),
        Commands::ClearErrors => client.post(format!("{}/errors/clear", base)),
        Commands::Config => client.get(format!("{}/config", base)),
        Commands::SelfTest { feature, should_fail } => client
            .post(format!("{}/test/{}", base, feature))
            .query(&[("shouldFail", should_fail)]),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
