use clap::{Parser, Subcommand};

use gopee::codec;
use gopee::http::home::normalize_entered_url;

#[derive(Parser)]
#[command(name = "token-cli")]
#[command(about = "Encode and decode gopee proxy tokens", long_about = None)]
struct Cli {
    /// Proxy base URL printed in front of encoded paths
    #[arg(short, long, default_value = "http://localhost:8080")]
    proxy: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the proxy URL for a target (scheme defaults to http)
    Encode { url: String },
    /// Print the target URL behind a token or proxy URL
    Decode { token: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { url } => {
            let target = normalize_entered_url(&url).ok_or_else(|| format!("not a URL: {}", url))?;
            println!("{}/{}", cli.proxy.trim_end_matches('/'), codec::encode_url(&target));
        }
        Commands::Decode { token } => {
            let segment = token.rsplit('/').next().unwrap_or(&token);
            let url = codec::decode(segment)?;
            println!("{}", url);
        }
    }

    Ok(())
}
