use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Command-line client for the chat relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Pre-shared key, sent as X-API-Key.
    #[arg(short, long)]
    key: Option<String>,

    /// Origin header to present.
    #[arg(short, long)]
    origin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay status
    Status,
    /// Send a single chat message
    Chat {
        message: String,

        #[arg(short, long)]
        model: Option<String>,

        /// Ask for a streamed reply and print bytes as they arrive
        #[arg(short, long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert("x-api-key", HeaderValue::from_str(key)?);
    }
    if let Some(origin) = &cli.origin {
        headers.insert(ORIGIN, HeaderValue::from_str(origin)?);
    }

    match cli.command {
        Commands::Status => {
            let res = client.get(&cli.url).headers(headers).send().await?;
            print_response(res).await?;
        }
        Commands::Chat {
            message,
            model,
            stream,
        } => {
            let mut body = json!({ "message": message, "stream": stream });
            if let Some(model) = model {
                body["model"] = Value::String(model);
            }
            let res = client
                .post(&cli.url)
                .headers(headers)
                .json(&body)
                .send()
                .await?;

            if stream && res.status().is_success() {
                let mut stdout = tokio::io::stdout();
                let mut chunks = res.bytes_stream();
                while let Some(chunk) = chunks.next().await {
                    stdout.write_all(&chunk?).await?;
                    stdout.flush().await?;
                }
                stdout.write_all(b"\n").await?;
            } else {
                print_response(res).await?;
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
