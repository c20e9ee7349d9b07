//! hublink CLI - talk to a hub from the terminal

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hublink::{
    ClientEvent, ExponentialBackoff, HubClient, HubConfig, MessageEnvelope, SEND_CALLER_METHOD,
    SEND_MESSAGE_METHOD,
};
use serde_json::Value;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "hublink")]
#[command(about = "hublink CLI - connect to a hub, invoke methods, watch messages")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Hub URL
    #[arg(long, env = "HUBLINK_URL", global = true, default_value = "https://localhost:4433/hub")]
    url: String,

    /// Access token sent with every connection attempt
    #[arg(long, env = "HUBLINK_TOKEN", global = true)]
    token: Option<String>,

    /// Skip TLS certificate verification (development only)
    #[arg(long, global = true)]
    insecure: bool,

    /// Extra header for the session request, as NAME=VALUE (can be repeated)
    #[arg(long = "header", value_parser = parse_header, global = true)]
    headers: Vec<(String, String)>,

    /// Fail awaited invocations after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay connected and print pushed messages and state changes until Ctrl-C
    Listen,

    /// Invoke a hub method and print its result
    ///
    /// Arguments are parsed as JSON; anything that is not valid JSON is sent as a string.
    ///
    /// Examples:
    ///   hublink invoke ListPlayers lobby
    ///   hublink invoke MovePlayer '{"x":1,"y":2}' 3
    Invoke {
        /// Hub method name
        method: String,

        /// Positional arguments
        args: Vec<String>,
    },

    /// Send a text message through the hub's SendMessage method
    Send {
        /// Message text
        message: String,

        /// Echo to the caller only (SendCaller)
        #[arg(long)]
        caller: bool,
    },

    /// Measure round-trip time to the hub
    Ping {
        /// Number of pings
        #[arg(short, long, default_value_t = 3)]
        count: u32,
    },
}

fn parse_header(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if name.is_empty() {
        return Err("header name must not be empty".to_string());
    }
    Ok((name.to_string(), value.to_string()))
}

fn send_method(caller: bool) -> &'static str {
    if caller {
        SEND_CALLER_METHOD
    } else {
        SEND_MESSAGE_METHOD
    }
}

fn parse_argument(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client = build_client(&cli)?;

    client.on_error(|message| eprintln!("error: {}", message));

    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", cli.url))?;

    let result = run_command(&cli.command, &client).await;

    client.disconnect().await.context("Failed to disconnect")?;
    result
}

fn build_client(cli: &Cli) -> Result<HubClient> {
    let headers = cli.headers.clone();
    let mut config = HubConfig::new(&cli.url)
        .retry_policy(
            ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(30))
                .max_retries(10),
        )
        .configure_transport(|opts| opts.headers.extend(headers));

    if cli.insecure {
        config = config.dangerous_skip_cert_verify();
    }
    if let Some(secs) = cli.timeout {
        config = config.invocation_timeout(Duration::from_secs(secs));
    }

    let client = HubClient::new(config).context("Invalid hub configuration")?;
    if let Some(token) = &cli.token {
        client.set_token(token.clone());
    }
    Ok(client)
}

async fn run_command(command: &Commands, client: &HubClient) -> Result<()> {
    match command {
        Commands::Listen => {
            client.subscribe_events(|event| match event {
                ClientEvent::MessageReceived(text) => println!("{}", text),
                ClientEvent::Connected => info!("Connected"),
                ClientEvent::Disconnected => info!("Disconnected"),
                ClientEvent::Reconnecting { attempt } => info!(attempt, "Reconnecting"),
                ClientEvent::Error(_) => {}
            });

            info!("Listening, press Ctrl-C to stop");
            signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            Ok(())
        }

        Commands::Invoke { method, args } => {
            let arguments: Vec<Value> = args.iter().map(|raw| parse_argument(raw)).collect();
            let result: Value = client
                .invoke_async(method, arguments)
                .await
                .with_context(|| format!("Invocation of '{}' failed", method))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Commands::Send { message, caller } => {
            let method = send_method(*caller);
            let envelope = MessageEnvelope::encode(message)?;
            client
                .invoke_async::<()>(method, (envelope,))
                .await
                .with_context(|| format!("{} failed", method))?;
            info!(method, "Message delivered");
            Ok(())
        }

        Commands::Ping { count } => {
            for seq in 0..*count {
                let rtt = client.ping().await.context("Ping failed")?;
                println!("ping {}: {}ms", seq, rtt.as_millis());
            }
            println!("latency: {}ms", client.latency().as_millis());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("X-Room=lobby").unwrap(),
            ("X-Room".to_string(), "lobby".to_string())
        );
        assert_eq!(
            parse_header("X-Empty=").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert!(parse_header("no-separator").is_err());
        assert!(parse_header("=value").is_err());
    }

    #[test]
    fn test_parse_argument_json_or_string() {
        assert_eq!(parse_argument("3"), Value::from(3));
        assert_eq!(parse_argument(r#"{"x":1}"#), serde_json::json!({"x": 1}));
        assert_eq!(parse_argument("lobby"), Value::String("lobby".to_string()));
    }

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::try_parse_from(["hublink", "send", "--caller", "hello"]).unwrap();

        match cli.command {
            Commands::Send { message, caller } => {
                assert_eq!(message, "hello");
                assert!(caller);
                assert_eq!(send_method(caller), "SendCaller");
            }
            _ => panic!("expected send"),
        }
        assert_eq!(send_method(false), "SendMessage");
    }

    #[test]
    fn test_cli_parses_invoke() {
        let cli = Cli::try_parse_from([
            "hublink",
            "--url",
            "https://hub.example.com/game",
            "invoke",
            "MovePlayer",
            "1",
            "north",
        ])
        .unwrap();

        assert_eq!(cli.url, "https://hub.example.com/game");
        match cli.command {
            Commands::Invoke { method, args } => {
                assert_eq!(method, "MovePlayer");
                assert_eq!(args, vec!["1".to_string(), "north".to_string()]);
            }
            _ => panic!("expected invoke"),
        }
    }
}
