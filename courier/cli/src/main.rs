//! Courier CLI
//!
//! Sends messages through a named sender plugin, or listens on an endpoint
//! and prints what arrives.
//!
//! # Usage
//!
//! ```bash
//! # Publish two messages on a TCP endpoint, giving subscribers time to join
//! courier send --plugin publisher --connection 'tcp://*:5555' \
//!     --topic alerts --startup-delay-ms 500 "disk full" "cpu hot"
//!
//! # Push stdin lines through an output from the config file
//! tail -f app.log | courier send --output logs
//!
//! # Print alerts as they arrive
//! courier listen --connection tcp://127.0.0.1:5555 --topic alerts
//!
//! # With verbose logging
//! RUST_LOG=debug courier send --connection tcp://*:5555 hello
//! ```
//!
//! # Environment Variables
//!
//! - `COURIER_CONFIG`: Configuration file path
//! - `COURIER_PLUGIN`: Plugin name when neither `--plugin` nor the output names one
//! - `COURIER_CONNECTION`: Connection string when `--connection` is not given
//! - `COURIER_TIMEOUT_MS`: Send timeout when `--timeout-ms` is not given
//! - `RUST_LOG`: Log filter (default `courier=info,courier_core=info`)

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use courier_core::{
    global_registry, load_config, load_config_from_path, make_sender, ConfigOverrides,
    CourierToml, InfoCollector, ReceiveError, Receiver, SendOutcome, SendRequest, SendTimeout,
};

const DEFAULT_LOG_FILTER: &str = "courier=info,courier_core=info";

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, env = "COURIER_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send messages and print the sender statistics
    Send(SendArgs),
    /// Print messages arriving on an endpoint
    Listen(ListenArgs),
    /// List the available sender plugins
    Plugins,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Output section of the config file to use
    #[arg(short = 'o', long, value_name = "NAME")]
    output: Option<String>,

    /// Sender plugin (publisher, push, ...)
    #[arg(short = 'p', long)]
    plugin: Option<String>,

    /// Connection string, e.g. tcp://*:5555 or inproc://name
    #[arg(long, value_name = "ADDRESS")]
    connection: Option<String>,

    /// Metadata tag sent with every message
    #[arg(short = 't', long, default_value = "")]
    topic: String,

    /// Per-message send timeout in milliseconds (0 = non-blocking)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Wait this long after binding before the first send
    #[arg(long, value_name = "MS", default_value_t = 0)]
    startup_delay_ms: u64,

    /// Report timed-out messages instead of failing on the first one
    #[arg(long)]
    quiet_timeouts: bool,

    /// Messages to send; stdin lines are sent when none are given
    #[arg(value_name = "MESSAGE")]
    messages: Vec<String>,
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Connection string of the sender endpoint
    #[arg(long, value_name = "ADDRESS")]
    connection: String,

    /// Only print messages whose metadata starts with this prefix (repeatable)
    #[arg(short = 't', long = "topic", value_name = "PREFIX")]
    topics: Vec<String>,

    /// Stop after this many messages
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Stop when no message arrives within this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Send(args) => run_send(cli.config, &args),
        Command::Listen(args) => run_listen(&args),
        Command::Plugins => {
            for name in global_registry().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn load(config: Option<PathBuf>) -> anyhow::Result<CourierToml> {
    let file = match config {
        Some(path) => load_config_from_path(Some(path.as_path()))
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => load_config().context("Failed to load config file")?,
    };
    file.validate(global_registry())
        .context("Invalid config file")?;
    Ok(file)
}

fn run_send(config: Option<PathBuf>, args: &SendArgs) -> anyhow::Result<()> {
    let file = load(config)?;

    let cli_overrides = ConfigOverrides {
        plugin: args.plugin.clone(),
        connection_string: args.connection.clone(),
        timeout_ms: args.timeout_ms,
    };
    let settings = file.resolve(
        args.output.as_deref(),
        &cli_overrides.or(ConfigOverrides::from_env()),
    )?;

    let mut sender = make_sender(&settings.plugin)
        .with_context(|| format!("Cannot create sender {:?}", settings.plugin))?;
    sender
        .connect_for_sends(&settings.connection.to_value())
        .with_context(|| format!("Failed to bind {}", settings.connection.connection_string))?;

    for endpoint in sender.endpoints() {
        info!(plugin = %settings.plugin, endpoint = %endpoint, "Sender ready");
    }

    if args.startup_delay_ms > 0 {
        // Subscribers that connect after a broadcast miss it
        thread::sleep(Duration::from_millis(args.startup_delay_ms));
    }

    let messages: Box<dyn Iterator<Item = io::Result<String>>> = if args.messages.is_empty() {
        Box::new(io::stdin().lock().lines())
    } else {
        Box::new(args.messages.clone().into_iter().map(Ok))
    };

    let mut timed_out = 0u64;
    for message in messages {
        let message = message.context("Failed to read stdin")?;
        let request =
            SendRequest::new(message.as_bytes(), settings.timeout).with_metadata(&args.topic);

        if args.quiet_timeouts {
            if let SendOutcome::TimedOut { timeout } = sender.offer(&request)? {
                timed_out += 1;
                warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    size = message.len(),
                    "Message not sent"
                );
            }
        } else {
            sender
                .send(&request)
                .with_context(|| format!("Failed to send {} byte message", message.len()))?;
        }
    }

    let mut collector = InfoCollector::new();
    sender.get_info(&mut collector)?;
    collector.add("timed_out", &timed_out)?;
    println!("{}", serde_json::to_string_pretty(&collector.into_value())?);
    Ok(())
}

fn run_listen(args: &ListenArgs) -> anyhow::Result<()> {
    let mut receiver = Receiver::connect(&args.connection)
        .with_context(|| format!("Failed to connect to {}", args.connection))?;
    for topic in &args.topics {
        receiver.subscribe(topic);
    }
    info!(endpoint = %receiver.endpoint(), topics = args.topics.len(), "Listening");

    let timeout = args
        .timeout_ms
        .map_or(SendTimeout::Forever, SendTimeout::from_millis);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut received = 0usize;

    while args.count.map_or(true, |count| received < count) {
        match receiver.recv_timeout(timeout) {
            Ok(Some(message)) => {
                writeln!(
                    out,
                    "{}\t{}",
                    String::from_utf8_lossy(message.metadata()),
                    String::from_utf8_lossy(message.payload())
                )?;
                out.flush()?;
                received += 1;
            }
            Ok(None) => {
                info!(received, "No message within timeout");
                break;
            }
            Err(ReceiveError::Closed) => {
                info!(received, "Sender closed the connection");
                break;
            }
            Err(e) => return Err(e).context("Receive failed"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "courier",
            "send",
            "--plugin",
            "publisher",
            "--connection",
            "tcp://*:5555",
            "--topic",
            "alerts",
            "--quiet-timeouts",
            "one",
            "two",
        ])
        .unwrap();

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.plugin.as_deref(), Some("publisher"));
        assert_eq!(args.connection.as_deref(), Some("tcp://*:5555"));
        assert_eq!(args.topic, "alerts");
        assert!(args.quiet_timeouts);
        assert_eq!(args.startup_delay_ms, 0);
        assert_eq!(args.messages, vec!["one", "two"]);
    }

    #[test]
    fn test_parse_listen_topics() {
        let cli = Cli::try_parse_from([
            "courier",
            "listen",
            "--connection",
            "tcp://127.0.0.1:5555",
            "-t",
            "a",
            "-t",
            "b",
            "-n",
            "3",
        ])
        .unwrap();

        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.topics, vec!["a", "b"]);
        assert_eq!(args.count, Some(3));
        assert_eq!(args.timeout_ms, None);
    }

    #[test]
    fn test_listen_requires_connection() {
        assert!(Cli::try_parse_from(["courier", "listen"]).is_err());
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[outputs.events]\nplugin = \"publisher\"\nconnection_string = \"inproc://events\""
        )
        .unwrap();

        let config = load(Some(file.path().to_path_buf())).unwrap();
        assert!(config.outputs.contains_key("events"));
    }

    #[test]
    fn test_load_rejects_unknown_plugin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[outputs.events]\nplugin = \"telegraph\"\nconnection_string = \"inproc://events\""
        )
        .unwrap();

        assert!(load(Some(file.path().to_path_buf())).is_err());
    }
}
