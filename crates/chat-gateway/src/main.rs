//! Send a chat request through the gateway and print the response.
//!
//! Configuration comes from the environment (`GATEWAY_PROVIDER`,
//! `GATEWAY_BASE_URL`, `GATEWAY_API_KEY` or `OPENROUTER_KEY`, ...) or from a
//! JSON file passed with `--config`.
//!
//! # Examples
//!
//! ```sh
//! # Basic request
//! chat-gateway --user "Summarize this thread"
//!
//! # System prompt, model alias, live text streaming
//! chat-gateway --system "You are terse." --user "Explain SSE." --model 4o --stream text
//!
//! # Pipe content from stdin, print each JSON object as it completes
//! cat colors.txt | chat-gateway --stdin --system "Emit one JSON object per color." --stream json
//!
//! # Print the normalized response as JSON
//! chat-gateway --user "Hi" --raw
//!
//! # Show known models
//! chat-gateway --list-models
//! ```

use chat_gateway::prelude::*;
use clap::Parser;
use std::io::{self, Read, Write};
use std::process;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Send a chat request through the gateway and print the response.
#[derive(Parser)]
#[command(name = "chat-gateway", version)]
struct Cli {
    // ── Message content ────────────────────────────────────────
    /// System prompt to set the assistant's behavior
    #[arg(long)]
    system: Option<String>,

    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    // ── Model and sampling ─────────────────────────────────────
    /// Model id or alias (defaults to the configured model)
    #[arg(long)]
    model: Option<String>,

    /// Sampling temperature (ignored for reasoning models)
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum tokens in the response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Path to a JSON Schema file that streamed JSON objects must satisfy
    #[arg(long)]
    schema: Option<String>,

    // ── Output mode ────────────────────────────────────────────
    /// Stream the response: "text" prints deltas live, "json" prints each object
    #[arg(long)]
    stream: Option<String>,

    /// Print the full normalized response as JSON
    #[arg(long)]
    raw: bool,

    /// List supported models, including configured alias targets, then exit
    #[arg(long)]
    list_models: bool,

    // ── Configuration ──────────────────────────────────────────
    /// JSON config file (environment variables still override it)
    #[arg(long)]
    config: Option<String>,

    /// Log verbosity on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(level)
        .with(fmt_layer)
        .init();
}

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

fn build_user_content(cli: &Cli) -> Result<String, String> {
    let stdin_text = if cli.stdin {
        Some(read_stdin_content()?)
    } else {
        None
    };

    match (&cli.user, stdin_text) {
        (Some(msg), Some(piped)) => Ok(format!("{msg}\n\n{piped}")),
        (Some(msg), None) => Ok(msg.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => Err("provide --user, --stdin, or both".to_string()),
    }
}

fn load_config(cli: &Cli) -> Result<GatewayConfig, String> {
    let base = match &cli.config {
        Some(path) => GatewayConfig::from_file(path).map_err(|e| e.to_string())?,
        None => GatewayConfig::default(),
    };
    base.merge_lookup(|key| std::env::var(key).ok())
        .map_err(|e| e.to_string())
}

fn load_schema(path: &str) -> Result<serde_json::Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read schema file '{path}': {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("failed to parse schema file '{path}': {e}"))
}

fn build_request(cli: &Cli) -> Result<ChatRequest, String> {
    let user = build_user_content(cli)?;
    let mut request = ChatRequest::prompt(
        cli.model.clone().unwrap_or_default(),
        cli.system.clone().unwrap_or_default(),
        user,
    );
    request.temperature = cli.temperature;
    request.max_tokens = cli.max_tokens;
    if let Some(path) = &cli.schema {
        request.output_schema = Some(load_schema(path)?);
    }
    Ok(request)
}

/// Text deltas are written as-is; JSON objects one per line.
fn write_update(out: &mut impl Write, update: &StreamUpdate<'_>) -> io::Result<()> {
    match update {
        StreamUpdate::Text { delta, .. } => write!(out, "{delta}")?,
        StreamUpdate::Json(value) => writeln!(out, "{value}")?,
    }
    out.flush()
}

/// Prints stream updates to stdout as they arrive.
struct CliSink;

impl StreamSink for CliSink {
    fn on_update(&self, update: &StreamUpdate<'_>) {
        if let Err(e) = write_update(&mut io::stdout().lock(), update) {
            tracing::debug!("Failed to write stream update to stdout: {e}");
        }
    }
}

async fn send_request(cli: &Cli) -> Result<String, String> {
    let config = load_config(cli)?;

    if cli.list_models {
        let catalog = ModelCatalog::new().with_aliases(config.aliases.clone());
        return Ok(catalog.supported_models().join("\n") + "\n");
    }

    let gateway = ChatGateway::new(config).map_err(|e| e.to_string())?;

    let request = build_request(cli)?;

    let response = match &cli.stream {
        Some(mode) => {
            let response = gateway
                .chat_stream_named(&request, mode, &CliSink)
                .await
                .map_err(|e| e.to_string())?;
            if !cli.raw {
                // Content was already printed live.
                return Ok("\n".to_string());
            }
            response
        }
        None => gateway.chat(&request).await.map_err(|e| e.to_string())?,
    };

    tracing::debug!("{}", gateway.usage().summary());

    if cli.raw {
        serde_json::to_string_pretty(&response)
            .map(|s| s + "\n")
            .map_err(|e| format!("failed to format response: {e}"))
    } else {
        Ok(format!("{}\n", response.text()))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match send_request(&cli).await {
        Ok(response) => print!("{response}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
