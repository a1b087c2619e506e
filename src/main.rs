use anyhow::{Context, Result};
use clap::Parser;
use resilient_llm::config::{
    DEFAULT_API_URL, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
    DEFAULT_TIMEOUT_SECS,
};
use resilient_llm::{ClientConfig, ERROR_PLACEHOLDER, InMemoryMetrics, LlmProvider, OpenAiProvider};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// resilient-llm - send one prompt to a chat-completion API with retries
///
/// Transient failures (timeouts, connection errors, HTTP 408/429/5xx) are
/// retried with linear backoff. Client errors abort immediately.
///
/// Examples:
///   resilient-llm "Summarize the Rust ownership model"
///   resilient-llm -s "Answer in one word" "Capital of France?"
#[derive(Parser, Debug)]
#[command(author, version = env!("RESILIENT_LLM_VERSION"), about)]
struct Cli {
    /// The user prompt
    #[arg(value_name = "PROMPT")]
    prompt: String,

    /// Optional system instruction sent before the prompt
    #[arg(long, short = 's', value_name = "TEXT")]
    system: Option<String>,

    /// Model identifier
    #[arg(long, short = 'm', env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// API credential
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Chat-completion endpoint
    #[arg(long, env = "OPENAI_API_URL", value_name = "URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Retries after the first attempt
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Backoff unit in seconds; retry n waits n units
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    retry_delay: f64,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Print per-model call statistics to stderr
    #[arg(long)]
    stats: bool,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let retry_delay = Duration::try_from_secs_f64(self.retry_delay)
            .with_context(|| format!("Invalid retry delay: {}", self.retry_delay))?;

        Ok(ClientConfig::new(&self.model, &self.api_key)
            .with_api_url(&self.api_url)
            .with_request_timeout(Duration::from_secs(self.timeout))
            .with_max_retries(self.max_retries)
            .with_retry_delay(retry_delay)
            .with_max_connections(self.max_connections))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let metrics = Arc::new(InMemoryMetrics::new());
    let provider = OpenAiProvider::new(cli.client_config()?, metrics.clone())?;

    let text = provider.generate(&cli.prompt, cli.system.as_deref()).await;
    provider.close().await;

    if cli.stats {
        for stats in metrics.summary() {
            eprintln!("{}", stats);
        }
    }

    if text == ERROR_PLACEHOLDER {
        eprintln!("{}", text);
        return Ok(ExitCode::FAILURE);
    }

    println!("{}", text);
    Ok(ExitCode::SUCCESS)
}
