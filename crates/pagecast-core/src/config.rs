//! Environment-driven configuration.

use std::time::Duration;

use anyhow::Context;

/// Credentials and endpoints for the external collaborators.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI API key for the generation service
    pub openai_api_key: String,
    /// Chat model used for page analysis and script generation
    pub openai_model: String,
    /// Google Cloud Text-to-Speech API key
    pub google_tts_api_key: String,
    /// Supabase project URL (document store + object storage)
    pub supabase_url: String,
    /// Supabase service-role key
    pub supabase_service_role_key: String,
    /// Webhook endpoint for best-effort result delivery
    pub webhook_url: String,
    /// Pipeline tunables
    pub pipeline: PipelineConfig,
}

/// Tunables for the job pipeline. Defaults match production behavior;
/// tests override the delays with zero durations.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delay inserted between consecutive page analyses within one job
    pub inter_page_delay: Duration,
    /// Delay inserted between consecutive script-generation chunk calls
    pub inter_chunk_delay: Duration,
    /// Timeout for a single page-analysis generation call
    pub generation_timeout: Duration,
    /// Timeout for the final document-summary call
    pub summary_timeout: Duration,
    /// How long completed/failed jobs stay queryable before expiry
    pub retention: Duration,
    /// Default narrator voice
    pub default_voice: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_page_delay: Duration::from_secs(1),
            inter_chunk_delay: Duration::from_secs(1),
            generation_timeout: Duration::from_secs(60),
            summary_timeout: Duration::from_secs(25),
            retention: Duration::from_secs(3600),
            default_voice: "en-US-Studio-Q".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Required: `OPENAI_API_KEY`, `GOOGLE_TTS_API_KEY`, `SUPABASE_URL`,
    /// `SUPABASE_SERVICE_ROLE_KEY`, `WEBHOOK_URL`. Tunables fall back to
    /// defaults when unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let pipeline = PipelineConfig {
            inter_page_delay: env_duration_secs("PAGECAST_INTER_PAGE_DELAY_SECS", 1),
            inter_chunk_delay: env_duration_secs("PAGECAST_INTER_CHUNK_DELAY_SECS", 1),
            generation_timeout: env_duration_secs("PAGECAST_GENERATION_TIMEOUT_SECS", 60),
            summary_timeout: env_duration_secs("PAGECAST_SUMMARY_TIMEOUT_SECS", 25),
            retention: env_duration_secs("PAGECAST_JOB_RETENTION_SECS", 3600),
            default_voice: std::env::var("PAGECAST_DEFAULT_VOICE")
                .unwrap_or_else(|_| "en-US-Studio-Q".to_string()),
        };

        Ok(Self {
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: std::env::var("PAGECAST_OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
            google_tts_api_key: require("GOOGLE_TTS_API_KEY")?,
            supabase_url: require("SUPABASE_URL")?,
            supabase_service_role_key: require("SUPABASE_SERVICE_ROLE_KEY")?,
            webhook_url: require("WEBHOOK_URL")?,
            pipeline,
        })
    }
}

fn require(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
