//! Environment-backed settings for the speech service client.

use anyhow::{bail, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "whisper-1";

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    /// Speech-to-text model identifier sent with every translation call.
    pub openai_model: String,
    /// API root; override to point at an OpenAI-compatible proxy.
    pub openai_base_url: String,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// `OPENAI_API_KEY` is required; `OPENAI_MODEL` and `OPENAI_BASE_URL`
    /// fall back to the public OpenAI defaults. Callers wanting `.env`
    /// support load it before calling this.
    pub fn from_env() -> Result<Self> {
        let openai_api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!(
                "missing required environment variable OPENAI_API_KEY; \
                 set it in the environment or .env file"
            ),
        };

        Ok(Self {
            openai_api_key,
            openai_model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}
