//! Process configuration, read once from the environment at startup

use crate::auth::TokenAuthenticator;
use crate::llm::DEFAULT_BASE_URL;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not defined in the environment variables")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub llm: LlmSettings,
    pub agent: AgentSettings,
    pub auth: TokenAuthenticator,
    pub system_prompt_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub trim_max_messages: usize,
    pub max_steps: Option<u32>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = get("AGENT_CHAT_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".agent-chat").join("chat.db")
            },
            PathBuf::from,
        );

        let auth = match get("AUTH_TOKENS") {
            Some(spec) => TokenAuthenticator::parse(&spec).map_err(|reason| ConfigError::Invalid {
                var: "AUTH_TOKENS",
                value: "<redacted>".to_string(),
                reason,
            })?,
            None => TokenAuthenticator::default(),
        };

        Ok(Self {
            port: parse_or(&get, "AGENT_CHAT_PORT", 8000)?,
            db_path,
            llm: LlmSettings {
                api_key: get("GROQ_API_KEY").ok_or(ConfigError::Missing("GROQ_API_KEY"))?,
                model: get("GROQ_MODEL").ok_or(ConfigError::Missing("GROQ_MODEL"))?,
                base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                temperature: parse_or(&get, "LLM_TEMPERATURE", 0.5)?,
                max_tokens: parse_or(&get, "LLM_MAX_TOKENS", 3000)?,
                max_retries: parse_or(&get, "LLM_MAX_RETRIES", 2)?,
            },
            agent: AgentSettings {
                trim_max_messages: parse_or(&get, "AGENT_TRIM_MAX_MESSAGES", 10)?,
                max_steps: get("AGENT_MAX_STEPS")
                    .map(|v| parse_value("AGENT_MAX_STEPS", &v))
                    .transpose()?,
            },
            auth,
            system_prompt_path: get("SYSTEM_PROMPT_PATH").map(PathBuf::from),
        })
    }
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(var).map_or(Ok(default), |v| parse_value(var, &v))
}
