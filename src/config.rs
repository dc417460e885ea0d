use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serenity::all::GuildId;

use crate::error::StartupError;

/// Command-line and environment inputs. Secrets never touch the config file.
#[derive(Parser, Debug)]
#[command(name = "gptcord", version, about)]
pub struct Args {
    /// Bot token used to authenticate against the Discord gateway.
    #[arg(long, env = "DISCORD_TOKEN", default_value = "", hide_env_values = true)]
    pub discord_token: String,

    /// API key sent as a bearer token to the completion endpoint.
    #[arg(long, env = "GPT_TOKEN", hide_env_values = true)]
    pub gpt_token: Option<String>,

    /// Test guild ID. If empty, commands are registered globally.
    #[arg(long, env = "GUILD_ID", default_value = "")]
    pub guild: String,

    /// Path to the TOML file holding the non-secret settings.
    #[arg(long, default_value = Configuration::FILENAME)]
    pub config: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Configuration {
    #[serde(skip)]
    pub authentication: Authentication,
    #[serde(skip)]
    pub scope: Scope,
    pub completion: Completion,
    pub discord: Discord,
}
impl Configuration {
    pub const FILENAME: &str = "config.toml";

    /// Builds the process-wide configuration from the command line, the
    /// environment and the settings file.
    pub fn from_args(args: Args) -> Result<Self, StartupError> {
        if args.discord_token.trim().is_empty() {
            return Err(StartupError::config("Token cannot be empty"));
        }

        let mut config = Self::load(&args.config).map_err(StartupError::config)?;
        config.authentication = Authentication {
            discord_token: args.discord_token,
            completion_api_key: args.gpt_token.filter(|key| !key.is_empty()),
        };
        config.scope = Scope::parse(&args.guild)?;
        config.completion.validate()?;

        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = if let Ok(file) = std::fs::read_to_string(path) {
            toml::from_str(&file)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        } else {
            Self::default()
        };
        config.save(path)?;

        Ok(config)
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        Ok(std::fs::write(path, toml::to_string_pretty(self)?)?)
    }
}

#[derive(Clone, Default)]
pub struct Authentication {
    pub discord_token: String,
    pub completion_api_key: Option<String>,
}
impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authentication")
            .field("discord_token", &"[REDACTED]")
            .field(
                "completion_api_key",
                &self.completion_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Where slash commands are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Global,
    Guild(GuildId),
}
impl Scope {
    pub fn parse(guild: &str) -> Result<Self, StartupError> {
        let guild = guild.trim();
        if guild.is_empty() {
            return Ok(Self::Global);
        }
        match guild.parse::<u64>() {
            Ok(id) if id != 0 => Ok(Self::Guild(GuildId::new(id))),
            _ => Err(StartupError::config(format!(
                "guild id `{guild}` is not a valid Discord snowflake"
            ))),
        }
    }
}
impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Guild(id) => write!(f, "guild {id}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Completion {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    /// Sampling temperature, between 0 and 2.
    pub temperature: f64,
    /// The request is abandoned (not retried) after this long.
    pub request_timeout_ms: u64,
    pub leading_trim: LeadingTrim,
}
impl Default for Completion {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/completions".into(),
            model: "gpt-3.5-turbo-instruct".into(),
            max_tokens: 128,
            temperature: 0.9,
            request_timeout_ms: 5000,
            leading_trim: LeadingTrim::default(),
        }
    }
}
impl Completion {
    fn validate(&self) -> Result<(), StartupError> {
        if self.max_tokens == 0 {
            return Err(StartupError::config("completion.max_tokens must be positive"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(StartupError::config(format!(
                "completion.temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(StartupError::config(
                "completion.request_timeout_ms must be positive",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(StartupError::config("completion.model cannot be empty"));
        }
        Ok(())
    }
}

/// How the start of the completion text is cleaned up before display.
///
/// The legacy completions endpoint prefixes its text with a space or blank
/// lines. `FirstChar` reproduces the historical single-character cut.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadingTrim {
    None,
    #[default]
    Whitespace,
    FirstChar,
}
impl LeadingTrim {
    pub fn apply<'a>(&self, text: &'a str) -> &'a str {
        match self {
            Self::None => text,
            Self::Whitespace => text.trim_start(),
            Self::FirstChar => {
                let mut chars = text.chars();
                chars.next();
                chars.as_str()
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Discord {
    /// Whether to tell the user when the completion fails. When off, failures
    /// are only logged and the interaction gets no reply.
    pub reply_on_error: bool,
}
