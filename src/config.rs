use std::fmt;
use std::path::PathBuf;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    MissingVar(&'static str),
    /// An environment variable is set but unusable.
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(name) => {
                write!(f, "required environment variable {name} is missing or empty")
            }
            Self::InvalidVar { name, value, reason } => {
                write!(f, "invalid value '{value}' for {name}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const DEFAULT_REMINDER_MINUTES: &str = "120,240,480,1440";
const DEFAULT_PORT: u16 = 3000;

pub struct Config {
    /// LINE channel secret, used to verify webhook signatures.
    pub channel_secret: String,
    /// LINE channel access token for the reply/push APIs.
    pub channel_access_token: String,
    pub openai_api_key: String,
    /// Nudge offsets in minutes, counted from a user's last activity.
    pub reminder_minutes: Vec<u64>,
    pub port: u16,
    /// Directory for state files (logs). Defaults to current directory.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup, so tests never
    /// touch the process environment.
    fn from_source<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let channel_secret = require(&get, "LINE_CHANNEL_SECRET")?;
        let channel_access_token = require(&get, "LINE_CHANNEL_ACCESS_TOKEN")?;
        let openai_api_key = require(&get, "OPENAI_API_KEY")?;

        let minutes_raw = get("REMINDER_MINUTES")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REMINDER_MINUTES.to_string());
        let reminder_minutes = parse_reminder_minutes(&minutes_raw)?;

        let port = match get("PORT").filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidVar {
                name: "PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let data_dir = get("DATA_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            channel_secret,
            channel_access_token,
            openai_api_key,
            reminder_minutes,
            port,
            data_dir,
        })
    }
}

fn require<F>(get: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

/// Parse a comma-separated list of positive minute offsets.
fn parse_reminder_minutes(raw: &str) -> Result<Vec<u64>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidVar {
        name: "REMINDER_MINUTES",
        value: raw.to_string(),
        reason,
    };

    let minutes = raw
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u64>()
                .map_err(|_| invalid(format!("'{part}' is not a whole number of minutes")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if minutes.is_empty() {
        return Err(invalid("at least one offset is required".into()));
    }
    if minutes.contains(&0) {
        return Err(invalid("offsets must be at least one minute".into()));
    }

    Ok(minutes)
}
