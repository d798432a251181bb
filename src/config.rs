use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::UserId;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {source}", .path.display())]
    ParseJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    /// Telegram user ids of the operating account. Their messages count as self-authored.
    #[serde(default)]
    owner_ids: Vec<u64>,
    #[serde(default = "default_prefix_enabled")]
    prefix_enabled: bool,
    #[serde(default = "default_gpt_prefix")]
    gpt_prefix: String,
    #[serde(default = "default_dalle_prefix")]
    dalle_prefix: String,
    #[serde(default)]
    openai: OpenAiFile,
    #[serde(default)]
    transcription: TranscriptionFile,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiFile {
    #[serde(default)]
    api_key: String,
    base_url: Option<String>,
    model: Option<String>,
    image_size: Option<String>,
    /// System message sent ahead of every completion prompt.
    pre_prompt: Option<String>,
}

#[derive(Deserialize, Default)]
struct TranscriptionFile {
    command: Option<String>,
    /// Extra arguments placed before the fixed transcription flags (e.g. `--model small`).
    #[serde(default)]
    args: Vec<String>,
    work_dir: Option<String>,
    temp_dir: Option<String>,
}

fn default_prefix_enabled() -> bool {
    true
}

fn default_gpt_prefix() -> String {
    "!gpt".to_string()
}

fn default_dalle_prefix() -> String {
    "!dalle".to_string()
}

/// Config file read when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "gptbridge.json";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_IMAGE_SIZE: &str = "512x512";
const DEFAULT_WHISPER_COMMAND: &str = "whisper";

/// Prefix routing settings. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// When false, every text message goes to the completion handler verbatim.
    pub prefix_enabled: bool,
    pub gpt_prefix: String,
    pub dalle_prefix: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            prefix_enabled: default_prefix_enabled(),
            gpt_prefix: default_gpt_prefix(),
            dalle_prefix: default_dalle_prefix(),
        }
    }
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub image_size: String,
    pub pre_prompt: Option<String>,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("image_size", &self.image_size)
            .field("pre_prompt", &self.pre_prompt)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Working directory of the transcription process; its output artifacts land here.
    pub work_dir: PathBuf,
    /// Where incoming audio is written before transcription.
    pub temp_dir: PathBuf,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub owner_ids: Vec<UserId>,
    pub routing: RoutingConfig,
    pub openai: OpenAiConfig,
    pub transcription: TranscriptionConfig,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from a JSON file, letting process environment variables override it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], but a missing file counts as an empty one so the
    /// environment alone can configure the bridge.
    pub fn load_or_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_or_env_with(path, |name| std::env::var(name).ok())
    }

    /// Load from a JSON file with a custom environment lookup.
    pub fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        Self::read(path.as_ref(), false, env)
    }

    pub fn load_or_env_with<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        Self::read(path.as_ref(), true, env)
    }

    fn read<F>(path: &Path, missing_ok: bool, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if missing_ok && e.kind() == std::io::ErrorKind::NotFound => "{}".to_string(),
            Err(e) => {
                return Err(ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        let mut file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseJson {
                path: path.to_path_buf(),
                source: e,
            })?;

        // Empty variables count as unset.
        let lookup = |name: &str| env(name).filter(|v| !v.is_empty());

        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            file.telegram_bot_token = token;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            file.openai.api_key = key;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            file.openai.base_url = Some(url);
        }
        if let Some(value) = lookup("PREFIX_ENABLED") {
            file.prefix_enabled = parse_bool("PREFIX_ENABLED", &value)?;
        }
        if let Some(prefix) = lookup("GPT_PREFIX") {
            file.gpt_prefix = prefix;
        }
        if let Some(prefix) = lookup("DALLE_PREFIX") {
            file.dalle_prefix = prefix;
        }
        if let Some(command) = lookup("WHISPER_COMMAND") {
            file.transcription.command = Some(command);
        }

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }
        if file.openai.api_key.is_empty() {
            return Err(ConfigError::Validation("openai.api_key is required".into()));
        }
        if file.prefix_enabled && (file.gpt_prefix.is_empty() || file.dalle_prefix.is_empty()) {
            return Err(ConfigError::Validation(
                "gpt_prefix and dalle_prefix must be non-empty when prefix_enabled is set".into(),
            ));
        }

        let command = file
            .transcription
            .command
            .unwrap_or_else(|| DEFAULT_WHISPER_COMMAND.to_string());
        if command.trim().is_empty() {
            return Err(ConfigError::Validation("transcription.command must not be empty".into()));
        }

        let transcription = TranscriptionConfig {
            command,
            args: file.transcription.args,
            work_dir: file
                .transcription
                .work_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            temp_dir: file
                .transcription
                .temp_dir
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        };

        let openai = OpenAiConfig {
            api_key: file.openai.api_key,
            base_url: file.openai.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: file.openai.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            image_size: file
                .openai
                .image_size
                .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string()),
            pre_prompt: file.openai.pre_prompt.filter(|p| !p.trim().is_empty()),
        };

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            owner_ids: file.owner_ids.into_iter().map(UserId).collect(),
            routing: RoutingConfig {
                prefix_enabled: file.prefix_enabled,
                gpt_prefix: file.gpt_prefix,
                dalle_prefix: file.dalle_prefix,
            },
            openai,
            transcription,
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name,
            value: value.to_string(),
        }),
    }
}
