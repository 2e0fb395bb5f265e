use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub facebook: FacebookConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    // Loaded from env
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public URL the platforms call back on; required for Telegram webhook mode.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            file_name: "comments.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn document_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}

/// How operator updates reach the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IngressMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub mode: IngressMode,
    pub api_base: String,
    pub allowed_chat_ids: Vec<i64>,
    pub poll_timeout_secs: u64,
    pub retry_delay_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            mode: IngressMode::Polling,
            api_base: "https://api.telegram.org".to_string(),
            allowed_chat_ids: Vec::new(),
            poll_timeout_secs: 30,
            retry_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    #[default]
    Enforced,
    Disabled,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FacebookConfig {
    pub graph_api_base: String,
    pub graph_api_version: String,
    pub signature_verification: SignatureMode,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            graph_api_base: "https://graph.facebook.com".to_string(),
            graph_api_version: "v18.0".to_string(),
            signature_verification: SignatureMode::Enforced,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub max_concurrent: usize,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_concurrent: 2,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound for every outbound call.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

/// Secrets never live in config.toml.
#[derive(Debug, Default, Clone)]
pub struct Secrets {
    pub telegram_bot_token: Option<String>,
    pub telegram_webhook_secret: Option<String>,
    pub fb_app_secret: Option<String>,
    pub fb_verify_token: Option<String>,
    pub fb_page_access_token: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Bearer credential for `/comments` and `/events`.
    pub dashboard_token: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("BRIDGE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let config_text =
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
        let mut config = Self::from_toml_str(&config_text)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config.toml")
    }

    /// Reads secrets, plus an optional `ALLOWED_CHAT_IDS` override of the allow-list.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let secret = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        self.secrets = Secrets {
            telegram_bot_token: secret("TELEGRAM_BOT_TOKEN"),
            telegram_webhook_secret: secret("TELEGRAM_WEBHOOK_SECRET"),
            fb_app_secret: secret("FB_APP_SECRET"),
            fb_verify_token: secret("FB_VERIFY_TOKEN"),
            fb_page_access_token: secret("FB_PAGE_ACCESS_TOKEN"),
            gemini_api_key: secret("GEMINI_API_KEY"),
            dashboard_token: secret("DASHBOARD_TOKEN"),
        };

        if let Some(ids) = secret("ALLOWED_CHAT_IDS") {
            self.telegram.allowed_chat_ids = parse_chat_ids(&ids)?;
        }
        Ok(())
    }
}

fn parse_chat_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .with_context(|| format!("ALLOWED_CHAT_IDS entry '{}' is not a chat id", id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[server]
port = 8080
public_base_url = "https://bridge.example.com"

[storage]
data_dir = "/var/lib/bridge"

[telegram]
mode = "webhook"
allowed_chat_ids = [-5082300118, 42]

[facebook]
signature_verification = "disabled"

[http]
timeout_secs = 5
"#;

    #[test]
    fn parses_sections_and_fills_defaults() {
        let config = AppConfig::from_toml_str(SAMPLE).expect("config");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.storage.document_path(),
            PathBuf::from("/var/lib/bridge/comments.json")
        );
        assert_eq!(config.telegram.mode, IngressMode::Webhook);
        assert_eq!(config.telegram.allowed_chat_ids, vec![-5082300118, 42]);
        assert_eq!(config.telegram.poll_timeout_secs, 30);
        assert_eq!(config.facebook.signature_verification, SignatureMode::Disabled);
        assert_eq!(config.facebook.graph_api_version, "v18.0");
        assert_eq!(config.http.timeout_secs, 5);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").expect("config");
        assert_eq!(config.telegram.mode, IngressMode::Polling);
        assert_eq!(config.facebook.signature_verification, SignatureMode::Enforced);
        assert!(config.telegram.allowed_chat_ids.is_empty());
    }

    #[test]
    fn env_supplies_secrets_and_allow_list() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("FB_APP_SECRET", "app-secret"),
            ("FB_VERIFY_TOKEN", "   "),
            ("ALLOWED_CHAT_IDS", "1, 2,,3"),
            ("DASHBOARD_TOKEN", " dash-token "),
        ]);
        let mut config = AppConfig::from_toml_str(SAMPLE).expect("config");
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .expect("env");

        assert_eq!(config.secrets.telegram_bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.secrets.fb_app_secret.as_deref(), Some("app-secret"));
        assert!(config.secrets.fb_verify_token.is_none());
        assert!(config.secrets.gemini_api_key.is_none());
        assert_eq!(config.secrets.dashboard_token.as_deref(), Some("dash-token"));
        assert_eq!(config.telegram.allowed_chat_ids, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_malformed_chat_ids() {
        let mut config = AppConfig::from_toml_str("").expect("config");
        let result = config.apply_env(|key| {
            (key == "ALLOWED_CHAT_IDS").then(|| "12,abc".to_string())
        });
        assert!(result.is_err());
    }
}
