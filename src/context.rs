use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::access::AllowList;
use crate::assist::GeminiClient;
use crate::commands::CommandRouter;
use crate::config::{AppConfig, IngressMode, SignatureMode};
use crate::error::BridgeError;
use crate::facebook::{GraphClient, ReplyPublisher, SignaturePolicy, SignatureVerifier, WebhookIngestor};
use crate::notify::NotificationDispatcher;
use crate::storage::CommentStore;
use crate::telegram::{TelegramBot, UpdateDispatcher};

/// Everything a handler needs, built once at startup and shared by reference.
pub struct BridgeContext {
    pub store: Arc<CommentStore>,
    pub allow_list: Arc<AllowList>,
    pub verifier: SignatureVerifier,
    /// `None` disables subscription verification.
    pub verify_token: Option<String>,
    pub ingestor: WebhookIngestor,
    pub notifier: NotificationDispatcher,
    pub router: Arc<CommandRouter>,
    /// Set only in webhook mode with a public URL and a secret token.
    pub telegram: Option<TelegramPush>,
    pub bot: Option<TelegramBot>,
    /// `None` leaves the dashboard routes unmounted.
    pub dashboard_token: Option<String>,
}

/// State for `POST /telegram` when the bot runs in webhook mode.
pub struct TelegramPush {
    pub dispatcher: Arc<UpdateDispatcher>,
    pub public_base_url: String,
    pub secret_token: String,
}

impl BridgeContext {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;

        let store = Arc::new(
            CommentStore::open(config.storage.document_path())
                .await
                .context("Failed to open comment store")?,
        );
        let allow_list = Arc::new(AllowList::new(config.telegram.allowed_chat_ids.iter().copied()));
        if allow_list.is_empty() {
            warn!("No allowed chat ids configured; every operator command will be dropped");
        }

        let secrets = &config.secrets;
        let verifier = SignatureVerifier::new(signature_policy(
            config.facebook.signature_verification,
            secrets.fb_app_secret.clone(),
        ));
        let verify_token = secrets.fb_verify_token.clone();
        if verify_token.is_none() {
            report_disabled(BridgeError::configuration(
                "webhook subscription",
                "FB_VERIFY_TOKEN is not set",
            ));
        }

        let graph = match &secrets.fb_page_access_token {
            Some(token) => Some(GraphClient::new(http.clone(), &config.facebook, token.clone())),
            None => {
                report_disabled(BridgeError::configuration(
                    "publishing",
                    "FB_PAGE_ACCESS_TOKEN is not set",
                ));
                None
            }
        };
        let publisher = Arc::new(ReplyPublisher::new(store.clone(), graph));

        let completion = match &secrets.gemini_api_key {
            Some(key) => Some(GeminiClient::new(http.clone(), &config.gemini, key.clone())),
            None => {
                info!("GEMINI_API_KEY not set; copy prompt will not include AI suggestions");
                None
            }
        };

        let bot = match &secrets.telegram_bot_token {
            Some(token) => Some(TelegramBot::new(http.clone(), &config.telegram.api_base, token.clone())),
            None => {
                report_disabled(BridgeError::configuration(
                    "operator channel",
                    "TELEGRAM_BOT_TOKEN is not set",
                ));
                None
            }
        };

        let router = Arc::new(CommandRouter::new(
            store.clone(),
            allow_list.clone(),
            publisher,
            completion,
        ));
        let notifier = NotificationDispatcher::new(bot.clone(), allow_list.clone());

        let telegram = match (&bot, config.telegram.mode) {
            (Some(bot), IngressMode::Webhook) => push_ingress(config, bot, &router)
                .map_err(report_disabled)
                .ok(),
            _ => None,
        };

        let dashboard_token = secrets.dashboard_token.clone();
        if dashboard_token.is_none() {
            report_disabled(BridgeError::configuration(
                "dashboard",
                "DASHBOARD_TOKEN is not set; /comments and /events are not served",
            ));
        }

        Ok(Self {
            ingestor: WebhookIngestor::new(store.clone()),
            store,
            allow_list,
            verifier,
            verify_token,
            notifier,
            router,
            telegram,
            bot,
            dashboard_token,
        })
    }
}

/// Push ingress trusts the chat id inside each update, so it is only enabled
/// when Telegram can authenticate itself with the secret token.
fn push_ingress(
    config: &AppConfig,
    bot: &TelegramBot,
    router: &Arc<CommandRouter>,
) -> Result<TelegramPush, BridgeError> {
    let public_base_url = config.server.public_base_url.clone().ok_or_else(|| {
        BridgeError::configuration(
            "operator commands",
            "telegram.mode = \"webhook\" needs server.public_base_url",
        )
    })?;
    let secret_token = config.secrets.telegram_webhook_secret.clone().ok_or_else(|| {
        BridgeError::configuration(
            "operator commands",
            "TELEGRAM_WEBHOOK_SECRET is required when telegram.mode = \"webhook\"",
        )
    })?;
    Ok(TelegramPush {
        dispatcher: Arc::new(UpdateDispatcher::new(bot.clone(), router.clone())),
        public_base_url,
        secret_token,
    })
}

/// Missing secrets under enforced verification yield a refusing policy, not an open one.
pub fn signature_policy(mode: SignatureMode, secret: Option<String>) -> SignaturePolicy {
    match (mode, secret) {
        (SignatureMode::Disabled, _) => SignaturePolicy::Disabled,
        (SignatureMode::Enforced, Some(secret)) => SignaturePolicy::Enforced { secret },
        (SignatureMode::Enforced, None) => {
            report_disabled(BridgeError::configuration(
                "webhook event delivery",
                "FB_APP_SECRET is not set while signature_verification = \"enforced\"",
            ));
            SignaturePolicy::Unavailable
        }
    }
}

fn report_disabled(err: BridgeError) {
    error!("Configuration error: {}", err);
}
