//! Chat delivery through the KakaoTalk "send to me" memo API.
//!
//! - [`ChatSender`]: what the pipelines talk to
//! - [`KakaoClient`]: `POST /v2/api/talk/memo/default/send` with a text
//!   template and one link button
//! - [`ConsoleSender`]: dry-run sender that prints instead of sending
//! - [`Sender`]: the two behind one concrete type

pub mod token;

use crate::api::{ApiError, RetryPolicy, retry_with_backoff};
use crate::config::KakaoConfig;
use crate::models::ChatMessage;
use crate::utils::{now_ms, truncate_for_log};
use serde_json::{Value, json};
use std::error::Error;
use std::time::Duration;
use token::{KakaoCredentials, TokenStore};
use tracing::{info, instrument, warn};
use url::Url;

/// Hosts that never get a message button: tunnel links expire and show an
/// interstitial page.
const REFUSED_LINK_HOSTS: [&str; 1] = ["ngrok-free.app"];
const CACHE_BUST_PARAM: &str = "ek_ts";

/// Delivers one formatted message.
pub trait ChatSender {
    async fn send(&self, message: &ChatMessage) -> Result<(), ApiError>;
}

/// Append (or replace) the `ek_ts` query parameter so the chat client does
/// not reuse a stale link preview.
pub fn with_cache_bust(link: &str, ts_ms: i64) -> Result<String, ApiError> {
    let mut url = Url::parse(link.trim()).map_err(|e| ApiError::fatal(format!("invalid link {link:?}: {e}")))?;
    if url
        .host_str()
        .is_some_and(|h| REFUSED_LINK_HOSTS.iter().any(|r| h.ends_with(r)))
    {
        return Err(ApiError::fatal(format!("refusing tunnel link {link}")));
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != CACHE_BUST_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(CACHE_BUST_PARAM, &ts_ms.to_string());
    Ok(url.to_string())
}

/// The `template_object` of a text message with one button.
pub fn text_template(text: &str, link: &str, button_title: &str) -> Value {
    json!({
        "object_type": "text",
        "text": text,
        "link": { "web_url": link, "mobile_web_url": link },
        "button_title": button_title,
    })
}

/// Kakao answers `{"result_code": 0}` on success.
pub fn check_send_response(status: u16, json: &Value) -> Result<(), ApiError> {
    if json.get("result_code").and_then(Value::as_i64) == Some(0) {
        return Ok(());
    }
    let body = truncate_for_log(&json.to_string(), 400);
    if (200..300).contains(&status) {
        return Err(ApiError::fatal(format!("memo send rejected: {body}")));
    }
    Err(ApiError::from_status(status, format!("memo send failed: {body}"), None))
}

#[derive(Debug)]
pub struct KakaoClient {
    http: reqwest::Client,
    send_url: String,
    default_link: String,
    tokens: TokenStore,
    policy: RetryPolicy,
}

impl KakaoClient {
    pub fn new(config: &KakaoConfig, credentials: KakaoCredentials) -> Result<Self, Box<dyn Error>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let tokens = TokenStore::new(http.clone(), &config.auth_base, credentials, &config.token_cache_path);
        Ok(Self {
            http,
            send_url: format!("{}/v2/api/talk/memo/default/send", config.api_base.trim_end_matches('/')),
            default_link: config.default_link.clone(),
            tokens,
            policy: RetryPolicy::new(3, Duration::from_millis(1000)),
        })
    }
}

impl ChatSender for KakaoClient {
    #[instrument(level = "info", skip_all, fields(chars = message.text.chars().count()))]
    async fn send(&self, message: &ChatMessage) -> Result<(), ApiError> {
        let link = message.link.as_deref().unwrap_or(&self.default_link);
        let link = with_cache_bust(link, now_ms())?;
        let template = text_template(&message.text, &link, &message.button_title).to_string();

        retry_with_backoff("kakao_send", &self.policy, |_| {
            let template = template.as_str();
            async move {
                let token = self.tokens.access_token().await?;
                let res = self
                    .http
                    .post(&self.send_url)
                    .bearer_auth(token)
                    .form(&[("template_object", template)])
                    .send()
                    .await?;
                let status = res.status().as_u16();
                let json: Value = res.json().await.unwrap_or(Value::Null);
                if status == 401 {
                    warn!("Kakao rejected the access token; invalidating cache");
                    self.tokens.invalidate().await;
                    return Err(ApiError::Transient {
                        status: Some(401),
                        message: "access token rejected".to_string(),
                        retry_after: None,
                    });
                }
                check_send_response(status, &json)
            }
        })
        .await?;

        info!("Sent Kakao memo");
        Ok(())
    }
}

/// Prints messages to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSender;

impl ChatSender for ConsoleSender {
    async fn send(&self, message: &ChatMessage) -> Result<(), ApiError> {
        println!("----- [{}] {} -----", message.button_title, message.link.as_deref().unwrap_or("-"));
        println!("{}", message.text);
        info!(chars = message.text.chars().count(), "Dry run: printed message");
        Ok(())
    }
}

#[derive(Debug)]
pub enum Sender {
    Kakao(KakaoClient),
    Console(ConsoleSender),
}

impl ChatSender for Sender {
    async fn send(&self, message: &ChatMessage) -> Result<(), ApiError> {
        match self {
            Self::Kakao(client) => client.send(message).await,
            Self::Console(console) => console.send(message).await,
        }
    }
}
