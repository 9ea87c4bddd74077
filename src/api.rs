//! Generative-text API interaction with exponential backoff retry logic.
//!
//! This module provides the one retry utility every outbound call in the
//! crate goes through, and a Gemini `generateContent` client built on it.
//!
//! # Architecture
//!
//! - [`ApiError`]: transient vs. fatal failure, with an optional
//!   provider-suggested delay
//! - [`RetryPolicy`] / [`retry_with_backoff`]: the shared backoff loop
//! - [`AskAsync`]: core trait defining async generation
//! - [`GeminiAsk`]: talks to the Gemini REST API
//! - [`RetryAsk`]: decorator that adds retry logic to any `AskAsync`
//!
//! # Retry Strategy
//!
//! - Provider-suggested delay (`RetryInfo.retryDelay`) wins when present,
//!   floored at 800 ms
//! - Otherwise exponential backoff `base * 2^(attempt-1)`, capped at 30 s
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::{GeminiConfig, SummarizeConfig};
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use serde_json::{Value, json};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Failure of one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Worth retrying: timeouts, connection errors, 429 and 5xx.
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<StdDuration>,
    },
    /// Retrying will not help.
    Fatal { status: Option<u16>, message: String },
}

impl ApiError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP status: 429, 500, 502, 503 and 504 are transient.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<StdDuration>) -> Self {
        if matches!(status, 429 | 500 | 502 | 503 | 504) {
            Self::Transient {
                status: Some(status),
                message: message.into(),
                retry_after,
            }
        } else {
            Self::Fatal {
                status: Some(status),
                message: message.into(),
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<StdDuration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            Self::Fatal { .. } => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { status: Some(s), message, .. } => write!(f, "HTTP {s} (transient): {message}"),
            Self::Transient { status: None, message, .. } => write!(f, "transient: {message}"),
            Self::Fatal { status: Some(s), message } => write!(f, "HTTP {s}: {message}"),
            Self::Fatal { status: None, message } => write!(f, "{message}"),
        }
    }
}

impl Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::transient(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string(), None)
        } else {
            Self::fatal(e.to_string())
        }
    }
}

/// Parameters of the shared backoff loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: usize,
    /// Initial delay between attempts (doubles with each attempt).
    pub base_delay: StdDuration,
    /// Maximum computed delay.
    pub max_delay: StdDuration,
    /// Lower bound applied to a provider-suggested delay.
    pub min_suggested_delay: StdDuration,
    /// Upper bound of the random jitter, in milliseconds.
    pub jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: StdDuration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: StdDuration::from_secs(30),
            min_suggested_delay: StdDuration::from_millis(800),
            jitter_ms: 250,
        }
    }

    #[cfg(test)]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_ms = 0;
        self
    }

    /// Delay before attempt `attempt + 1`, after `attempt` failures. Never
    /// more than `max_delay` plus jitter.
    pub fn delay_for(&self, attempt: usize, err: &ApiError) -> StdDuration {
        let delay = match err.retry_after() {
            Some(suggested) => suggested.max(self.min_suggested_delay).min(self.max_delay),
            None => {
                let shift = attempt.saturating_sub(1).min(16) as u32;
                self.base_delay.saturating_mul(1 << shift).min(self.max_delay)
            }
        };
        let jitter_ms: u64 = if self.jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=self.jitter_ms)
        };
        delay + StdDuration::from_millis(jitter_ms)
    }
}

/// Run `op` until it succeeds, fails fatally, or runs out of attempts.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let total_t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        let attempt_t0 = Instant::now();
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
                let elapsed_ms_total = total_t0.elapsed().as_millis();

                if !e.is_transient() {
                    error!(label, attempt, elapsed_ms_attempt, error = %e, "Call failed with a non-retryable error");
                    return Err(e);
                }
                if attempt >= policy.max_attempts {
                    error!(
                        label,
                        attempt,
                        max = policy.max_attempts,
                        elapsed_ms_total,
                        error = %e,
                        "Call exhausted retries"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(attempt, &e);
                warn!(
                    label,
                    attempt,
                    max = policy.max_attempts,
                    elapsed_ms_attempt,
                    elapsed_ms_total,
                    ?delay,
                    error = %e,
                    "Attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}

/// The shape of a generation response, decided once at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text {
        text: String,
        /// Citation URLs the provider claims it used. Untrusted.
        grounding_urls: Vec<String>,
    },
    /// The provider answered, but not with usable text.
    Malformed(String),
}

/// Trait for async text generation.
///
/// Implementors send a prompt to a generative model and return what came
/// back. This abstraction allows decorators (like retry logic) and test fakes.
pub trait AskAsync {
    async fn ask(&self, prompt: &str) -> Result<Generation, ApiError>;
}

/// Generation parameters for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Text shorter than this is reported as [`Generation::Malformed`].
    pub min_output_chars: usize,
}

/// Gemini `generateContent` client.
pub struct GeminiAsk {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    params: GenerationParams,
}

impl fmt::Debug for GeminiAsk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiAsk")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("params", &self.params)
            .finish()
    }
}

impl GeminiAsk {
    pub fn new(config: &GeminiConfig, api_key: &str) -> Result<Self, Box<dyn Error>> {
        if api_key.trim().is_empty() {
            return Err("GEMINI_API_KEY is not set".into());
        }
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
            params: GenerationParams {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
                min_output_chars: config.min_output_chars,
            },
        })
    }

    /// Same client with different generation parameters.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint,
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.api_key)
        )
    }

    fn body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.params.temperature,
                "maxOutputTokens": self.params.max_output_tokens,
            },
        })
    }
}

impl AskAsync for GeminiAsk {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &str) -> Result<Generation, ApiError> {
        let t0 = Instant::now();
        let res = self.http.post(self.url()).json(&self.body(prompt)).send().await?;
        let status = res.status();
        let body = res.text().await?;
        let json: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let elapsed_ms = t0.elapsed().as_millis();

        if !status.is_success() {
            warn!(elapsed_ms, status = status.as_u16(), body = %truncate_for_log(&body, 400), "Gemini returned an error status");
            return Err(ApiError::from_status(
                status.as_u16(),
                truncate_for_log(&body, 400),
                parse_retry_delay(&json),
            ));
        }

        let generation = interpret_response(&json, self.params.min_output_chars);
        match &generation {
            Generation::Text { text, grounding_urls } => {
                debug!(elapsed_ms, chars = text.chars().count(), grounding = grounding_urls.len(), "Gemini returned text")
            }
            Generation::Malformed(reason) => {
                warn!(elapsed_ms, %reason, body = %truncate_for_log(&body, 600), "Gemini returned no usable text")
            }
        }
        Ok(generation)
    }
}

/// Read `error.details[@type ~ RetryInfo].retryDelay` (`"12s"`, `"1.5s"`).
pub fn parse_retry_delay(json: &Value) -> Option<StdDuration> {
    json.pointer("/error/details")?
        .as_array()?
        .iter()
        .filter(|d| {
            d.get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.contains("RetryInfo"))
        })
        .find_map(|d| d.get("retryDelay").and_then(Value::as_str))
        .and_then(|s| s.trim().trim_end_matches('s').parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .and_then(|secs| StdDuration::try_from_secs_f64(secs).ok())
}

/// Turn a successful `generateContent` body into a [`Generation`].
pub fn interpret_response(json: &Value, min_output_chars: usize) -> Generation {
    let Some(candidate) = json.pointer("/candidates/0") else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .map(|r| format!("no candidates (blocked: {r})"))
            .unwrap_or_else(|| "no candidates in response".to_string());
        return Generation::Malformed(reason);
    };

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    let text = text.trim().to_string();

    if text.is_empty() {
        let finish = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Generation::Malformed(format!("empty text (finishReason: {finish})"));
    }
    let chars = text.chars().count();
    if chars < min_output_chars {
        return Generation::Malformed(format!(
            "output too short ({chars} < {min_output_chars} chars)"
        ));
    }

    let grounding_urls = candidate
        .pointer("/groundingMetadata/groundingChunks")
        .and_then(Value::as_array)
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|c| c.pointer("/web/uri").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Generation::Text { text, grounding_urls }
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`]
/// implementation.
pub struct RetryAsk<T> {
    /// The underlying client to wrap.
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_attempts", &self.policy.max_attempts)
            .field("base_delay", &self.policy.base_delay)
            .field("max_delay", &self.policy.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &str) -> Result<Generation, ApiError> {
        let t0 = Instant::now();
        let res = retry_with_backoff("generate", &self.policy, |_| self.inner.ask(prompt)).await;
        let elapsed_ms_total = t0.elapsed().as_millis();
        match &res {
            Ok(_) => info!(elapsed_ms_total, "ask succeeded"),
            Err(e) => error!(elapsed_ms_total, error = %e, "ask failed"),
        }
        res
    }
}

/// Build the retrying Gemini client described by `config`.
pub fn gemini_with_backoff(config: &GeminiConfig, api_key: &str) -> Result<RetryAsk<GeminiAsk>, Box<dyn Error>> {
    let client = GeminiAsk::new(config, api_key)?;
    let policy = RetryPolicy::new(config.max_attempts, StdDuration::from_millis(config.base_delay_ms));
    Ok(RetryAsk::new(client, policy))
}

/// The retrying Gemini client used for per-article summaries: same model and
/// retry policy, shorter and cooler generations.
pub fn gemini_summarizer(
    config: &GeminiConfig,
    summarize: &SummarizeConfig,
    api_key: &str,
) -> Result<RetryAsk<GeminiAsk>, Box<dyn Error>> {
    let client = GeminiAsk::new(config, api_key)?.with_params(GenerationParams {
        temperature: summarize.temperature,
        max_output_tokens: summarize.max_output_tokens,
        min_output_chars: 1,
    });
    let policy = RetryPolicy::new(config.max_attempts, StdDuration::from_millis(config.base_delay_ms));
    Ok(RetryAsk::new(client, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct Scripted {
        replies: RefCell<VecDeque<Result<Generation, ApiError>>>,
        calls: Cell<usize>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Generation, ApiError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl AskAsync for Scripted {
        async fn ask(&self, _prompt: &str) -> Result<Generation, ApiError> {
            self.calls.set(self.calls.get() + 1);
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::fatal("script exhausted")))
        }
    }

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        let mut p = RetryPolicy::new(max_attempts, StdDuration::from_millis(1)).without_jitter();
        p.min_suggested_delay = StdDuration::from_millis(1);
        p
    }

    fn text(s: &str) -> Generation {
        Generation::Text {
            text: s.to_string(),
            grounding_urls: vec![],
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(ApiError::from_status(429, "x", None).is_transient());
        assert!(ApiError::from_status(503, "x", None).is_transient());
        assert!(!ApiError::from_status(400, "x", None).is_transient());
        assert!(!ApiError::from_status(403, "x", None).is_transient());
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let p = RetryPolicy::new(6, StdDuration::from_millis(1200)).without_jitter();
        let e = ApiError::transient("x");
        assert_eq!(p.delay_for(1, &e), StdDuration::from_millis(1200));
        assert_eq!(p.delay_for(2, &e), StdDuration::from_millis(2400));
        assert_eq!(p.delay_for(3, &e), StdDuration::from_millis(4800));
        assert_eq!(p.delay_for(10, &e), StdDuration::from_secs(30));
    }

    #[test]
    fn test_delay_prefers_provider_hint_with_floor() {
        let p = RetryPolicy::new(6, StdDuration::from_millis(1200)).without_jitter();
        let hinted = ApiError::from_status(429, "x", Some(StdDuration::from_secs(7)));
        assert_eq!(p.delay_for(1, &hinted), StdDuration::from_secs(7));
        let tiny = ApiError::from_status(429, "x", Some(StdDuration::from_millis(10)));
        assert_eq!(p.delay_for(1, &tiny), StdDuration::from_millis(800));
    }

    #[test]
    fn test_parse_retry_delay() {
        let json = json!({
            "error": {
                "code": 429,
                "details": [
                    { "@type": "type.googleapis.com/google.rpc.QuotaFailure" },
                    { "@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "12s" }
                ]
            }
        });
        assert_eq!(parse_retry_delay(&json), Some(StdDuration::from_secs(12)));
        assert_eq!(parse_retry_delay(&json!({"error": {}})), None);
        assert_eq!(parse_retry_delay(&Value::Null), None);
    }

    #[test]
    fn test_oversized_retry_delay_is_ignored_or_capped() {
        let huge = json!({"error": {"details": [
            { "@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "1e30s" }
        ]}});
        assert_eq!(parse_retry_delay(&huge), None);

        let p = RetryPolicy::new(6, StdDuration::from_millis(1200)).without_jitter();
        let hinted = ApiError::from_status(429, "quota", Some(StdDuration::from_secs(3600)));
        assert_eq!(p.delay_for(1, &hinted), StdDuration::from_secs(30));
    }

    #[test]
    fn test_interpret_text_and_grounding() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello " }, { "text": "world" }] },
                "groundingMetadata": {
                    "groundingChunks": [{ "web": { "uri": "https://s.a/1", "title": "a" } }]
                }
            }]
        });
        assert_eq!(
            interpret_response(&json, 0),
            Generation::Text {
                text: "hello world".to_string(),
                grounding_urls: vec!["https://s.a/1".to_string()],
            }
        );
    }

    #[test]
    fn test_interpret_malformed_shapes() {
        assert!(matches!(interpret_response(&json!({}), 0), Generation::Malformed(_)));
        assert!(matches!(
            interpret_response(&json!({"promptFeedback": {"blockReason": "SAFETY"}}), 0),
            Generation::Malformed(r) if r.contains("SAFETY")
        ));
        assert!(matches!(
            interpret_response(&json!({"candidates": [{"finishReason": "MAX_TOKENS", "content": {"parts": "oops"}}]}), 0),
            Generation::Malformed(r) if r.contains("MAX_TOKENS")
        ));
        let short = json!({"candidates": [{"content": {"parts": [{"text": "short"}]}}]});
        assert!(matches!(interpret_response(&short, 100), Generation::Malformed(r) if r.contains("too short")));
    }

    #[tokio::test]
    async fn test_retry_ask_recovers_from_transient_errors() {
        let inner = Scripted::new(vec![
            Err(ApiError::from_status(429, "slow down", Some(StdDuration::from_millis(1)))),
            Err(ApiError::transient("timeout")),
            Ok(text("brief")),
        ]);
        let api = RetryAsk::new(inner, fast_policy(5));
        assert_eq!(api.ask("p").await.unwrap(), text("brief"));
        assert_eq!(api.inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_ask_stops_on_fatal() {
        let inner = Scripted::new(vec![
            Err(ApiError::from_status(400, "bad request", None)),
            Ok(text("never")),
        ]);
        let api = RetryAsk::new(inner, fast_policy(5));
        assert!(api.ask("p").await.is_err());
        assert_eq!(api.inner.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retry_ask_gives_up_after_max_attempts() {
        let inner = Scripted::new(vec![
            Err(ApiError::transient("a")),
            Err(ApiError::transient("b")),
            Err(ApiError::transient("c")),
            Ok(text("late")),
        ]);
        let api = RetryAsk::new(inner, fast_policy(3));
        let err = api.ask("p").await.unwrap_err();
        assert_eq!(err, ApiError::transient("c"));
        assert_eq!(api.inner.calls.get(), 3);
    }

    #[test]
    fn test_gemini_requires_key() {
        assert!(GeminiAsk::new(&GeminiConfig::default(), " ").is_err());
    }

    #[test]
    fn test_gemini_url_and_body() {
        let g = GeminiAsk::new(&GeminiConfig::default(), "k y").unwrap();
        assert_eq!(
            g.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-flash-latest:generateContent?key=k%20y"
        );
        let body = g.body("hi");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 3000);
    }
}
