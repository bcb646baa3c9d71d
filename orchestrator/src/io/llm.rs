//! Provider-agnostic LLM gateway.
//!
//! One call is one budget check, at most one HTTP POST, and a normalized
//! [`LlmCallResult`]. Failures never panic or propagate; they come back as
//! `success == false` with a readable `error`.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::core::budget::{BudgetCheck, check_limit};
use crate::io::profiles::{LlmSettings, ProviderConfig};

const ERROR_BODY_EXCERPT_CHARS: usize = 500;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENROUTER_REFERER: &str = "https://aifactory.seeinside.me";
const OPENROUTER_TITLE: &str = "AI Factory Orchestrator";

/// Request/response shape family of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    Ollama,
    /// Chat-completions shape (OpenAI, OpenRouter, most hosted gateways).
    OpenAiCompatible,
}

impl ProviderKind {
    pub fn from_provider(provider: &str) -> Self {
        match provider {
            "anthropic" => ProviderKind::Anthropic,
            "ollama" => ProviderKind::Ollama,
            _ => ProviderKind::OpenAiCompatible,
        }
    }
}

pub fn build_request_body(
    kind: ProviderKind,
    model: &str,
    prompt: &str,
    max_tokens: usize,
    temperature: f64,
) -> Value {
    let messages = json!([{ "role": "user", "content": prompt }]);
    match kind {
        ProviderKind::Anthropic => json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": messages,
        }),
        ProviderKind::Ollama => json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        }),
        ProviderKind::OpenAiCompatible => json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": messages,
        }),
    }
}

/// Extract the generated text; unrecognized shapes yield `""`.
pub fn parse_response(kind: ProviderKind, body: &Value) -> String {
    let pointer = match kind {
        ProviderKind::Anthropic => "/content/0/text",
        ProviderKind::Ollama => "/message/content",
        ProviderKind::OpenAiCompatible => "/choices/0/message/content",
    };
    body.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn build_headers(
    provider: &str,
    config: &ProviderConfig,
    api_key: Option<&str>,
) -> Vec<(String, String)> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if let (Some(name), Some(key)) = (config.auth_header.as_deref(), api_key) {
        headers.push((name.to_string(), format!("{}{key}", config.auth_prefix)));
    }
    match provider {
        "openrouter" => {
            headers.push(("HTTP-Referer".to_string(), OPENROUTER_REFERER.to_string()));
            headers.push(("X-Title".to_string(), OPENROUTER_TITLE.to_string()));
        }
        "anthropic" => {
            headers.push(("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()));
        }
        _ => {}
    }
    headers
}

/// Why a gateway call did not produce content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BudgetExceeded(String),
    #[error("No base_url configured for provider: {0}")]
    MissingBaseUrl(String),
    #[error("Request timeout ({0}s)")]
    Timeout(u64),
    #[error("Request failed: {0}")]
    Network(String),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),
}

/// Normalized outcome of one gateway call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmCallResult {
    pub success: bool,
    pub content: String,
    pub model: String,
    pub error: Option<String>,
    pub token_info: BudgetCheck,
}

/// Anything that can answer a prompt. The runner only talks to this.
pub trait LlmClient {
    fn call(&self, prompt: &str) -> LlmCallResult;
    fn model(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Network(String),
}

/// Blocking JSON POST.
pub trait HttpTransport {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpReply, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest::blocking`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| anyhow::anyhow!("build http client: {err}"))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body.to_string());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let classify = |err: reqwest::Error| {
            if err.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(err.to_string())
            }
        };
        let response = builder.send().map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(classify)?;
        Ok(HttpReply { status, body })
    }
}

/// Gateway bound to one resolved profile.
pub struct LlmGateway<T> {
    settings: LlmSettings,
    kind: ProviderKind,
    transport: T,
    timeout: Duration,
}

impl<T: HttpTransport> LlmGateway<T> {
    pub fn new(settings: LlmSettings, transport: T, timeout: Duration) -> Self {
        let kind = ProviderKind::from_provider(&settings.profile.provider);
        Self {
            settings,
            kind,
            transport,
            timeout,
        }
    }

    fn request(&self, prompt: &str, budget: &BudgetCheck) -> Result<String, GatewayError> {
        let profile = &self.settings.profile;
        if !budget.ok {
            return Err(GatewayError::BudgetExceeded(
                budget.warning.clone().unwrap_or_default(),
            ));
        }
        let Some(url) = self.settings.provider_config.base_url.as_deref() else {
            return Err(GatewayError::MissingBaseUrl(profile.provider.clone()));
        };

        let request = HttpRequest {
            url: url.to_string(),
            headers: build_headers(
                &profile.provider,
                &self.settings.provider_config,
                self.settings.api_key.as_deref(),
            ),
            body: build_request_body(
                self.kind,
                &profile.model,
                prompt,
                budget.effective_max_output,
                profile.temperature,
            ),
            timeout: self.timeout,
        };

        info!(
            provider = %profile.provider,
            model = %profile.model,
            prompt_tokens = budget.prompt_tokens,
            max_output = budget.effective_max_output,
            "calling llm"
        );
        let reply = self.transport.post_json(&request).map_err(|err| match err {
            TransportError::Timeout => GatewayError::Timeout(self.timeout.as_secs()),
            TransportError::Network(message) => GatewayError::Network(message),
        })?;
        debug!(status = reply.status, bytes = reply.body.len(), "llm responded");

        if reply.status != 200 {
            return Err(GatewayError::Status {
                status: reply.status,
                body: reply.body.chars().take(ERROR_BODY_EXCERPT_CHARS).collect(),
            });
        }
        let body: Value = serde_json::from_str(&reply.body)
            .map_err(|err| GatewayError::InvalidJson(err.to_string()))?;
        Ok(parse_response(self.kind, &body))
    }
}

impl<T: HttpTransport> LlmClient for LlmGateway<T> {
    fn call(&self, prompt: &str) -> LlmCallResult {
        let profile = &self.settings.profile;
        let budget = check_limit(
            prompt,
            profile.max_context_tokens,
            profile.max_output_tokens,
        );
        if let Some(warning) = budget.warning.as_deref() {
            warn!(model = %profile.model, "{warning}");
        }
        match self.request(prompt, &budget) {
            Ok(content) => LlmCallResult {
                success: true,
                content,
                model: profile.model.clone(),
                error: None,
                token_info: budget,
            },
            Err(err) => {
                warn!(model = %profile.model, error = %err, "llm call failed");
                LlmCallResult {
                    success: false,
                    content: String::new(),
                    model: profile.model.clone(),
                    error: Some(err.to_string()),
                    token_info: budget,
                }
            }
        }
    }

    fn model(&self) -> &str {
        &self.settings.profile.model
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    use super::*;
    use crate::io::profiles::LlmProfile;

    struct ScriptedTransport {
        reply: Result<HttpReply, TransportError>,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                reply: Ok(HttpReply {
                    status,
                    body: body.to_string(),
                }),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(err: TransportError) -> Self {
            Self {
                reply: Err(err),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl HttpTransport for &ScriptedTransport {
        fn post_json(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
            self.seen.borrow_mut().push(request.clone());
            self.reply.clone()
        }
    }

    fn settings(provider: &str, base_url: Option<&str>) -> LlmSettings {
        LlmSettings {
            profile_name: Some("test".to_string()),
            profile: LlmProfile {
                provider: provider.to_string(),
                model: "model-x".to_string(),
                temperature: 0.3,
                max_output_tokens: 100,
                max_context_tokens: 1000,
                api_key_env: None,
                extra: BTreeMap::new(),
            },
            provider_config: ProviderConfig {
                base_url: base_url.map(str::to_string),
                auth_header: Some("Authorization".to_string()),
                auth_prefix: "Bearer ".to_string(),
            },
            api_key: Some("sk-1".to_string()),
        }
    }

    fn gateway<'a>(
        provider: &str,
        transport: &'a ScriptedTransport,
    ) -> LlmGateway<&'a ScriptedTransport> {
        LlmGateway::new(
            settings(provider, Some("http://llm.invalid/v1")),
            transport,
            Duration::from_secs(120),
        )
    }

    #[test]
    fn request_bodies_follow_provider_shape() {
        let anthropic = build_request_body(ProviderKind::Anthropic, "m", "hi", 50, 0.7);
        assert_eq!(anthropic["max_tokens"], 50);
        assert!(anthropic.get("temperature").is_none());
        assert_eq!(anthropic["messages"][0]["role"], "user");

        let ollama = build_request_body(ProviderKind::Ollama, "m", "hi", 50, 0.7);
        assert_eq!(ollama["stream"], false);
        assert_eq!(ollama["options"]["num_predict"], 50);
        assert_eq!(ollama["options"]["temperature"], 0.7);

        let openai = build_request_body(ProviderKind::OpenAiCompatible, "m", "hi", 50, 0.7);
        assert_eq!(openai["temperature"], 0.7);
        assert_eq!(openai["messages"][0]["content"], "hi");
    }

    #[test]
    fn unrecognized_response_shapes_are_empty() {
        let body = json!({"unexpected": true});
        for kind in [
            ProviderKind::Anthropic,
            ProviderKind::Ollama,
            ProviderKind::OpenAiCompatible,
        ] {
            assert_eq!(parse_response(kind, &body), "");
        }
        assert_eq!(
            parse_response(ProviderKind::Ollama, &json!({"message": {"content": "ok"}})),
            "ok"
        );
    }

    #[test]
    fn auth_header_requires_both_name_and_key() {
        let config = ProviderConfig::default();
        let headers = build_headers("ollama", &config, Some("sk"));
        assert_eq!(headers.len(), 1);

        let headers = build_headers(
            "openrouter",
            &ProviderConfig {
                auth_header: Some("Authorization".to_string()),
                auth_prefix: "Bearer ".to_string(),
                base_url: None,
            },
            Some("sk"),
        );
        assert!(headers.contains(&("Authorization".to_string(), "Bearer sk".to_string())));
        assert!(headers.iter().any(|(name, _)| name == "X-Title"));
    }

    #[test]
    fn success_returns_content_and_token_info() {
        let transport = ScriptedTransport::replying(
            200,
            r#"{"choices":[{"message":{"content":"generated"}}]}"#,
        );
        let result = gateway("openrouter", &transport).call("prompt text");
        assert!(result.success);
        assert_eq!(result.content, "generated");
        assert_eq!(result.model, "model-x");
        assert_eq!(result.error, None);
        assert_eq!(result.token_info.effective_max_output, 100);

        let seen = transport.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "http://llm.invalid/v1");
        assert_eq!(seen[0].body["max_tokens"], 100);
    }

    #[test]
    fn budget_overflow_skips_the_network() {
        let transport = ScriptedTransport::replying(200, "{}");
        let result = gateway("openrouter", &transport).call(&"x".repeat(3500));
        assert!(!result.success);
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Context overflow"))
        );
        assert!(transport.seen.borrow().is_empty());
    }

    #[test]
    fn missing_base_url_skips_the_network() {
        let transport = ScriptedTransport::replying(200, "{}");
        let gw = LlmGateway::new(settings("mystery", None), &transport, Duration::from_secs(5));
        let result = gw.call("hello");
        assert_eq!(
            result.error.as_deref(),
            Some("No base_url configured for provider: mystery")
        );
        assert!(transport.seen.borrow().is_empty());
    }

    #[test]
    fn non_200_reports_status_and_truncated_body() {
        let body = "e".repeat(2000);
        let transport = ScriptedTransport::replying(503, &body);
        let result = gateway("openrouter", &transport).call("hello");
        assert!(!result.success);
        assert_eq!(result.content, "");
        let error = result.error.expect("error");
        assert!(error.starts_with("API error 503: "));
        assert_eq!(error.len(), "API error 503: ".len() + 500);
    }

    #[test]
    fn transport_failures_are_distinguished() {
        let cases = [
            (
                ScriptedTransport::failing(TransportError::Timeout),
                "Request timeout (120s)",
            ),
            (
                ScriptedTransport::failing(TransportError::Network("refused".to_string())),
                "Request failed: refused",
            ),
        ];
        for (transport, expected) in &cases {
            let result = gateway("ollama", transport).call("hello");
            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some(*expected));
        }

        let transport = ScriptedTransport::replying(200, "not json");
        let result = gateway("ollama", &transport).call("hello");
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Invalid JSON response: "))
        );
    }

    /// Serves exactly one HTTP response and returns the raw request head.
    fn serve_once(listener: TcpListener, response_body: &'static str) -> std::thread::JoinHandle<String> {
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read line");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().expect("content length");
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("read body");

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response_body.len(),
                response_body
            )
            .expect("write response");
            stream.flush().expect("flush");
            head
        })
    }

    #[test]
    fn reqwest_transport_posts_to_a_live_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = serve_once(listener, r#"{"message":{"content":"from server"}}"#);

        let mut settings = settings("ollama", None);
        settings.provider_config.base_url = Some(format!("http://{addr}/api/chat"));
        let gw = LlmGateway::new(
            settings,
            ReqwestTransport::new().expect("client"),
            Duration::from_secs(10),
        );
        let result = gw.call("hello server");

        let head = server.join().expect("server thread").to_ascii_lowercase();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.content, "from server");
        assert!(head.starts_with("post /api/chat"));
        assert!(head.contains("authorization: bearer sk-1"));
    }
}
