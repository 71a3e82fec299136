//! `http` agent: one HTTP request per invocation.
//!
//! Config keys: `url` (required), `method` (default GET), `headers` (object of
//! strings), `body` (string sent verbatim, anything else sent as JSON).
//! Outputs: `statusCode`, `body` (JSON when it parses, else text) and
//! `headers`.

use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use agentflow_core::agent::{Agent, AgentCapabilities, AgentContext, AgentResult};
use agentflow_types::workflow::JsonMap;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpAgent {
    client: reqwest::Client,
}

impl HttpAgent {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Method, headers and body from config, or a configuration error message.
fn build_request_parts(ctx: &AgentContext) -> Result<(Method, HeaderMap, Option<Value>), String> {
    let method = match ctx.config_value("method") {
        None | Some(Value::Null) => Method::GET,
        Some(Value::String(m)) => match m.to_ascii_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "PATCH" => Method::PATCH,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            other => return Err(format!("unsupported method '{other}'")),
        },
        Some(_) => return Err("config 'method' must be a string".to_string()),
    };

    let mut headers = HeaderMap::new();
    match ctx.config_value("headers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (name, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| format!("invalid header name '{name}': {e}"))?;
                let value = HeaderValue::from_str(&value)
                    .map_err(|e| format!("invalid value for header '{name}': {e}"))?;
                headers.insert(name, value);
            }
        }
        Some(_) => return Err("config 'headers' must be an object".to_string()),
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    let body = ctx
        .config_value("body")
        .filter(|b| !b.is_null())
        .cloned();

    Ok((method, headers, body))
}

fn response_headers(headers: &HeaderMap) -> JsonMap {
    let mut map = JsonMap::new();
    for (name, value) in headers {
        if map.contains_key(name.as_str()) {
            continue;
        }
        if let Ok(v) = value.to_str() {
            map.insert(name.as_str().to_string(), Value::String(v.to_string()));
        }
    }
    map
}

fn decode_body(text: String) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

impl Agent for HttpAgent {
    fn agent_type(&self) -> &str {
        "http"
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::new(
            "http",
            "Makes HTTP requests to external APIs. Supports GET, POST, PUT, PATCH, DELETE, HEAD.",
        )
    }

    async fn execute(&self, ctx: &AgentContext) -> AgentResult {
        let start = Instant::now();

        let url = match ctx.required_config("url") {
            Ok(url) => url.to_string(),
            Err(e) => return AgentResult::failure(format!("Invalid configuration: {e}"), start.elapsed()),
        };
        let (method, headers, body) = match build_request_parts(ctx) {
            Ok(parts) => parts,
            Err(e) => return AgentResult::failure(format!("Invalid configuration: {e}"), start.elapsed()),
        };

        tracing::debug!(method = %method, url = url.as_str(), "sending http request");

        let mut request = self.client.request(method, &url).headers(headers);
        request = match body {
            Some(Value::String(text)) => request.body(text),
            Some(other) => request.body(other.to_string()),
            None => request,
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return AgentResult::failure(format!("HTTP request failed: {e}"), start.elapsed()),
        };

        let status = response.status();
        let headers = response_headers(response.headers());
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return AgentResult::failure(
                    format!("HTTP request failed: could not read body: {e}"),
                    start.elapsed(),
                );
            }
        };

        if !status.is_success() {
            return AgentResult::failure(format!("HTTP request failed: status {status}"), start.elapsed());
        }

        let mut outputs = JsonMap::new();
        outputs.insert("statusCode".to_string(), Value::from(status.as_u16()));
        outputs.insert("body".to_string(), decode_body(text));
        outputs.insert("headers".to_string(), Value::Object(headers));
        AgentResult::success(outputs, start.elapsed())
    }
}
