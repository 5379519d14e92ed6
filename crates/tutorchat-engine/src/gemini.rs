use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::backend::{ChatBackend, ChatClient, ChatSession, Part, SessionConfig};
use crate::config::{api_base_from_env, request_timeout_from_env};
use crate::credentials::Credential;
use crate::errors::ServiceError;

/// `generateContent` transport for the Gemini API.
pub struct GeminiBackend {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(api_base_from_env(), request_timeout_from_env())
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn connect(&self, credential: &Credential) -> Result<Box<dyn ChatClient>, ServiceError> {
        Ok(Box::new(GeminiClient {
            api_base: self.api_base.clone(),
            api_key: credential.secret().to_string(),
            timeout: self.timeout,
            http: self.http.clone(),
        }))
    }
}

#[derive(Clone)]
struct GeminiClient {
    api_base: String,
    api_key: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiClient {
    fn endpoint_for_model(&self, model: &str) -> String {
        endpoint_for_model(&self.api_base, model)
    }

    fn post(&self, model: &str, payload: &Value) -> Result<Value, ServiceError> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .map_err(|err| ServiceError::transport(err.without_url().to_string()))?;
        response_json_or_error(response)
    }
}

impl ChatClient for GeminiClient {
    fn create_session(&self, config: &SessionConfig) -> Result<Box<dyn ChatSession>, ServiceError> {
        Ok(Box::new(GeminiSession {
            client: self.clone(),
            config: config.clone(),
            history: Vec::new(),
        }))
    }

    fn generate(
        &self,
        model: &str,
        system_instruction: Option<&str>,
        prompt: &str,
    ) -> Result<String, ServiceError> {
        let contents = vec![json!({
            "role": "user",
            "parts": [{ "text": prompt }],
        })];
        let mut payload = Map::new();
        payload.insert("contents".to_string(), Value::Array(contents));
        if let Some(instruction) = system_instruction.filter(|value| !value.trim().is_empty()) {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": instruction }] }),
            );
        }
        let response = self.post(model, &Value::Object(payload))?;
        Ok(extract_reply_text(&response))
    }
}

struct GeminiSession {
    client: GeminiClient,
    config: SessionConfig,
    history: Vec<Value>,
}

impl ChatSession for GeminiSession {
    fn send(&mut self, parts: &[Part]) -> Result<String, ServiceError> {
        let user_content = json!({
            "role": "user",
            "parts": parts.iter().map(part_to_json).collect::<Vec<Value>>(),
        });
        let payload = build_session_payload(&self.config, &self.history, &user_content);
        let response = self.client.post(&self.config.model, &payload)?;
        let reply = extract_reply_text(&response);

        // The exchange only joins the history once the service answered.
        self.history.push(user_content);
        self.history.push(json!({
            "role": "model",
            "parts": [{ "text": reply }],
        }));
        Ok(reply)
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn endpoint_for_model(api_base: &str, model: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{}/{}:generateContent", api_base, model_path)
}

fn part_to_json(part: &Part) -> Value {
    match part {
        Part::Text(text) => json!({ "text": text }),
        Part::InlineData { mime_type, data } => json!({
            "inlineData": {
                "mimeType": mime_type,
                "data": BASE64.encode(data),
            }
        }),
    }
}

fn build_session_payload(config: &SessionConfig, history: &[Value], user_content: &Value) -> Value {
    let mut contents = history.to_vec();
    contents.push(user_content.clone());
    json!({
        "contents": contents,
        "systemInstruction": {
            "parts": [{ "text": config.system_instruction }],
        },
        "generationConfig": {
            "temperature": config.temperature,
            "maxOutputTokens": config.max_output_tokens,
        },
    })
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, ServiceError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| ServiceError::transport(format!("response body read failed: {}", err.without_url())))?;
    if !status.is_success() {
        return Err(service_error_from_body(code, &body));
    }
    serde_json::from_str(&body).map_err(|err| {
        ServiceError::http(code, None, format!("invalid JSON payload: {err}"))
    })
}

/// Error bodies look like `{"error": {"code": 429, "message": ..., "status": "RESOURCE_EXHAUSTED"}}`.
fn service_error_from_body(code: u16, body: &str) -> ServiceError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed
        .as_ref()
        .and_then(|value| value.get("error"))
        .and_then(Value::as_object);
    let service_status = error
        .and_then(|obj| obj.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = error
        .and_then(|obj| obj.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_text(body.trim(), 512));
    ServiceError::http(code, service_status, message)
}

fn extract_reply_text(response_payload: &Value) -> String {
    let parts = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
