use crate::config::Settings;
use crate::error::LlmError;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionNamedToolChoice, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionToolArgs, ChatCompletionToolChoiceOption, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FunctionName,
        FunctionObjectArgs,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// A function the model is forced to call, used for structured extraction
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// Chat-completion model used for grading and insight extraction
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier, part of every grading cache key
    fn model(&self) -> &str;

    /// Send a system and a user message, return the text of the first choice
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Force a call to `tool` and return its parsed arguments
    async fn call_tool(&self, system: &str, user: &str, tool: &ToolSpec) -> Result<Value, LlmError>;
}

/// Ask for a JSON answer and parse it, tolerating prose around the object
pub async fn complete_json(
    backend: &dyn ChatBackend,
    system: &str,
    user: &str,
) -> Result<Value, LlmError> {
    let content = backend.complete(system, user).await?;
    parse_json_response(&content)
}

/// Parse JSON from a model response, handling embedded JSON
pub fn parse_json_response(response: &str) -> Result<Value, LlmError> {
    match serde_json::from_str(response) {
        Ok(parsed) => Ok(parsed),
        Err(_) => try_extract_embedded_json(response),
    }
}

/// Try to extract JSON that might be embedded in text
fn try_extract_embedded_json(response: &str) -> Result<Value, LlmError> {
    match response.find('{') {
        Some(start) => match response.rfind('}') {
            Some(end) if end > start => serde_json::from_str(&response[start..=end])
                .map_err(|e| LlmError::MalformedResponse(format!("failed to parse extracted JSON: {e}"))),
            _ => Err(LlmError::MalformedResponse(
                "found opening brace but no closing brace in response".to_string(),
            )),
        },
        None => Err(LlmError::MalformedResponse("no JSON found in response".to_string())),
    }
}

/// Minimum interval between model requests, shared by every backend that
/// holds a clone of it
#[derive(Debug)]
pub struct RateLimiter {
    rate_limit_rps: f64,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(rate_limit_rps: f64) -> Self {
        Self {
            rate_limit_rps,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request is allowed
    pub async fn wait(&self) {
        let mut last_request = self.last_request.lock().await;
        enforce_rate_limit(&mut last_request, self.rate_limit_rps).await;
    }
}

/// OpenAI-compatible chat backend with client-side rate limiting
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    limiter: Arc<RateLimiter>,
}

impl OpenAiBackend {
    /// Create a backend for `model` that spaces its requests through `limiter`
    pub fn new(settings: &Settings, model: &str, limiter: Arc<RateLimiter>) -> Result<Self, LlmError> {
        let api_key = std::env::var(&settings.env_var_api_key)
            .map_err(|_| LlmError::MissingApiKey(settings.env_var_api_key.clone()))?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&settings.api_endpoint);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: model.to_string(),
            temperature: settings.temperature as f32,
            limiter,
        })
    }

    fn build_messages(system: &str, user: &str) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system.to_string())
            .build()
            .map_err(|e| LlmError::Request(format!("system message: {e}")))?
            .into();

        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(user.to_string())
            .build()
            .map_err(|e| LlmError::Request(format!("user message: {e}")))?
            .into();

        Ok(vec![system_message, user_message])
    }

    async fn send(
        &self,
        request: async_openai::types::CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, LlmError> {
        self.limiter.wait().await;

        debug!(model = %self.model, "sending chat completion request");
        Ok(self.client.chat().create(request).await?)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(system, user)?)
            .temperature(self.temperature)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = self.send(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    async fn call_tool(&self, system: &str, user: &str, tool: &ToolSpec) -> Result<Value, LlmError> {
        let function = FunctionObjectArgs::default()
            .name(tool.name.clone())
            .description(tool.description.clone())
            .parameters(tool.parameters.clone())
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let tool_definition = ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(function)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let tool_choice = ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
            r#type: ChatCompletionToolType::Function,
            function: FunctionName {
                name: tool.name.clone(),
            },
        });

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(system, user)?)
            .temperature(self.temperature)
            .tools(vec![tool_definition])
            .tool_choice(tool_choice)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = self.send(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        let call = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .find(|call| call.function.name == tool.name)
            .ok_or_else(|| LlmError::MissingToolCall(tool.name.clone()))?;

        serde_json::from_str(&call.function.arguments)
            .map_err(|e| LlmError::MalformedResponse(format!("tool arguments: {e}")))
    }
}

/// Enforce a minimum interval between requests, `rate_limit_rps <= 0` disables it
async fn enforce_rate_limit(last_request: &mut Option<Instant>, rate_limit_rps: f64) {
    if rate_limit_rps <= 0.0 {
        return;
    }

    let min_interval = Duration::from_secs_f64(1.0 / rate_limit_rps);

    if let Some(last_time) = *last_request {
        let elapsed = last_time.elapsed();
        if elapsed < min_interval {
            sleep(min_interval - elapsed).await;
        }
    }

    *last_request = Some(Instant::now());
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex as StdMutex;

    enum Reply {
        Text(String),
        Fail,
    }

    /// Backend double answering by the first rule whose needle occurs in the
    /// user prompt
    pub(crate) struct ScriptedBackend {
        model: String,
        rules: Vec<(String, Reply)>,
        tool_reply: Option<Value>,
        calls: StdMutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new() -> Self {
            Self {
                model: "scripted".to_string(),
                rules: Vec::new(),
                tool_reply: None,
                calls: StdMutex::new(Vec::new()),
            }
        }

        pub(crate) fn on(mut self, needle: &str, reply: impl Into<String>) -> Self {
            self.rules.push((needle.to_string(), Reply::Text(reply.into())));
            self
        }

        pub(crate) fn fail_on(mut self, needle: &str) -> Self {
            self.rules.push((needle.to_string(), Reply::Fail));
            self
        }

        pub(crate) fn with_tool_reply(mut self, reply: Value) -> Self {
            self.tool_reply = Some(reply);
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn model(&self) -> &str {
            &self.model
        }

        async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(user.to_string());
            match self.rules.iter().find(|(needle, _)| user.contains(needle.as_str())) {
                Some((_, Reply::Text(text))) => Ok(text.clone()),
                Some((_, Reply::Fail)) => Err(LlmError::EmptyResponse),
                None => Err(LlmError::MalformedResponse(format!("unscripted prompt: {user}"))),
            }
        }

        async fn call_tool(&self, _system: &str, user: &str, tool: &ToolSpec) -> Result<Value, LlmError> {
            self.calls.lock().unwrap().push(user.to_string());
            self.tool_reply
                .clone()
                .ok_or_else(|| LlmError::MissingToolCall(tool.name.clone()))
        }
    }
}
