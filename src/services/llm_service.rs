//! 答案生成服务 - 业务能力层
//!
//! 只负责"把一道题变成一段学习指南文本"，不关心存储和批量流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（默认使用 Gemini 的 OpenAI 兼容端点）

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::GenerationError;
use crate::services::prompt::build_study_prompt;
use crate::services::retry::{is_rate_limit_message, with_backoff, AttemptError, RetryPolicy};
use crate::utils::logging::truncate_text;

/// 答案生成能力
///
/// 两次调用之间不保留任何状态。限流重试在实现内部完成，
/// 调用方只会看到 `RateLimited` 或 `Failed` 两种错误。
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question_text: &str) -> Result<String, GenerationError>;
}

/// 基于 OpenAI 兼容接口的答案生成服务
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_output_tokens: u32,
    retry_policy: RetryPolicy,
    has_credentials: bool,
}

impl LlmService {
    /// 创建新的答案生成服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config).with_backoff(single_attempt()),
            model_name: config.llm_model_name.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            retry_policy: config.retry_policy(),
            has_credentials: !config.llm_api_key.trim().is_empty(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 单次调用，不重试
    async fn request_once(&self, prompt: &str) -> Result<String, AttemptError> {
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| AttemptError::Failed(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.temperature)
            .max_tokens(self.max_output_tokens)
            .build()
            .map_err(|e| AttemptError::Failed(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_api_error(&e)
        })?;

        debug!("LLM API 调用成功");

        // 空响应视为失败，而不是一个空答案
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AttemptError::Failed("LLM 返回内容为空".to_string()))
    }
}

#[async_trait]
impl AnswerGenerator for LlmService {
    async fn generate(&self, question_text: &str) -> Result<String, GenerationError> {
        if !self.has_credentials {
            warn!("未配置 LLM_API_KEY，无法生成答案");
            return Err(GenerationError::failed("missing API key"));
        }

        debug!(
            "调用 LLM API，模型: {}，题目: {}",
            self.model_name,
            truncate_text(question_text, 60)
        );

        let prompt = build_study_prompt(question_text);
        let prompt = prompt.as_str();
        let service = self;
        with_backoff(&self.retry_policy, move |_| service.request_once(prompt)).await
    }
}

/// 关闭 async-openai 内置的指数退避：每次 `create` 只发一次请求，
/// 重试完全由 `with_backoff` 按 `RetryPolicy` 控制
fn single_attempt() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// 把接口错误归类为"限流"或"其他失败"
///
/// 4xx/5xx 响应在 async-openai 中都是 `ApiError`，先看 `code` / `type`
/// （如 `rate_limit_exceeded`、`RESOURCE_EXHAUSTED`），再看错误文本。
fn classify_api_error(err: &OpenAIError) -> AttemptError {
    if let OpenAIError::ApiError(api) = err {
        let rate_limited = [api.code.as_deref(), api.r#type.as_deref()]
            .into_iter()
            .flatten()
            .any(is_rate_limit_message);
        if rate_limited {
            return AttemptError::RateLimited(err.to_string());
        }
    }
    AttemptError::classify(err.to_string())
}
