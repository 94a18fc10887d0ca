use std::time::Duration;

use crate::services::retry::RetryPolicy;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 采样温度，越低回答越稳定
    pub temperature: f32,
    /// 单次回答的最大输出 token 数
    pub max_output_tokens: u32,
    // --- 重试配置 ---
    /// 遇到频率限制时的最大重试次数（不含首次调用）
    pub max_retries: u32,
    /// 首次重试的等待时间，之后每次翻倍
    pub retry_base_delay_ms: u64,
    /// 批量生成时两次调用之间的最小间隔
    pub min_call_delay_ms: u64,
    // --- 持久化配置 ---
    pub storage_dir: String,
    pub storage_key: String,
    /// 自定义题目目录（TOML），为空时使用内置目录
    pub catalog_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-3-flash-preview".to_string(),
            temperature: 0.2,
            max_output_tokens: 2048,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            min_call_delay_ms: 300,
            storage_dir: ".study_guide".to_string(),
            storage_key: "physio_answers".to_string(),
            catalog_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("GEMINI_API_KEY"))
                .or_else(|_| std::env::var("API_KEY"))
                .unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            temperature: std::env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.temperature),
            max_output_tokens: std::env::var("LLM_MAX_OUTPUT_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_output_tokens),
            max_retries: std::env::var("LLM_MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retries),
            retry_base_delay_ms: std::env::var("LLM_RETRY_BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_base_delay_ms),
            min_call_delay_ms: std::env::var("MIN_CALL_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.min_call_delay_ms),
            storage_dir: std::env::var("STORAGE_DIR").unwrap_or(default.storage_dir),
            storage_key: std::env::var("STORAGE_KEY").unwrap_or(default.storage_key),
            catalog_path: std::env::var("CATALOG_PATH").ok().filter(|v| !v.trim().is_empty()),
        }
    }

    /// 频率限制重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// 批量生成的调用间隔
    pub fn min_call_delay(&self) -> Duration {
        Duration::from_millis(self.min_call_delay_ms)
    }
}
