//! 频率限制重试
//!
//! 与存储、队列无关的纯循环：输入一次调用的闭包和重试策略，
//! 输出成功结果或两种终态错误之一。

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{error, warn};

use crate::error::GenerationError;

static RATE_LIMIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b429\b|rate[ _-]?limit|too many requests|resource[ _-]?exhausted|quota")
        .expect("rate limit pattern is valid")
});

/// 重试策略：首次重试等待 `base_delay`，之后每次翻倍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次调用）
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// 第 `retry` 次重试（从 0 开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// 单次调用的失败分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// 被服务端限流，可以重试
    RateLimited(String),
    /// 其他失败，不重试
    Failed(String),
}

impl AttemptError {
    /// 根据错误信息判断是否为限流
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_rate_limit_message(&message) {
            AttemptError::RateLimited(message)
        } else {
            AttemptError::Failed(message)
        }
    }
}

pub fn is_rate_limit_message(message: &str) -> bool {
    RATE_LIMIT_PATTERN.is_match(message)
}

/// 带指数退避的重试循环
///
/// `operation` 的参数是当前尝试序号（从 0 开始）。
/// 限流时最多重试 `max_retries` 次；其他失败立即返回。
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, GenerationError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::RateLimited(message)) if attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "⏳ 触发频率限制，{}ms 后重试 ({}/{}): {}",
                    delay.as_millis(),
                    attempt + 1,
                    policy.max_retries,
                    message
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(AttemptError::RateLimited(message)) => {
                error!("❌ 重试 {} 次后仍被限流: {}", policy.max_retries, message);
                return Err(GenerationError::RateLimited);
            }
            Err(AttemptError::Failed(reason)) => {
                error!("❌ 生成失败: {}", reason);
                return Err(GenerationError::Failed { reason });
            }
        }
    }
}
