use thiserror::Error;

/// 应用程序错误类型
///
/// 只在门面层（`StudyGuide`）和目录加载时出现；
/// 单个题目的生成失败不会上抛，而是写入该题目的 `AnswerRecord.error`。
#[derive(Debug, Error)]
pub enum AppError {
    /// 题目目录错误
    #[error("题目目录错误: {0}")]
    Catalog(#[from] CatalogError),
    /// 未知的章节
    #[error("未知的章节: {0}")]
    UnknownSection(String),
    /// 未知的题目
    #[error("未知的题目: {0}")]
    UnknownQuestion(String),
}

/// 答案生成错误
///
/// 对调用方只暴露两种终态：频率限制、其他失败。
/// `Display` 的内容就是展示给用户的提示语。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// 重试次数用尽后仍被限流
    #[error("API limit reached. Please wait a few seconds before trying again.")]
    RateLimited,
    /// 网络错误、空响应、缺少凭据等，不重试
    #[error("Failed to generate answer. Check your internet connection.")]
    Failed { reason: String },
}

impl GenerationError {
    pub fn failed(reason: impl Into<String>) -> Self {
        GenerationError::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited)
    }
}

/// 本地存储错误
///
/// 在 Store 边界上永远是非致命的：记录日志，内存状态继续有效。
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读写文件失败
    #[error("存储读写失败 ({key}): {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 超出存储配额
    #[error("存储空间不足 ({key}): 需要 {needed} 字节, 配额 {quota} 字节")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },
    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 题目目录错误
#[derive(Debug, Error)]
pub enum CatalogError {
    /// TOML 解析失败
    #[error("TOML解析失败: {0}")]
    Parse(#[from] toml::de::Error),
    /// 章节 ID 重复
    #[error("章节 ID 重复: {0}")]
    DuplicateSection(String),
    /// 题目 ID 重复
    #[error("题目 ID 重复: {0}")]
    DuplicateQuestion(String),
    /// 章节没有题目
    #[error("章节没有题目: {0}")]
    EmptySection(String),
    /// 目录为空
    #[error("题目目录为空")]
    Empty,
}

// ========== 便捷构造函数 ==========

impl StorageError {
    /// 创建文件读写错误
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            key: key.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_messages() {
        assert_eq!(
            GenerationError::RateLimited.to_string(),
            "API limit reached. Please wait a few seconds before trying again."
        );
        assert_eq!(
            GenerationError::failed("empty response").to_string(),
            "Failed to generate answer. Check your internet connection."
        );
        assert!(GenerationError::RateLimited.is_rate_limited());
        assert!(!GenerationError::failed("x").is_rate_limited());
    }

    #[test]
    fn test_app_error_from_catalog() {
        let err: AppError = CatalogError::DuplicateSection("cardio".to_string()).into();
        assert!(err.to_string().contains("cardio"));
    }
}
