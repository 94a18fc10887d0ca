//! 单题生成流程 - 流程层
//!
//! 核心职责：定义"一道题"的完整处理流程
//!
//! 流程顺序：
//! 1. 标记 loading 并清掉旧错误
//! 2. 调用答案生成服务
//! 3. 成功写入文本；失败写入错误信息，保留原有文本

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::GenerationError;
use crate::models::{AnswerPatch, Question};
use crate::services::{AnswerGenerator, AnswerStore};
use crate::utils::logging::truncate_text;

/// 单题生成流程
///
/// - 不持有任何批量状态
/// - 失败一定写回对应题目的记录，不会被吞掉
#[derive(Clone)]
pub struct AnswerFlow {
    store: Arc<AnswerStore>,
    generator: Arc<dyn AnswerGenerator>,
}

impl AnswerFlow {
    pub fn new(store: Arc<AnswerStore>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self { store, generator }
    }

    pub fn store(&self) -> &Arc<AnswerStore> {
        &self.store
    }

    pub async fn run(&self, question: &Question) -> Result<(), GenerationError> {
        info!("[题目 {}] 📝 {}", question.id, truncate_text(&question.text, 60));
        self.store.update(&question.id, AnswerPatch::started());

        match self.generator.generate(&question.text).await {
            Ok(text) => {
                info!("[题目 {}] ✓ 已生成 {} 字符", question.id, text.chars().count());
                self.store.update(&question.id, AnswerPatch::succeeded(text));
                Ok(())
            }
            Err(e) => {
                warn!("[题目 {}] ⚠️ 生成失败: {:?}", question.id, e);
                self.store.update(&question.id, AnswerPatch::failed(e.to_string()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    fn question() -> Question {
        Question {
            id: "cardio-2".to_string(),
            number: 2,
            text: "Cardiac cycle".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_sets_text_and_clears_flags() {
        let store = Arc::new(AnswerStore::in_memory());
        store.update("cardio-2", AnswerPatch::failed("old error"));
        let generator = Arc::new(ScriptedGenerator::new().answer("Cardiac cycle", "**1. Systole**"));
        let flow = AnswerFlow::new(store.clone(), generator);

        tokio_test::assert_ok!(flow.run(&question()).await);

        let record = store.get("cardio-2");
        assert_eq!(record.text.as_deref(), Some("**1. Systole**"));
        assert!(!record.loading);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_text() {
        let store = Arc::new(AnswerStore::in_memory());
        store.update("cardio-2", AnswerPatch::succeeded("previous"));
        let generator = Arc::new(ScriptedGenerator::new().fail("Cardiac cycle", GenerationError::RateLimited));
        let flow = AnswerFlow::new(store.clone(), generator);

        let err = tokio_test::assert_err!(flow.run(&question()).await);
        assert_eq!(err, GenerationError::RateLimited);

        let record = store.get("cardio-2");
        assert_eq!(record.text.as_deref(), Some("previous"));
        assert!(!record.loading);
        assert_eq!(record.error, Some(GenerationError::RateLimited.to_string()));
    }

    #[tokio::test]
    async fn test_failure_without_text_leaves_text_empty() {
        let store = Arc::new(AnswerStore::in_memory());
        let generator = Arc::new(
            ScriptedGenerator::new().fail("Cardiac cycle", GenerationError::failed("empty response")),
        );
        let flow = AnswerFlow::new(store.clone(), generator);

        assert!(flow.run(&question()).await.is_err());

        let record = store.get("cardio-2");
        assert!(record.text.is_none());
        assert!(record.error.is_some());
        assert!(!record.loading);
    }
}
