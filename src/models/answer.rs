use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 单个题目的答案状态
///
/// 序列化格式与本地存储一致：`{ "text": ..., "loading": ..., "error": ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// 答案所处阶段（由记录字段推导）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPhase {
    Idle,
    Loading,
    Ready,
    Failed,
}

impl AnswerRecord {
    pub fn phase(&self) -> AnswerPhase {
        if self.loading {
            AnswerPhase::Loading
        } else if self.error.is_some() {
            AnswerPhase::Failed
        } else if self.text.is_some() {
            AnswerPhase::Ready
        } else {
            AnswerPhase::Idle
        }
    }

    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    /// 合并补丁：只替换补丁中给出的字段
    pub fn apply(&mut self, patch: &AnswerPatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(loading) = patch.loading {
            self.loading = loading;
        }
        if let Some(error) = &patch.error {
            self.error = error.clone();
        }
    }
}

/// 答案记录的部分更新
///
/// 外层 `None` 表示"不修改该字段"，`Some(None)` 表示清空。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerPatch {
    pub text: Option<Option<String>>,
    pub loading: Option<bool>,
    pub error: Option<Option<String>>,
}

impl AnswerPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: Option<String>) -> Self {
        self.text = Some(text);
        self
    }

    pub fn loading(mut self, loading: bool) -> Self {
        self.loading = Some(loading);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.loading.is_none() && self.error.is_none()
    }

    /// 开始生成：进入 loading，同时清掉旧错误
    pub fn started() -> Self {
        Self::new().loading(true).error(None)
    }

    /// 生成成功
    pub fn succeeded(text: impl Into<String>) -> Self {
        Self::new().text(Some(text.into())).loading(false).error(None)
    }

    /// 生成失败：不动已有文本
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new().loading(false).error(Some(message.into()))
    }

    /// 撤销 loading 标记（批量停止或重新加载时使用）
    pub fn settled() -> Self {
        Self::new().loading(false)
    }
}

/// 题目 ID → 答案记录
pub type AnswerState = BTreeMap<String, AnswerRecord>;

/// 章节完成进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionProgress {
    pub answered: usize,
    pub total: usize,
    /// 四舍五入后的百分比，题目数为 0 时为 0
    pub percent: u8,
}

impl SectionProgress {
    pub fn new(answered: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0
        } else {
            ((answered as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            answered,
            total,
            percent,
        }
    }
}
