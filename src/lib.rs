//! # Study Guide
//!
//! 生理学考试学习指南：按章节展示固定题库，为每道题按需调用大模型生成学习要点，
//! 并把结果缓存在本地。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 本地键值存储（`LocalStorage`），只暴露读写能力
//!
//! ### ② 业务能力层（Services）
//! - `AnswerStore` - 答案状态的唯一持有者，合并更新并持久化
//! - `LlmService` - 调用生成服务，内部处理限流重试
//!
//! ### ③ 流程层（Workflow）
//! - `AnswerFlow` - "一道题"的完整流程（loading → 生成 → 写回）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/section_queue` - 章节批量生成、限速、停止
//! - `orchestrator/study_guide` - 界面层使用的入口
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod testing;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, GenerationError, StorageError};
pub use infrastructure::{FileStorage, LocalStorage, MemoryStorage};
pub use models::{AnswerPatch, AnswerRecord, Catalog, Question, Section, SectionProgress};
pub use orchestrator::{BatchOutcome, SingleOutcome, StudyGuide};
pub use services::{AnswerGenerator, AnswerStore, LlmService};
pub use workflow::AnswerFlow;
