//! 学习指南门面 - 编排层入口
//!
//! 界面层只通过这里的 `on_*` 方法修改状态：
//! `on_update_answer` / `on_generate_one` / `on_generate_all_missing` /
//! `on_stop_generation` / `on_clear_cache`。
//!
//! 切换章节只改变当前章节，不会自动开始生成。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::FileStorage;
use crate::models::{load_catalog_or_builtin, AnswerPatch, AnswerRecord, Catalog, Question, Section, SectionProgress};
use crate::orchestrator::section_queue::{BatchOutcome, SectionQueue, SingleOutcome};
use crate::services::{AnswerGenerator, AnswerStore, LlmService};
use crate::utils::logging::log_startup;
use crate::workflow::AnswerFlow;

/// 应用主结构
pub struct StudyGuide {
    catalog: Catalog,
    store: Arc<AnswerStore>,
    queue: SectionQueue,
    selected_section: Mutex<String>,
}

impl StudyGuide {
    pub fn new(
        catalog: Catalog,
        store: Arc<AnswerStore>,
        generator: Arc<dyn AnswerGenerator>,
        min_call_delay: Duration,
    ) -> Self {
        let flow = AnswerFlow::new(store.clone(), generator);
        let selected_section = catalog.first_section().id.clone();
        Self {
            catalog,
            store,
            queue: SectionQueue::new(flow, min_call_delay),
            selected_section: Mutex::new(selected_section),
        }
    }

    /// 按配置初始化：加载目录、恢复本地答案缓存、创建生成服务
    pub async fn initialize(config: &Config) -> Result<Self> {
        let catalog = load_catalog_or_builtin(config.catalog_path.as_deref()).await?;

        let storage = Arc::new(FileStorage::new(PathBuf::from(&config.storage_dir)));
        let store = Arc::new(AnswerStore::load(storage, config.storage_key.clone()));
        let generator = Arc::new(LlmService::new(config));

        log_startup(generator.model_name(), catalog.sections().len(), catalog.question_count());

        Ok(Self::new(catalog, store, generator, config.min_call_delay()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<AnswerStore> {
        &self.store
    }

    pub fn queue(&self) -> &SectionQueue {
        &self.queue
    }

    pub fn section(&self, section_id: &str) -> AppResult<&Section> {
        self.catalog
            .section(section_id)
            .ok_or_else(|| AppError::UnknownSection(section_id.to_string()))
    }

    fn question(&self, question_id: &str) -> AppResult<&Question> {
        self.catalog
            .question(question_id)
            .ok_or_else(|| AppError::UnknownQuestion(question_id.to_string()))
    }

    /// 当前选中的章节
    pub fn selected_section(&self) -> &Section {
        let id = self
            .selected_section
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        self.catalog
            .section(&id)
            .unwrap_or_else(|| self.catalog.first_section())
    }

    /// 切换章节（不触发生成）
    pub fn select_section(&self, section_id: &str) -> AppResult<&Section> {
        let section = self.section(section_id)?;
        *self
            .selected_section
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = section.id.clone();
        Ok(section)
    }

    pub fn answer(&self, question_id: &str) -> AnswerRecord {
        self.store.get(question_id)
    }

    pub fn section_progress(&self, section_id: &str) -> AppResult<SectionProgress> {
        Ok(self.store.progress(self.section(section_id)?))
    }

    /// 章节内按题干搜索
    pub fn search(&self, section_id: &str, query: &str) -> AppResult<Vec<&Question>> {
        Ok(self.section(section_id)?.filter_questions(query))
    }

    // ========== 界面入口 ==========

    pub fn on_update_answer(&self, question_id: &str, patch: AnswerPatch) -> AppResult<AnswerRecord> {
        self.question(question_id)?;
        Ok(self.store.update(question_id, patch))
    }

    pub async fn on_generate_one(&self, question_id: &str) -> AppResult<SingleOutcome> {
        let question = self.question(question_id)?;
        Ok(self.queue.generate_one(question).await)
    }

    pub async fn on_generate_all_missing(&self, section_id: &str) -> AppResult<BatchOutcome> {
        let section = self.section(section_id)?;
        Ok(self.queue.generate_all(section).await)
    }

    pub fn on_stop_generation(&self, section_id: &str) -> AppResult<bool> {
        self.section(section_id)?;
        Ok(self.queue.stop(section_id))
    }

    /// 清空答案缓存；调用前由界面向用户确认
    pub fn on_clear_cache(&self) {
        let stopped = self.queue.stop_all();
        if stopped > 0 {
            info!("⏹️ 清空缓存前已停止 {} 个批次", stopped);
        }
        self.store.clear_all();
    }
}
