//! 答案存储 - 业务能力层
//!
//! 进程内唯一持有 `AnswerState` 的对象。所有修改都通过 `update` 的合并语义完成，
//! 每次修改后把整张表写入本地存储。写入失败不影响内存状态。

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::infrastructure::{LocalStorage, MemoryStorage};
use crate::models::{AnswerPatch, AnswerRecord, AnswerState, Section, SectionProgress};

/// 答案存储
///
/// 职责：
/// - 按题目 ID 读取 / 合并更新答案记录
/// - 每次修改后持久化整张表
/// - 启动时从本地存储恢复，并清掉上次会话残留的 loading 标记
pub struct AnswerStore {
    state: Mutex<AnswerState>,
    storage: Arc<dyn LocalStorage>,
    storage_key: String,
    last_persist_error: Mutex<Option<String>>,
    revision: watch::Sender<u64>,
}

impl AnswerStore {
    /// 从本地存储恢复答案表
    ///
    /// 存储内容损坏或读取失败时从空表开始，不会报错。
    pub fn load(storage: Arc<dyn LocalStorage>, storage_key: impl Into<String>) -> Self {
        let storage_key = storage_key.into();
        let state = match storage.get_item(&storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<AnswerState>(&raw) {
                Ok(state) => normalize_stale_loading(state),
                Err(e) => {
                    warn!("⚠️ 本地答案缓存无法解析，已忽略: {}", e);
                    AnswerState::new()
                }
            },
            Ok(None) => AnswerState::new(),
            Err(e) => {
                warn!("⚠️ 读取本地答案缓存失败: {}", e);
                AnswerState::new()
            }
        };

        info!("✓ 已恢复 {} 条答案记录", state.len());

        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(state),
            storage,
            storage_key,
            last_persist_error: Mutex::new(None),
            revision,
        }
    }

    /// 不落盘的存储（测试或临时会话使用）
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStorage::new()), "answers")
    }

    /// 读取答案记录，不存在时返回空闲状态的默认记录
    pub fn get(&self, question_id: &str) -> AnswerRecord {
        self.lock_state().get(question_id).cloned().unwrap_or_default()
    }

    /// 合并更新：只替换补丁中给出的字段，返回更新后的记录
    pub fn update(&self, question_id: &str, patch: AnswerPatch) -> AnswerRecord {
        let mut state = self.lock_state();
        let record = state.entry(question_id.to_string()).or_default();
        record.apply(&patch);
        let updated = record.clone();

        debug!("更新答案 {}: {:?}", question_id, patch);

        // 持锁写入，保证落盘顺序与修改顺序一致
        self.persist(&state);
        drop(state);

        self.bump_revision();
        updated
    }

    /// 清空全部答案并删除本地存储
    ///
    /// 是否需要用户确认由调用方（界面）决定。
    pub fn clear_all(&self) {
        let mut state = self.lock_state();
        state.clear();
        match self.storage.remove_item(&self.storage_key) {
            Ok(()) => self.set_persist_error(None),
            Err(e) => self.report_persist_error(e),
        }
        drop(state);

        info!("🗑️ 已清空全部答案缓存");
        self.bump_revision();
    }

    /// 当前答案表的副本
    pub fn snapshot(&self) -> AnswerState {
        self.lock_state().clone()
    }

    /// 章节完成进度（有文本即视为已完成）
    pub fn progress(&self, section: &Section) -> SectionProgress {
        let state = self.lock_state();
        let answered = section
            .questions
            .iter()
            .filter(|q| state.get(&q.id).is_some_and(AnswerRecord::has_text))
            .count();
        SectionProgress::new(answered, section.questions.len())
    }

    /// 最近一次持久化失败的原因（成功写入后清空）
    pub fn persistence_error(&self) -> Option<String> {
        self.last_persist_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 订阅修改通知，值为单调递增的修订号
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn persist(&self, state: &AnswerState) {
        let result = serde_json::to_string(state)
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.set_item(&self.storage_key, &raw));

        match result {
            Ok(()) => self.set_persist_error(None),
            Err(e) => self.report_persist_error(e),
        }
    }

    fn report_persist_error(&self, e: StorageError) {
        warn!("⚠️ 答案缓存写入失败，本次会话继续使用内存数据: {}", e);
        self.set_persist_error(Some(e.to_string()));
    }

    fn set_persist_error(&self, error: Option<String>) {
        *self
            .last_persist_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = error;
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    // 记录在每次修改后都保持一致，锁中毒时可以直接继续使用
    fn lock_state(&self) -> MutexGuard<'_, AnswerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 重启后没有任何请求在进行中，残留的 loading 一律重置为空闲
fn normalize_stale_loading(mut state: AnswerState) -> AnswerState {
    let mut stale = 0;
    for record in state.values_mut().filter(|r| r.loading) {
        record.apply(&AnswerPatch::settled());
        stale += 1;
    }
    if stale > 0 {
        warn!("⚠️ 发现 {} 条上次会话残留的 loading 记录，已重置", stale);
    }
    state
}
