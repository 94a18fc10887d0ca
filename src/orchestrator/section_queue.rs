//! 章节批量生成队列 - 编排层
//!
//! ## 职责
//!
//! 1. **批量生成**：按目录顺序逐题生成章节中尚无答案的题目
//! 2. **限速**：相邻两次调用之间至少间隔 `min_delay`，最后一题之后不等待
//! 3. **停止**：每个章节一个停止开关，在当前题目完成后生效
//! 4. **并发保护**：同一章节同一时刻只允许一个批次；同一题目同一时刻只有一个调用，以最新触发的为准
//!
//! ## 批次状态机
//!
//! ```text
//! Idle ──generate_all──▶ Running ──stop──▶ Stopping
//!  ▲                        │                 │
//!  └──────── 完成 ──────────┴──── 当前题完成 ──┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{AbortHandle, AbortRegistration, Abortable, Aborted};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::GenerationError;
use crate::models::{AnswerPatch, Question, Section};
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::AnswerFlow;

/// 章节批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    /// 已请求停止，等待当前题目完成
    Stopping,
}

/// 一次 `generate_all` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// 该章节已有批次在运行，本次不做任何事
    AlreadyRunning,
    /// 没有需要生成的题目
    NothingToDo,
    Completed { succeeded: usize, failed: usize },
    /// 被停止；`skipped` 是未开始的题目数
    Stopped {
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// 一次 `generate_one` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleOutcome {
    Answered,
    Failed(GenerationError),
    /// 同一题目又发起了新的生成，本次调用被取代
    Superseded,
}

struct InFlightCall {
    ticket: u64,
    abort: AbortHandle,
}

/// 章节批量生成队列
pub struct SectionQueue {
    flow: AnswerFlow,
    min_delay: Duration,
    batches: Mutex<HashMap<String, BatchState>>,
    /// 正在进行的调用（单题生成和批次当前题），同一题目最多一个
    in_flight: Mutex<HashMap<String, InFlightCall>>,
    next_ticket: AtomicU64,
}

impl SectionQueue {
    pub fn new(flow: AnswerFlow, min_delay: Duration) -> Self {
        Self {
            flow,
            min_delay,
            batches: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn state(&self, section_id: &str) -> BatchState {
        self.lock_batches()
            .get(section_id)
            .copied()
            .unwrap_or(BatchState::Idle)
    }

    pub fn is_running(&self, section_id: &str) -> bool {
        self.state(section_id) != BatchState::Idle
    }

    /// 生成章节中所有尚无答案的题目
    ///
    /// 跳过已有文本或正在生成中的题目。题目按目录顺序逐个处理；
    /// 每道题的结果（或错误）写回存储后才开始下一题。
    pub async fn generate_all(&self, section: &Section) -> BatchOutcome {
        let store = self.flow.store();

        let pending: Vec<&Question> = {
            let mut batches = self.lock_batches();
            if batches
                .get(&section.id)
                .is_some_and(|state| *state != BatchState::Idle)
            {
                info!("⚠️ 章节 {} 已有批次在运行，忽略本次请求", section.id);
                return BatchOutcome::AlreadyRunning;
            }

            let pending: Vec<&Question> = section
                .questions
                .iter()
                .filter(|q| {
                    let record = store.get(&q.id);
                    !record.has_text() && !record.loading
                })
                .collect();

            if pending.is_empty() {
                debug!("章节 {} 没有需要生成的题目", section.id);
                return BatchOutcome::NothingToDo;
            }

            batches.insert(section.id.clone(), BatchState::Running);
            pending
        };

        log_batch_start(&section.title, pending.len(), section.questions.len());

        // 先全部标记为 loading，界面可以立即显示占位
        for question in &pending {
            store.update(&question.id, AnswerPatch::started());
        }

        let mut guard = BatchGuard {
            queue: self,
            section_id: &section.id,
            pending,
            settled: 0,
        };
        let mut succeeded = 0;
        let mut failed = 0;
        let mut stopped = false;
        let mut last_call_at: Option<Instant> = None;

        while guard.settled < guard.pending.len() {
            if self.state(&section.id) == BatchState::Stopping {
                stopped = true;
                break;
            }

            let question = guard.pending[guard.settled];
            // 批次开始后被单题生成处理过（或正在处理）的题目不再重复调用
            if store.get(&question.id).has_text() || self.has_in_flight_call(&question.id) {
                debug!("[题目 {}] 已由单题生成处理，跳过", question.id);
                guard.settled += 1;
                continue;
            }

            // 间隔只出现在两次真实调用之间
            if let Some(at) = last_call_at {
                tokio::time::sleep_until(at + self.min_delay).await;
                if self.state(&section.id) == BatchState::Stopping {
                    stopped = true;
                    break;
                }
            }

            let registered = if store.get(&question.id).has_text() {
                None
            } else {
                self.try_register(&question.id)
            };
            let Some((ticket, registration)) = registered else {
                debug!("[题目 {}] 已由单题生成处理，跳过", question.id);
                guard.settled += 1;
                continue;
            };

            match self.run_registered(question, ticket, registration).await {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(_)) => failed += 1,
                Err(_aborted) => info!("[题目 {}] 批次内的调用已被单题生成取代", question.id),
            }
            last_call_at = Some(Instant::now());
            guard.settled += 1;
        }

        let skipped = guard.pending.len() - guard.settled;
        drop(guard);

        log_batch_complete(&section.title, succeeded, failed, stopped);

        if stopped {
            BatchOutcome::Stopped {
                succeeded,
                failed,
                skipped,
            }
        } else {
            BatchOutcome::Completed { succeeded, failed }
        }
    }

    /// 请求停止章节的批次；没有运行中的批次时返回 false
    pub fn stop(&self, section_id: &str) -> bool {
        let mut batches = self.lock_batches();
        match batches.get_mut(section_id) {
            Some(state) if *state == BatchState::Running => {
                *state = BatchState::Stopping;
                info!("⏹️ 已请求停止章节 {} 的批量生成", section_id);
                true
            }
            _ => false,
        }
    }

    /// 停止所有章节的批次，返回被请求停止的章节数
    pub fn stop_all(&self) -> usize {
        let mut batches = self.lock_batches();
        let mut count = 0;
        for state in batches.values_mut() {
            if *state == BatchState::Running {
                *state = BatchState::Stopping;
                count += 1;
            }
        }
        count
    }

    /// 单题生成（不经过批次）
    ///
    /// 同一题目再次触发时，上一次尚未完成的调用（包括批次中正在进行的那一题）
    /// 会被取消，之后由新调用负责写回结果。
    pub async fn generate_one(&self, question: &Question) -> SingleOutcome {
        let (ticket, registration) = self.register(&question.id);

        match self.run_registered(question, ticket, registration).await {
            Ok(Ok(())) => SingleOutcome::Answered,
            Ok(Err(e)) => SingleOutcome::Failed(e),
            Err(_aborted) => SingleOutcome::Superseded,
        }
    }

    /// 登记一次调用，取消同一题目上尚未完成的调用
    fn register(&self, question_id: &str) -> (u64, AbortRegistration) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (abort, registration) = AbortHandle::new_pair();

        let previous = self
            .lock_in_flight()
            .insert(question_id.to_string(), InFlightCall { ticket, abort });
        if let Some(previous) = previous {
            info!("[题目 {}] 🔁 取代上一次尚未完成的生成", question_id);
            previous.abort.abort();
        }
        (ticket, registration)
    }

    /// 同一题目已有调用在进行时不登记
    fn try_register(&self, question_id: &str) -> Option<(u64, AbortRegistration)> {
        let mut in_flight = self.lock_in_flight();
        if in_flight.contains_key(question_id) {
            return None;
        }
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (abort, registration) = AbortHandle::new_pair();
        in_flight.insert(question_id.to_string(), InFlightCall { ticket, abort });
        Some((ticket, registration))
    }

    async fn run_registered(
        &self,
        question: &Question,
        ticket: u64,
        registration: AbortRegistration,
    ) -> Result<Result<(), GenerationError>, Aborted> {
        let guard = InFlightGuard {
            queue: self,
            question_id: &question.id,
            ticket,
        };
        let result = Abortable::new(self.flow.run(question), registration).await;
        drop(guard);
        result
    }

    fn has_in_flight_call(&self, question_id: &str) -> bool {
        self.lock_in_flight().contains_key(question_id)
    }

    fn lock_batches(&self) -> MutexGuard<'_, HashMap<String, BatchState>> {
        self.batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlightCall>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 批次结束（正常完成、停止或 future 被丢弃）时把章节恢复为 Idle，
/// 并撤销尚未完成题目的 loading 标记
struct BatchGuard<'a> {
    queue: &'a SectionQueue,
    section_id: &'a str,
    pending: Vec<&'a Question>,
    settled: usize,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let store = self.queue.flow.store();
        for question in &self.pending[self.settled..] {
            // 仍有调用在进行的题目由该调用负责收尾
            if store.get(&question.id).loading && !self.queue.has_in_flight_call(&question.id) {
                store.update(&question.id, AnswerPatch::settled());
            }
        }
        self.queue.lock_batches().remove(self.section_id);
    }
}

/// 调用结束时注销自己；调用被丢弃而未被取代时撤销 loading 标记
struct InFlightGuard<'a> {
    queue: &'a SectionQueue,
    question_id: &'a str,
    ticket: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.queue.lock_in_flight();
        let still_current = in_flight
            .get(self.question_id)
            .is_some_and(|call| call.ticket == self.ticket);
        if !still_current {
            return;
        }
        in_flight.remove(self.question_id);
        drop(in_flight);

        let store = self.queue.flow.store();
        if store.get(self.question_id).loading {
            store.update(self.question_id, AnswerPatch::settled());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerRecord;
    use crate::services::AnswerStore;
    use crate::testing::ScriptedGenerator;
    use std::sync::Arc;

    const DELAY: Duration = Duration::from_millis(300);

    fn section() -> Section {
        Section {
            id: "blood".to_string(),
            title: "Blood".to_string(),
            questions: (1..=3)
                .map(|n| Question {
                    id: format!("blood-{n}"),
                    number: n,
                    text: format!("Q{n}"),
                })
                .collect(),
        }
    }

    fn queue_with(generator: Arc<ScriptedGenerator>) -> (Arc<AnswerStore>, Arc<SectionQueue>) {
        let store = Arc::new(AnswerStore::in_memory());
        let flow = AnswerFlow::new(store.clone(), generator);
        (store, Arc::new(SectionQueue::new(flow, DELAY)))
    }

    fn assert_untouched(record: &AnswerRecord) {
        assert!(record.text.is_none());
        assert!(!record.loading, "loading flag must not be left stuck");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_runs_in_order_with_delay() {
        let generator = Arc::new(ScriptedGenerator::new());
        let (store, queue) = queue_with(generator.clone());
        let started = Instant::now();

        let outcome = queue.generate_all(&section()).await;
        assert_eq!(outcome, BatchOutcome::Completed { succeeded: 3, failed: 0 });

        assert_eq!(generator.calls(), vec!["Q1", "Q2", "Q3"]);
        let offsets: Vec<_> = generator.call_times().iter().map(|t| *t - started).collect();
        assert_eq!(offsets, vec![Duration::ZERO, DELAY, DELAY * 2]);
        // 最后一题之后不等待
        assert_eq!(started.elapsed(), DELAY * 2);

        for n in 1..=3 {
            let record = store.get(&format!("blood-{n}"));
            assert_eq!(record.text, Some(format!("Answer for Q{n}")));
            assert!(!record.loading);
            assert!(record.error.is_none());
        }
        assert_eq!(queue.state("blood"), BatchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_skips_answered_and_loading() {
        let generator = Arc::new(ScriptedGenerator::new());
        let (store, queue) = queue_with(generator.clone());
        store.update("blood-1", AnswerPatch::succeeded("done"));
        store.update("blood-2", AnswerPatch::started());

        let outcome = queue.generate_all(&section()).await;
        assert_eq!(outcome, BatchOutcome::Completed { succeeded: 1, failed: 0 });
        assert_eq!(generator.calls(), vec!["Q3"]);
        assert_eq!(store.get("blood-1").text.as_deref(), Some("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_do() {
        let generator = Arc::new(ScriptedGenerator::new());
        let (store, queue) = queue_with(generator.clone());
        for n in 1..=3 {
            store.update(&format!("blood-{n}"), AnswerPatch::succeeded("done"));
        }

        assert_eq!(queue.generate_all(&section()).await, BatchOutcome::NothingToDo);
        assert!(generator.calls().is_empty());
        assert!(!queue.is_running("blood"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_recorded_and_batch_continues() {
        let generator = Arc::new(
            ScriptedGenerator::new().fail("Q2", GenerationError::failed("empty response")),
        );
        let (store, queue) = queue_with(generator.clone());

        let outcome = queue.generate_all(&section()).await;
        assert_eq!(outcome, BatchOutcome::Completed { succeeded: 2, failed: 1 });

        let failed = store.get("blood-2");
        assert!(failed.text.is_none());
        assert!(!failed.loading);
        assert_eq!(failed.error, Some(GenerationError::failed("x").to_string()));
        assert!(store.get("blood-3").text.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_inflight_call_finishes_it_then_halts() {
        let generator = Arc::new(ScriptedGenerator::new());
        let gate = generator.hold("Q1");
        let (store, queue) = queue_with(generator.clone());

        let batch = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.generate_all(&section()).await })
        };
        generator.wait_for_calls(1).await;
        assert_eq!(queue.state("blood"), BatchState::Running);
        assert!(store.get("blood-3").loading);

        assert!(queue.stop("blood"));
        assert_eq!(queue.state("blood"), BatchState::Stopping);
        gate.notify_one();

        let outcome = batch.await.unwrap();
        assert_eq!(
            outcome,
            BatchOutcome::Stopped { succeeded: 1, failed: 0, skipped: 2 }
        );
        assert_eq!(generator.calls(), vec!["Q1"]);
        assert_eq!(store.get("blood-1").text.as_deref(), Some("Answer for Q1"));
        assert_untouched(&store.get("blood-2"));
        assert_untouched(&store.get("blood-3"));
        assert_eq!(queue.state("blood"), BatchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_between_items() {
        let generator = Arc::new(ScriptedGenerator::new());
        let (store, queue) = queue_with(generator.clone());

        let batch = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.generate_all(&section()).await })
        };
        // Q1 已完成，批次正在等待调用间隔
        generator.wait_for_calls(1).await;
        while store.get("blood-1").text.is_none() {
            tokio::task::yield_now().await;
        }
        assert!(queue.stop("blood"));

        let outcome = batch.await.unwrap();
        assert!(matches!(outcome, BatchOutcome::Stopped { succeeded: 1, skipped: 2, .. }));
        assert_eq!(generator.calls(), vec!["Q1"]);
        assert_untouched(&store.get("blood-2"));
        assert_untouched(&store.get("blood-3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_batch_is_a_noop_while_running() {
        let generator = Arc::new(ScriptedGenerator::new());
        let gate = generator.hold("Q1");
        let (_store, queue) = queue_with(generator.clone());

        let first = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.generate_all(&section()).await })
        };
        generator.wait_for_calls(1).await;

        assert_eq!(queue.generate_all(&section()).await, BatchOutcome::AlreadyRunning);

        gate.notify_one();
        assert_eq!(
            first.await.unwrap(),
            BatchOutcome::Completed { succeeded: 3, failed: 0 }
        );
        // 每道题只调用一次
        assert_eq!(generator.calls(), vec!["Q1", "Q2", "Q3"]);

        // 批次结束后可以再次启动（此时已无待生成题目）
        assert_eq!(queue.generate_all(&section()).await, BatchOutcome::NothingToDo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_batch_returns_false() {
        let (_store, queue) = queue_with(Arc::new(ScriptedGenerator::new()));
        assert!(!queue.stop("blood"));
        assert_eq!(queue.stop_all(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_batch_resets_state() {
        let generator = Arc::new(ScriptedGenerator::new());
        let _gate = generator.hold("Q1");
        let (store, queue) = queue_with(generator.clone());

        let batch = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.generate_all(&section()).await })
        };
        generator.wait_for_calls(1).await;
        batch.abort();
        assert!(batch.await.unwrap_err().is_cancelled());

        assert_eq!(queue.state("blood"), BatchState::Idle);
        for n in 1..=3 {
            assert_untouched(&store.get(&format!("blood-{n}")));
        }
    }

    #[tokio::test]
    async fn test_generate_one_success_and_failure() {
        let generator = Arc::new(ScriptedGenerator::new().fail("Q2", GenerationError::RateLimited));
        let (store, queue) = queue_with(generator);
        let section = section();

        assert_eq!(queue.generate_one(&section.questions[0]).await, SingleOutcome::Answered);
        let record = store.get("blood-1");
        assert!(record.text.is_some() && !record.loading && record.error.is_none());

        assert_eq!(
            queue.generate_one(&section.questions[1]).await,
            SingleOutcome::Failed(GenerationError::RateLimited)
        );
        let record = store.get("blood-2");
        assert!(record.text.is_none() && !record.loading && record.error.is_some());
    }

    #[tokio::test]
    async fn test_generate_one_supersedes_pending_call() {
        let generator = Arc::new(ScriptedGenerator::new());
        let _gate = generator.hold("Q1");
        let (store, queue) = queue_with(generator.clone());
        let question = section().questions[0].clone();

        let first = {
            let queue = queue.clone();
            let question = question.clone();
            tokio::spawn(async move { queue.generate_one(&question).await })
        };
        generator.wait_for_calls(1).await;
        assert!(store.get("blood-1").loading);

        assert_eq!(queue.generate_one(&question).await, SingleOutcome::Answered);
        assert_eq!(first.await.unwrap(), SingleOutcome::Superseded);

        let record = store.get("blood-1");
        assert_eq!(record.text.as_deref(), Some("Answer for Q1"));
        assert!(!record.loading);
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_one_during_batch() {
        let generator = Arc::new(ScriptedGenerator::new());
        let gate = generator.hold("Q1");
        let (store, queue) = queue_with(generator.clone());
        let section = section();
        let started = Instant::now();

        let batch = {
            let queue = queue.clone();
            let section = section.clone();
            tokio::spawn(async move { queue.generate_all(&section).await })
        };
        generator.wait_for_calls(1).await;

        // Q3 此时处于批次的 loading 状态，单题生成不受批次限制
        assert_eq!(queue.generate_one(&section.questions[2]).await, SingleOutcome::Answered);
        assert!(store.get("blood-3").text.is_some());

        gate.notify_one();
        assert_eq!(
            batch.await.unwrap(),
            BatchOutcome::Completed { succeeded: 2, failed: 0 }
        );
        assert!(store.get("blood-2").text.is_some());
        // 批次不会再为 Q3 调用一次
        assert_eq!(generator.calls(), vec!["Q1", "Q3", "Q2"]);
        // Q2 是最后一次真实调用，之后不再等待
        assert_eq!(started.elapsed(), DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_one_supersedes_batch_inflight_call() {
        let generator = Arc::new(ScriptedGenerator::new());
        let gate = generator.hold("Q1");
        let (store, queue) = queue_with(generator.clone());
        let section = section();

        let batch = {
            let queue = queue.clone();
            let section = section.clone();
            tokio::spawn(async move { queue.generate_all(&section).await })
        };
        generator.wait_for_calls(1).await;

        assert_eq!(queue.generate_one(&section.questions[0]).await, SingleOutcome::Answered);
        assert_eq!(store.get("blood-1").text.as_deref(), Some("Answer for Q1"));

        // 批次里被取代的调用即使放行也不能再写回
        generator.set("Q1", Ok("stale batch answer".to_string()));
        gate.notify_one();

        assert_eq!(
            batch.await.unwrap(),
            BatchOutcome::Completed { succeeded: 2, failed: 0 }
        );
        assert_eq!(generator.calls(), vec!["Q1", "Q1", "Q2", "Q3"]);
        let record = store.get("blood-1");
        assert_eq!(record.text.as_deref(), Some("Answer for Q1"));
        assert!(!record.loading);
        assert_eq!(queue.state("blood"), BatchState::Idle);
    }
}
