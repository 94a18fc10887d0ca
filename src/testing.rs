//! 测试用的答案生成器

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::GenerationError;
use crate::services::AnswerGenerator;

/// 按题干返回预设结果，并记录调用顺序和时间
///
/// 没有预设的题干返回 `Answer for {题干}`。
#[derive(Default)]
pub struct ScriptedGenerator {
    outcomes: Mutex<HashMap<String, Result<String, GenerationError>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, question: &str, answer: &str) -> Self {
        self.set(question, Ok(answer.to_string()));
        self
    }

    pub fn fail(self, question: &str, error: GenerationError) -> Self {
        self.set(question, Err(error));
        self
    }

    pub fn set(&self, question: &str, outcome: Result<String, GenerationError>) {
        self.outcomes.lock().unwrap().insert(question.to_string(), outcome);
    }

    /// 让该题的调用停在半路，直到返回的 `Notify` 被触发
    pub fn hold(&self, question: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(question.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    /// 让出执行权直到至少发生了 `n` 次调用
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls.lock().unwrap().len() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn generate(&self, question_text: &str) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((question_text.to_string(), Instant::now()));

        let gate = self.gates.lock().unwrap().remove(question_text);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.outcomes
            .lock()
            .unwrap()
            .get(question_text)
            .cloned()
            .unwrap_or_else(|| Ok(format!("Answer for {question_text}")))
    }
}
