//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `section_queue` - 章节批量生成队列
//! - 找出章节中尚无答案的题目，按目录顺序逐个生成
//! - 控制调用间隔，提供停止开关
//! - 保证同一章节不会同时运行两个批次
//! - 单题生成（同一题目以最新一次触发为准）
//!
//! ### `study_guide` - 应用门面
//! - 持有目录、答案存储和队列
//! - 暴露界面层使用的全部入口
//!
//! ## 层次关系
//!
//! ```text
//! study_guide (界面入口)
//!     ↓
//! section_queue (处理 Vec<Question>)
//!     ↓
//! workflow::AnswerFlow (处理单个 Question)
//!     ↓
//! services (能力层：store / llm / retry)
//!     ↓
//! infrastructure (基础设施：LocalStorage)
//! ```

pub mod section_queue;
pub mod study_guide;

// 重新导出主要类型
pub use section_queue::{BatchOutcome, BatchState, SectionQueue, SingleOutcome};
pub use study_guide::StudyGuide;
