/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::SectionProgress;

/// 初始化日志
///
/// 读取 `RUST_LOG`，未设置时使用 `info`。重复调用不会报错。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `model`: 模型名称
/// - `sections`: 章节数量
/// - `questions`: 题目数量
pub fn log_startup(model: &str, sections: usize, questions: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 生理学学习指南 - {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("🤖 模型: {}", model);
    info!("📚 {} 个章节, 共 {} 道题", sections, questions);
    info!("{}", "=".repeat(60));
}

/// 记录批量生成开始信息
///
/// # 参数
/// - `section_title`: 章节标题
/// - `pending`: 待生成的题目数
/// - `total`: 章节题目总数
pub fn log_batch_start(section_title: &str, pending: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始生成: {}", section_title);
    info!("📄 待生成 {} / 共 {} 道题", pending, total);
    info!("{}", "=".repeat(60));
}

/// 记录批量生成完成信息
///
/// # 参数
/// - `section_title`: 章节标题
/// - `succeeded`: 成功数量
/// - `failed`: 失败数量
/// - `stopped`: 是否被用户停止
pub fn log_batch_complete(section_title: &str, succeeded: usize, failed: usize, stopped: bool) {
    info!("\n{}", "─".repeat(60));
    if stopped {
        info!("⏹️ {} 已停止: 成功 {}, 失败 {}", section_title, succeeded, failed);
    } else {
        info!("✓ {} 生成完成: 成功 {}, 失败 {}", section_title, succeeded, failed);
    }
    info!("{}", "─".repeat(60));
}

/// 打印章节进度
pub fn log_progress(section_title: &str, progress: SectionProgress) {
    info!(
        "📊 {}: {}/{} 已完成 ({}%)",
        section_title, progress.answered, progress.total, progress.percent
    );
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
