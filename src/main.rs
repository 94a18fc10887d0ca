use anyhow::{bail, Result};
use study_guide::orchestrator::{BatchOutcome, SingleOutcome};
use study_guide::utils::logging::{self, log_progress};
use study_guide::{AnswerRecord, Config, Question, StudyGuide};
use tracing::{info, warn};

const USAGE: &str = "用法:
  study_guide [sections]              列出章节及进度
  study_guide show <章节ID> [关键词]   显示章节题目和答案
  study_guide generate <章节ID>        生成章节中所有缺失的答案（Ctrl-C 停止）
  study_guide ask <题目ID>             生成（或重新生成）单题答案
  study_guide clear --yes              清空本地答案缓存";

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    let guide = StudyGuide::initialize(&config).await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        [] | ["sections"] => list_sections(&guide)?,
        ["show", section_id, query @ ..] => show_section(&guide, section_id, &query.join(" "))?,
        ["generate", section_id] => generate_section(&guide, section_id).await?,
        ["ask", question_id] => ask_question(&guide, question_id).await?,
        ["clear", "--yes"] => {
            guide.on_clear_cache();
            info!("✓ 本地答案缓存已清空");
        }
        ["clear"] => warn!("⚠️ 清空缓存不可恢复，请使用 `clear --yes` 确认"),
        _ => bail!("无法识别的参数: {:?}\n\n{}", args, USAGE),
    }

    if let Some(e) = guide.store().persistence_error() {
        warn!("⚠️ 本地缓存写入失败，本次结果仅保存在内存中: {}", e);
    }

    Ok(())
}

fn list_sections(guide: &StudyGuide) -> Result<()> {
    for section in guide.catalog().sections() {
        let progress = guide.section_progress(&section.id)?;
        println!(
            "{:<14} {:>3}/{:<3} {:>3}%  {}",
            section.id, progress.answered, progress.total, progress.percent, section.title
        );
    }
    Ok(())
}

fn show_section(guide: &StudyGuide, section_id: &str, query: &str) -> Result<()> {
    let section = guide.select_section(section_id)?;
    let questions = guide.search(section_id, query)?;

    println!("{}\n", section.title);
    if questions.is_empty() {
        println!("没有匹配 \"{}\" 的题目", query);
        return Ok(());
    }
    for question in questions {
        print_question(question, &guide.answer(&question.id));
    }

    log_progress(&section.title, guide.section_progress(section_id)?);
    Ok(())
}

async fn generate_section(guide: &StudyGuide, section_id: &str) -> Result<()> {
    let section = guide.select_section(section_id)?;

    let generation = guide.on_generate_all_missing(section_id);
    tokio::pin!(generation);

    let outcome = tokio::select! {
        outcome = &mut generation => outcome?,
        _ = tokio::signal::ctrl_c() => {
            // 当前题目完成后停止；再按一次 Ctrl-C 直接退出
            guide.on_stop_generation(section_id)?;
            info!("⏹️ 等待当前题目完成，再次按 Ctrl-C 立即退出");
            tokio::select! {
                outcome = &mut generation => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("⚠️ 已强制退出，正在生成的题目未完成");
                    return Ok(());
                }
            }
        }
    };

    match outcome {
        BatchOutcome::AlreadyRunning => warn!("⚠️ 该章节已有批次在运行"),
        BatchOutcome::NothingToDo => info!("✓ {} 的所有题目都已有答案", section.title),
        BatchOutcome::Completed { .. } | BatchOutcome::Stopped { .. } => {}
    }

    log_progress(&section.title, guide.section_progress(section_id)?);
    Ok(())
}

async fn ask_question(guide: &StudyGuide, question_id: &str) -> Result<()> {
    match guide.on_generate_one(question_id).await? {
        SingleOutcome::Answered => {}
        SingleOutcome::Failed(e) => warn!("⚠️ {}", e),
        SingleOutcome::Superseded => warn!("⚠️ 本次生成已被新的请求取代"),
    }

    if let Some(question) = guide.catalog().question(question_id) {
        print_question(question, &guide.answer(question_id));
    }
    Ok(())
}

fn print_question(question: &Question, record: &AnswerRecord) {
    println!("{}. {}", question.number, question.text);
    match (&record.text, &record.error) {
        (_, Some(error)) => println!("   [失败] {}\n", error),
        (Some(text), None) => println!("{}\n", text),
        (None, None) if record.loading => println!("   [生成中]\n"),
        (None, None) => println!("   [未生成] study_guide ask {}\n", question.id),
    }
}
