use crate::models::catalog::Catalog;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载题目目录
pub async fn load_catalog(toml_file_path: &Path) -> Result<Catalog> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let catalog = Catalog::from_toml_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "成功加载 {} 个章节, {} 个题目",
        catalog.sections().len(),
        catalog.question_count()
    );

    Ok(catalog)
}

/// 按配置加载目录：指定了路径就读文件，否则使用内置目录
pub async fn load_catalog_or_builtin(path: Option<&str>) -> Result<Catalog> {
    match path {
        Some(path) => load_catalog(Path::new(path)).await,
        None => Catalog::builtin().context("内置题目目录无效"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_catalog_from_file() {
        let path = std::env::temp_dir().join(format!("study_guide_catalog_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            [[sections]]
            id = "endo"
            title = "Endocrine"
            [[sections.questions]]
            number = 1
            text = "Hypothalamic-pituitary axis"
            "#,
        )
        .unwrap();

        let catalog = load_catalog(&path).await.unwrap();
        assert_eq!(catalog.sections()[0].questions[0].id, "endo-1");

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let err = load_catalog(Path::new("/definitely/not/here.toml")).await.unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[tokio::test]
    async fn test_builtin_fallback() {
        let catalog = load_catalog_or_builtin(None).await.unwrap();
        assert!(catalog.question_count() > 0);
    }
}
