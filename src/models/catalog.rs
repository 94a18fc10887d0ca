//! 静态题目目录
//!
//! 目录在运行期只读。内置目录随二进制一起编译，也可以从 TOML 文件加载。

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::CatalogError;
use crate::models::question::{Question, Section};

const BUILTIN_CATALOG: &str = include_str!("../../catalog/physiology.toml");

/// 题目目录
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Catalog {
    sections: Vec<Section>,
}

impl Catalog {
    /// 内置的生理学题目目录
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// 解析并校验 TOML 目录
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = toml::from_str(content)?;
        catalog.normalized()
    }

    pub fn from_sections(sections: Vec<Section>) -> Result<Self, CatalogError> {
        Catalog { sections }.normalized()
    }

    /// 补齐缺省的题目 ID，并检查 ID 唯一、章节非空
    fn normalized(mut self) -> Result<Self, CatalogError> {
        if self.sections.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut section_ids = HashSet::new();
        let mut question_ids = HashSet::new();

        for section in &mut self.sections {
            if !section_ids.insert(section.id.clone()) {
                return Err(CatalogError::DuplicateSection(section.id.clone()));
            }
            if section.questions.is_empty() {
                return Err(CatalogError::EmptySection(section.id.clone()));
            }
            for question in &mut section.questions {
                if question.id.trim().is_empty() {
                    question.id = format!("{}-{}", section.id, question.number);
                }
                if !question_ids.insert(question.id.clone()) {
                    return Err(CatalogError::DuplicateQuestion(question.id.clone()));
                }
            }
        }

        Ok(self)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn first_section(&self) -> &Section {
        // normalized() 保证至少有一个章节
        &self.sections[0]
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.sections
            .iter()
            .find_map(|s| s.question(question_id))
    }

    /// 题目所属的章节
    pub fn section_of(&self, question_id: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.question(question_id).is_some())
    }

    pub fn question_count(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }
}
