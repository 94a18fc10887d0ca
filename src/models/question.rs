use serde::{Deserialize, Serialize};

/// 题目（只读，来自静态目录）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 题目 ID，目录中唯一；缺省时由目录按 `{章节ID}-{题号}` 补齐
    #[serde(default)]
    pub id: String,
    /// 题号（仅用于显示）
    #[serde(deserialize_with = "deserialize_number")]
    pub number: u32,
    /// 题干
    pub text: String,
}

/// 章节：一组有序的题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Section {
    /// 按题干做大小写无关的子串过滤，保持目录顺序；空查询返回全部题目
    pub fn filter_questions(&self, query: &str) -> Vec<&Question> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.questions.iter().collect();
        }
        self.questions
            .iter()
            .filter(|q| q.text.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

// 题号既可以写成整数也可以写成字符串
fn deserialize_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct NumberVisitor;

    impl<'de> Visitor<'de> for NumberVisitor {
        type Value = u32;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a non-negative integer or a string holding one")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            value
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid question number: {value}")))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u32::try_from(value).map_err(|_| E::custom(format!("question number out of range: {value}")))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u32::try_from(value).map_err(|_| E::custom(format!("question number out of range: {value}")))
        }
    }

    deserializer.deserialize_any(NumberVisitor)
}
