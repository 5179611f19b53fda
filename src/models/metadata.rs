//! 双语元数据

use serde::{Deserialize, Serialize};

/// 元数据语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// 英语
    #[serde(rename = "en")]
    English,
    /// 印尼语
    #[serde(rename = "ind")]
    Indonesian,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::Indonesian];

    /// 语言代码，同时用于导出文件名
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Indonesian => "ind",
        }
    }
}

/// 单一语言的标题 + 关键词
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedMetadata {
    pub title: String,
    pub keywords: Vec<String>,
}

/// 一个文件的完整元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub en: LocalizedMetadata,
    pub ind: LocalizedMetadata,
    pub category: String,
}

impl Metadata {
    pub fn localized(&self, language: Language) -> &LocalizedMetadata {
        match language {
            Language::English => &self.en,
            Language::Indonesian => &self.ind,
        }
    }
}

/// 一次生成调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub metadata: Metadata,
    /// 轻量预览图（data URL），视频文件会带上
    pub thumbnail: Option<String>,
}

impl Generated {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            thumbnail: None,
        }
    }
}
