//! 解析模型返回的元数据
//!
//! 模型被要求只返回 JSON，但实际经常包在 ```json 代码块里、前后带说明文字，
//! 关键词有时是数组有时是逗号分隔的字符串，这里统一处理。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::Settings;
use crate::error::GenerateError;
use crate::models::{LocalizedMetadata, Metadata, StockCategory};
use crate::utils::logging::truncate_text;

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(alias = "english")]
    en: RawLocalized,
    #[serde(alias = "id", alias = "indonesian")]
    ind: RawLocalized,
    #[serde(default)]
    category: Option<RawCategory>,
}

#[derive(Debug, Deserialize)]
struct RawLocalized {
    #[serde(default)]
    title: String,
    #[serde(default)]
    keywords: Option<RawKeywords>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawKeywords {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCategory {
    Code(u8),
    Name(String),
}

/// 解析模型响应为元数据
pub fn parse_metadata_response(response: &str, settings: &Settings) -> Result<Metadata, GenerateError> {
    let json = extract_json(response).ok_or_else(|| {
        GenerateError::MalformedResponse(format!(
            "响应中没有 JSON 对象: {}",
            truncate_text(response, 80)
        ))
    })?;

    let raw: RawMetadata = serde_json::from_str(json)
        .map_err(|e| GenerateError::MalformedResponse(format!("JSON 结构不符: {}", e)))?;

    let en = normalize_localized(raw.en, settings)
        .ok_or_else(|| GenerateError::MalformedResponse("英文标题为空".to_string()))?;
    let ind = normalize_localized(raw.ind, settings)
        .ok_or_else(|| GenerateError::MalformedResponse("印尼语标题为空".to_string()))?;

    let category = raw.category.map(normalize_category).unwrap_or_default();
    debug!(
        "解析元数据: 标题 '{}'，{} 个关键词，分类 '{}'",
        truncate_text(&en.title, 40),
        en.keywords.len(),
        category
    );

    Ok(Metadata { en, ind, category })
}

/// 取出响应里的 JSON 对象（优先代码块，其次第一个 `{` 到最后一个 `}`）
fn extract_json(response: &str) -> Option<&str> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());

    let body = fence
        .as_ref()
        .and_then(|re| re.captures(response))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(response);

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

fn normalize_localized(raw: RawLocalized, settings: &Settings) -> Option<LocalizedMetadata> {
    let title = normalize_title(&raw.title, settings.title_max_chars);
    if title.is_empty() {
        return None;
    }

    let keywords = match raw.keywords {
        Some(RawKeywords::List(list)) => list,
        Some(RawKeywords::Text(text)) => text
            .split([',', ';', '\n'])
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    Some(LocalizedMetadata {
        title,
        keywords: normalize_keywords(keywords, settings.keyword_count),
    })
}

/// 去掉首尾空白和引号，合并空白，按字符数截断
fn normalize_title(title: &str, max_chars: usize) -> String {
    let title = title
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if title.chars().count() <= max_chars {
        return title;
    }
    title.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// 小写、去空、去重（保持顺序），截取前 `limit` 个
fn normalize_keywords(keywords: Vec<String>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().trim_matches('"').trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .take(limit)
        .collect()
}

/// 分类能对上分类表时使用标准名称，否则保留原文
fn normalize_category(raw: RawCategory) -> String {
    match raw {
        RawCategory::Code(code) => StockCategory::from_code(code)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| code.to_string()),
        RawCategory::Name(name) => StockCategory::from_name(&name)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| name.trim().to_string()),
    }
}
