//! 错误类型
//!
//! 生成调用的失败分为两类：
//! - **凭证耗尽类**：限流、配额、鉴权、超时、传输 / 过载。换一个 Key 冷却后重试即可恢复。
//! - **永久类**：其他所有错误（输入有误、格式不支持、响应无法解析）。直接标记失败。

use std::path::PathBuf;
use std::sync::OnceLock;

use async_openai::error::OpenAIError;
use regex::Regex;
use thiserror::Error;

/// 生成调用错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// 请求频率限制（429）
    #[error("API请求频率限制: {0}")]
    RateLimited(String),
    /// 配额用尽
    #[error("API配额已用尽: {0}")]
    QuotaExceeded(String),
    /// Key 无效或无权限
    #[error("API Key 无效或无权限: {0}")]
    Unauthorized(String),
    /// 请求超时
    #[error("请求超时: {0}")]
    Timeout(String),
    /// 服务过载（5xx）
    #[error("服务暂时不可用: {0}")]
    Overloaded(String),
    /// 网络传输失败
    #[error("网络请求失败: {0}")]
    Transport(String),
    /// 不支持的文件格式
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),
    /// 输入内容有误
    #[error("输入无效: {0}")]
    InvalidInput(String),
    /// 模型返回内容无法解析
    #[error("无法解析模型响应: {0}")]
    MalformedResponse(String),
    /// 其他错误
    #[error("{0}")]
    Other(String),
}

impl GenerateError {
    /// 是否属于凭证耗尽类（需要冷却 Key 并重新排队）
    pub fn is_credential_exhaustion(&self) -> bool {
        matches!(
            self,
            GenerateError::RateLimited(_)
                | GenerateError::QuotaExceeded(_)
                | GenerateError::Unauthorized(_)
                | GenerateError::Timeout(_)
                | GenerateError::Overloaded(_)
                | GenerateError::Transport(_)
        )
    }

    /// 根据错误文本归类
    ///
    /// 服务商返回的错误大多只有一段文字，这里按关键字判断属于哪一类。
    /// 匹配不到任何信号的一律视为永久错误。
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_rules().iter().find(|(re, _)| re.is_match(&message)) {
            Some((_, make)) => make(message),
            None => GenerateError::Other(message),
        }
    }
}

type ClassifyRule = (Regex, fn(String) -> GenerateError);

/// 按优先级排列的归类规则，大小写不敏感
fn classify_rules() -> &'static [ClassifyRule] {
    static RULES: OnceLock<Vec<ClassifyRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let table: [(&str, fn(String) -> GenerateError); 6] = [
            (
                r"\b429\b|rate.?limit|too many requests|resource.?exhausted",
                GenerateError::RateLimited,
            ),
            (r"quota|billing|insufficient.?(balance|credit)", GenerateError::QuotaExceeded),
            (
                r"\b40[13]\b|unauthori[sz]ed|forbidden|permission|api.?key|authenticat",
                GenerateError::Unauthorized,
            ),
            (r"time.?out|timed out|deadline", GenerateError::Timeout),
            (
                r"\b50[0234]\b|overload|unavailable|internal (server )?error",
                GenerateError::Overloaded,
            ),
            (
                r"network|fetch failed|connection|socket|econnreset|dns",
                GenerateError::Transport,
            ),
        ];
        table
            .into_iter()
            .filter_map(|(pattern, make)| {
                Regex::new(&format!("(?i){}", pattern))
                    .ok()
                    .map(|re| (re, make))
            })
            .collect()
    })
}

// ========== 从常见错误类型转换 ==========

impl From<OpenAIError> for GenerateError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => {
                if e.is_timeout() {
                    GenerateError::Timeout(e.to_string())
                } else {
                    GenerateError::Transport(e.to_string())
                }
            }
            OpenAIError::ApiError(api) => GenerateError::classify(api.message),
            e @ OpenAIError::JSONDeserialize(..) => GenerateError::MalformedResponse(e.to_string()),
            other => GenerateError::classify(other.to_string()),
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
