use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 目标图库平台，影响提示词和 CSV 表头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    AdobeStock,
    Shutterstock,
    Freepik,
    Generic,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::AdobeStock => "Adobe Stock",
            Platform::Shutterstock => "Shutterstock",
            Platform::Freepik => "Freepik",
            Platform::Generic => "a generic stock site",
        }
    }
}

/// 生成设置，原样转交给生成器
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 标题最大字符数
    pub title_max_chars: usize,
    /// 关键词数量
    pub keyword_count: usize,
    /// 目标平台
    pub platform: Platform,
    /// 附加到提示词末尾的自定义要求
    pub custom_prompt: Option<String>,
    /// 模型名称，为空时使用全局配置
    pub model_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title_max_chars: 150,
            keyword_count: 40,
            platform: Platform::AdobeStock,
            custom_prompt: None,
            model_name: None,
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API Key 列表（轮询使用）
    pub api_keys: Vec<String>,
    /// OpenAI 兼容接口地址
    pub api_base_url: String,
    /// 默认模型
    pub model_name: String,
    /// 素材目录
    pub input_folder: String,
    /// CSV 输出目录
    pub output_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 单次生成调用的超时时间（秒）
    pub request_timeout_secs: u64,
    /// 生成设置
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model_name: "gemini-2.5-flash".to_string(),
            input_folder: "input".to_string(),
            output_folder: "output".to_string(),
            verbose_logging: false,
            request_timeout_secs: 120,
            settings: Settings::default(),
        }
    }
}

impl Config {
    /// 从默认值 + 环境变量加载
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载（可选），再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// 从 TOML 文件加载
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: PathBuf::from(path),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: PathBuf::from(path),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.api_keys = parse_api_keys(&config.api_keys.join("\n"));
        Ok(config)
    }

    /// 单次生成调用的超时时间，至少 1 秒
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    fn with_env_overrides(self) -> Self {
        let current = self;
        Self {
            api_keys: std::env::var("STOCK_API_KEYS").ok().map(|v| parse_api_keys(&v)).unwrap_or(current.api_keys),
            api_base_url: std::env::var("STOCK_API_BASE_URL").unwrap_or(current.api_base_url),
            model_name: std::env::var("STOCK_MODEL_NAME").unwrap_or(current.model_name),
            input_folder: std::env::var("STOCK_INPUT_FOLDER").unwrap_or(current.input_folder),
            output_folder: std::env::var("STOCK_OUTPUT_FOLDER").unwrap_or(current.output_folder),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(current.verbose_logging),
            request_timeout_secs: std::env::var("STOCK_REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(current.request_timeout_secs),
            settings: Settings {
                title_max_chars: std::env::var("STOCK_TITLE_MAX_CHARS").ok().and_then(|v| v.parse().ok()).unwrap_or(current.settings.title_max_chars),
                keyword_count: std::env::var("STOCK_KEYWORD_COUNT").ok().and_then(|v| v.parse().ok()).unwrap_or(current.settings.keyword_count),
                ..current.settings
            },
        }
    }
}

/// 解析用户输入的 Key 列表
///
/// 支持逗号 / 换行分隔，去掉空白和空项，按首次出现的顺序去重
pub fn parse_api_keys(raw: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in raw.split([',', '\n', '\r']).map(str::trim) {
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}
