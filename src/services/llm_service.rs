//! LLM 服务 - 业务能力层
//!
//! 只负责"给一个文件生成元数据"能力，不关心调度
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini、Azure、OpenRouter 等）
//!
//! 每次调用都用调度器借给它的 Key 新建一个客户端，所以同一个服务实例可以被多个 worker 共用。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{Config, Settings};
use crate::error::GenerateError;
use crate::models::{Credential, Generated, MediaFile, MediaKind, StockCategory};
use crate::services::generator::Generator;
use crate::services::metadata_parser::parse_metadata_response;

/// LLM 服务
///
/// 职责：
/// - 构建提示词（平台、标题长度、关键词数量、自定义要求）
/// - 调用视觉模型
/// - 解析返回的双语元数据
pub struct LlmService {
    api_base_url: String,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        Self {
            api_base_url: config.api_base_url.clone(),
            model_name: config.model_name.clone(),
        }
    }

    /// 创建自定义端点和模型的 LLM 服务
    pub fn with_endpoint(api_base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            model_name: model_name.into(),
        }
    }

    fn client(&self, credential: &Credential) -> Client<OpenAIConfig> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(credential.expose())
            .with_api_base(&self.api_base_url);
        Client::with_config(openai_config)
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `credential`: 本次调用使用的 Key
    /// - `model`: 模型名称
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `image_url`: 图片 URL / data URL（可选），会追加到用户消息中
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        credential: &Credential,
        model: &str,
        user_message: &str,
        system_message: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<String, GenerateError> {
        debug!("调用 LLM API，模型: {}，Key: {}", model, credential);
        debug!("用户消息长度: {} 字符", user_message.len());

        // 构建消息列表
        let mut messages = Vec::new();

        // 添加系统消息（如果提供）
        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        // 构建用户消息内容（支持图片）
        let user_msg = match image_url {
            Some(url) => {
                let content_parts = vec![
                    ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText {
                            text: user_message.to_string(),
                        },
                    ),
                    ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.to_string(),
                                detail: Some(ImageDetail::Auto),
                            },
                        },
                    ),
                ];

                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(
                        content_parts,
                    ))
                    .build()?
            }
            None => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()?,
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.4)
            .max_tokens(2048u32)
            .build()?;

        // 调用 API
        let response = self
            .client(credential)
            .chat()
            .create(request)
            .await
            .map_err(|e| {
                warn!("LLM API 调用失败 (Key {}): {}", credential, e);
                GenerateError::from(e)
            })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| GenerateError::MalformedResponse("LLM 返回内容为空".to_string()))?;

        Ok(content.trim().to_string())
    }

    /// 构建用于生成元数据的消息
    ///
    /// 返回 (user_message, system_message)
    fn build_metadata_messages(&self, file: &MediaFile, settings: &Settings) -> (String, String) {
        let system_message = "You are a senior stock contributor who writes metadata that gets \
                              accepted on microstock sites. You describe only what is visible, \
                              never invent brand names or people's identities, and always answer \
                              with a single JSON object."
            .to_string();

        let kind_hint = match file.kind {
            MediaKind::Image => "a photo or raster illustration",
            MediaKind::Video => "a frame taken from a stock video clip; describe the clip",
            MediaKind::Vector => "a vector illustration",
        };

        let categories = StockCategory::ALL
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", ");

        let custom = settings
            .custom_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("\nAdditional requirements: {}\n", p))
            .unwrap_or_default();

        let user_message = format!(
            r#"Create stock metadata for {platform}.
The attached image is {kind_hint}. Original file name: "{name}".

Rules:
- Title: one descriptive sentence, at most {title_max} characters, no trailing period.
- Keywords: exactly {keyword_count} single words or short phrases, most important first, no duplicates.
- Provide the same metadata in English ("en") and Indonesian ("ind").
- Category: pick one of: {categories}.
{custom}
Reply with JSON only, in this shape:
{{"en": {{"title": "...", "keywords": ["..."]}}, "ind": {{"title": "...", "keywords": ["..."]}}, "category": "..."}}"#,
            platform = settings.platform.name(),
            kind_hint = kind_hint,
            name = file.name,
            title_max = settings.title_max_chars,
            keyword_count = settings.keyword_count,
            categories = categories,
            custom = custom,
        );

        (user_message, system_message)
    }
}

#[async_trait]
impl Generator for LlmService {
    async fn generate(
        &self,
        file: &MediaFile,
        settings: &Settings,
        credential: &Credential,
    ) -> Result<Generated, GenerateError> {
        let image_url = file.vision_data_url()?;
        let model = settings
            .model_name
            .as_deref()
            .unwrap_or(self.model_name.as_str());

        let (user_message, system_message) = self.build_metadata_messages(file, settings);
        let response = self
            .send_to_llm(
                credential,
                model,
                &user_message,
                Some(&system_message),
                Some(&image_url),
            )
            .await?;

        let metadata = parse_metadata_response(&response, settings)?;

        // 视频在列表里只能显示预览帧
        let thumbnail = match (file.kind, &file.preview) {
            (MediaKind::Video, Some(preview)) => Some(preview.data_url()),
            _ => None,
        };

        Ok(Generated {
            metadata,
            thumbnail,
        })
    }
}
