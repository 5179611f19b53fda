//! 素材文件

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose, Engine};
use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

/// 素材类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// 图片
    Image,
    /// 视频
    Video,
    /// 矢量图
    Vector,
}

impl MediaKind {
    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Vector => "vector",
        }
    }

    /// 按文件名后缀识别类型，返回 (类型, MIME)
    pub fn from_file_name(name: &str) -> Option<(MediaKind, &'static str)> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS.get(ext.as_str()).copied()
    }
}

/// 后缀 → (类型, MIME)
static EXTENSIONS: phf::Map<&'static str, (MediaKind, &'static str)> = phf_map! {
    "jpg" => (MediaKind::Image, "image/jpeg"),
    "jpeg" => (MediaKind::Image, "image/jpeg"),
    "png" => (MediaKind::Image, "image/png"),
    "webp" => (MediaKind::Image, "image/webp"),
    "gif" => (MediaKind::Image, "image/gif"),
    "bmp" => (MediaKind::Image, "image/bmp"),
    "tif" => (MediaKind::Image, "image/tiff"),
    "tiff" => (MediaKind::Image, "image/tiff"),
    "mp4" => (MediaKind::Video, "video/mp4"),
    "m4v" => (MediaKind::Video, "video/x-m4v"),
    "mov" => (MediaKind::Video, "video/quicktime"),
    "webm" => (MediaKind::Video, "video/webm"),
    "avi" => (MediaKind::Video, "video/x-msvideo"),
    "mkv" => (MediaKind::Video, "video/x-matroska"),
    "svg" => (MediaKind::Vector, "image/svg+xml"),
    "eps" => (MediaKind::Vector, "application/postscript"),
    "ai" => (MediaKind::Vector, "application/postscript"),
};

/// 预览图（视频抽帧 / 矢量图栅格化的结果），由调用方提供
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPreview {
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

impl MediaPreview {
    pub fn new(mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn data_url(&self) -> String {
        to_data_url(&self.mime, &self.bytes)
    }
}

/// 一个待生成元数据的素材文件
///
/// 文件内容用 `Arc` 持有，worker 取出任务时克隆代价很低。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// 文件名（导出 CSV 时使用）
    pub name: String,
    /// 来源路径（从磁盘加载时才有）
    pub path: Option<PathBuf>,
    pub kind: MediaKind,
    pub mime: String,
    pub bytes: Arc<[u8]>,
    pub preview: Option<MediaPreview>,
}

impl MediaFile {
    /// 根据文件名创建素材，后缀不受支持时返回 `UnsupportedFormat`
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Result<Self, GenerateError> {
        let name = name.into();
        let (kind, mime) = MediaKind::from_file_name(&name)
            .ok_or_else(|| GenerateError::UnsupportedFormat(name.clone()))?;

        Ok(Self {
            name,
            path: None,
            kind,
            mime: mime.to_string(),
            bytes: bytes.into(),
            preview: None,
        })
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_preview(mut self, preview: MediaPreview) -> Self {
        self.preview = Some(preview);
        self
    }

    /// 发送给视觉模型的图片（data URL）
    ///
    /// - 栅格图片：直接使用原文件（有预览图时优先用预览图）
    /// - 视频 / 矢量图：必须有预览图，否则无法识别
    pub fn vision_data_url(&self) -> Result<String, GenerateError> {
        if let Some(preview) = &self.preview {
            return Ok(preview.data_url());
        }
        match self.kind {
            MediaKind::Image => Ok(to_data_url(&self.mime, &self.bytes)),
            MediaKind::Vector if self.mime == "image/svg+xml" => {
                Ok(to_data_url(&self.mime, &self.bytes))
            }
            MediaKind::Video | MediaKind::Vector => Err(GenerateError::UnsupportedFormat(format!(
                "{} 缺少预览图，无法识别 {} 内容",
                self.name,
                self.kind.name()
            ))),
        }
    }
}

fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}
