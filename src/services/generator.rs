//! 生成能力的抽象
//!
//! 调度器只认识这个 trait：给一个文件、一份设置、一个 Key，返回元数据或错误。
//! 错误要能区分凭证耗尽类与永久类（见 [`GenerateError::is_credential_exhaustion`]）。

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::GenerateError;
use crate::models::{Credential, Generated, MediaFile};

/// 元数据生成器
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        file: &MediaFile,
        settings: &Settings,
        credential: &Credential,
    ) -> Result<Generated, GenerateError>;
}
