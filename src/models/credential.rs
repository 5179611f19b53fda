//! API 凭证

use std::fmt;

/// API 凭证（Key）
///
/// 只是一个不透明的字符串。是否被占用、是否在冷却，都记录在凭证池里，不在 Key 本身。
/// `Debug` / `Display` 只显示末尾 4 位，避免 Key 出现在日志里。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// 原始 Key，仅在发起请求时使用
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// 打码后的 Key，例如 `…a1b2`
    pub fn masked(&self) -> String {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("…{}", tail)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.masked())
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}
