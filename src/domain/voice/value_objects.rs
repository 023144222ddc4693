//! Voice Context - Value Objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// 音色
///
/// 不变量:
/// - uid 不能为空，同一引擎内唯一
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voice {
    uid: String,
    label: String,
    locale: String,
}

impl Voice {
    pub fn new(
        uid: impl Into<String>,
        label: impl Into<String>,
        locale: impl Into<String>,
    ) -> Result<Self, &'static str> {
        let uid = uid.into();
        if uid.trim().is_empty() {
            return Err("音色 uid 不能为空");
        }
        if uid.len() > 200 {
            return Err("音色 uid 长度不能超过200字符");
        }
        Ok(Self {
            uid,
            label: label.into(),
            locale: locale.into(),
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uid, self.locale)
    }
}
