//! `.info` 元数据文件
//!
//! 与 `.snd` 文件成对存放，记录原始文本（用于检测 key 碰撞）和音频格式。
//! 空字段不写入 JSON。

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::application::ports::CacheError;
use crate::domain::AudioFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormatInfoFile {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub big_endian: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl AudioFormatInfoFile {
    pub fn new(text: impl Into<String>, format: &AudioFormat) -> Self {
        Self {
            text: text.into(),
            big_endian: format.big_endian,
            bit_depth: format.bit_depth,
            bit_rate: format.bit_rate,
            frequency: format.frequency,
            channels: format.channels,
            codec: format.codec.clone(),
            container: format.container.clone(),
        }
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            container: self.container.clone(),
            codec: self.codec.clone(),
            big_endian: self.big_endian,
            bit_depth: self.bit_depth,
            bit_rate: self.bit_rate,
            frequency: self.frequency,
            channels: self.channels,
        }
    }

    pub async fn read_from(path: &Path) -> Result<Self, CacheError> {
        let content = fs::read(path).await?;
        serde_json::from_slice(&content).map_err(|e| {
            CacheError::SerializationError(format!("{}: {}", path.display(), e))
        })
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), CacheError> {
        let content = serde_json::to_vec(self)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        fs::write(path, content).await?;
        Ok(())
    }
}
