//! Audio Context - Value Objects

use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONTAINER_NONE: &str = "NONE";
pub const CONTAINER_WAVE: &str = "WAVE";
pub const CONTAINER_OGG: &str = "OGG";

pub const CODEC_PCM_SIGNED: &str = "PCM_SIGNED";
pub const CODEC_MP3: &str = "MP3";
pub const CODEC_VORBIS: &str = "VORBIS";
pub const CODEC_OPUS: &str = "OPUS";

/// 音频格式
///
/// 所有字段都可以为空：请求时只指定容器和编码，
/// 引擎真正返回的流才带有采样率、声道数等信息。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub container: Option<String>,
    pub codec: Option<String>,
    pub big_endian: Option<bool>,
    pub bit_depth: Option<u32>,
    pub bit_rate: Option<u32>,
    pub frequency: Option<u64>,
    pub channels: Option<u32>,
}

impl AudioFormat {
    pub fn new(container: &str, codec: &str) -> Self {
        Self {
            container: Some(container.to_string()),
            codec: Some(codec.to_string()),
            ..Default::default()
        }
    }

    pub fn wav() -> Self {
        Self::new(CONTAINER_WAVE, CODEC_PCM_SIGNED)
    }

    pub fn mp3() -> Self {
        Self::new(CONTAINER_NONE, CODEC_MP3)
    }

    pub fn ogg() -> Self {
        Self::new(CONTAINER_OGG, CODEC_VORBIS)
    }

    pub fn opus() -> Self {
        Self::new(CONTAINER_OGG, CODEC_OPUS)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "wav" => Some(Self::wav()),
            "mp3" => Some(Self::mp3()),
            "ogg" => Some(Self::ogg()),
            "opus" => Some(Self::opus()),
            _ => None,
        }
    }

    /// 文件扩展名，无法识别时返回 "bin"
    pub fn extension(&self) -> &'static str {
        match self.codec.as_deref() {
            Some(CODEC_PCM_SIGNED) => "wav",
            Some(CODEC_MP3) => "mp3",
            Some(CODEC_VORBIS) => "ogg",
            Some(CODEC_OPUS) => "opus",
            _ => "bin",
        }
    }

    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_bit_depth(mut self, bit_depth: u32) -> Self {
        self.bit_depth = Some(bit_depth);
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn with_big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = Some(big_endian);
        self
    }
}

fn field<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}bit/{}bps/{}Hz/{}ch/{}",
            field(&self.container),
            field(&self.codec),
            field(&self.bit_depth),
            field(&self.bit_rate),
            field(&self.frequency),
            field(&self.channels),
            match self.big_endian {
                Some(true) => "be",
                Some(false) => "le",
                None => "-",
            }
        )
    }
}
