//! TTS Engine Port - TTS 合成引擎抽象
//!
//! 定义语音合成的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use thiserror::Error;

use super::audio_stream::AudioStream;
use crate::domain::{AudioFormat, Voice};

/// TTS 错误
///
/// 同一次合成失败需要同时交给所有等待的读者，所以实现了 Clone
#[derive(Debug, Clone, Error)]
pub enum TtsError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// TTS 合成请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// 要合成的文本内容
    pub text: String,
    /// 音色
    pub voice: Voice,
    /// 期望的音频格式
    pub format: AudioFormat,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: Voice, format: AudioFormat) -> Self {
        Self {
            text: text.into(),
            voice,
            format,
        }
    }
}

/// TTS Engine Port
///
/// 外部 TTS 服务的抽象接口
#[async_trait]
pub trait TtsEnginePort: Send + Sync {
    /// 引擎标识，参与缓存 key 计算
    fn id(&self) -> &str;

    /// 请求的缓存 key
    ///
    /// 相同的 (text, voice, format) 必须得到相同的 key
    fn cache_key(&self, request: &SynthesisRequest) -> String {
        generate_cache_key(request)
    }

    /// 执行合成，返回音频流
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Box<dyn AudioStream>, TtsError>;

    /// 检查 TTS 服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}

/// 生成缓存 key
///
/// 使用 md5(text | voice uid | format) 作为缓存 key
pub fn generate_cache_key(request: &SynthesisRequest) -> String {
    let raw = format!(
        "{}|{}|{}",
        request.text,
        request.voice.uid(),
        request.format
    );
    format!("{:x}", md5::compute(raw.as_bytes()))
}
