//! HTTP TTS Client - 调用外部 TTS HTTP 服务
//!
//! 实现 TtsEnginePort trait，通过 HTTP 调用外部 TTS 服务
//!
//! 外部 TTS API:
//! POST http://localhost:8000/api/tts/infer
//! Request: {"text": "...", "voice_ref": "...", "format": "wav"}  (JSON)
//! Response: 音频二进制，格式由 Content-Type 和 X-TTS-* headers 描述

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{
    AudioStream, BufferedAudioStream, SynthesisRequest, TtsEnginePort, TtsError,
};
use crate::config::TtsConfig;
use crate::domain::AudioFormat;

/// TTS 推理请求体 (JSON)
#[derive(Debug, Serialize)]
struct TtsHttpRequest<'a> {
    /// 要合成的文本
    text: &'a str,
    /// 音色标识（TTS 服务自行解析）
    voice_ref: &'a str,
    /// 期望的音频格式扩展名
    format: &'a str,
}

/// HTTP TTS 客户端配置
#[derive(Debug, Clone)]
pub struct HttpTtsClientConfig {
    /// TTS 服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 重试次数
    pub max_retries: u32,
}

impl Default for HttpTtsClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            max_retries: 0,
        }
    }
}

impl HttpTtsClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

impl From<&TtsConfig> for HttpTtsClientConfig {
    fn from(config: &TtsConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

/// HTTP TTS 客户端
///
/// 通过 HTTP 调用外部 TTS 服务
pub struct HttpTtsClient {
    client: Client,
    config: HttpTtsClientConfig,
}

impl HttpTtsClient {
    /// 创建新的 HTTP TTS 客户端
    pub fn new(config: HttpTtsClientConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TtsError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// 使用默认配置创建客户端
    pub fn with_default_config() -> Result<Self, TtsError> {
        Self::new(HttpTtsClientConfig::default())
    }

    /// 获取推理 URL
    fn infer_url(&self) -> String {
        format!("{}/api/tts/infer", self.config.base_url)
    }

    /// 获取健康检查 URL
    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }

    async fn infer_once(&self, request: &SynthesisRequest) -> Result<BufferedAudioStream, TtsError> {
        let http_request = TtsHttpRequest {
            text: &request.text,
            voice_ref: request.voice.uid(),
            format: request.format.extension(),
        };

        tracing::debug!(
            url = %self.infer_url(),
            text_len = http_request.text.len(),
            voice_ref = %http_request.voice_ref,
            format = http_request.format,
            "Sending TTS infer request"
        );

        let response = self
            .client
            .post(self.infer_url())
            .json(&http_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TtsError::Timeout
                } else if e.is_connect() {
                    TtsError::NetworkError(format!("Cannot connect to TTS service: {}", e))
                } else {
                    TtsError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TtsError::VoiceNotFound(request.voice.uid().to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TtsError::ServiceError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let format = format_from_headers(response.headers(), &request.format)?;

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| TtsError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();

        tracing::info!(
            format = %format,
            audio_size = audio_data.len(),
            "TTS inference completed"
        );

        Ok(BufferedAudioStream::new(audio_data, format))
    }
}

/// 从响应 headers 推断音频格式
///
/// 没有 Content-Type 时沿用请求的格式
fn format_from_headers(headers: &HeaderMap, requested: &AudioFormat) -> Result<AudioFormat, TtsError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase());

    let mut format = match content_type.as_deref() {
        None => requested.clone(),
        Some(ct) if ct.contains("opus") => AudioFormat::opus(),
        Some(ct) if ct.starts_with("audio/ogg") => AudioFormat::ogg(),
        Some(ct) if ct.starts_with("audio/mpeg") || ct.starts_with("audio/mp3") => {
            AudioFormat::mp3()
        }
        Some(ct) if ["audio/wav", "audio/x-wav", "audio/wave"]
            .iter()
            .any(|prefix| ct.starts_with(prefix)) =>
        {
            AudioFormat::wav()
        }
        Some(ct) if ct.starts_with("application/octet-stream") => requested.clone(),
        Some(ct) => return Err(TtsError::UnsupportedFormat(ct.to_string())),
    };

    let header_number = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };
    if let Some(sample_rate) = header_number("X-TTS-Sample-Rate") {
        format = format.with_frequency(sample_rate);
    }
    if let Some(channels) = header_number("X-TTS-Channels") {
        format = format.with_channels(channels as u32);
    }
    Ok(format)
}

#[async_trait]
impl TtsEnginePort for HttpTtsClient {
    fn id(&self) -> &str {
        "HttpTtsClient"
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Box<dyn AudioStream>, TtsError> {
        let mut attempt = 0;
        loop {
            match self.infer_once(request).await {
                Ok(stream) => return Ok(Box::new(stream)),
                Err(e @ (TtsError::NetworkError(_) | TtsError::Timeout))
                    if attempt < self.config.max_retries =>
                {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "TTS request failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
