//! Fake TTS Client - 用于测试的 TTS 客户端
//!
//! 始终返回固定的音频文件，不实际调用 TTS 服务

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::ports::{
    AudioStream, BufferedAudioStream, SynthesisRequest, TtsEnginePort, TtsError,
};
use crate::domain::AudioFormat;

/// Fake TTS Client 配置
#[derive(Debug, Clone)]
pub struct FakeTtsClientConfig {
    /// 固定返回的音频文件路径
    pub audio_file_path: PathBuf,
    /// 音频格式，为空时按文件扩展名推断
    pub format: Option<AudioFormat>,
    /// 模拟推理延迟（毫秒）
    pub delay_ms: u64,
}

impl FakeTtsClientConfig {
    pub fn new(audio_file_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_file_path: audio_file_path.into(),
            format: None,
            delay_ms: 200,
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Fake TTS Client
///
/// 用于测试，始终返回配置的固定音频文件
pub struct FakeTtsClient {
    config: FakeTtsClientConfig,
    /// 缓存的音频数据
    audio_data: Vec<u8>,
    format: AudioFormat,
}

impl FakeTtsClient {
    /// 创建新的 FakeTtsClient
    pub fn new(config: FakeTtsClientConfig) -> Result<Self, std::io::Error> {
        let audio_data = std::fs::read(&config.audio_file_path)?;
        let format = config
            .format
            .clone()
            .or_else(|| {
                config
                    .audio_file_path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(AudioFormat::from_extension)
            })
            .unwrap_or_else(AudioFormat::wav);

        tracing::info!(
            path = %config.audio_file_path.display(),
            size = audio_data.len(),
            format = %format,
            "FakeTtsClient initialized"
        );
        Ok(Self {
            config,
            audio_data,
            format,
        })
    }
}

#[async_trait]
impl TtsEnginePort for FakeTtsClient {
    fn id(&self) -> &str {
        "FakeTtsClient"
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Box<dyn AudioStream>, TtsError> {
        tracing::debug!(
            text_len = request.text.len(),
            voice = %request.voice,
            "FakeTtsClient: returning fixed audio"
        );

        // 模拟推理延迟
        if self.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        }

        Ok(Box::new(BufferedAudioStream::new(
            self.audio_data.clone(),
            self.format.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Voice;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_returns_file_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.mp3");
        std::fs::write(&path, b"fake mp3 bytes").unwrap();

        let client = FakeTtsClient::new(FakeTtsClientConfig::new(&path).with_delay_ms(0)).unwrap();
        let request = SynthesisRequest::new(
            "hello",
            Voice::new("fake:voice", "Fake", "en-US").unwrap(),
            AudioFormat::wav(),
        );

        let mut stream = client.synthesize(&request).await.unwrap();
        assert_eq!(stream.format().await, AudioFormat::mp3());
        assert_eq!(stream.length().await, Some(14));

        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"fake mp3 bytes");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(FakeTtsClient::new(FakeTtsClientConfig::new(dir.path().join("none.wav"))).is_err());
    }
}
