//! Audio Cache Port - TTS 结果缓存
//!
//! 定义 TTS 缓存的抽象接口，具体实现是磁盘上的 LRU 缓存

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use thiserror::Error;

use super::audio_stream::AudioStream;
use super::tts_engine::{SynthesisRequest, TtsEnginePort, TtsError};
use crate::domain::AudioFormat;

/// Audio Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] TtsError),

    #[error("Sound cache file is empty: {0}")]
    EmptyCacheFile(String),

    #[error("Cache file is not open: {0}")]
    NotOpen(String),

    #[error("Not enough free disk space: {available} bytes available, {required} bytes required")]
    InsufficientSpace { available: u64, required: u64 },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        CacheError::IoError(err.to_string())
    }
}

impl From<CacheError> for io::Error {
    fn from(err: CacheError) -> Self {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub enabled: bool,
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// 缓存条目概要
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub key: String,
    pub text: String,
    pub size_bytes: u64,
    pub completed: bool,
    pub format: Option<AudioFormat>,
    pub readers: usize,
}

/// Audio Cache Port
///
/// - 缓存 key: 引擎标识 + 引擎给出的请求 key
/// - 命中时直接返回读取缓存文件的流
/// - 未命中时延迟调用引擎，边合成边写入缓存
#[async_trait]
pub trait TtsCachePort: Send + Sync {
    /// 获取缓存的音频流，不存在时合成
    ///
    /// 缓存不可用时直接调用引擎，不经过缓存
    async fn get_or_synthesize(
        &self,
        engine: Arc<dyn TtsEnginePort>,
        request: SynthesisRequest,
    ) -> Result<Box<dyn AudioStream>, CacheError>;

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;

    /// 列出缓存条目，最近使用的在前
    async fn entries(&self) -> Vec<CacheEntryInfo>;
}
