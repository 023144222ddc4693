//! 应用层 - 端口定义
//!
//! 包含：
//! - ports: 六边形架构端口定义（TtsEngine、AudioStream、TtsCache）

pub mod ports;

pub use ports::{
    // Audio stream
    read_chunk,
    AudioStream,
    BufferedAudioStream,
    // Audio cache
    CacheEntryInfo,
    CacheError,
    CacheStats,
    TtsCachePort,
    // TTS engine
    generate_cache_key,
    SynthesisRequest,
    TtsEnginePort,
    TtsError,
};
