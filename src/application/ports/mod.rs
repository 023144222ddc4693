//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_cache;
mod audio_stream;
mod tts_engine;

pub use audio_cache::{CacheEntryInfo, CacheError, CacheStats, TtsCachePort};
pub use audio_stream::{read_chunk, AudioStream, BufferedAudioStream};
pub use tts_engine::{generate_cache_key, SynthesisRequest, TtsEnginePort, TtsError};
