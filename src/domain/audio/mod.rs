//! Audio Context - 音频格式
//!
//! 职责:
//! - 描述 TTS 引擎产出的音频格式
//! - 格式的展示形式参与缓存 key 计算

mod format;

pub use format::{
    AudioFormat, CODEC_MP3, CODEC_OPUS, CODEC_PCM_SIGNED, CODEC_VORBIS, CONTAINER_NONE,
    CONTAINER_OGG, CONTAINER_WAVE,
};
