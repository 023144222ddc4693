//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Audio Context: 音频格式
//! - Voice Context: 音色

pub mod audio;
pub mod voice;

pub use audio::AudioFormat;
pub use voice::Voice;
