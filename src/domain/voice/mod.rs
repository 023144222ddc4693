//! Voice Context - 音色
//!
//! 职责:
//! - 标识 TTS 引擎使用的音色
//! - 音色 uid 参与缓存 key 计算

mod value_objects;

pub use value_objects::Voice;
