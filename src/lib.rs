//! ttscache - TTS 合成结果磁盘 LRU 缓存
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Audio: 音频格式
//! - Voice: 音色
//!
//! 应用层 (application/):
//! - Ports: 端口定义（AudioStream, TtsEngine, TtsCache）
//!
//! 基础设施层 (infrastructure/):
//! - Persistence: 磁盘文件 LRU 缓存
//! - Adapters: HTTP TTS Client, Fake TTS Client

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
