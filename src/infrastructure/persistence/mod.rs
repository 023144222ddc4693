//! Persistence Layer - 数据持久化
//!
//! 磁盘文件缓存实现

pub mod file_cache;

pub use self::file_cache::TtsLruCache;
