//! File Cache - 磁盘 TTS 缓存
//!
//! 合成结果边读边写入缓存目录，多个读者共享同一次合成

mod disk;
mod info_file;
mod lru_cache;
mod result;
mod supplier;
mod wrapper;

#[cfg(test)]
pub(crate) mod test_support;

pub use disk::{available_space, check_free_space};
pub use info_file::AudioFormatInfoFile;
pub use lru_cache::{cache_key, TtsLruCache};
pub use result::{TtsResult, INFO_EXT, SOUND_EXT};
pub use supplier::{AudioStreamSupplier, ResolvedStream};
pub use wrapper::AudioStreamCacheWrapper;
