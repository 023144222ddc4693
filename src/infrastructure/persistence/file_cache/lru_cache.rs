//! 基于磁盘文件的 TTS LRU 缓存
//!
//! - 每个条目是缓存目录下的 `<key>.snd` + `<key>.info` 文件对
//! - 条目按访问顺序保存在 [`LruCache`] 中，超过上限时从最久未使用的开始淘汰
//! - 有读者的条目不会被淘汰
//! - 启动时清理残缺文件并按修改时间加载已有条目

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;

use super::disk;
use super::result::{TtsResult, INFO_EXT, SOUND_EXT};
use super::supplier::AudioStreamSupplier;
use crate::application::ports::{
    AudioStream, CacheEntryInfo, CacheError, CacheStats, SynthesisRequest, TtsCachePort,
    TtsEnginePort,
};
use crate::config::CacheConfig;

struct CacheSettings {
    directory: PathBuf,
    max_size_bytes: u64,
    /// 目录是否已经准备好（创建、清理、加载）
    prepared: bool,
}

/// TTS LRU 缓存
pub struct TtsLruCache {
    settings: Mutex<CacheSettings>,
    entries: Mutex<LruCache<String, Arc<TtsResult>>>,
    enabled: AtomicBool,
    /// 激活失败后整个进程生命周期内不再启用
    failed: AtomicBool,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl TtsLruCache {
    /// 创建缓存并按配置激活
    ///
    /// 激活失败时缓存处于禁用状态，所有请求直接交给引擎
    pub async fn activate(config: &CacheConfig) -> Self {
        let cache = Self {
            settings: Mutex::new(CacheSettings {
                directory: config.directory.clone(),
                max_size_bytes: config.max_size_bytes(),
                prepared: false,
            }),
            entries: Mutex::new(LruCache::unbounded()),
            enabled: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        };
        cache.reconfigure(config).await;
        cache
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn directory(&self) -> PathBuf {
        self.settings.lock().directory.clone()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.settings.lock().max_size_bytes
    }

    /// 运行时更新配置
    pub async fn reconfigure(&self, config: &CacheConfig) {
        if self.failed.load(Ordering::SeqCst) {
            tracing::warn!("TTS cache activation failed earlier, the cache stays disabled");
            return;
        }
        if !config.enabled {
            self.enabled.store(false, Ordering::SeqCst);
            tracing::info!("TTS cache disabled");
            return;
        }

        let max_size_bytes = config.max_size_bytes();
        let needs_prepare = {
            let settings = self.settings.lock();
            !settings.prepared || settings.directory != config.directory
        };

        let prepared = if needs_prepare {
            Self::prepare(&config.directory, max_size_bytes)
                .await
                .map(|entries| *self.entries.lock() = entries)
        } else {
            disk::check_free_space(&config.directory, max_size_bytes)
        };
        if let Err(e) = prepared {
            tracing::warn!(
                directory = %config.directory.display(),
                error = %e,
                "Cannot activate the TTS cache, it will be disabled"
            );
            self.failed.store(true, Ordering::SeqCst);
            self.enabled.store(false, Ordering::SeqCst);
            return;
        }

        {
            let mut settings = self.settings.lock();
            settings.directory = config.directory.clone();
            settings.max_size_bytes = max_size_bytes;
            settings.prepared = true;
        }
        self.enabled.store(true, Ordering::SeqCst);
        self.make_space();

        tracing::info!(
            directory = %config.directory.display(),
            max_size_bytes,
            entries = self.entries.lock().len(),
            "TTS cache enabled"
        );
    }

    /// 准备缓存目录并加载已有条目
    async fn prepare(
        dir: &Path,
        max_size_bytes: u64,
    ) -> Result<LruCache<String, Arc<TtsResult>>, CacheError> {
        fs::create_dir_all(dir).await?;
        disk::check_free_space(dir, max_size_bytes)?;
        clean_orphan_files(dir).await?;
        load_entries(dir).await
    }

    /// 淘汰最久未使用的条目直到总大小不超过上限
    ///
    /// 至少保留一个条目，有读者的条目跳过
    fn make_space(&self) {
        let max_size_bytes = self.max_size_bytes();
        let mut entries = self.entries.lock();

        let mut total: u64 = entries.iter().map(|(_, entry)| entry.current_size()).sum();
        if total <= max_size_bytes {
            return;
        }

        let candidates: Vec<String> = entries.iter().rev().map(|(key, _)| key.clone()).collect();
        for key in candidates {
            if total <= max_size_bytes || entries.len() <= 1 {
                break;
            }
            let Some(entry) = entries.peek(&key).cloned() else {
                continue;
            };
            // 删除和移出列表在同一个 entries 锁内完成
            if !entry.delete_files() {
                continue;
            }
            entries.pop(&key);
            total = total.saturating_sub(entry.current_size());
            tracing::debug!(
                key = %key,
                size_bytes = entry.current_size(),
                total_size_bytes = total,
                "Evicted TTS cache entry"
            );
        }
    }

    /// 获取（或创建）条目并打开一个客户端
    ///
    /// key 碰撞且旧条目正在被读取时返回 None，调用方绕过缓存
    fn open_entry(
        &self,
        key: String,
        supplier: Arc<AudioStreamSupplier>,
    ) -> Option<Result<Box<dyn AudioStream>, CacheError>> {
        let dir = self.directory();
        let mut entries = self.entries.lock();

        let entry = match entries.peek(&key).cloned() {
            Some(entry) if entry.text() == supplier.text() => {
                entries.promote(&key);
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "TTS cache hit");
                entry
            }
            Some(entry) if entry.is_in_use() => {
                tracing::warn!(
                    key = %key,
                    "TTS cache key collision with an entry in use, bypassing the cache"
                );
                return None;
            }
            existing => {
                if let Some(entry) = existing {
                    tracing::warn!(
                        key = %key,
                        "TTS cache key collision, replacing the previous entry"
                    );
                    entry.delete_files();
                }
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "TTS cache miss");
                let entry = Arc::new(TtsResult::new(&dir, key.clone(), supplier.clone()));
                entries.put(key, entry.clone());
                entry
            }
        };

        Some(
            entry
                .open_client(supplier)
                .map(|client| Box::new(client) as Box<dyn AudioStream>),
        )
    }

    #[cfg(test)]
    fn insert(&self, entry: Arc<TtsResult>) {
        self.entries.lock().put(entry.key().to_string(), entry);
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }
}

/// 缓存 key：`<引擎 id>_<引擎给出的 key>`
///
/// 包含文件名不允许的字符时改用 md5
pub fn cache_key(engine: &dyn TtsEnginePort, request: &SynthesisRequest) -> String {
    let key = format!("{}_{}", engine.id(), engine.cache_key(request));
    if key.chars().all(is_key_char) {
        return key;
    }
    let engine_id: String = engine
        .id()
        .chars()
        .map(|c| if is_key_char(c) { c } else { '_' })
        .collect();
    format!("{}_{:x}", engine_id, md5::compute(key.as_bytes()))
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn sound_or_info(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(SOUND_EXT) => Some(SOUND_EXT),
        Some(INFO_EXT) => Some(INFO_EXT),
        _ => None,
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(file = %path.display(), error = %e, "Cannot delete cache file");
        }
    }
}

/// 删除空文件和缺少配对文件的 `.snd` / `.info`
async fn clean_orphan_files(dir: &Path) -> Result<(), CacheError> {
    let mut files = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(item) = read_dir.next_entry().await? {
        let path = item.path();
        let metadata = item.metadata().await?;
        if metadata.is_file() && sound_or_info(&path).is_some() {
            files.push((path, metadata.len()));
        }
    }

    let mut remaining = Vec::with_capacity(files.len());
    for (path, len) in files {
        if len == 0 {
            tracing::debug!(file = %path.display(), "Deleting empty cache file");
            remove_quietly(&path).await;
        } else {
            remaining.push(path);
        }
    }

    for path in remaining {
        let partner = match sound_or_info(&path) {
            Some(SOUND_EXT) => path.with_extension(INFO_EXT),
            _ => path.with_extension(SOUND_EXT),
        };
        if !fs::try_exists(&partner).await.unwrap_or(false) {
            tracing::debug!(file = %path.display(), "Deleting orphan cache file");
            remove_quietly(&path).await;
        }
    }
    Ok(())
}

/// 加载所有完整的文件对，最旧的先放入（最终排在 LRU 末尾）
async fn load_entries(dir: &Path) -> Result<LruCache<String, Arc<TtsResult>>, CacheError> {
    let mut sounds: Vec<(SystemTime, String)> = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(item) = read_dir.next_entry().await? {
        let path = item.path();
        if sound_or_info(&path) != Some(SOUND_EXT) {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let modified = item
            .metadata()
            .await?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        sounds.push((modified, key.to_string()));
    }
    sounds.sort();

    let mut entries = LruCache::unbounded();
    for (_, key) in sounds {
        match TtsResult::load(dir, key.clone()).await {
            Ok(entry) => {
                tracing::debug!(key = %key, size_bytes = entry.current_size(), "Loaded TTS cache entry");
                entries.put(key, Arc::new(entry));
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cannot load TTS cache entry, deleting it");
                remove_quietly(&dir.join(format!("{}.{}", key, SOUND_EXT))).await;
                remove_quietly(&dir.join(format!("{}.{}", key, INFO_EXT))).await;
            }
        }
    }
    Ok(entries)
}

#[async_trait]
impl TtsCachePort for TtsLruCache {
    async fn get_or_synthesize(
        &self,
        engine: Arc<dyn TtsEnginePort>,
        request: SynthesisRequest,
    ) -> Result<Box<dyn AudioStream>, CacheError> {
        if !self.is_enabled() {
            return Ok(engine.synthesize(&request).await?);
        }

        let key = cache_key(engine.as_ref(), &request);
        let supplier = Arc::new(AudioStreamSupplier::new(engine.clone(), request.clone()));

        let opened = self.open_entry(key.clone(), supplier);
        self.make_space();

        match opened {
            Some(Ok(stream)) => Ok(stream),
            Some(Err(e)) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Cannot open TTS cache entry, synthesizing without the cache"
                );
                Ok(engine.synthesize(&request).await?)
            }
            None => Ok(engine.synthesize(&request).await?),
        }
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            enabled: self.is_enabled(),
            total_entries: entries.len(),
            total_size_bytes: entries.iter().map(|(_, entry)| entry.current_size()).sum(),
            max_size_bytes: self.max_size_bytes(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    async fn entries(&self) -> Vec<CacheEntryInfo> {
        self.entries
            .lock()
            .iter()
            .map(|(_, entry)| entry.info())
            .collect()
    }
}
