//! TTS Result - 单个缓存条目
//!
//! 一个缓存条目对应磁盘上的一对文件：
//! - `<key>.snd`: 音频字节，完成之前只追加
//! - `<key>.info`: 文本和音频格式，上游流解析之后才写入
//!
//! 多个 [`AudioStreamCacheWrapper`] 可以同时读取同一个条目。文件中的数据不够时，
//! 从上游 TTS 流按块拉取并写入文件，其他读者和以后的读者直接复用这些字节。
//!
//! 锁的层次：
//! - `files`: 文件句柄的打开/关闭和读者计数
//! - `upstream`: 提供者、已解析的流和格式
//! - 已解析流自身的异步锁：同一时刻只有一个读者从上游拉取数据

use parking_lot::Mutex;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use super::info_file::AudioFormatInfoFile;
use super::supplier::{AudioStreamSupplier, ResolvedStream};
use super::wrapper::AudioStreamCacheWrapper;
use crate::application::ports::{read_chunk, CacheEntryInfo, CacheError};
use crate::domain::AudioFormat;

pub const SOUND_EXT: &str = "snd";
pub const INFO_EXT: &str = "info";

/// 每次从上游拉取的块大小。小块延迟低，但调用次数多
const CHUNK_SIZE: usize = 10_000;

type SharedFile = Arc<AsyncMutex<File>>;

struct FileSlot {
    clients: usize,
    file: Option<SharedFile>,
}

struct UpstreamState {
    supplier: Option<Arc<AudioStreamSupplier>>,
    stream: Option<Arc<ResolvedStream>>,
    format: Option<AudioFormat>,
}

/// 缓存的 TTS 结果
pub struct TtsResult {
    key: String,
    text: String,
    sound_file: PathBuf,
    info_file: PathBuf,
    current_size: AtomicU64,
    completed: AtomicBool,
    upstream: Mutex<UpstreamState>,
    files: Mutex<FileSlot>,
}

impl TtsResult {
    /// 尚未合成的条目，数据由 supplier 提供
    pub fn new(cache_dir: &Path, key: impl Into<String>, supplier: Arc<AudioStreamSupplier>) -> Self {
        let key = key.into();
        Self {
            sound_file: cache_dir.join(format!("{}.{}", key, SOUND_EXT)),
            info_file: cache_dir.join(format!("{}.{}", key, INFO_EXT)),
            text: supplier.text().to_string(),
            key,
            current_size: AtomicU64::new(0),
            completed: AtomicBool::new(false),
            upstream: Mutex::new(UpstreamState {
                supplier: Some(supplier),
                stream: None,
                format: None,
            }),
            files: Mutex::new(FileSlot {
                clients: 0,
                file: None,
            }),
        }
    }

    /// 从磁盘上完整的文件对加载
    ///
    /// `.snd` 为空时返回 [`CacheError::EmptyCacheFile`]，调用方应丢弃该条目
    pub async fn load(cache_dir: &Path, key: impl Into<String>) -> Result<Self, CacheError> {
        let key = key.into();
        let sound_file = cache_dir.join(format!("{}.{}", key, SOUND_EXT));
        let info_file = cache_dir.join(format!("{}.{}", key, INFO_EXT));

        let size = fs::metadata(&sound_file).await?.len();
        if size == 0 {
            return Err(CacheError::EmptyCacheFile(sound_file.display().to_string()));
        }
        let info = AudioFormatInfoFile::read_from(&info_file).await?;

        Ok(Self {
            key,
            text: info.text.clone(),
            sound_file,
            info_file,
            current_size: AtomicU64::new(size),
            completed: AtomicBool::new(true),
            upstream: Mutex::new(UpstreamState {
                supplier: None,
                stream: None,
                format: Some(info.audio_format()),
            }),
            files: Mutex::new(FileSlot {
                clients: 0,
                file: None,
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sound_file(&self) -> &Path {
        &self.sound_file
    }

    pub fn info_file(&self) -> &Path {
        &self.info_file
    }

    /// 已写入磁盘的字节数
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn set_size(&self, size: u64) {
        self.current_size.store(size, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn client_count(&self) -> usize {
        self.files.lock().clients
    }

    pub fn is_in_use(&self) -> bool {
        self.client_count() > 0
    }

    pub fn info(&self) -> CacheEntryInfo {
        let format = self.upstream.lock().format.clone();
        CacheEntryInfo {
            key: self.key.clone(),
            text: self.text.clone(),
            size_bytes: self.current_size(),
            completed: self.is_completed(),
            format,
            readers: self.client_count(),
        }
    }

    /// 打开一个读取该条目的客户端流
    ///
    /// `fallback` 在缓存文件丢失、需要重新合成时使用
    pub fn open_client(
        self: &Arc<Self>,
        fallback: Arc<AudioStreamSupplier>,
    ) -> Result<AudioStreamCacheWrapper, CacheError> {
        tracing::debug!(file = %self.sound_file.display(), "Opening a cache audio stream client");

        {
            // 从磁盘加载的条目没有 supplier，借此机会记录下来
            let mut upstream = self.upstream.lock();
            if upstream.supplier.is_none() {
                upstream.supplier = Some(fallback.clone());
            }
        }

        // 打开文件和增加读者计数必须在同一个 files 锁内完成，所以这里用同步 IO
        let mut files = self.files.lock();
        if files.file.is_none() || !self.sound_file.exists() {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&self.sound_file)?;
            let len = file.metadata()?.len();

            if self.is_completed() && len == 0 {
                // 标记为完成但文件是空的，说明文件被删掉了，重新合成
                tracing::debug!(
                    file = %self.sound_file.display(),
                    "The cached sound file is not present anymore, it will be synthesized again"
                );
                self.reset(fallback);
            } else if !self.is_completed() && self.current_size() == 0 && len > 0 {
                // 从头写入，丢弃上次未完成的残留字节
                file.set_len(0)?;
            }

            files.file = Some(Arc::new(AsyncMutex::new(File::from_std(file))));
        }
        files.clients += 1;

        Ok(AudioStreamCacheWrapper::new(self.clone()))
    }

    fn reset(&self, supplier: Arc<AudioStreamSupplier>) {
        self.completed.store(false, Ordering::SeqCst);
        self.current_size.store(0, Ordering::SeqCst);
        let mut upstream = self.upstream.lock();
        upstream.stream = None;
        upstream.supplier = Some(supplier);
    }

    /// 客户端流关闭时调用
    ///
    /// 最后一个客户端关闭后释放文件句柄和上游流。上游没有读完的条目
    /// 下次打开时重新合成。
    pub(crate) fn close_client(&self) {
        tracing::debug!(file = %self.sound_file.display(), "Closing a cache audio stream client");

        let mut files = self.files.lock();
        files.clients = files.clients.saturating_sub(1);
        if files.clients > 0 {
            return;
        }

        if files.file.take().is_some() {
            tracing::debug!(file = %self.sound_file.display(), "Effectively closing the cache file");
        }

        let mut upstream = self.upstream.lock();
        let released = upstream.stream.take().is_some();
        upstream.supplier = None;
        if !self.is_completed() {
            self.current_size.store(0, Ordering::SeqCst);
            // 磁盘上不能留下看起来完整的文件对，否则重启后会被当作完整条目加载
            self.discard_partial_files();
            if released {
                tracing::debug!(
                    key = %self.key,
                    "Upstream stream released before its end, entry will be synthesized again"
                );
            }
        }
    }

    /// 清空 `.snd` 并删除 `.info`，调用方持有 `files` 锁
    fn discard_partial_files(&self) {
        let truncated = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.sound_file)
            .and_then(|file| file.set_len(0));
        let removed = std::fs::remove_file(&self.info_file);
        for (path, outcome) in [(&self.sound_file, truncated), (&self.info_file, removed)] {
            match outcome {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        file = %path.display(),
                        error = %e,
                        "Cannot discard partial cache file"
                    );
                }
            }
        }
    }

    fn shared_file(&self) -> Result<SharedFile, CacheError> {
        self.files
            .lock()
            .file
            .clone()
            .ok_or_else(|| CacheError::NotOpen(self.sound_file.display().to_string()))
    }

    /// 获取上游流，必要时解析 supplier
    ///
    /// 第一次拿到流时写入 `.info` 文件
    async fn resolve_stream(&self) -> Result<Option<Arc<ResolvedStream>>, CacheError> {
        let supplier = {
            let upstream = self.upstream.lock();
            if let Some(stream) = &upstream.stream {
                return Ok(Some(stream.clone()));
            }
            match &upstream.supplier {
                Some(supplier) => supplier.clone(),
                None => return Ok(None),
            }
        };

        let stream = supplier.resolve().await?;

        let (attached, current) = {
            let mut upstream = self.upstream.lock();
            let same_supplier = upstream
                .supplier
                .as_ref()
                .is_some_and(|s| Arc::ptr_eq(s, &supplier));
            let attached = same_supplier && upstream.stream.is_none();
            if attached {
                upstream.stream = Some(stream.clone());
                upstream.format = Some(stream.format().clone());
            }
            (attached, upstream.stream.clone())
        };

        if attached {
            // 拿到真实的响应格式后才能写 .info 文件
            AudioFormatInfoFile::new(&self.text, stream.format())
                .write_to(&self.info_file)
                .await?;
            tracing::debug!(file = %self.info_file.display(), "Cache info file written");
        }
        Ok(current)
    }

    /// 从上游拉取数据直到文件中至少有 `end` 字节或上游结束
    async fn fill_to(&self, file: &SharedFile, end: u64) -> Result<(), CacheError> {
        if end <= self.current_size() || self.is_completed() {
            return Ok(());
        }

        tracing::trace!(key = %self.key, end, "Maybe need to get data from the upstream stream");
        let Some(stream) = self.resolve_stream().await? else {
            tracing::warn!(key = %self.key, "No upstream stream available to fill the cache file");
            return Ok(());
        };

        let mut upstream = stream.lock().await;
        // 拿到锁后再检查一次
        while end > self.current_size() && !self.is_completed() {
            let chunk = read_chunk(&mut **upstream, CHUNK_SIZE).await?;
            if chunk.is_empty() {
                tracing::trace!(key = %self.key, "End of the upstream stream reached");
                self.completed.store(true, Ordering::SeqCst);
            } else {
                write_at(file, self.current_size(), &chunk).await?;
                self.current_size.fetch_add(chunk.len() as u64, Ordering::SeqCst);
                tracing::trace!(
                    key = %self.key,
                    bytes = chunk.len(),
                    "Wrote upstream chunk to the cache file"
                );
                // 不足一个块说明上游已经读完
                if chunk.len() < CHUNK_SIZE {
                    self.completed.store(true, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }

    /// 从 `offset` 开始读取最多 `len` 字节
    ///
    /// 文件中的数据不够时先从上游拉取。到达流末尾时返回的字节可能少于 `len`，
    /// 返回空表示没有更多数据。
    pub async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, CacheError> {
        let file = self.shared_file()?;
        self.fill_to(&file, offset.saturating_add(len as u64)).await?;

        let available = self.current_size().saturating_sub(offset);
        let to_read = available.min(len as u64) as usize;
        if to_read == 0 {
            return Ok(Vec::new());
        }

        let bytes = read_at(&file, offset, to_read).await?;
        tracing::trace!(key = %self.key, offset, bytes = bytes.len(), "Read from the cache file");
        Ok(bytes)
    }

    /// 音频总长度
    ///
    /// 未完成时先看上游是否声明了长度，否则只能把上游全部读完
    pub async fn total_size(&self) -> u64 {
        if self.is_completed() {
            return self.current_size();
        }

        let advertised = self
            .upstream
            .lock()
            .stream
            .as_ref()
            .and_then(|stream| stream.length());
        if let Some(length) = advertised {
            return length;
        }

        let filled = match self.shared_file() {
            Ok(file) => self.fill_to(&file, u64::MAX).await,
            Err(e) => Err(e),
        };
        if let Err(e) = filled {
            tracing::debug!(
                key = %self.key,
                error = %e,
                "Cannot read the total size of the TTS result, using the current size"
            );
        }
        self.current_size()
    }

    /// 不访问上游的情况下，从 `offset` 开始已经可读的字节数
    pub fn available_from(&self, offset: u64) -> u64 {
        self.current_size().saturating_sub(offset)
    }

    /// 音频格式
    ///
    /// 格式未知时解析上游流，失败则按 WAV 处理
    pub async fn audio_format(&self) -> AudioFormat {
        let known = self.upstream.lock().format.clone();
        if let Some(format) = known {
            return format;
        }

        if let Err(e) = self.resolve_stream().await {
            tracing::warn!(
                key = %self.key,
                error = %e,
                "Cannot get or store audio format from the TTS engine"
            );
        }

        let resolved = self.upstream.lock().format.clone();
        resolved.unwrap_or_else(|| {
            tracing::warn!(
                file = %self.sound_file.display(),
                "Cannot get audio format for TTS sound file, assuming WAV"
            );
            AudioFormat::wav()
        })
    }

    /// 删除磁盘上的文件对
    ///
    /// 仍有客户端在读取时不删除，返回 false。
    ///
    /// 同步删除：缓存在 `entries` 锁内调用，删除必须先于同 key 新条目创建文件完成。
    pub fn delete_files(&self) -> bool {
        tracing::debug!(file = %self.sound_file.display(), "Receiving call to delete the cache files");

        let files = self.files.lock();
        if files.clients > 0 {
            tracing::debug!(
                key = %self.key,
                clients = files.clients,
                "Cache entry still in use, not deleting its files"
            );
            return false;
        }

        for path in [&self.sound_file, &self.info_file] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Cannot delete cache file");
                }
            }
        }
        tracing::debug!(key = %self.key, "Cache files deleted");
        true
    }
}

async fn write_at(file: &SharedFile, offset: u64, data: &[u8]) -> std::io::Result<()> {
    let mut file = file.lock().await;
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(data).await?;
    file.flush().await
}

async fn read_at(file: &SharedFile, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let mut file = file.lock().await;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut bytes = Vec::with_capacity(len);
    (&mut *file).take(len as u64).read_to_end(&mut bytes).await?;
    Ok(bytes)
}
