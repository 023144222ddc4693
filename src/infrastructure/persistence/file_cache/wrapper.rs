//! 读取缓存条目的客户端流
//!
//! 每个客户端维护自己的读取位置，关闭（drop）时通知条目

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::ready;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use super::result::TtsResult;
use crate::application::ports::{AudioStream, CacheError};
use crate::domain::AudioFormat;

type PendingRead = BoxFuture<'static, Result<Vec<u8>, CacheError>>;

/// 缓存客户端流
pub struct AudioStreamCacheWrapper {
    entry: Arc<TtsResult>,
    offset: u64,
    pending: Option<PendingRead>,
}

impl AudioStreamCacheWrapper {
    pub(crate) fn new(entry: Arc<TtsResult>) -> Self {
        Self {
            entry,
            offset: 0,
            pending: None,
        }
    }

    pub fn key(&self) -> &str {
        self.entry.key()
    }

    /// 当前读取位置
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 读取最多 `len` 字节，返回空表示已到末尾
    pub async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, CacheError> {
        self.pending = None;
        let bytes = self.entry.read(self.offset, len).await?;
        self.offset += bytes.len() as u64;
        Ok(bytes)
    }

    /// 无需等待上游即可读取的字节数
    pub fn available(&self) -> u64 {
        self.entry.available_from(self.offset)
    }

    pub async fn total_size(&self) -> u64 {
        self.entry.total_size().await
    }
}

impl AsyncRead for AudioStreamCacheWrapper {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if this.pending.is_none() {
            let entry = this.entry.clone();
            let offset = this.offset;
            let len = buf.remaining();
            this.pending = Some(Box::pin(async move { entry.read(offset, len).await }));
        }

        let Some(pending) = this.pending.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(pending.as_mut().poll(cx));
        this.pending = None;

        let bytes = result?;
        // 调用方的缓冲区可能比发起读取时小，多出的部分下次按偏移重新读取
        let n = bytes.len().min(buf.remaining());
        buf.put_slice(&bytes[..n]);
        this.offset += n as u64;
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl AudioStream for AudioStreamCacheWrapper {
    async fn format(&mut self) -> AudioFormat {
        self.entry.audio_format().await
    }

    async fn length(&mut self) -> Option<u64> {
        Some(self.entry.total_size().await)
    }
}

impl Drop for AudioStreamCacheWrapper {
    fn drop(&mut self) {
        // 先丢弃进行中的读取，避免它在条目关闭后继续访问文件
        self.pending = None;
        self.entry.close_client();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::file_cache::supplier::AudioStreamSupplier;
    use crate::infrastructure::persistence::file_cache::test_support::{
        random_data, request, FakeEngine,
    };
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    fn open(dir: &std::path::Path, engine: &Arc<FakeEngine>) -> (Arc<TtsResult>, AudioStreamCacheWrapper) {
        let supplier = Arc::new(AudioStreamSupplier::new(engine.clone(), request("text")));
        let entry = Arc::new(TtsResult::new(dir, "key1", supplier.clone()));
        let client = entry.open_client(supplier).unwrap();
        (entry, client)
    }

    #[tokio::test]
    async fn test_small_buffer_reads_advance_offset() {
        let dir = tempdir().unwrap();
        let data = random_data(1_000);
        let engine = Arc::new(FakeEngine::new(data.clone()));
        let (_entry, mut client) = open(dir.path(), &engine);

        let mut buf = [0u8; 7];
        let mut read = Vec::new();
        loop {
            let n = client.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            read.extend_from_slice(&buf[..n]);
        }

        assert_eq!(read, data);
        assert_eq!(client.offset(), 1_000);
        assert_eq!(client.available(), 0);
    }

    #[tokio::test]
    async fn test_metadata() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new(random_data(12_000)).without_length());
        let (entry, mut client) = open(dir.path(), &engine);

        assert_eq!(client.key(), "key1");
        assert_eq!(client.format().await, AudioFormat::mp3());
        assert_eq!(client.length().await, Some(12_000));
        assert!(entry.is_completed());
    }

    #[tokio::test]
    async fn test_drop_releases_client() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new(random_data(100)));
        let (entry, mut client) = open(dir.path(), &engine);

        assert_eq!(client.read_bytes(10).await.unwrap().len(), 10);
        assert_eq!(entry.client_count(), 1);
        drop(client);
        assert_eq!(entry.client_count(), 0);
        assert!(!entry.is_in_use());
    }
}
