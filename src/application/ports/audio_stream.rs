//! Audio Stream Port - 音频流抽象
//!
//! TTS 引擎产出的流和缓存交给调用方的流实现同一个 trait，
//! 调用方不需要关心音频来自引擎还是来自磁盘缓存。

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::domain::AudioFormat;

/// 音频流
///
/// 字节通过 [`AsyncRead`] 读取。格式和长度可能要等上游合成开始后才知道，
/// 所以是异步方法。
#[async_trait]
pub trait AudioStream: AsyncRead + Send + Unpin {
    /// 音频格式
    async fn format(&mut self) -> AudioFormat;

    /// 总长度（字节），未知时返回 None
    async fn length(&mut self) -> Option<u64> {
        None
    }
}

/// 从流中读取最多 `max` 字节
///
/// 只有到达流末尾时才会返回不足 `max` 的数据，返回空表示流已结束。
pub async fn read_chunk<R>(reader: &mut R, max: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = Vec::with_capacity(max);
    reader.take(max as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}

/// 内存音频流
///
/// 用于一次性拿到完整音频的引擎（例如 HTTP 响应体）
pub struct BufferedAudioStream {
    data: io::Cursor<Vec<u8>>,
    format: AudioFormat,
}

impl BufferedAudioStream {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self {
            data: io::Cursor::new(data),
            format,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.get_ref().is_empty()
    }
}

impl AsyncRead for BufferedAudioStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

#[async_trait]
impl AudioStream for BufferedAudioStream {
    async fn format(&mut self) -> AudioFormat {
        self.format.clone()
    }

    async fn length(&mut self) -> Option<u64> {
        Some(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_chunk_until_end() {
        let mut stream = BufferedAudioStream::new((0u8..25).collect(), AudioFormat::wav());

        let first = read_chunk(&mut stream, 10).await.unwrap();
        assert_eq!(first, (0u8..10).collect::<Vec<_>>());
        let second = read_chunk(&mut stream, 10).await.unwrap();
        assert_eq!(second.len(), 10);
        let last = read_chunk(&mut stream, 10).await.unwrap();
        assert_eq!(last, vec![20, 21, 22, 23, 24]);
        assert!(read_chunk(&mut stream, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buffered_stream_metadata() {
        let mut stream = BufferedAudioStream::new(vec![1, 2, 3], AudioFormat::mp3());
        assert_eq!(stream.format().await, AudioFormat::mp3());
        assert_eq!(stream.length().await, Some(3));
    }
}
