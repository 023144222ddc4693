//! 缓存测试用的引擎和音频流

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

use crate::application::ports::{AudioStream, SynthesisRequest, TtsEnginePort, TtsError};
use crate::domain::{AudioFormat, Voice};

pub fn voice() -> Voice {
    Voice::new("fake:voice", "Fake Voice", "en-US").unwrap()
}

pub fn request(text: &str) -> SynthesisRequest {
    SynthesisRequest::new(text, voice(), AudioFormat::mp3())
}

pub fn random_data(len: usize) -> Vec<u8> {
    // 简单的线性同余序列，足够区分字节位置
    let mut seed: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) as u8
        })
        .collect()
}

/// 记录是否被关闭（drop）的内存音频流
pub struct TrackedStream {
    data: io::Cursor<Vec<u8>>,
    format: AudioFormat,
    advertise_length: bool,
    closed: Arc<AtomicBool>,
}

impl TrackedStream {
    pub fn new(data: Vec<u8>, closed: Arc<AtomicBool>) -> Self {
        Self {
            data: io::Cursor::new(data),
            format: AudioFormat::mp3(),
            advertise_length: false,
            closed,
        }
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

#[async_trait]
impl AudioStream for TrackedStream {
    async fn format(&mut self) -> AudioFormat {
        self.format.clone()
    }

    async fn length(&mut self) -> Option<u64> {
        self.advertise_length
            .then(|| self.data.get_ref().len() as u64)
    }
}

/// 计数的假引擎
pub struct FakeEngine {
    id: String,
    data: Vec<u8>,
    delay: Option<Duration>,
    advertise_length: bool,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    closed: Arc<AtomicBool>,
}

impl FakeEngine {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            id: "FakeEngine".to_string(),
            data,
            delay: None,
            advertise_length: true,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 上游流不声明长度
    pub fn without_length(mut self) -> Self {
        self.advertise_length = false;
        self
    }

    /// 前 `count` 次合成失败
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 最近一次返回的流是否已关闭
    pub fn stream_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TtsEnginePort for FakeEngine {
    fn id(&self) -> &str {
        &self.id
    }

    async fn synthesize(
        &self,
        _request: &SynthesisRequest,
    ) -> Result<Box<dyn AudioStream>, TtsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TtsError::ServiceError("simulated failure".to_string()));
        }

        self.closed.store(false, Ordering::SeqCst);
        let mut stream = TrackedStream::new(self.data.clone(), self.closed.clone());
        stream.advertise_length = self.advertise_length;
        Ok(Box::new(stream))
    }
}

/// 对任意文本都返回同一个 key 的引擎，用来模拟 key 碰撞
pub struct CollidingEngine {
    pub inner: FakeEngine,
}

#[async_trait]
impl TtsEnginePort for CollidingEngine {
    fn id(&self) -> &str {
        "CollidingEngine"
    }

    fn cache_key(&self, _request: &SynthesisRequest) -> String {
        "same-key".to_string()
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Box<dyn AudioStream>, TtsError> {
        let mut data = request.text.as_bytes().to_vec();
        data.extend_from_slice(b"-audio");
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedStream::new(data, Arc::new(AtomicBool::new(false)))))
    }
}
