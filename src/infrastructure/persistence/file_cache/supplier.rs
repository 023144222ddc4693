//! Audio Stream Supplier - 延迟执行的 TTS 合成
//!
//! 把对 TTS 引擎的调用包装起来，直到真正需要数据时才合成。
//! 无论多少读者并发请求，引擎最多被调用一次；失败会交给所有等待的读者，
//! 之后的请求会重新发起合成。

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::application::ports::{AudioStream, SynthesisRequest, TtsEnginePort, TtsError};
use crate::domain::AudioFormat;

/// 已解析的上游音频流
///
/// 内部的流由异步锁保护，同一时刻只有一个读者从上游拉取数据
pub struct ResolvedStream {
    format: AudioFormat,
    length: Option<u64>,
    reader: AsyncMutex<Box<dyn AudioStream>>,
}

impl ResolvedStream {
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// 上游声明的总长度
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub(crate) async fn lock(&self) -> AsyncMutexGuard<'_, Box<dyn AudioStream>> {
        self.reader.lock().await
    }
}

type Outcome = Result<Arc<ResolvedStream>, TtsError>;

/// 解析状态
enum SupplierState {
    Unresolved,
    /// 合成进行中，等待者订阅结果
    Resolving(watch::Receiver<Option<Outcome>>),
    Resolved(Arc<ResolvedStream>),
    /// 上次合成失败，下次 resolve 会重试
    Failed,
}

/// 延迟合成的音频流提供者
pub struct AudioStreamSupplier {
    engine: Arc<dyn TtsEnginePort>,
    request: SynthesisRequest,
    state: Mutex<SupplierState>,
}

impl AudioStreamSupplier {
    pub fn new(engine: Arc<dyn TtsEnginePort>, request: SynthesisRequest) -> Self {
        Self {
            engine,
            request,
            state: Mutex::new(SupplierState::Unresolved),
        }
    }

    pub fn text(&self) -> &str {
        &self.request.text
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.lock(), SupplierState::Resolved(_))
    }

    /// 解析上游流
    ///
    /// 第一个调用者执行合成，并发的调用者等待同一个结果
    pub async fn resolve(&self) -> Result<Arc<ResolvedStream>, TtsError> {
        loop {
            let (sender, mut receiver) = {
                let mut state = self.state.lock();
                let waiting = match &*state {
                    SupplierState::Resolved(stream) => return Ok(stream.clone()),
                    SupplierState::Resolving(receiver) => Some(receiver.clone()),
                    SupplierState::Unresolved | SupplierState::Failed => None,
                };
                match waiting {
                    Some(receiver) => (None, receiver),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        *state = SupplierState::Resolving(receiver.clone());
                        (Some(sender), receiver)
                    }
                }
            };

            if let Some(sender) = sender {
                return self.synthesize(sender).await;
            }

            tracing::trace!(
                engine = self.engine.id(),
                "Waiting for a concurrent synthesis to complete"
            );
            let outcome = match receiver.wait_for(Option::is_some).await {
                Ok(outcome) => (*outcome).clone(),
                // 发起合成的调用者被取消，重新竞争
                Err(_) => None,
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    async fn synthesize(&self, sender: watch::Sender<Option<Outcome>>) -> Outcome {
        let mut guard = ResolvingGuard {
            supplier: self,
            armed: true,
        };

        tracing::debug!(
            engine = self.engine.id(),
            text_len = self.request.text.len(),
            voice = %self.request.voice,
            "Resolving TTS audio stream"
        );

        let outcome = match self.engine.synthesize(&self.request).await {
            Ok(mut stream) => {
                let format = stream.format().await;
                let length = stream.length().await;
                Ok(Arc::new(ResolvedStream {
                    format,
                    length,
                    reader: AsyncMutex::new(stream),
                }))
            }
            Err(e) => {
                tracing::warn!(
                    engine = self.engine.id(),
                    error = %e,
                    "TTS synthesis failed"
                );
                Err(e)
            }
        };

        *self.state.lock() = match &outcome {
            Ok(stream) => SupplierState::Resolved(stream.clone()),
            Err(_) => SupplierState::Failed,
        };
        guard.armed = false;

        sender.send_replace(Some(outcome.clone()));
        outcome
    }
}

/// 合成被取消时把状态恢复为 Unresolved
struct ResolvingGuard<'a> {
    supplier: &'a AudioStreamSupplier,
    armed: bool,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.supplier.state.lock();
            if matches!(*state, SupplierState::Resolving(_)) {
                *state = SupplierState::Unresolved;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::file_cache::test_support::{request, FakeEngine};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolve_synthesizes_once() {
        let engine = Arc::new(FakeEngine::new(vec![1, 2, 3]).with_delay(Duration::from_millis(50)));
        let supplier = Arc::new(AudioStreamSupplier::new(engine.clone(), request("text")));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let supplier = supplier.clone();
            handles.push(tokio::spawn(async move { supplier.resolve().await }));
        }
        let mut streams = Vec::new();
        for handle in handles {
            streams.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(engine.calls(), 1);
        assert!(supplier.is_resolved());
        assert!(streams.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(streams[0].format(), &AudioFormat::mp3());
        assert_eq!(streams[0].length(), Some(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_reaches_waiters_then_retries() {
        let engine = Arc::new(
            FakeEngine::new(vec![1, 2, 3])
                .with_delay(Duration::from_millis(50))
                .failing(1),
        );
        let supplier = Arc::new(AudioStreamSupplier::new(engine.clone(), request("text")));

        let first = {
            let supplier = supplier.clone();
            tokio::spawn(async move { supplier.resolve().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let supplier = supplier.clone();
            tokio::spawn(async move { supplier.resolve().await })
        };

        assert!(matches!(first.await.unwrap(), Err(TtsError::ServiceError(_))));
        assert!(matches!(second.await.unwrap(), Err(TtsError::ServiceError(_))));
        assert_eq!(engine.calls(), 1);
        assert!(!supplier.is_resolved());

        // 失败不会被记住，下一次请求重新合成
        assert!(supplier.resolve().await.is_ok());
        assert_eq!(engine.calls(), 2);
        assert!(supplier.is_resolved());
    }

    #[tokio::test]
    async fn test_cancelled_resolution_can_be_retried() {
        let engine = Arc::new(FakeEngine::new(vec![9]).with_delay(Duration::from_millis(200)));
        let supplier = AudioStreamSupplier::new(engine.clone(), request("text"));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), supplier.resolve()).await;
        assert!(cancelled.is_err());
        assert!(!supplier.is_resolved());

        assert!(supplier.resolve().await.is_ok());
        assert_eq!(engine.calls(), 2);
    }
}
