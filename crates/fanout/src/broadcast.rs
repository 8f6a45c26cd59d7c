//! Bounded-concurrency broadcaster
//!
//! Per-listener sends run under a semaphore capped at 100 permits per
//! orchestrator. Transient send failures (including send timeouts) retry
//! up to twice with linear 100 ms backoff; a gone connection is removed
//! from the directory, which also settles the listener count. Audio frames
//! pass through the listener's bounded buffer before going out so a slow
//! listener sheds its oldest audio rather than growing without bound.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

use babelcast_core::{
    ConnectionId, Error, LanguageTag, ListenerDirectory, ListenerSink, ServerFrame, SessionId,
};
use babelcast_config::constants::fanout::{MAX_RETRIES, RETRY_BACKOFF_MS};

use crate::listener_buffer::ListenerBuffer;

pub struct Broadcaster {
    sink: Arc<dyn ListenerSink>,
    directory: Arc<dyn ListenerDirectory>,
    semaphore: Arc<Semaphore>,
    send_timeout: Duration,
    buffers: DashMap<ConnectionId, Arc<Mutex<ListenerBuffer>>>,
}

impl Broadcaster {
    pub fn new(
        sink: Arc<dyn ListenerSink>,
        directory: Arc<dyn ListenerDirectory>,
        max_concurrent: usize,
        send_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            directory,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            send_timeout,
            buffers: DashMap::new(),
        }
    }

    /// Deliver a synthesized audio chunk to one listener, buffering first.
    pub async fn deliver_audio(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
        target_language: &LanguageTag,
        audio: Vec<u8>,
        is_partial: bool,
        produced_at_ms: u64,
    ) {
        let buffer = self
            .buffers
            .entry(connection_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ListenerBuffer::default())))
            .clone();

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed on shutdown
        };

        let mut guard = buffer.lock().await;
        let overflow = guard.push(audio, produced_at_ms);
        if overflow > 0 {
            metrics::counter!("listener_buffer_overflow_total").increment(overflow as u64);
            tracing::debug!(
                connection_id = %connection_id,
                dropped = overflow,
                "listener buffer overflow, dropped oldest frames"
            );
        }

        while let Some((frame_audio, _)) = guard.pop() {
            let frame = ServerFrame::AudioChunk {
                session_id: session_id.clone(),
                target_language: target_language.clone(),
                audio_data: BASE64.encode(&frame_audio),
                is_partial,
            };
            if !self.send_with_retry(connection_id, frame).await {
                guard.clear();
                break;
            }
        }
    }

    /// Deliver a control or transcript frame to one listener.
    pub async fn deliver_frame(&self, connection_id: &ConnectionId, frame: ServerFrame) {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        self.send_with_retry(connection_id, frame).await;
    }

    /// Drop a listener's buffered audio on disconnect.
    pub fn forget(&self, connection_id: &ConnectionId) {
        self.buffers.remove(connection_id);
    }

    /// Send with bounded retry. Returns false when the connection is gone
    /// or the frame was abandoned.
    async fn send_with_retry(&self, connection_id: &ConnectionId, frame: ServerFrame) -> bool {
        let mut attempt: u32 = 0;
        loop {
            let outcome =
                tokio::time::timeout(self.send_timeout, self.sink.send(connection_id, frame.clone()))
                    .await;

            match outcome {
                Ok(Ok(())) => return true,
                Ok(Err(Error::ConnectionGone(_))) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        "listener gone mid-send, removing connection"
                    );
                    self.directory.remove_connection(connection_id).await;
                    self.forget(connection_id);
                    return false;
                }
                Ok(Err(e)) => {
                    // Non-gone send failures are treated as transient.
                    if attempt >= MAX_RETRIES {
                        metrics::counter!("broadcast_send_failures_total").increment(1);
                        tracing::warn!(
                            connection_id = %connection_id,
                            error = %e,
                            "dropping frame after retries"
                        );
                        return false;
                    }
                }
                Err(_) => {
                    if attempt >= MAX_RETRIES {
                        metrics::counter!("broadcast_send_failures_total").increment(1);
                        tracing::warn!(
                            connection_id = %connection_id,
                            "dropping frame after send timeouts"
                        );
                        return false;
                    }
                }
            }

            attempt += 1;
            metrics::counter!("broadcast_send_retries_total").increment(1);
            tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        failures_before_success: AtomicU32,
        sent: SyncMutex<Vec<(ConnectionId, ServerFrame)>>,
        gone: bool,
    }

    #[async_trait]
    impl ListenerSink for FlakySink {
        async fn send(&self, connection_id: &ConnectionId, frame: ServerFrame) -> Result<(), Error> {
            if self.gone {
                return Err(Error::ConnectionGone(connection_id.clone()));
            }
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Internal("transport hiccup".into()));
            }
            self.sent.lock().push((connection_id.clone(), frame));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDirectory {
        removed: SyncMutex<Vec<ConnectionId>>,
    }

    #[async_trait]
    impl ListenerDirectory for MockDirectory {
        fn listeners_by_language(
            &self,
            _session_id: &SessionId,
        ) -> HashMap<LanguageTag, Vec<ConnectionId>> {
            HashMap::new()
        }

        fn broadcast_control(&self, _session_id: &SessionId) -> babelcast_core::traits::BroadcastControl {
            babelcast_core::traits::BroadcastControl::default()
        }

        async fn remove_connection(&self, connection_id: &ConnectionId) {
            self.removed.lock().push(connection_id.clone());
        }
    }

    fn broadcaster(sink: Arc<FlakySink>, directory: Arc<MockDirectory>) -> Broadcaster {
        Broadcaster::new(sink, directory, 4, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn transient_failures_retry_and_deliver() {
        let sink = Arc::new(FlakySink {
            failures_before_success: AtomicU32::new(2),
            sent: SyncMutex::new(Vec::new()),
            gone: false,
        });
        let directory = Arc::new(MockDirectory::default());
        let b = broadcaster(sink.clone(), directory.clone());

        let es = LanguageTag::parse("es").unwrap();
        b.deliver_audio(&"s1".into(), &"c1".into(), &es, vec![0u8; 64], false, 0)
            .await;

        assert_eq!(sink.sent.lock().len(), 1);
        assert!(directory.removed.lock().is_empty());
    }

    #[tokio::test]
    async fn gone_connection_is_removed() {
        let sink = Arc::new(FlakySink {
            failures_before_success: AtomicU32::new(0),
            sent: SyncMutex::new(Vec::new()),
            gone: true,
        });
        let directory = Arc::new(MockDirectory::default());
        let b = broadcaster(sink.clone(), directory.clone());

        let es = LanguageTag::parse("es").unwrap();
        b.deliver_audio(&"s1".into(), &"c1".into(), &es, vec![0u8; 64], false, 0)
            .await;

        assert_eq!(directory.removed.lock().as_slice(), &["c1".to_string()]);
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn persistent_failure_drops_frame() {
        let sink = Arc::new(FlakySink {
            failures_before_success: AtomicU32::new(100),
            sent: SyncMutex::new(Vec::new()),
            gone: false,
        });
        let directory = Arc::new(MockDirectory::default());
        let b = broadcaster(sink.clone(), directory.clone());

        b.deliver_frame(&"c1".into(), ServerFrame::HeartbeatAck).await;
        assert!(sink.sent.lock().is_empty());
        // Not a gone connection: stays registered.
        assert!(directory.removed.lock().is_empty());
    }
}
