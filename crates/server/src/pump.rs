//! Transcription pump
//!
//! Bridges one session's ASR stream to its partial-result processor:
//! recognizer events flow into the processor's channel in arrival order,
//! and transcripts echo back to the speaker so their client can render
//! what the recognizer heard. Audio flows to the stream through the
//! handle's sink, untouched by the pump.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use babelcast_core::{
    AsrEvent, ConnectionId, LanguageTag, ListenerSink, ServerFrame, SessionId,
    TranscriptionEngine, TranscriptionHandle, UpstreamError,
};

pub struct TranscriptionPump {
    session_id: SessionId,
    speaker_connection_id: ConnectionId,
    sink: Arc<dyn ListenerSink>,
}

impl TranscriptionPump {
    pub fn new(
        session_id: SessionId,
        speaker_connection_id: ConnectionId,
        sink: Arc<dyn ListenerSink>,
    ) -> Self {
        Self {
            session_id,
            speaker_connection_id,
            sink,
        }
    }

    /// Drain recognizer events until the stream or the processor closes.
    pub async fn run(self, mut handle: TranscriptionHandle, events_tx: mpsc::Sender<AsrEvent>) {
        while let Some(event) = handle.events.recv().await {
            self.echo_to_speaker(&event).await;
            if events_tx.send(event).await.is_err() {
                tracing::debug!(session_id = %self.session_id, "processor closed, pump stopping");
                break;
            }
        }
        tracing::debug!(session_id = %self.session_id, "transcription stream ended");
    }

    async fn echo_to_speaker(&self, event: &AsrEvent) {
        let frame = match event {
            AsrEvent::Partial(p) => ServerFrame::PartialTranscript {
                session_id: self.session_id.clone(),
                text: p.text.clone(),
                stability: p.stability,
                origin_timestamp: p.origin_timestamp_ms,
            },
            AsrEvent::Final(f) => ServerFrame::FinalTranscript {
                session_id: self.session_id.clone(),
                text: f.text.clone(),
                language: f.source_language.clone(),
                origin_timestamp: f.origin_timestamp_ms,
            },
            AsrEvent::Error(_) => return,
        };
        if let Err(e) = self.sink.send(&self.speaker_connection_id, frame).await {
            tracing::debug!(
                session_id = %self.session_id,
                error = %e,
                "failed to echo transcript to speaker"
            );
        }
    }
}

/// Stand-in engine when no recognizer is configured: consumes audio,
/// produces no events, keeps the stream open.
pub struct NullTranscriptionEngine;

#[async_trait]
impl TranscriptionEngine for NullTranscriptionEngine {
    async fn open_stream(
        &self,
        session_id: SessionId,
        _source_language: LanguageTag,
    ) -> Result<TranscriptionHandle, UpstreamError> {
        tracing::warn!(
            session_id = %session_id,
            "no transcription engine configured, audio will not be transcribed"
        );
        let (audio_tx, mut audio_rx) = mpsc::channel(64);
        let (events_tx, events) = mpsc::channel(1);
        tokio::spawn(async move {
            // Hold the sender so the event stream stays open for the
            // session's lifetime.
            let _keep_open = events_tx;
            while audio_rx.recv().await.is_some() {}
        });
        Ok(TranscriptionHandle { audio_tx, events })
    }
}

/// Test engine: events are injected per session through a handle the test
/// keeps.
#[derive(Default)]
pub struct ScriptedTranscriptionEngine {
    injectors: DashMap<SessionId, mpsc::Sender<AsrEvent>>,
}

impl ScriptedTranscriptionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender for injecting recognizer events into an open stream.
    pub fn injector(&self, session_id: &SessionId) -> Option<mpsc::Sender<AsrEvent>> {
        self.injectors.get(session_id).map(|tx| tx.clone())
    }
}

#[async_trait]
impl TranscriptionEngine for ScriptedTranscriptionEngine {
    async fn open_stream(
        &self,
        session_id: SessionId,
        _source_language: LanguageTag,
    ) -> Result<TranscriptionHandle, UpstreamError> {
        let (audio_tx, mut audio_rx) = mpsc::channel(64);
        let (events_tx, events) = mpsc::channel(64);
        self.injectors.insert(session_id, events_tx);
        tokio::spawn(async move { while audio_rx.recv().await.is_some() {} });
        Ok(TranscriptionHandle { audio_tx, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babelcast_core::{Error, PartialResult};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        frames: Mutex<Vec<ServerFrame>>,
    }

    #[async_trait]
    impl ListenerSink for CapturingSink {
        async fn send(&self, _connection_id: &ConnectionId, frame: ServerFrame) -> Result<(), Error> {
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    #[tokio::test]
    async fn pump_echoes_and_forwards_events() {
        let engine = ScriptedTranscriptionEngine::new();
        let session_id = "golden-eagle-427".to_string();
        let handle = engine
            .open_stream(session_id.clone(), LanguageTag::parse("en").unwrap())
            .await
            .unwrap();

        let sink = Arc::new(CapturingSink::default());
        let pump = TranscriptionPump::new(session_id.clone(), "speaker".into(), sink.clone());
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let pump_task = tokio::spawn(pump.run(handle, events_tx));

        let injector = engine.injector(&session_id).unwrap();
        injector
            .send(AsrEvent::Partial(PartialResult {
                result_id: "r1".into(),
                text: "hello".into(),
                stability: Some(0.8),
                origin_timestamp_ms: 10,
                session_id: session_id.clone(),
                source_language: LanguageTag::parse("en").unwrap(),
            }))
            .await
            .unwrap();

        let forwarded = events_rx.recv().await.unwrap();
        assert!(matches!(forwarded, AsrEvent::Partial(_)));
        // Echo reached the speaker sink.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(matches!(
            sink.frames.lock().first(),
            Some(ServerFrame::PartialTranscript { .. })
        ));

        drop(injector);
        drop(engine);
        let _ = pump_task.await;
    }
}
