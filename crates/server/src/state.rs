//! Application state
//!
//! Shared handles across all handlers, plus the per-session runtime: the
//! processor task, the transcription pump, the audio admission limiter,
//! and the ASR stream's audio sink. The state layer also runs the
//! idle/expiry reaper and turns directory outcomes into listener
//! notifications.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use babelcast_config::constants::flags::PARTIAL_RESULTS_PARAMETER;
use babelcast_config::Settings;
use babelcast_core::{
    AsrEvent, AudioFrame, ConnectionId, Error, FeatureFlagOracle, FlagSnapshot, ListenerSink,
    ServerFrame, SessionId, SpeakerAuth, TranscriptionEngine, UpstreamError,
};
use babelcast_fanout::{Broadcaster, FanoutOrchestrator};
use babelcast_pipeline::{
    AudioActivity, CanaryGate, EmotionAnalyzer, EmotionRegistry, PartialResultProcessor,
    ProcessorConfig,
};
use babelcast_translation::{
    create_synthesizer, create_translator, supported_languages, TranslationCache, UpstreamProvider,
};

use crate::auth::StaticTokenAuth;
use crate::directory::{DisconnectOutcome, SessionDirectory, SessionRecord};
use crate::pump::{NullTranscriptionEngine, TranscriptionPump};
use crate::rate_limit::AudioRateLimiter;

/// Outbound transport registry: one frame channel per live connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    senders: DashMap<ConnectionId, mpsc::Sender<ServerFrame>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: ConnectionId, tx: mpsc::Sender<ServerFrame>) {
        self.senders.insert(connection_id, tx);
    }

    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.senders.remove(connection_id);
    }
}

#[async_trait]
impl ListenerSink for ConnectionRegistry {
    async fn send(&self, connection_id: &ConnectionId, frame: ServerFrame) -> Result<(), Error> {
        let tx = self
            .senders
            .get(connection_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::ConnectionGone(connection_id.clone()))?;
        tx.send(frame)
            .await
            .map_err(|_| Error::ConnectionGone(connection_id.clone()))
    }
}

/// Feature-flag oracle default: everything on, full rollout. A remote
/// oracle implements the same trait.
pub struct StaticFlagOracle;

#[async_trait]
impl FeatureFlagOracle for StaticFlagOracle {
    async fn get(&self, _parameter: &str) -> Result<FlagSnapshot, UpstreamError> {
        Ok(FlagSnapshot::full_on())
    }
}

/// Running machinery of one active session.
pub struct SessionRuntime {
    pub events_tx: mpsc::Sender<AsrEvent>,
    pub audio_tx: mpsc::Sender<AudioFrame>,
    pub audio_activity: AudioActivity,
    pub audio_limiter: Mutex<AudioRateLimiter>,
    pub next_sequence: std::sync::atomic::AtomicU64,
    processor_task: tokio::task::JoinHandle<()>,
    pump_task: tokio::task::JoinHandle<()>,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub directory: Arc<SessionDirectory>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub orchestrator: Arc<FanoutOrchestrator>,
    pub analyzer: Arc<EmotionAnalyzer>,
    pub gate: Arc<CanaryGate>,
    pub auth: Arc<dyn SpeakerAuth>,
    pub engine: Arc<dyn TranscriptionEngine>,
    pub runtimes: Arc<DashMap<SessionId, SessionRuntime>>,
}

impl AppState {
    /// Wire the default state from settings.
    pub fn new(settings: Settings) -> Self {
        let engine: Arc<dyn TranscriptionEngine> = Arc::new(NullTranscriptionEngine);
        Self::with_engine(settings, engine)
    }

    /// Wire state with a specific transcription engine (tests script it).
    pub fn with_engine(settings: Settings, engine: Arc<dyn TranscriptionEngine>) -> Self {
        let settings = Arc::new(settings);
        let directory = Arc::new(SessionDirectory::new(
            settings.session.clone(),
            supported_languages(),
        ));
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            directory.clone(),
            settings.fanout.max_concurrent_broadcasts,
            Duration::from_secs(settings.fanout.send_timeout_secs),
        ));

        let provider = match settings.upstream.provider.as_str() {
            "noop" => UpstreamProvider::Noop,
            _ => UpstreamProvider::Http,
        };
        let translator = create_translator(provider, &settings.upstream, &settings.fanout);
        let synthesizer = create_synthesizer(provider, &settings.upstream, &settings.fanout);
        let cache = Arc::new(TranslationCache::new(
            settings.fanout.max_cache_entries,
            Duration::from_secs(settings.fanout.cache_ttl_secs),
        ));
        let orchestrator = Arc::new(FanoutOrchestrator::new(
            directory.clone(),
            translator,
            synthesizer,
            cache,
            broadcaster.clone(),
            &settings.fanout,
        ));

        let analyzer = Arc::new(EmotionAnalyzer::new(Arc::new(EmotionRegistry::new())));
        let gate = Arc::new(CanaryGate::new(
            Arc::new(StaticFlagOracle),
            PARTIAL_RESULTS_PARAMETER.to_string(),
            Duration::from_secs(settings.flags.cache_ttl_secs),
        ));
        let auth = Arc::new(StaticTokenAuth::new(&settings.server.auth));

        Self {
            settings,
            directory,
            registry,
            broadcaster,
            orchestrator,
            analyzer,
            gate,
            auth,
            engine,
            runtimes: Arc::new(DashMap::new()),
        }
    }

    /// Start the per-session machinery: ASR stream, transcription pump,
    /// and the partial-result processor task.
    pub async fn start_session_runtime(&self, session: &SessionRecord) -> Result<(), Error> {
        let handle = self
            .engine
            .open_stream(session.session_id.clone(), session.source_language.clone())
            .await
            .map_err(Error::Upstream)?;

        let audio_activity = AudioActivity::new();
        let (events_tx, events_rx) = mpsc::channel::<AsrEvent>(256);

        let mut processor_config = ProcessorConfig::new(
            session.session_id.clone(),
            session.source_language.clone(),
            session.tunables,
        );
        processor_config.pause_threshold =
            Duration::from_secs_f32(self.settings.pipeline.pause_threshold_secs);
        processor_config.orphan_timeout =
            Duration::from_secs(self.settings.pipeline.orphan_timeout_secs);
        processor_config.dedup_ttl =
            Duration::from_secs(self.settings.pipeline.dedup_cache_ttl_secs);

        let processor = PartialResultProcessor::new(
            processor_config,
            self.gate.clone(),
            self.orchestrator.clone(),
            self.analyzer.registry(),
            audio_activity.clone(),
            Instant::now(),
        );
        let processor_task = tokio::spawn(processor.run(events_rx));

        let pump = TranscriptionPump::new(
            session.session_id.clone(),
            session.speaker_connection_id.clone(),
            self.registry.clone(),
        );
        let audio_tx = handle.audio_tx.clone();
        let pump_task = tokio::spawn(pump.run(handle, events_tx.clone()));

        let limiter = AudioRateLimiter::new(
            self.settings.pipeline.max_audio_frames_per_sec,
            self.settings.pipeline.audio_burst,
            Instant::now(),
        );
        self.runtimes.insert(
            session.session_id.clone(),
            SessionRuntime {
                events_tx,
                audio_tx,
                audio_activity,
                audio_limiter: Mutex::new(limiter),
                next_sequence: std::sync::atomic::AtomicU64::new(0),
                processor_task,
                pump_task,
            },
        );
        Ok(())
    }

    /// Tear down a session's runtime: cancel in-flight forwards, stop the
    /// tasks, drop emotion state, notify listeners.
    pub async fn end_session(
        &self,
        session: &SessionRecord,
        listeners: &[ConnectionId],
        reason: &str,
    ) {
        self.orchestrator.cancel_session(&session.session_id);
        if let Some((_, runtime)) = self.runtimes.remove(&session.session_id) {
            runtime.processor_task.abort();
            runtime.pump_task.abort();
        }
        self.analyzer.end_session(&session.session_id);

        let frame = ServerFrame::SessionEnded {
            session_id: session.session_id.clone(),
            reason: reason.to_string(),
        };
        for listener in listeners {
            self.broadcaster.forget(listener);
            self.broadcaster.deliver_frame(listener, frame.clone()).await;
        }
        tracing::info!(session_id = %session.session_id, reason, "session runtime stopped");
    }

    /// Handle a transport disconnect (idempotent).
    pub async fn handle_disconnect(&self, connection_id: &ConnectionId) {
        self.registry.unregister(connection_id);
        self.broadcaster.forget(connection_id);
        match self.directory.disconnect(connection_id) {
            DisconnectOutcome::SpeakerLeft { session, listeners } => {
                self.end_session(&session, &listeners, "speaker disconnected").await;
            }
            DisconnectOutcome::ListenerLeft {
                session_id,
                remaining,
            } => {
                tracing::debug!(
                    session_id = %session_id,
                    remaining,
                    connection_id = %connection_id,
                    "listener disconnected"
                );
            }
            DisconnectOutcome::None => {}
        }
    }

    /// Announce a frame to every listener of a session.
    pub async fn announce(&self, session_id: &SessionId, frame: ServerFrame) {
        use babelcast_core::ListenerDirectory;
        let listeners = self.directory.listeners_by_language(session_id);
        for connection_id in listeners.values().flatten() {
            self.broadcaster.deliver_frame(connection_id, frame.clone()).await;
        }
    }

    /// Spawn the idle/expiry reaper. Returns the shutdown handle.
    pub fn start_reaper(&self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let state = self.clone();
        let cadence = Duration::from_secs(state.settings.session.reap_interval_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = state
                            .directory
                            .reap_idle(Instant::now(), chrono::Utc::now());
                        for connection_id in &report.idle_connections {
                            state.registry.unregister(connection_id);
                            state.broadcaster.forget(connection_id);
                        }
                        for (session, listeners) in &report.ended_sessions {
                            state.end_session(session, listeners, "session expired").await;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("reaper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
