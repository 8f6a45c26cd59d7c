//! Session & connection directory
//!
//! Sole owner of session and connection records. The listener count is an
//! atomic counter with a `>= 0` invariant: increments are bounded by the
//! session's capacity and decrements are conditional, serialized per
//! session by the listener-index lock. Idle connections and expired or
//! speakerless sessions are dropped by the periodic reaper.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use babelcast_config::constants::session as session_consts;
use babelcast_config::SessionConfig;
use babelcast_core::{
    BroadcastAction, BroadcastControl, ConnectionId, Error, ErrorCode, LanguageTag,
    ListenerDirectory, SessionId, SessionTunables,
};

use crate::session_id::generate_session_id;

/// Connection role, bound on the first createSession or joinSession.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unauthenticated,
    Speaker,
    Listener,
}

#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub session_id: Option<SessionId>,
    pub target_language: Option<LanguageTag>,
    pub created_at: Instant,
    pub last_activity_at: Instant,
}

#[derive(Debug)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub speaker_connection_id: ConnectionId,
    pub source_language: LanguageTag,
    pub tunables: SessionTunables,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    active: AtomicBool,
    listener_count: AtomicU32,
    control: Mutex<BroadcastControl>,
    /// Secondary index: target language → listener connections. Also the
    /// serialization point for listener-count mutations.
    listeners: Mutex<HashMap<LanguageTag, HashSet<ConnectionId>>>,
}

impl SessionRecord {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> u32 {
        self.listener_count.load(Ordering::SeqCst)
    }

    pub fn control(&self) -> BroadcastControl {
        *self.control.lock()
    }

    fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn listener_connections(&self) -> Vec<ConnectionId> {
        self.listeners
            .lock()
            .values()
            .flat_map(|set| set.iter().cloned())
            .collect()
    }
}

/// What a disconnect did, so the caller can notify and tear down.
pub enum DisconnectOutcome {
    /// The speaker left: the session ended; notify these listeners.
    SpeakerLeft {
        session: Arc<SessionRecord>,
        listeners: Vec<ConnectionId>,
    },
    /// A listener left an existing session.
    ListenerLeft {
        session_id: SessionId,
        remaining: u32,
    },
    /// Nothing further to do.
    None,
}

/// Idle/expiry sweep results.
#[derive(Default)]
pub struct ReapReport {
    pub idle_connections: Vec<ConnectionId>,
    pub ended_sessions: Vec<(Arc<SessionRecord>, Vec<ConnectionId>)>,
}

pub struct SessionDirectory {
    sessions: RwLock<HashMap<SessionId, Arc<SessionRecord>>>,
    connections: DashMap<ConnectionId, ConnectionRecord>,
    config: SessionConfig,
    supported_languages: HashSet<LanguageTag>,
}

impl SessionDirectory {
    pub fn new(config: SessionConfig, supported_languages: Vec<LanguageTag>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connections: DashMap::new(),
            config,
            supported_languages: supported_languages.into_iter().collect(),
        }
    }

    /// Record a freshly accepted transport connection.
    pub fn attach(&self, connection_id: &ConnectionId, now: Instant) {
        self.connections.insert(
            connection_id.clone(),
            ConnectionRecord {
                connection_id: connection_id.clone(),
                role: Role::Unauthenticated,
                session_id: None,
                target_language: None,
                created_at: now,
                last_activity_at: now,
            },
        );
    }

    /// Refresh a connection's activity timestamp.
    pub fn touch(&self, connection_id: &ConnectionId, now: Instant) {
        if let Some(mut record) = self.connections.get_mut(connection_id) {
            record.last_activity_at = now;
        }
    }

    pub fn connection(&self, connection_id: &ConnectionId) -> Option<ConnectionRecord> {
        self.connections.get(connection_id).map(|r| r.clone())
    }

    pub fn session(&self, session_id: &SessionId) -> Option<Arc<SessionRecord>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Create a session for a speaker connection. Out-of-range tunables are
    /// clamped into contract bounds.
    pub fn create_session(
        &self,
        speaker_connection_id: &ConnectionId,
        source_language: LanguageTag,
        tunables: SessionTunables,
    ) -> Result<Arc<SessionRecord>, Error> {
        let record = self
            .connections
            .get(speaker_connection_id)
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "unknown connection"))?;
        if record.session_id.is_some() {
            return Err(Error::protocol(
                ErrorCode::InvalidRole,
                "connection already bound to a session",
            ));
        }
        drop(record);

        let mut sessions = self.sessions.write();
        if sessions.len() >= self.config.max_sessions {
            return Err(Error::protocol(
                ErrorCode::SessionAtCapacity,
                "maximum concurrent sessions reached",
            ));
        }

        let tunables = clamp_tunables(tunables);
        let session_id = generate_session_id(|candidate| sessions.contains_key(candidate));
        let now = Utc::now();
        let session = Arc::new(SessionRecord {
            session_id: session_id.clone(),
            speaker_connection_id: speaker_connection_id.clone(),
            source_language,
            tunables,
            created_at: now,
            expires_at: now + ChronoDuration::seconds(self.config.max_lifetime_secs as i64),
            active: AtomicBool::new(true),
            listener_count: AtomicU32::new(0),
            control: Mutex::new(BroadcastControl::default()),
            listeners: Mutex::new(HashMap::new()),
        });
        sessions.insert(session_id.clone(), session.clone());
        drop(sessions);

        if let Some(mut record) = self.connections.get_mut(speaker_connection_id) {
            record.role = Role::Speaker;
            record.session_id = Some(session_id.clone());
        }

        tracing::info!(
            session_id = %session_id,
            speaker = %speaker_connection_id,
            source_language = %session.source_language,
            "session created"
        );
        metrics::gauge!("active_sessions").increment(1.0);
        Ok(session)
    }

    /// Join a listener to a session, atomically incrementing the listener
    /// count against the capacity bound.
    pub fn join_session(
        &self,
        listener_connection_id: &ConnectionId,
        session_id: &SessionId,
        target_language: LanguageTag,
    ) -> Result<(Arc<SessionRecord>, u32), Error> {
        if !self.supported_languages.contains(&target_language) {
            return Err(Error::protocol(
                ErrorCode::UnsupportedLanguage,
                format!("no voice available for language {target_language}"),
            ));
        }

        let session = self
            .session(session_id)
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "no such session"))?;
        if !session.is_active() {
            return Err(Error::protocol(ErrorCode::SessionInactive, "session has ended"));
        }

        let record = self
            .connections
            .get(listener_connection_id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "unknown connection"))?;
        if record.role == Role::Speaker {
            return Err(Error::protocol(
                ErrorCode::InvalidRole,
                "speakers cannot join as listeners",
            ));
        }
        // Re-joining moves the listener: leave the previous session first.
        if let Some(previous) = record.session_id.clone() {
            if &previous != session_id {
                self.leave_session(listener_connection_id, &previous);
            }
        }

        let max = self.config.max_listeners;
        let count = {
            let mut index = session.listeners.lock();
            let count = session
                .listener_count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    (current < max).then_some(current + 1)
                })
                .map_err(|_| {
                    Error::protocol(ErrorCode::SessionAtCapacity, "listener capacity reached")
                })?
                + 1;
            index
                .entry(target_language.clone())
                .or_default()
                .insert(listener_connection_id.clone());
            count
        };

        if let Some(mut record) = self.connections.get_mut(listener_connection_id) {
            record.role = Role::Listener;
            record.session_id = Some(session_id.clone());
            record.target_language = Some(target_language.clone());
        }

        tracing::info!(
            session_id = %session_id,
            listener = %listener_connection_id,
            target_language = %target_language,
            listener_count = count,
            "listener joined"
        );
        Ok((session, count))
    }

    /// Switch a listener's target language.
    pub fn retarget(
        &self,
        listener_connection_id: &ConnectionId,
        new_language: LanguageTag,
    ) -> Result<LanguageTag, Error> {
        if !self.supported_languages.contains(&new_language) {
            return Err(Error::protocol(
                ErrorCode::UnsupportedLanguage,
                format!("no voice available for language {new_language}"),
            ));
        }
        let record = self
            .connections
            .get(listener_connection_id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "unknown connection"))?;
        if record.role != Role::Listener {
            return Err(Error::protocol(
                ErrorCode::InvalidRole,
                "only listeners change language",
            ));
        }
        let session_id = record
            .session_id
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "not joined to a session"))?;
        let session = self
            .session(&session_id)
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "no such session"))?;

        {
            let mut index = session.listeners.lock();
            if let Some(old) = &record.target_language {
                if let Some(set) = index.get_mut(old) {
                    set.remove(listener_connection_id);
                    if set.is_empty() {
                        index.remove(old);
                    }
                }
            }
            index
                .entry(new_language.clone())
                .or_default()
                .insert(listener_connection_id.clone());
        }

        if let Some(mut record) = self.connections.get_mut(listener_connection_id) {
            record.target_language = Some(new_language.clone());
        }
        Ok(new_language)
    }

    /// Drop a connection. Idempotent: a second disconnect is a no-op.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> DisconnectOutcome {
        let Some((_, record)) = self.connections.remove(connection_id) else {
            return DisconnectOutcome::None;
        };

        match record.role {
            Role::Speaker => {
                let Some(session_id) = record.session_id else {
                    return DisconnectOutcome::None;
                };
                let Some(session) = self.sessions.write().remove(&session_id) else {
                    return DisconnectOutcome::None;
                };
                session.close();
                metrics::gauge!("active_sessions").decrement(1.0);
                let listeners = session.listener_connections();
                // Listener connections stay attached; they may join another
                // session.
                for listener in &listeners {
                    if let Some(mut conn) = self.connections.get_mut(listener) {
                        conn.session_id = None;
                        conn.target_language = None;
                    }
                }
                tracing::info!(
                    session_id = %session_id,
                    listeners = listeners.len(),
                    "speaker disconnected, session ended"
                );
                DisconnectOutcome::SpeakerLeft { session, listeners }
            }
            Role::Listener => {
                let Some(session_id) = record.session_id else {
                    return DisconnectOutcome::None;
                };
                let Some(session) = self.session(&session_id) else {
                    return DisconnectOutcome::None;
                };
                let remaining = self.remove_listener(&session, connection_id, record.target_language.as_ref());
                DisconnectOutcome::ListenerLeft {
                    session_id,
                    remaining,
                }
            }
            Role::Unauthenticated => DisconnectOutcome::None,
        }
    }

    /// Remove a session whose runtime failed to start, unbinding the
    /// speaker connection so it can retry.
    pub fn fail_session(&self, session_id: &SessionId) {
        if let Some(session) = self.sessions.write().remove(session_id) {
            session.close();
            metrics::gauge!("active_sessions").decrement(1.0);
            if let Some(mut record) = self.connections.get_mut(&session.speaker_connection_id) {
                record.role = Role::Unauthenticated;
                record.session_id = None;
            }
            tracing::warn!(session_id = %session_id, "session removed after runtime failure");
        }
    }

    /// Update broadcast state from a speaker control frame.
    pub fn update_control(
        &self,
        session_id: &SessionId,
        action: BroadcastAction,
        volume: Option<f32>,
    ) -> Result<BroadcastControl, Error> {
        let session = self
            .session(session_id)
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "no such session"))?;
        let mut control = session.control.lock();
        match action {
            BroadcastAction::Pause => control.paused = true,
            BroadcastAction::Resume => control.paused = false,
            BroadcastAction::Mute => control.muted = true,
            BroadcastAction::Unmute => control.muted = false,
        }
        if let Some(volume) = volume {
            control.volume = volume.clamp(0.0, 2.0);
        }
        Ok(*control)
    }

    /// Session status for the speaker's status frame.
    pub fn describe(&self, session_id: &SessionId) -> Result<babelcast_core::ServerFrame, Error> {
        let session = self
            .session(session_id)
            .ok_or_else(|| Error::protocol(ErrorCode::SessionNotFound, "no such session"))?;
        let distribution: HashMap<String, u32> = session
            .listeners
            .lock()
            .iter()
            .map(|(lang, conns)| (lang.to_string(), conns.len() as u32))
            .collect();
        Ok(babelcast_core::ServerFrame::SessionStatus {
            session_id: session_id.clone(),
            active: session.is_active(),
            listener_count: session.listener_count(),
            language_distribution: distribution,
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
    }

    /// Sweep idle connections and expired or speakerless sessions. Run on
    /// a cadence of at least one minute.
    pub fn reap_idle(&self, now: Instant, wall: DateTime<Utc>) -> ReapReport {
        let mut report = ReapReport::default();
        let idle_cutoff = Duration::from_secs(self.config.idle_timeout_secs);

        let idle: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|r| now.duration_since(r.last_activity_at) > idle_cutoff)
            .map(|r| r.connection_id.clone())
            .collect();
        for connection_id in idle {
            tracing::info!(connection_id = %connection_id, "reaping idle connection");
            if let DisconnectOutcome::SpeakerLeft { session, listeners } =
                self.disconnect(&connection_id)
            {
                report.ended_sessions.push((session, listeners));
            }
            report.idle_connections.push(connection_id);
        }

        let stale: Vec<Arc<SessionRecord>> = {
            let sessions = self.sessions.read();
            sessions
                .values()
                .filter(|s| {
                    s.expires_at <= wall || !self.connections.contains_key(&s.speaker_connection_id)
                })
                .cloned()
                .collect()
        };
        for session in stale {
            let mut sessions = self.sessions.write();
            if sessions.remove(&session.session_id).is_some() {
                session.close();
                metrics::gauge!("active_sessions").decrement(1.0);
                drop(sessions);
                let listeners = session.listener_connections();
                for listener in &listeners {
                    if let Some(mut conn) = self.connections.get_mut(listener) {
                        conn.session_id = None;
                        conn.target_language = None;
                    }
                }
                tracing::info!(session_id = %session.session_id, "reaping expired session");
                report.ended_sessions.push((session, listeners));
            }
        }

        report
    }

    fn leave_session(&self, connection_id: &ConnectionId, session_id: &SessionId) {
        if let Some(session) = self.session(session_id) {
            let language = self
                .connections
                .get(connection_id)
                .and_then(|r| r.target_language.clone());
            self.remove_listener(&session, connection_id, language.as_ref());
        }
    }

    /// Remove a listener from the index and conditionally decrement the
    /// count. A decrement below zero is swallowed: the count stays zero.
    fn remove_listener(
        &self,
        session: &SessionRecord,
        connection_id: &ConnectionId,
        language: Option<&LanguageTag>,
    ) -> u32 {
        let mut index = session.listeners.lock();
        let mut present = false;
        match language {
            Some(lang) => {
                if let Some(set) = index.get_mut(lang) {
                    present = set.remove(connection_id);
                    if set.is_empty() {
                        index.remove(lang);
                    }
                }
            }
            None => {
                for set in index.values_mut() {
                    present |= set.remove(connection_id);
                }
                index.retain(|_, set| !set.is_empty());
            }
        }

        if present {
            let updated = session
                .listener_count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    (current >= 1).then(|| current - 1)
                });
            match updated {
                Ok(previous) => previous - 1,
                Err(_) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        "listener count already zero on decrement"
                    );
                    0
                }
            }
        } else {
            session.listener_count()
        }
    }
}

fn clamp_tunables(tunables: SessionTunables) -> SessionTunables {
    let clamped = SessionTunables {
        partial_results_enabled: tunables.partial_results_enabled,
        min_stability_threshold: tunables.min_stability_threshold.clamp(
            session_consts::MIN_STABILITY_LOW,
            session_consts::MIN_STABILITY_HIGH,
        ),
        max_buffer_timeout_secs: tunables.max_buffer_timeout_secs.clamp(
            session_consts::BUFFER_TIMEOUT_LOW_SECS,
            session_consts::BUFFER_TIMEOUT_HIGH_SECS,
        ),
    };
    if clamped.min_stability_threshold != tunables.min_stability_threshold
        || clamped.max_buffer_timeout_secs != tunables.max_buffer_timeout_secs
    {
        tracing::warn!(
            requested_stability = tunables.min_stability_threshold,
            requested_timeout = tunables.max_buffer_timeout_secs,
            "session tunables out of bounds, clamped"
        );
    }
    clamped
}

#[async_trait]
impl ListenerDirectory for SessionDirectory {
    fn listeners_by_language(
        &self,
        session_id: &SessionId,
    ) -> HashMap<LanguageTag, Vec<ConnectionId>> {
        match self.session(session_id) {
            Some(session) => session
                .listeners
                .lock()
                .iter()
                .map(|(lang, conns)| (lang.clone(), conns.iter().cloned().collect()))
                .collect(),
            None => HashMap::new(),
        }
    }

    fn broadcast_control(&self, session_id: &SessionId) -> BroadcastControl {
        self.session(session_id)
            .map(|s| s.control())
            .unwrap_or_default()
    }

    async fn remove_connection(&self, connection_id: &ConnectionId) {
        self.disconnect(connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> SessionDirectory {
        SessionDirectory::new(
            SessionConfig::default(),
            babelcast_translation::supported_languages(),
        )
    }

    fn attach(dir: &SessionDirectory, id: &str) -> ConnectionId {
        let id = id.to_string();
        dir.attach(&id, Instant::now());
        id
    }

    fn en() -> LanguageTag {
        LanguageTag::parse("en").unwrap()
    }

    fn es() -> LanguageTag {
        LanguageTag::parse("es").unwrap()
    }

    #[test]
    fn create_join_disconnect_round_trip() {
        let dir = directory();
        let speaker = attach(&dir, "speaker");
        let listener = attach(&dir, "listener");

        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();
        assert_eq!(session.listener_count(), 0);

        let (_, count) = dir
            .join_session(&listener, &session.session_id, es())
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(session.listener_count(), 1);

        match dir.disconnect(&listener) {
            DisconnectOutcome::ListenerLeft { remaining, .. } => assert_eq!(remaining, 0),
            _ => panic!("expected listener outcome"),
        }
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn double_disconnect_never_goes_negative() {
        let dir = directory();
        let speaker = attach(&dir, "speaker");
        let listener = attach(&dir, "listener");
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();
        dir.join_session(&listener, &session.session_id, es()).unwrap();

        dir.disconnect(&listener);
        // Second disconnect of the same connection is a no-op.
        match dir.disconnect(&listener) {
            DisconnectOutcome::None => {}
            _ => panic!("second disconnect must be idempotent"),
        }
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn join_unknown_session_fails() {
        let dir = directory();
        let listener = attach(&dir, "listener");
        let err = dir
            .join_session(&listener, &"no-such-session-1".to_string(), es())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
    }

    #[test]
    fn join_unsupported_language_fails() {
        let dir = directory();
        let speaker = attach(&dir, "speaker");
        let listener = attach(&dir, "listener");
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();

        let err = dir
            .join_session(
                &listener,
                &session.session_id,
                LanguageTag::parse("xx").unwrap(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedLanguage);
    }

    #[test]
    fn listener_capacity_is_enforced() {
        let mut config = SessionConfig::default();
        config.max_listeners = 2;
        let dir = SessionDirectory::new(config, babelcast_translation::supported_languages());
        let speaker = attach(&dir, "speaker");
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();

        for i in 0..2 {
            let listener = attach(&dir, &format!("listener-{i}"));
            dir.join_session(&listener, &session.session_id, es()).unwrap();
        }
        let overflow = attach(&dir, "listener-overflow");
        let err = dir
            .join_session(&overflow, &session.session_id, es())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionAtCapacity);
        assert_eq!(session.listener_count(), 2);
    }

    #[test]
    fn speaker_disconnect_ends_session_and_lists_listeners() {
        let dir = directory();
        let speaker = attach(&dir, "speaker");
        let l1 = attach(&dir, "l1");
        let l2 = attach(&dir, "l2");
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();
        dir.join_session(&l1, &session.session_id, es()).unwrap();
        dir.join_session(&l2, &session.session_id, LanguageTag::parse("fr").unwrap())
            .unwrap();

        match dir.disconnect(&speaker) {
            DisconnectOutcome::SpeakerLeft { session, listeners } => {
                assert!(!session.is_active());
                assert_eq!(listeners.len(), 2);
            }
            _ => panic!("expected speaker outcome"),
        }
        assert!(dir.session(&session.session_id).is_none());
    }

    #[test]
    fn secondary_index_groups_by_language() {
        let dir = directory();
        let speaker = attach(&dir, "speaker");
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();
        for i in 0..3 {
            let listener = attach(&dir, &format!("es-{i}"));
            dir.join_session(&listener, &session.session_id, es()).unwrap();
        }
        let fr_listener = attach(&dir, "fr-0");
        dir.join_session(&fr_listener, &session.session_id, LanguageTag::parse("fr").unwrap())
            .unwrap();

        let by_language = dir.listeners_by_language(&session.session_id);
        assert_eq!(by_language[&es()].len(), 3);
        assert_eq!(by_language[&LanguageTag::parse("fr").unwrap()].len(), 1);
    }

    #[test]
    fn retarget_moves_index_entry() {
        let dir = directory();
        let speaker = attach(&dir, "speaker");
        let listener = attach(&dir, "listener");
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();
        dir.join_session(&listener, &session.session_id, es()).unwrap();

        dir.retarget(&listener, LanguageTag::parse("fr").unwrap()).unwrap();

        let by_language = dir.listeners_by_language(&session.session_id);
        assert!(!by_language.contains_key(&es()));
        assert_eq!(by_language[&LanguageTag::parse("fr").unwrap()].len(), 1);
        // Count unchanged by a language switch.
        assert_eq!(session.listener_count(), 1);
    }

    #[test]
    fn tunables_are_clamped_into_contract() {
        let dir = directory();
        let speaker = attach(&dir, "speaker");
        let session = dir
            .create_session(
                &speaker,
                en(),
                SessionTunables {
                    partial_results_enabled: true,
                    min_stability_threshold: 0.2,
                    max_buffer_timeout_secs: 60.0,
                },
            )
            .unwrap();
        assert_eq!(session.tunables.min_stability_threshold, 0.70);
        assert_eq!(session.tunables.max_buffer_timeout_secs, 10.0);
    }

    #[test]
    fn idle_connections_are_reaped() {
        let mut config = SessionConfig::default();
        config.idle_timeout_secs = 600;
        let dir = SessionDirectory::new(config, babelcast_translation::supported_languages());
        let t0 = Instant::now();
        let speaker = "speaker".to_string();
        dir.attach(&speaker, t0);
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();

        // Eleven minutes later with no activity the connection goes, and
        // the speakerless session with it.
        let report = dir.reap_idle(t0 + Duration::from_secs(660), Utc::now());
        assert_eq!(report.idle_connections, vec![speaker]);
        assert_eq!(report.ended_sessions.len(), 1);
        assert!(dir.session(&session.session_id).is_none());
    }

    #[test]
    fn expired_sessions_are_reaped() {
        let dir = directory();
        let t0 = Instant::now();
        let speaker = "speaker".to_string();
        dir.attach(&speaker, t0);
        let session = dir
            .create_session(&speaker, en(), SessionTunables::default())
            .unwrap();

        // Wall clock past expiry, connection still fresh.
        let future = Utc::now() + ChronoDuration::hours(3);
        let report = dir.reap_idle(t0, future);
        assert_eq!(report.ended_sessions.len(), 1);
        assert!(dir.session(&session.session_id).is_none());
    }
}
