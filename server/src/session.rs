//! Connected-client sessions and their input queues.
//!
//! A session's input queue is the one structure both the receive path and the
//! tick loop touch, so it carries its own lock. Queuing never waits for the
//! world; the tick loop drains whatever is due when it gets there.

use dashmap::DashMap;
use log::info;
use parking_lot::Mutex;
use shared::InputFrame;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Session {
    id: u32,
    player_id: u32,
    name: String,
    inputs: Mutex<Vec<InputFrame>>,
    last_ack_tick: AtomicU64,
    connected_at: Instant,
}

impl Session {
    pub fn new(id: u32, player_id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            player_id,
            name: name.into(),
            inputs: Mutex::new(Vec::new()),
            last_ack_tick: AtomicU64::new(0),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn queue_input(&self, frame: InputFrame) {
        self.inputs.lock().push(frame);
    }

    pub fn pending_inputs(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Removes and returns every queued frame with `tick <= up_to`, in the
    /// order they were queued. Later frames stay queued.
    pub fn drain_inputs(&self, up_to: u64) -> Vec<InputFrame> {
        let mut inputs = self.inputs.lock();
        let (due, later): (Vec<_>, Vec<_>) = inputs.drain(..).partition(|f| f.tick <= up_to);
        *inputs = later;
        due
    }

    /// The frame to apply this tick: the highest tick among those due, the
    /// most recently queued one on ties.
    pub fn drain_latest(&self, up_to: u64) -> Option<InputFrame> {
        self.drain_inputs(up_to)
            .into_iter()
            .max_by_key(|frame| frame.tick)
    }

    /// Records the newest state tick the client confirmed. Never moves back.
    pub fn acknowledge(&self, tick: u64) {
        self.last_ack_tick.fetch_max(tick, Ordering::AcqRel);
    }

    pub fn last_ack_tick(&self) -> u64 {
        self.last_ack_tick.load(Ordering::Acquire)
    }
}

/// Sessions keyed by id. Add and remove are O(1) and safe alongside the tick loop.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<u32, Arc<Session>>,
    next_session_id: AtomicU32,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_session_id: AtomicU32::new(1),
            max_sessions,
        }
    }

    pub fn next_session_id(&self) -> u32 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Registers a session. Returns `false` when at capacity or the id is taken.
    pub fn add(&self, session: Arc<Session>) -> bool {
        if self.is_full() || self.sessions.contains_key(&session.id()) {
            return false;
        }
        info!(
            "Session {} joined as player {} ({})",
            session.id(),
            session.player_id(),
            session.name()
        );
        self.sessions.insert(session.id(), session);
        true
    }

    /// Unregisters a session; its undrained input goes with it.
    pub fn remove(&self, session_id: u32) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(&session_id)?;
        info!(
            "Session {} left ({} queued inputs dropped)",
            session_id,
            session.pending_inputs()
        );
        Some(session)
    }

    pub fn get(&self, session_id: u32) -> Option<Arc<Session>> {
        self.sessions.get(&session_id).map(|s| Arc::clone(s.value()))
    }

    /// Lowest player id in `1..` not used by a registered session.
    pub fn free_player_id(&self) -> u32 {
        let mut used: Vec<u32> = self.sessions.iter().map(|s| s.player_id()).collect();
        used.sort_unstable();
        let mut candidate = 1;
        for id in used {
            if id == candidate {
                candidate += 1;
            } else if id > candidate {
                break;
            }
        }
        candidate
    }

    /// Registered sessions ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        sessions.sort_by_key(|s| s.id());
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
