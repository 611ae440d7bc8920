//! Session registry
//!
//! One entry per attached tab. `register` and `unregister` are the only
//! mutators; teardown of a session always goes through `unregister`, which
//! also purges the tab's paused exchanges and, unless the browser already
//! ended it, closes the protocol session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ipc::protocol::SessionInfo;

use super::adapter::ProtocolAdapter;
use super::channel::OutputChannel;
use super::ids::{ChannelId, TargetId};
use super::store::ExchangeStore;

/// An interception session on one tab
#[derive(Debug, Clone)]
pub struct Session {
    pub target: TargetId,
    /// Flat CDP session id commands are addressed to
    pub cdp_session_id: String,
    /// Where this tab's interception events go
    pub channel: OutputChannel,
    /// True while registered; a session the browser ends is unregistered
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(target: TargetId, cdp_session_id: String, channel: OutputChannel) -> Self {
        Self {
            target,
            cdp_session_id,
            channel,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            target: self.target.clone(),
            active: self.active,
            channel: self.channel.id().0,
            created_at: self.created_at,
        }
    }
}

/// How [`SessionRegistry::unregister`] treats the protocol session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Close the protocol session
    Detach,
    /// The browser already ended it; send nothing
    Forget,
}

/// Outcome of [`SessionRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyAttached,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<TargetId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session; an existing one for the same target is kept
    pub fn register(&mut self, session: Session) -> Registration {
        if self.sessions.contains_key(&session.target) {
            return Registration::AlreadyAttached;
        }
        tracing::debug!(tab = %session.target, channel = %session.channel.id(), "Session registered");
        self.sessions.insert(session.target.clone(), session);
        Registration::Registered
    }

    pub fn get(&self, target: &TargetId) -> Option<&Session> {
        self.sessions.get(target)
    }

    pub fn contains(&self, target: &TargetId) -> bool {
        self.sessions.contains_key(target)
    }

    /// Remove a session, purge its exchanges and release the protocol session
    ///
    /// Safe to call for targets that are not registered; the store is still
    /// cleared.
    pub async fn unregister(
        &mut self,
        target: &TargetId,
        teardown: Teardown,
        store: &mut ExchangeStore,
        adapter: &mut ProtocolAdapter,
    ) -> Option<Session> {
        let session = self.sessions.remove(target);
        let purged = store.clear(target);

        match (&session, teardown) {
            (Some(_), Teardown::Detach) => adapter.detach(target).await,
            (Some(_), Teardown::Forget) => {}
            (None, _) => tracing::debug!(tab = %target, "Unregister for unknown target"),
        }

        if session.is_some() {
            tracing::info!(tab = %target, purged = purged.len(), "Session ended");
        }
        session
    }

    /// Targets whose interception events go to the given channel
    pub fn targets_for_channel(&self, channel: ChannelId) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = self
            .sessions
            .values()
            .filter(|s| s.channel.id() == channel)
            .map(|s| s.target.clone())
            .collect();
        targets.sort();
        targets
    }

    /// Every registered target
    pub fn targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = self.sessions.keys().cloned().collect();
        targets.sort();
        targets
    }

    /// Snapshot for status reporting, oldest first
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.values().map(Session::info).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.target.cmp(&b.target)));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
