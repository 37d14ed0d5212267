//! Connection registry and send primitives.
//!
//! Sessions hand out a bounded broadcast queue; a receiver that falls more
//! than the queue depth behind loses the oldest frames first. Channel
//! subscriptions and notification rules outlive individual sockets for the
//! process lifetime, so reconnecting clients keep their state.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sentinel_common::types::NotificationRule;

use crate::messages::ServerMessage;

/// Per-session outbound queue depth.
pub const SESSION_QUEUE: usize = 256;

struct Session {
    sender: broadcast::Sender<ServerMessage>,
}

#[derive(Default)]
struct HubState {
    /// user id → live sessions
    connections: HashMap<i64, HashMap<Uuid, Session>>,
    /// user id → subscribed channels (survives reconnects)
    channels: HashMap<i64, HashSet<String>>,
    rules: HashMap<i64, Vec<NotificationRule>>,
    /// task id → user watching its progress
    progress_watchers: HashMap<String, i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HubStats {
    pub active_users: usize,
    pub total_connections: usize,
    pub total_rules: usize,
    pub channels: Vec<String>,
}

#[derive(Default)]
pub struct Hub {
    state: RwLock<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and auto-subscribe the user to their personal
    /// channel. Returns the session id and the frame receiver; the
    /// connection-established frame is already queued on it.
    pub async fn attach(&self, user_id: i64) -> (Uuid, broadcast::Receiver<ServerMessage>) {
        let session_id = Uuid::new_v4();
        let (sender, receiver) = broadcast::channel(SESSION_QUEUE);

        let mut state = self.state.write().await;
        state
            .connections
            .entry(user_id)
            .or_default()
            .insert(session_id, Session { sender: sender.clone() });
        state
            .channels
            .entry(user_id)
            .or_default()
            .insert(personal_channel(user_id));
        drop(state);

        let _ = sender.send(ServerMessage::ConnectionEstablished {
            user_id,
            session_id,
            timestamp: Utc::now(),
        });
        info!(user_id, %session_id, "realtime session attached");
        (session_id, receiver)
    }

    /// Remove one session. Channel subscriptions and rules stay behind.
    pub async fn detach(&self, user_id: i64, session_id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(sessions) = state.connections.get_mut(&user_id) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                state.connections.remove(&user_id);
            }
        }
        info!(user_id, %session_id, "realtime session detached");
    }

    pub async fn subscribe_channel(&self, user_id: i64, channel: &str) {
        let mut state = self.state.write().await;
        state
            .channels
            .entry(user_id)
            .or_default()
            .insert(channel.to_string());
        debug!(user_id, channel, "channel subscribed");
    }

    pub async fn unsubscribe_channel(&self, user_id: i64, channel: &str) {
        let mut state = self.state.write().await;
        if let Some(channels) = state.channels.get_mut(&user_id) {
            channels.remove(channel);
        }
        debug!(user_id, channel, "channel unsubscribed");
    }

    pub async fn user_channels(&self, user_id: i64) -> Vec<String> {
        let state = self.state.read().await;
        state
            .channels
            .get(&user_id)
            .map(|set| {
                let mut list: Vec<String> = set.iter().cloned().collect();
                list.sort();
                list
            })
            .unwrap_or_default()
    }

    /// Send to every session of a user. Sessions whose receiver is gone are
    /// discovered here and removed. Returns delivered session count.
    pub async fn send_personal(&self, user_id: i64, message: ServerMessage) -> usize {
        let mut state = self.state.write().await;
        let Some(sessions) = state.connections.get_mut(&user_id) else {
            return 0;
        };
        let mut delivered = 0;
        let mut broken = Vec::new();
        for (session_id, session) in sessions.iter() {
            match session.sender.send(message.clone()) {
                Ok(_) => delivered += 1,
                Err(_) => broken.push(*session_id),
            }
        }
        for session_id in broken {
            warn!(user_id, %session_id, "dropping broken session on send");
            sessions.remove(&session_id);
        }
        if sessions.is_empty() {
            state.connections.remove(&user_id);
        }
        delivered
    }

    pub async fn send_to_session(
        &self,
        user_id: i64,
        session_id: Uuid,
        message: ServerMessage,
    ) -> bool {
        let state = self.state.read().await;
        state
            .connections
            .get(&user_id)
            .and_then(|sessions| sessions.get(&session_id))
            .map(|session| session.sender.send(message).is_ok())
            .unwrap_or(false)
    }

    /// Best-effort broadcast to every user subscribed to a channel.
    pub async fn broadcast_channel(&self, channel: &str, message: ServerMessage) -> usize {
        let targets: Vec<i64> = {
            let state = self.state.read().await;
            state
                .channels
                .iter()
                .filter(|(_, channels)| channels.contains(channel))
                .map(|(user_id, _)| *user_id)
                .collect()
        };
        let mut delivered = 0;
        for user_id in &targets {
            delivered += self.send_personal(*user_id, message.clone()).await;
        }
        debug!(channel, users = targets.len(), delivered, "channel broadcast");
        delivered
    }

    /// System announcement: every connected user.
    pub async fn announce(&self, message: ServerMessage) -> usize {
        let targets: Vec<i64> = {
            let state = self.state.read().await;
            state.connections.keys().copied().collect()
        };
        let mut delivered = 0;
        for user_id in targets {
            delivered += self.send_personal(user_id, message.clone()).await;
        }
        delivered
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.state.read().await;
        let mut channels: HashSet<String> = HashSet::new();
        for set in state.channels.values() {
            channels.extend(set.iter().cloned());
        }
        let mut channels: Vec<String> = channels.into_iter().collect();
        channels.sort();
        HubStats {
            active_users: state.connections.len(),
            total_connections: state.connections.values().map(HashMap::len).sum(),
            total_rules: state.rules.values().map(Vec::len).sum(),
            channels,
        }
    }

    // -- notification rules ------------------------------------------------

    pub async fn add_rule(&self, rule: NotificationRule) {
        let mut state = self.state.write().await;
        state.rules.entry(rule.owner_user_id).or_default().push(rule);
    }

    pub async fn remove_rule(&self, user_id: i64, rule_id: &str) -> bool {
        let mut state = self.state.write().await;
        if let Some(rules) = state.rules.get_mut(&user_id) {
            let before = rules.len();
            rules.retain(|rule| rule.id != rule_id);
            return rules.len() < before;
        }
        false
    }

    pub async fn rules_for(&self, user_id: i64) -> Vec<NotificationRule> {
        let state = self.state.read().await;
        state.rules.get(&user_id).cloned().unwrap_or_default()
    }

    // -- task progress -----------------------------------------------------

    pub async fn watch_progress(&self, task_id: &str, user_id: i64) {
        let mut state = self.state.write().await;
        state.progress_watchers.insert(task_id.to_string(), user_id);
    }

    pub async fn unwatch_progress(&self, task_id: &str) {
        let mut state = self.state.write().await;
        state.progress_watchers.remove(task_id);
    }

    /// Push a progress frame to whoever watches the task. Terminal updates
    /// (100% or cancellation) clear the watcher entry.
    pub async fn push_progress(
        &self,
        task_id: &str,
        progress: u8,
        status: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) {
        let watcher = {
            let state = self.state.read().await;
            state.progress_watchers.get(task_id).copied()
        };
        let Some(user_id) = watcher else { return };
        self.send_personal(
            user_id,
            ServerMessage::ProgressUpdate {
                task_id: task_id.to_string(),
                progress: progress.min(100),
                status: status.to_string(),
                message: message.to_string(),
                data,
                timestamp: Utc::now(),
            },
        )
        .await;
        if progress >= 100 {
            self.unwatch_progress(task_id).await;
        }
    }

    pub async fn push_task_cancelled(&self, task_id: &str) {
        let watcher = {
            let state = self.state.read().await;
            state.progress_watchers.get(task_id).copied()
        };
        if let Some(user_id) = watcher {
            self.send_personal(
                user_id,
                ServerMessage::TaskCancelled {
                    task_id: task_id.to_string(),
                    timestamp: Utc::now(),
                },
            )
            .await;
            self.unwatch_progress(task_id).await;
        }
    }
}

pub fn personal_channel(user_id: i64) -> String {
    format!("user_{user_id}")
}

pub fn repository_channel(repo_ref: &str) -> String {
    format!("repository_{repo_ref}")
}
