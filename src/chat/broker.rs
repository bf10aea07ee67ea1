//! Rooms keyed by request id.
//!
//! Each live connection owns a bounded outbound queue. Fan-out uses `try_send`, so a
//! member that stops reading only loses its own messages; the transcript in the
//! database stays complete and is what a reconnecting client reads back.
//!
//! Sends to one room are serialized, so members see pushes in transcript order.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::{
    db,
    error::{CoreError, CoreResult},
    identity::Role,
    locks::KeyedLocks,
    requests,
};

use super::msg::{self, ChatMessage};

pub type ConnectionId = Uuid;

const OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug)]
struct Member {
    tx: mpsc::Sender<ChatMessage>,
    rooms: HashSet<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ChatBroker {
    db_pool: SqlitePool,
    members: Arc<DashMap<ConnectionId, Member>>,
    rooms: Arc<DashMap<Uuid, HashSet<ConnectionId>>>,
    room_locks: KeyedLocks,
    /// Last timestamp handed out, in unix millis.
    clock: Arc<AtomicI64>,
}

/// A registered connection. Dropping it leaves every room it joined.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
    broker: ChatBroker,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.broker.leave(self.id);
    }
}

impl ChatBroker {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            members: Arc::default(),
            rooms: Arc::default(),
            room_locks: KeyedLocks::default(),
            clock: Arc::default(),
        }
    }

    pub fn connect(&self) -> (ConnectionGuard, mpsc::Receiver<ChatMessage>) {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.members.insert(id, Member { tx, rooms: HashSet::new() });
        tracing::debug!(connection = %id, "chat connection registered");

        (ConnectionGuard { id, broker: self.clone() }, rx)
    }

    pub fn join(&self, connection_id: ConnectionId, request_id: Uuid) -> CoreResult<()> {
        let mut member = self
            .members
            .get_mut(&connection_id)
            .ok_or_else(|| CoreError::not_found("Connection is not registered."))?;
        member.rooms.insert(request_id);
        self.rooms.entry(request_id).or_default().insert(connection_id);

        tracing::debug!(connection = %connection_id, %request_id, "joined room");
        Ok(())
    }

    /// Drops the connection from every room it is in. Unknown ids are ignored.
    pub fn leave(&self, connection_id: ConnectionId) {
        let Some((_, member)) = self.members.remove(&connection_id) else {
            return;
        };
        for request_id in member.rooms {
            self.rooms.remove_if_mut(&request_id, |_, connections| {
                connections.remove(&connection_id);
                connections.is_empty()
            });
        }
        tracing::debug!(connection = %connection_id, "left all rooms");
    }

    /// Appends to the transcript, then pushes to everyone in the room.
    pub async fn send(
        &self,
        request_id: Uuid,
        sender_role: Role,
        sender_name: &str,
        text: &str,
    ) -> CoreResult<ChatMessage> {
        if text.trim().is_empty() {
            return Err(CoreError::validation("Message text cannot be empty."));
        }
        if !requests::exists(&self.db_pool, request_id).await? {
            return Err(CoreError::not_found("Donation request not found."));
        }

        // stamp, append and push as one step per room
        let _room = self.room_locks.lock(request_id).await;
        let message = ChatMessage {
            id: Uuid::now_v7(),
            request_id,
            sender_role,
            sender_name: sender_name.to_owned(),
            text: text.to_owned(),
            timestamp: db::from_millis(self.tick())?,
        };
        msg::append(&self.db_pool, &message).await?;
        self.fan_out(&message);

        Ok(message)
    }

    pub async fn history(&self, request_id: Uuid) -> CoreResult<Vec<ChatMessage>> {
        Ok(msg::history(&self.db_pool, request_id).await?)
    }

    pub fn room_size(&self, request_id: Uuid) -> usize {
        self.rooms.get(&request_id).map_or(0, |connections| connections.len())
    }

    /// Wall-clock millis, never behind the previous tick.
    fn tick(&self) -> i64 {
        let now = db::to_millis(OffsetDateTime::now_utc());
        self.clock.fetch_max(now, Ordering::SeqCst).max(now)
    }

    fn fan_out(&self, message: &ChatMessage) {
        let Some(connections) = self
            .rooms
            .get(&message.request_id)
            .map(|c| c.value().clone())
        else {
            return;
        };

        for connection_id in connections {
            let Some(member) = self.members.get(&connection_id) else {
                continue;
            };
            match member.tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection = %connection_id,
                        request_id = %message.request_id,
                        "outbound queue full, message dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection = %connection_id, "outbound queue closed");
                }
            }
        }
    }
}
