//! Routes joins to room actors, materializing rooms on first use and
//! retiring them once they have sat empty past the idle TTL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use parley_common::RoomError;

use super::actor::{RoomCommand, RoomHandle, RoomReport};
use super::ServerServices;
use crate::peers::PeerTx;
use crate::protocol::JoinRequest;
use crate::types::{Peer, RoomConfig};

type PeerReply = oneshot::Receiver<Result<Peer, RoomError>>;
type JoinReply = oneshot::Sender<Result<(RoomHandle, PeerReply), RoomError>>;

struct PendingJoin {
    request: JoinRequest,
    tx: PeerTx,
    reply: JoinReply,
}

enum RegistryCommand {
    Join {
        request: JoinRequest,
        tx: PeerTx,
        reply: JoinReply,
    },
    Materialized {
        room_id: String,
        config: RoomConfig,
    },
    CloseRoom {
        room_id: String,
        reason: String,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms: usize,
    pub materializing: usize,
    pub participants: u32,
}

/// Cloneable front door to the registry task.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<RegistryCommand>,
}

impl RegistryHandle {
    /// Join `request.room_id`, creating the room if needed.
    ///
    /// `tx` becomes the peer's outbound queue; the room's `room:joined`
    /// snapshot is the first message placed on it.
    pub async fn join(
        &self,
        request: JoinRequest,
        tx: PeerTx,
    ) -> Result<(RoomHandle, Peer), RoomError> {
        let (reply, routed) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Join { request, tx, reply })
            .map_err(|_| RoomError::RoomUnavailable)?;
        let (room, joined) = routed.await.map_err(|_| RoomError::RoomUnavailable)??;
        let peer = joined.await.map_err(|_| RoomError::RoomUnavailable)??;
        Ok((room, peer))
    }

    /// Close a room for good: members get `room:closed`, later joins
    /// get `ROOM_CLOSED`.
    pub fn close_room(&self, room_id: &str, reason: &str) {
        let _ = self.tx.send(RegistryCommand::CloseRoom {
            room_id: room_id.to_string(),
            reason: reason.to_string(),
        });
    }

    pub async fn stats(&self) -> RegistryStats {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RegistryCommand::Stats { reply }).is_err() {
            return RegistryStats::default();
        }
        rx.await.unwrap_or_default()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(RegistryCommand::Shutdown);
    }
}

struct RoomEntry {
    handle: RoomHandle,
    /// Joins sent to the room.
    routed: u64,
    /// Joins the room reports having handled.
    processed: u64,
    occupancy: u32,
    empty_since: Option<Instant>,
}

impl RoomEntry {
    fn is_idle(&self, now: Instant, ttl: std::time::Duration) -> bool {
        self.occupancy == 0
            && self.processed >= self.routed
            && self
                .empty_since
                .is_some_and(|since| now.duration_since(since) >= ttl)
    }
}

pub struct Registry {
    services: ServerServices,
    rooms: HashMap<String, RoomEntry>,
    materializing: HashMap<String, Vec<PendingJoin>>,
    closed: HashSet<String>,
    tx: mpsc::UnboundedSender<RegistryCommand>,
    rx: mpsc::UnboundedReceiver<RegistryCommand>,
    reports_tx: mpsc::UnboundedSender<RoomReport>,
    reports: mpsc::UnboundedReceiver<RoomReport>,
}

impl Registry {
    pub fn spawn(services: ServerServices) -> RegistryHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let registry = Self {
            services,
            rooms: HashMap::new(),
            materializing: HashMap::new(),
            closed: HashSet::new(),
            tx: tx.clone(),
            rx,
            reports_tx,
            reports,
        };
        tokio::spawn(registry.run());
        RegistryHandle { tx }
    }

    async fn run(mut self) {
        let mut reaper = tokio::time::interval(self.services.settings.reaper_interval);
        reaper.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(RegistryCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(report) = self.reports.recv() => self.report(report),
                _ = reaper.tick() => self.reap(),
            }
        }

        for (room_id, entry) in self.rooms.drain() {
            debug!(room_id = %room_id, "Stopping room");
            let _ = entry.handle.send(RoomCommand::Shutdown);
        }
        info!("Room registry stopped");
    }

    fn handle(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::Join { request, tx, reply } => {
                self.join(PendingJoin { request, tx, reply })
            }
            RegistryCommand::Materialized { room_id, config } => {
                let Some(pending) = self.materializing.remove(&room_id) else {
                    return;
                };
                if config.closed {
                    self.closed.insert(room_id.clone());
                }
                if self.closed.contains(&room_id) {
                    for join in pending {
                        let _ = join.reply.send(Err(RoomError::RoomClosed));
                    }
                    return;
                }
                let handle = RoomHandle::spawn(
                    &room_id,
                    &config,
                    self.services.clone(),
                    self.reports_tx.clone(),
                );
                info!(room_id = %room_id, name = %config.name, "Room materialized");
                self.rooms.insert(
                    room_id,
                    RoomEntry {
                        handle,
                        routed: 0,
                        processed: 0,
                        occupancy: 0,
                        empty_since: Some(Instant::now()),
                    },
                );
                for join in pending {
                    self.join(join);
                }
            }
            RegistryCommand::CloseRoom { room_id, reason } => {
                self.closed.insert(room_id.clone());
                if let Some(entry) = self.rooms.get(&room_id) {
                    let _ = entry.handle.send(RoomCommand::Close { reason });
                }
                if let Some(pending) = self.materializing.remove(&room_id) {
                    for join in pending {
                        let _ = join.reply.send(Err(RoomError::RoomClosed));
                    }
                }
            }
            RegistryCommand::Stats { reply } => {
                let _ = reply.send(RegistryStats {
                    rooms: self.rooms.len(),
                    materializing: self.materializing.len(),
                    participants: self.rooms.values().map(|e| e.occupancy).sum(),
                });
            }
            RegistryCommand::Shutdown => {}
        }
    }

    fn join(&mut self, join: PendingJoin) {
        let room_id = join.request.room_id.clone();
        if self.closed.contains(&room_id) {
            let _ = join.reply.send(Err(RoomError::RoomClosed));
            return;
        }

        if let Some(entry) = self.rooms.get_mut(&room_id) {
            let (peer_reply, peer_rx) = oneshot::channel();
            let command = RoomCommand::Join {
                display_name: join.request.display_name,
                avatar: join.request.avatar,
                peer_id: join.request.peer_id,
                tx: join.tx,
                reply: peer_reply,
            };
            if entry.handle.send(command).is_err() {
                warn!(room_id = %room_id, "Room stopped unexpectedly");
                self.rooms.remove(&room_id);
                let _ = join.reply.send(Err(RoomError::RoomUnavailable));
                return;
            }
            entry.routed += 1;
            let _ = join.reply.send(Ok((entry.handle.clone(), peer_rx)));
            return;
        }

        let first = !self.materializing.contains_key(&room_id);
        self.materializing.entry(room_id.clone()).or_default().push(join);
        if first {
            self.materialize(room_id);
        }
    }

    fn materialize(&self, room_id: String) {
        let source = Arc::clone(&self.services.source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let config = match source.fetch(&room_id).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(room_id = %room_id, error = %e, "Room config unavailable; using defaults");
                    RoomConfig::default()
                }
            };
            let _ = tx.send(RegistryCommand::Materialized { room_id, config });
        });
    }

    fn report(&mut self, report: RoomReport) {
        match report {
            RoomReport::Occupancy {
                room_id,
                count,
                joins_processed,
            } => {
                if let Some(entry) = self.rooms.get_mut(&room_id) {
                    entry.occupancy = count;
                    entry.processed = joins_processed;
                    if count == 0 {
                        entry.empty_since.get_or_insert_with(Instant::now);
                    } else {
                        entry.empty_since = None;
                    }
                }
            }
            RoomReport::Stopped { room_id } => {
                if self
                    .rooms
                    .get(&room_id)
                    .is_some_and(|e| e.handle.is_stopped())
                {
                    self.rooms.remove(&room_id);
                }
            }
        }
    }

    fn reap(&mut self) {
        let now = Instant::now();
        let ttl = self.services.settings.room_idle_ttl;
        let idle: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, e)| e.is_idle(now, ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for room_id in idle {
            if let Some(entry) = self.rooms.remove(&room_id) {
                info!(room_id = %room_id, "Reaping idle room");
                let _ = entry.handle.send(RoomCommand::Shutdown);
            }
        }
    }
}
