//! Asynchronous master -> slave replication.
//!
//! Grounded on `examples/original_source/src/replication.cpp`'s
//! `ReplicationService`: a single event loop owning all slave connections,
//! fed by an instruction queue, driving per-slave catch-up tasks and a
//! ping/timeout timer. Re-expressed as a dedicated `tokio::task` per
//! spec.md §5 and this crate's SPEC_FULL.md.

pub mod catchup;
pub mod oplog;
pub mod queue;
pub mod slave_client;
pub mod varint;
pub mod wire;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::ReplicationConfig;
use crate::db::DB;

use catchup::{CatchupTask, Phase};
use oplog::{OpLogStore, Seq};
use queue::{channel, Instruction, InstructionQueue, InstructionReceiver, NewSlave};
use wire::encode_command;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history gap: slave requested seq {requested} but store only retains from {min_seq}")]
    HistoryGap { requested: Seq, min_seq: Seq },
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    #[error("instruction channel closed")]
    ChannelClosed,
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationRole {
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Connecting,
    Syncing,
    Connected,
    Disconnected,
}

/// A single attached slave as tracked by the replication service. Looked up
/// by `conn_id` from the shared table rather than owned directly by its
/// `CatchupTask`, per spec.md §9's arena-of-handles note.
pub struct SlaveConn {
    pub conn_id: u64,
    pub write_half: OwnedWriteHalf,
    pub peer_addr: String,
    pub native: bool,
    pub state: SlaveState,
    pub listening_port: Option<u16>,
    pub synced_seq: Seq,
    pub dbs: Vec<u32>,
    pub last_ack: Instant,
    /// True when this connection is actually our upstream master looping
    /// back as a slave of us (multi-master loop avoidance, spec.md §9).
    pub is_upstream: bool,
}

#[derive(Debug, Clone)]
pub struct RoleInfo {
    pub role: ReplicationRole,
    pub server_key: String,
    pub max_seq: Seq,
    pub master_host: Option<(String, u16)>,
    pub slaves: Vec<SlaveSummary>,
}

#[derive(Debug, Clone)]
pub struct SlaveSummary {
    pub peer_addr: String,
    pub listening_port: Option<u16>,
    pub state: SlaveState,
    pub synced_seq: Seq,
}

/// The replication event loop's owned state. Runs as a single `tokio::task`
/// (spec.md §5's "single-threaded cooperative loop").
pub struct ReplicationService {
    oplog: Arc<OpLogStore>,
    db: Arc<tokio::sync::RwLock<DB>>,
    slaves: Arc<Mutex<HashMap<u64, SlaveConn>>>,
    catchup_handles: HashMap<u64, JoinHandle<()>>,
    role: ReplicationRole,
    master_addr: Option<(String, u16)>,
    upstream_server_key: slave_client::UpstreamKeyCell,
    config: ReplicationConfig,
    slave_client_handle: Option<slave_client::SlaveClientHandle>,
    receiver: InstructionReceiver,
}

/// Handle cloned into every connection-handling task and the command
/// dispatcher so they can talk to the replication service.
#[derive(Clone)]
pub struct ReplicationHandle {
    pub queue: InstructionQueue,
    pub oplog: Arc<OpLogStore>,
}

impl ReplicationHandle {
    pub fn record_set(&self, db: u32, key: String, value: String, from_master: bool) {
        self.oplog.record_set(db, key, value, from_master);
        self.queue.signal_write();
    }

    pub fn record_del(&self, db: u32, key: String, from_master: bool) {
        self.oplog.record_del(db, key, from_master);
        self.queue.signal_write();
    }

    pub fn record_redis(&self, db: u32, cmd: String, args: Vec<String>, from_master: bool) {
        self.oplog.record_redis(db, cmd, args, from_master);
        self.queue.signal_write();
    }
}

/// Builds the op-log store and instruction queue, spawns the service's
/// event loop task, and returns the handle other tasks use to reach it.
pub fn spawn(
    config: ReplicationConfig,
    db: Arc<tokio::sync::RwLock<DB>>,
) -> std::io::Result<ReplicationHandle> {
    let oplog = Arc::new(OpLogStore::load(
        &config.repl_data_dir,
        config.ring_capacity,
        config.repl_backlog_size,
        config.repl_max_backup_logs,
    )?);
    let (queue, receiver) = channel();

    let handle = ReplicationHandle {
        queue: queue.clone(),
        oplog: oplog.clone(),
    };

    let replicaof = config.replicaof.clone();
    let mut service = ReplicationService {
        oplog,
        db,
        slaves: Arc::new(Mutex::new(HashMap::new())),
        catchup_handles: HashMap::new(),
        role: if replicaof.is_some() {
            ReplicationRole::Slave
        } else {
            ReplicationRole::Master
        },
        master_addr: replicaof.clone(),
        upstream_server_key: Arc::new(std::sync::Mutex::new(None)),
        config,
        slave_client_handle: None,
        receiver,
    };

    if let Some((host, port)) = replicaof {
        let sc = slave_client::spawn(
            host,
            port,
            service.oplog.clone(),
            service.db.clone(),
            service.upstream_server_key.clone(),
        );
        service.slave_client_handle = Some(sc);
    }

    tokio::spawn(async move { service.run().await });

    Ok(handle)
}

impl ReplicationService {
    #[instrument(skip(self), fields(role = ?self.role))]
    async fn run(&mut self) {
        info!("replication service started");
        let mut ping_timer =
            tokio::time::interval(Duration::from_secs(self.config.repl_ping_slave_period.max(1)));
        loop {
            tokio::select! {
                batch = self.receiver.recv_batch() => {
                    if batch.is_empty() {
                        self.feed_connected_slaves().await;
                    }
                    for instr in batch {
                        self.handle_instruction(instr).await;
                    }
                }
                _ = ping_timer.tick() => {
                    self.ping_slaves().await;
                }
            }
        }
    }

    async fn handle_instruction(&mut self, instr: Instruction) {
        match instr {
            Instruction::Replicate => self.feed_connected_slaves().await,
            Instruction::AttachSlave(new_slave) => self.attach_slave(new_slave).await,
            Instruction::SetListeningPort { conn_id, port } => {
                let mut slaves = self.slaves.lock().await;
                if let Some(slave) = slaves.get_mut(&conn_id) {
                    slave.listening_port = Some(port);
                }
            }
            Instruction::DetachSlave(conn_id) => self.detach_slave(conn_id).await,
            Instruction::DescribeRole(reply) => {
                let _ = reply.send(self.role_info().await);
            }
            Instruction::SetMaster(target, reply) => {
                let result = self.set_master(target).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn attach_slave(&mut self, new: NewSlave) {
        let verified = new
            .claimed_server_key
            .as_deref()
            .map(|k| self.oplog.verify_client(k, new.claimed_seq))
            .unwrap_or(false);

        let conn_id = new.conn_id;
        let is_upstream = self
            .upstream_server_key
            .lock()
            .unwrap()
            .as_deref()
            .zip(new.claimed_server_key.as_deref())
            .map(|(a, b)| a == b)
            .unwrap_or(false);

        let slave = SlaveConn {
            conn_id,
            write_half: new.write_half,
            peer_addr: new.peer_addr.clone(),
            native: new.native,
            state: SlaveState::Syncing,
            listening_port: None,
            synced_seq: new.claimed_seq,
            dbs: new.dbs.clone(),
            last_ack: Instant::now(),
            is_upstream,
        };

        self.slaves.lock().await.insert(conn_id, slave);

        let (start_phase, start_disk_index) = if verified && new.claimed_seq > 0 {
            if self.oplog.in_disk(new.claimed_seq + 1) {
                let idx = self
                    .oplog
                    .segment_for_seq(new.claimed_seq + 1)
                    .unwrap_or(1);
                (Phase::DiskLogs, Some(idx))
            } else {
                (Phase::MemRing, None)
            }
        } else {
            (Phase::IterDb, None)
        };

        info!(
            conn_id,
            peer = %new.peer_addr,
            native = new.native,
            verified,
            phase = ?start_phase,
            "attaching new slave"
        );

        let task = CatchupTask::new(
            conn_id,
            start_phase,
            start_disk_index,
            new.claimed_seq,
            self.oplog.clone(),
            self.db.clone(),
            self.slaves.clone(),
            new.dbs,
            is_upstream,
            new.native,
        );
        let handle = tokio::spawn(task.run());
        self.catchup_handles.insert(conn_id, handle);
    }

    async fn detach_slave(&mut self, conn_id: u64) {
        self.slaves.lock().await.remove(&conn_id);
        if let Some(handle) = self.catchup_handles.remove(&conn_id) {
            handle.abort();
        }
        info!(conn_id, "slave detached");
    }

    async fn feed_connected_slaves(&mut self) {
        let mut slaves = self.slaves.lock().await;
        let max_seq = self.oplog.max_seq();
        for slave in slaves.values_mut() {
            if slave.state != SlaveState::Connected || slave.synced_seq >= max_seq {
                continue;
            }
            let (ops, _more) =
                self.oplog
                    .load_op(&slave.dbs, slave.synced_seq + 1, slave.is_upstream);
            if ops.is_empty() {
                slave.synced_seq = max_seq;
                continue;
            }
            let mut last_seq = slave.synced_seq;
            let mut failed = false;
            for (seq, op) in &ops {
                let mut parts = op.to_redis_command();
                if slave.native {
                    parts.push(seq.to_string());
                }
                let bytes = encode_command(&parts);
                if slave.write_half.write_all(&bytes).await.is_err() {
                    failed = true;
                    break;
                }
                last_seq = *seq;
            }
            if !failed {
                let _ = slave.write_half.flush().await;
            }
            slave.synced_seq = last_seq;
            if failed {
                warn!(conn_id = slave.conn_id, "write failure feeding slave, will detach on next read error");
            }
        }
    }

    async fn ping_slaves(&mut self) {
        let mut slaves = self.slaves.lock().await;
        let timeout = Duration::from_secs(self.config.repl_timeout.max(1));
        let mut stale = Vec::new();
        for slave in slaves.values_mut() {
            if slave.state != SlaveState::Connected {
                continue;
            }
            if slave.last_ack.elapsed() > timeout {
                stale.push(slave.conn_id);
                continue;
            }
            let ping = encode_command(&["PING".to_string()]);
            let _ = slave.write_half.write_all(&ping).await;
            let _ = slave.write_half.flush().await;
        }
        drop(slaves);
        for conn_id in stale {
            warn!(conn_id, "slave timed out, detaching");
            self.detach_slave(conn_id).await;
        }
    }

    async fn role_info(&self) -> RoleInfo {
        let slaves = self.slaves.lock().await;
        RoleInfo {
            role: self.role,
            server_key: self.oplog.server_key().to_string(),
            max_seq: self.oplog.max_seq(),
            master_host: self.master_addr.clone(),
            slaves: slaves
                .values()
                .map(|s| SlaveSummary {
                    peer_addr: s.peer_addr.clone(),
                    listening_port: s.listening_port,
                    state: s.state,
                    synced_seq: s.synced_seq,
                })
                .collect(),
        }
    }

    async fn set_master(&mut self, target: Option<(String, u16)>) -> Result<(), String> {
        if let Some(sc) = self.slave_client_handle.take() {
            sc.stop();
        }
        match target {
            None => {
                self.role = ReplicationRole::Master;
                self.master_addr = None;
                *self.upstream_server_key.lock().unwrap() = None;
                info!("promoted to master (REPLICAOF NO ONE)");
            }
            Some((host, port)) => {
                self.role = ReplicationRole::Slave;
                self.master_addr = Some((host.clone(), port));
                *self.upstream_server_key.lock().unwrap() = None;
                let sc = slave_client::spawn(
                    host,
                    port,
                    self.oplog.clone(),
                    self.db.clone(),
                    self.upstream_server_key.clone(),
                );
                self.slave_client_handle = Some(sc);
                info!(host = %self.master_addr.as_ref().unwrap().0, port, "became slave of new master");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn spawn_starts_as_master_with_no_replicaof() {
        let dir = tempdir().unwrap();
        let mut cfg = ReplicationConfig::default();
        cfg.repl_data_dir = dir.path().to_string_lossy().into_owned();
        let db = Arc::new(tokio::sync::RwLock::new(DB::new()));
        let handle = spawn(cfg, db).unwrap();
        let role = handle.queue.describe_role().await.unwrap();
        assert_eq!(role.role, ReplicationRole::Master);
        assert!(role.master_host.is_none());
    }

    #[tokio::test]
    async fn record_set_advances_max_seq_observed_via_role_info() {
        let dir = tempdir().unwrap();
        let mut cfg = ReplicationConfig::default();
        cfg.repl_data_dir = dir.path().to_string_lossy().into_owned();
        let db = Arc::new(tokio::sync::RwLock::new(DB::new()));
        let handle = spawn(cfg, db).unwrap();
        handle.record_set(0, "a".to_string(), "1".to_string(), false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let role = handle.queue.describe_role().await.unwrap();
        assert_eq!(role.max_seq, 1);
    }
}
