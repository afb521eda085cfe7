//! Catch-up Task: brings one newly attached slave from wherever it claims to
//! be up to the live op-log tail, then hands it off to the steady-state feed
//! in `ReplicationService`.
//!
//! Grounded on `examples/original_source/src/replication.cpp`'s
//! `DumpFile`/`LoadSyncTask` (the `ITER_DB`/`DUMP_DISK_LOG`/`DUMP_MEM_LOG`
//! phase progression lives there, `m_db_iter`/`m_cur_logidx` fields). The
//! arena-of-handles pattern (task holds only an id, looks up its slave in a
//! shared table each tick) follows spec.md §9's Design Notes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::DB;

use super::oplog::{OpLogStore, SegmentReader, Seq};
use super::wire::encode_command;
use super::{SlaveConn, SlaveState};

const TICK: Duration = Duration::from_millis(5);
const DISK_BATCH_BYTES: usize = 64 * 1024;

/// Which phase a slave's catch-up is currently in, per spec.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    IterDb,
    DiskLogs,
    MemRing,
}

struct IterDbState {
    snapshot: Vec<(String, crate::db::Entry)>,
    cursor: usize,
    seq_after_iter: Seq,
}

struct DiskLogsState {
    segment_index: u32,
    reader: Option<SegmentReader>,
    /// Furthest seq already delivered to the slave (its resume point).
    seq_cursor: Seq,
    /// Absolute seq of the next record `reader` will hand back, anchored on
    /// the open segment's own `start_seq` rather than `seq_cursor`.
    next_record_seq: Seq,
}

/// Drives a single slave through `IterDb -> DiskLogs -> MemRing`, then
/// signals the owning service to move the slave to `Connected`.
pub struct CatchupTask {
    conn_id: u64,
    phase: Phase,
    iter: Option<IterDbState>,
    disk: Option<DiskLogsState>,
    /// Resume seq to hand to `feed_connected_slaves` once promoted, kept
    /// current across every path into `MemRing` (direct start, IterDb
    /// skipping disk, or DiskLogs running dry).
    mem_ring_seq: Seq,
    oplog: Arc<OpLogStore>,
    db: Arc<tokio::sync::RwLock<DB>>,
    slaves: Arc<Mutex<HashMap<u64, SlaveConn>>>,
    dbs: Vec<u32>,
    suppress_from_master: bool,
    native: bool,
}

impl CatchupTask {
    pub fn new(
        conn_id: u64,
        start_phase: Phase,
        start_disk_index: Option<u32>,
        start_seq: Seq,
        oplog: Arc<OpLogStore>,
        db: Arc<tokio::sync::RwLock<DB>>,
        slaves: Arc<Mutex<HashMap<u64, SlaveConn>>>,
        dbs: Vec<u32>,
        suppress_from_master: bool,
        native: bool,
    ) -> Self {
        let disk = start_disk_index.map(|idx| DiskLogsState {
            segment_index: idx,
            reader: None,
            seq_cursor: start_seq,
            next_record_seq: 0,
        });
        CatchupTask {
            conn_id,
            phase: start_phase,
            iter: None,
            disk,
            mem_ring_seq: start_seq,
            oplog,
            db,
            slaves,
            dbs,
            suppress_from_master,
            native,
        }
    }

    /// Runs to completion (slave reaches `MemRing` and is promoted to
    /// `Connected`) or until the slave disappears from the shared table
    /// (disconnect raced the catch-up).
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(TICK);
        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(true) => break,
                Ok(false) => continue,
                Err(e) => {
                    warn!(conn_id = self.conn_id, error = %e, "catch-up task aborting");
                    break;
                }
            }
        }
    }

    /// Returns `Ok(true)` once the slave has been promoted to `Connected`.
    async fn tick(&mut self) -> std::io::Result<bool> {
        if !self.slaves.lock().await.contains_key(&self.conn_id) {
            return Ok(true);
        }

        match self.phase {
            Phase::IterDb => self.tick_iter_db().await,
            Phase::DiskLogs => self.tick_disk_logs().await,
            Phase::MemRing => {
                self.promote_to_connected().await;
                Ok(true)
            }
        }
    }

    async fn tick_iter_db(&mut self) -> std::io::Result<bool> {
        if self.iter.is_none() {
            let db = self.db.read().await;
            let snapshot: Vec<(String, crate::db::Entry)> = db
                .items
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let seq_after_iter = self.oplog.max_seq();
            info!(
                conn_id = self.conn_id,
                keys = snapshot.len(),
                seq_after_iter,
                "starting IterDB catch-up phase"
            );
            self.iter = Some(IterDbState {
                snapshot,
                cursor: 0,
                seq_after_iter,
            });
        }

        const BATCH: usize = 500;
        let (commands, done, seq_after_iter) = {
            let state = self.iter.as_mut().unwrap();
            let end = (state.cursor + BATCH).min(state.snapshot.len());
            let mut commands = Vec::new();
            for (key, entry) in &state.snapshot[state.cursor..end] {
                if let crate::db::DataType::String(value) = &entry.value {
                    let mut parts = vec!["__set__".to_string(), key.clone(), value.clone()];
                    if self.native {
                        parts.push(state.seq_after_iter.to_string());
                    }
                    commands.push(encode_command(&parts));
                } else {
                    for mut cmd in entry_to_commands(key, entry) {
                        if self.native {
                            cmd.push(state.seq_after_iter.to_string());
                        }
                        commands.push(encode_command(&cmd));
                    }
                }
            }
            state.cursor = end;
            (commands, end >= state.snapshot.len(), state.seq_after_iter)
        };

        self.write_to_slave(&commands).await?;

        if done {
            debug!(conn_id = self.conn_id, "IterDB phase complete");
            self.iter = None;
            if self.oplog.in_disk(seq_after_iter + 1) {
                let segment_index = self
                    .oplog
                    .segment_for_seq(seq_after_iter + 1)
                    .unwrap_or(1);
                self.disk = Some(DiskLogsState {
                    segment_index,
                    reader: None,
                    seq_cursor: seq_after_iter,
                    next_record_seq: 0,
                });
                self.phase = Phase::DiskLogs;
            } else {
                self.mem_ring_seq = seq_after_iter;
                self.phase = Phase::MemRing;
            }
        }
        Ok(false)
    }

    async fn tick_disk_logs(&mut self) -> std::io::Result<bool> {
        let max_backup = self.oplog.max_backup_logs();
        let ops = {
            let state = self.disk.as_mut().unwrap();
            if state.reader.is_none() {
                let path = self.oplog.log_path(state.segment_index);
                match SegmentReader::open(&path) {
                    Ok(r) => {
                        state.reader = Some(r);
                        state.next_record_seq = self
                            .oplog
                            .peek_log_start(state.segment_index)
                            .unwrap_or(state.seq_cursor + 1);
                    }
                    Err(_) => {
                        state.segment_index += 1;
                        if state.segment_index > max_backup {
                            self.mem_ring_seq = state.seq_cursor;
                            self.phase = Phase::MemRing;
                            self.disk = None;
                            return Ok(false);
                        }
                        return Ok(false);
                    }
                }
            }
            state.reader.as_mut().unwrap().read_batch(DISK_BATCH_BYTES)?
        };

        if ops.is_empty() {
            let state = self.disk.as_mut().unwrap();
            state.segment_index += 1;
            state.reader = None;
            if state.segment_index > max_backup || !self.oplog.in_disk(state.seq_cursor + 1) {
                debug!(conn_id = self.conn_id, "DiskLogs phase complete");
                self.mem_ring_seq = state.seq_cursor;
                self.phase = Phase::MemRing;
                self.disk = None;
            }
            return Ok(false);
        }

        let mut commands = Vec::new();
        {
            let state = self.disk.as_mut().unwrap();
            for op in &ops {
                let record_seq = state.next_record_seq;
                state.next_record_seq += 1;
                if record_seq <= state.seq_cursor {
                    // Already delivered to this slave (resuming mid-segment).
                    continue;
                }
                state.seq_cursor = record_seq;
                if !self.dbs.is_empty() && !self.dbs.contains(&op.db()) {
                    continue;
                }
                if self.suppress_from_master && op.from_master() {
                    continue;
                }
                let mut parts = op.to_redis_command();
                if self.native {
                    parts.push(record_seq.to_string());
                }
                commands.push(encode_command(&parts));
            }
        }
        self.write_to_slave(&commands).await?;
        Ok(false)
    }

    async fn promote_to_connected(&mut self) {
        let from_seq = self.mem_ring_seq;
        let mut slaves = self.slaves.lock().await;
        if let Some(slave) = slaves.get_mut(&self.conn_id) {
            slave.state = SlaveState::Connected;
            slave.synced_seq = from_seq;
            info!(conn_id = self.conn_id, synced_seq = from_seq, "slave caught up, now connected");
        }
    }

    async fn write_to_slave(&mut self, commands: &[Vec<u8>]) -> std::io::Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let mut slaves = self.slaves.lock().await;
        let Some(slave) = slaves.get_mut(&self.conn_id) else {
            return Ok(());
        };
        for cmd in commands {
            slave.write_half.write_all(cmd).await?;
        }
        slave.write_half.flush().await
    }
}

/// Reconstructs the command(s) needed to recreate a non-string entry on a
/// slave. String entries are handled separately via `__set__`.
fn entry_to_commands(key: &str, entry: &crate::db::Entry) -> Vec<Vec<String>> {
    use crate::db::DataType;
    match &entry.value {
        DataType::List(items) => {
            if items.is_empty() {
                return Vec::new();
            }
            let mut cmd = vec!["RPUSH".to_string(), key.to_string()];
            cmd.extend(items.iter().cloned());
            vec![cmd]
        }
        DataType::Hash(map) => map
            .iter()
            .map(|(f, v)| vec!["HSET".to_string(), key.to_string(), f.clone(), v.clone()])
            .collect(),
        DataType::Set(members) => {
            if members.is_empty() {
                return Vec::new();
            }
            let mut cmd = vec!["SADD".to_string(), key.to_string()];
            cmd.extend(members.iter().cloned());
            vec![cmd]
        }
        DataType::ZSet(zset) => zset
            .members
            .iter()
            .map(|(m, score)| {
                vec![
                    "ZADD".to_string(),
                    key.to_string(),
                    score.to_string(),
                    m.clone(),
                ]
            })
            .collect(),
        _ => Vec::new(),
    }
}
