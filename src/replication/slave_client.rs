//! Slave Client: the outbound half of replication, connecting to a master
//! and replaying the stream it sends into the local keyspace.
//!
//! Grounded on `examples/original_source/src/replication.cpp`'s
//! `SlaveClient`/`ConnectMaster`, including its persisted
//! `repl.sync.state` (server key + last synced seq, so a restart resumes
//! instead of re-running a full IterDB sync) and its native-vs-legacy
//! handshake fallback.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::db::DB;
use crate::resp::{RespHandler, RespValue};

use super::oplog::OpLogStore;
use super::wire::{encode_arsync, encode_command, parse_arsynced};

/// Handshake/downgrade state machine, per spec.md §4.5. A master that
/// understands `ARSYNC` acks with `+ARSYNCED ...` and we go straight to
/// `Synced`; anything else (typically a `-ERR unknown command` from a
/// legacy master) downgrades to a plain `SYNC`, whose reply is a bulk-string
/// RDB header (`AwaitingBulkHeader`/`ReceivingBulk`) we discard before
/// streaming commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Idle,
    Connecting,
    WaitingAck,
    AwaitingBulkHeader,
    ReceivingBulk,
    Synced,
}

pub struct SlaveClientHandle {
    stop: Arc<Notify>,
}

/// Shared cell the slave client writes its learned upstream server key into
/// once the native handshake completes, so the replication service can tell
/// a reconnecting upstream master apart from an ordinary slave (multi-master
/// loop avoidance, spec.md §9).
pub type UpstreamKeyCell = Arc<std::sync::Mutex<Option<String>>>;

impl SlaveClientHandle {
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

struct SyncStateFile {
    path: PathBuf,
}

impl SyncStateFile {
    fn new(data_dir: &str) -> Self {
        SyncStateFile {
            path: PathBuf::from(data_dir).join("repl.sync.state"),
        }
    }

    fn load(&self) -> Option<(String, u64)> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let mut parts = content.split_whitespace();
        let key = parts.next()?.to_string();
        let seq: u64 = parts.next()?.parse().ok()?;
        Some((key, seq))
    }

    fn persist(&self, server_key: &str, seq: u64) {
        let _ = std::fs::write(&self.path, format!("{} {}", server_key, seq));
    }
}

/// Spawns the reconnect-on-close slave client loop and returns a handle to
/// stop it (used by `SLAVEOF NO ONE` / `REPLICAOF NO ONE`).
pub fn spawn(
    host: String,
    port: u16,
    oplog: Arc<OpLogStore>,
    db: Arc<tokio::sync::RwLock<DB>>,
    upstream_key: UpstreamKeyCell,
) -> SlaveClientHandle {
    let stop = Arc::new(Notify::new());
    let task_stop = stop.clone();
    tokio::spawn(async move {
        run_loop(host, port, oplog, db, task_stop, upstream_key).await;
    });
    SlaveClientHandle { stop }
}

async fn run_loop(
    host: String,
    port: u16,
    oplog: Arc<OpLogStore>,
    db: Arc<tokio::sync::RwLock<DB>>,
    stop: Arc<Notify>,
    upstream_key: UpstreamKeyCell,
) {
    let sync_state = SyncStateFile::new(&oplog.data_dir().to_string_lossy());
    loop {
        tokio::select! {
            _ = stop.notified() => {
                info!("slave client stopped");
                return;
            }
            result = connect_and_sync(&host, port, &oplog, &db, &sync_state, &stop, &upstream_key) => {
                if let Err(e) = result {
                    *upstream_key.lock().unwrap() = None;
                    warn!(master = %format!("{host}:{port}"), error = %e, "replication link failed, reconnecting");
                }
            }
        }
        tokio::select! {
            _ = stop.notified() => return,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}

async fn connect_and_sync(
    host: &str,
    port: u16,
    oplog: &Arc<OpLogStore>,
    db: &Arc<tokio::sync::RwLock<DB>>,
    sync_state: &SyncStateFile,
    stop: &Arc<Notify>,
    upstream_key: &UpstreamKeyCell,
) -> std::io::Result<()> {
    let mut state = HandshakeState::Connecting;
    let stream = TcpStream::connect((host, port)).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let listening_port: u16 = 0;
    let replconf = encode_command(&[
        "REPLCONF".to_string(),
        "listening-port".to_string(),
        listening_port.to_string(),
    ]);
    write_half.write_all(&replconf).await?;
    write_half.flush().await?;
    skip_one_reply(&mut reader).await?;

    let (server_key, seq) = sync_state
        .load()
        .filter(|(k, _)| k == oplog.server_key() || oplog.server_key().is_empty())
        .unwrap_or_else(|| ("-".to_string(), 0));

    state = HandshakeState::WaitingAck;
    let arsync = encode_arsync(&server_key, seq, &[]);
    write_half.write_all(&arsync).await?;
    write_half.flush().await?;

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let trimmed = line.trim_end();
    if let Some((upstream_server_key, _ack_seq)) = parse_arsynced(trimmed.trim_start_matches('+')) {
        state = HandshakeState::Synced;
        info!(upstream_key = %upstream_server_key, "native sync acknowledged by master");
        *upstream_key.lock().unwrap() = Some(upstream_server_key.clone());
        stream_commands(&mut reader, oplog, db, sync_state, &upstream_server_key, stop, true).await?;
        return Ok(());
    }

    warn!(reply = %trimmed, "master rejected native ARSYNC, falling back to legacy SYNC");
    state = HandshakeState::AwaitingBulkHeader;
    let sync_cmd = encode_command(&["SYNC".to_string()]);
    write_half.write_all(&sync_cmd).await?;
    write_half.flush().await?;

    let bulk_len = read_bulk_header(&mut reader).await?;
    state = HandshakeState::ReceivingBulk;
    let mut rdb_payload = vec![0u8; bulk_len];
    use tokio::io::AsyncReadExt;
    reader.read_exact(&mut rdb_payload).await?;

    state = HandshakeState::Synced;
    info!(bytes = bulk_len, "legacy SYNC bulk header received, streaming plain commands");
    stream_commands(&mut reader, oplog, db, sync_state, "-", stop, false).await?;
    let _ = state;
    Ok(())
}

/// Reads a RESP bulk-string header (`$<len>\r\n`) off a legacy `SYNC`
/// reply, per spec.md §4.5 step 3. The payload that follows is a fake
/// empty RDB and is discarded by the caller, not parsed as a real dump.
async fn read_bulk_header(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<usize> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let trimmed = line.trim();
    let Some(len_str) = trimmed.strip_prefix('$') else {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            "expected bulk header from legacy SYNC reply",
        ));
    };
    len_str
        .parse::<usize>()
        .map_err(|_| std::io::Error::new(ErrorKind::InvalidData, "invalid legacy SYNC bulk length"))
}

async fn skip_one_reply(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<()> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(())
}

/// Replays every command the master streams after a successful handshake
/// until the connection closes or `stop` fires, applying each with
/// `from_master = true` so it feeds this server's own op-log (enabling
/// chained replication) without being looped back upstream.
async fn stream_commands(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    oplog: &Arc<OpLogStore>,
    db: &Arc<tokio::sync::RwLock<DB>>,
    sync_state: &SyncStateFile,
    upstream_key: &str,
    stop: &Arc<Notify>,
    native: bool,
) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let mut synced_seq = 0u64;
    loop {
        tokio::select! {
            _ = stop.notified() => return Ok(()),
            chunk = read_chunk(reader) => {
                let bytes = chunk?;
                if bytes.is_empty() {
                    return Err(std::io::Error::new(ErrorKind::UnexpectedEof, "master closed replication stream"));
                }
                buf.extend_from_slice(&bytes);
                while let Ok(Some((value, consumed))) = RespHandler::parse_request(&buf) {
                    let master_seq = apply_command(&value, oplog, db, native).await;
                    if let Some(seq) = master_seq {
                        synced_seq = seq;
                        sync_state.persist(upstream_key, synced_seq);
                    } else if !native {
                        synced_seq = oplog.max_seq();
                        sync_state.persist(upstream_key, synced_seq);
                    }
                    buf.drain(0..consumed);
                }
            }
        }
    }
}

async fn read_chunk(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;
    let mut tmp = [0u8; 4096];
    let n = reader.read(&mut tmp).await?;
    Ok(tmp[..n].to_vec())
}

/// Applies a single command received from the master to the local
/// keyspace and records it into our own op-log with `from_master = true`,
/// so a slave of this slave sees it but it is never echoed back upstream.
///
/// In the native stream every command carries its master-side seq as a
/// trailing decimal argument (spec.md §6/§4.5 step 5); when `native` is set
/// we strip and return it instead of deriving our resume position from our
/// own op-log's local numbering. `PING` and other single-token commands
/// have nothing to strip and return `None`. A legacy (`SYNC`) stream never
/// carries a seq token.
async fn apply_command(
    value: &RespValue,
    oplog: &Arc<OpLogStore>,
    db: &Arc<tokio::sync::RwLock<DB>>,
    native: bool,
) -> Option<u64> {
    let RespValue::Array(Some(items)) = value else {
        return None;
    };
    let mut parts: Vec<String> = items
        .iter()
        .filter_map(|v| match v {
            RespValue::BulkString(Some(s)) => Some(s.clone()),
            _ => None,
        })
        .collect();

    let master_seq = if native && parts.len() >= 2 {
        parts.pop().and_then(|s| s.parse::<u64>().ok())
    } else {
        None
    };

    let Some(verb) = parts.first().cloned() else {
        return master_seq;
    };
    let verb_upper = verb.to_uppercase();

    match verb_upper.as_str() {
        "__SET__" if parts.len() == 3 => {
            let mut guard = db.write().await;
            guard.items.insert(
                parts[1].clone(),
                crate::db::Entry {
                    value: crate::db::DataType::String(parts[2].clone()),
                    expires_at: None,
                },
            );
            guard.increment_changes();
            drop(guard);
            oplog.record_set(0, parts[1].clone(), parts[2].clone(), true);
        }
        "DEL" if parts.len() >= 2 => {
            let mut guard = db.write().await;
            for key in &parts[1..] {
                guard.items.remove(key);
            }
            guard.increment_changes();
            drop(guard);
            oplog.record_del(0, parts[1].clone(), true);
        }
        "PING" => {}
        _ => {
            oplog.record_redis(0, verb, parts[1..].to_vec(), true);
        }
    }
    master_seq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let state = SyncStateFile::new(dir.path().to_str().unwrap());
        state.persist("abc123", 42);
        let (key, seq) = state.load().unwrap();
        assert_eq!(key, "abc123");
        assert_eq!(seq, 42);
    }

    #[test]
    fn sync_state_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let state = SyncStateFile::new(dir.path().to_str().unwrap());
        assert!(state.load().is_none());
    }
}
