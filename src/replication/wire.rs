//! RESP encoding helpers for the replication wire protocol: commands
//! streamed to a slave are plain RESP arrays, identical to the command
//! format clients send, so a slave replays them through the same
//! dispatcher path as a directly-connected client.

use crate::resp::RespValue;

/// Encodes a command (verb + args) as a RESP array of bulk strings.
pub fn encode_command(parts: &[String]) -> Vec<u8> {
    let items = parts
        .iter()
        .map(|p| RespValue::BulkString(Some(p.clone())))
        .collect();
    RespValue::Array(Some(items)).serialize().into_bytes()
}

pub fn encode_simple(s: &str) -> Vec<u8> {
    RespValue::SimpleString(s.to_string()).serialize().into_bytes()
}

pub fn encode_error(s: &str) -> Vec<u8> {
    RespValue::Error(s.to_string()).serialize().into_bytes()
}

pub fn encode_bulk(s: &str) -> Vec<u8> {
    RespValue::BulkString(Some(s.to_string())).serialize().into_bytes()
}

/// `ARSYNC <server_key> <seq> [<db>...]`, the native full/partial sync
/// request a slave opens with.
pub fn encode_arsync(server_key: &str, seq: u64, dbs: &[u32]) -> Vec<u8> {
    let mut parts = vec!["ARSYNC".to_string(), server_key.to_string(), seq.to_string()];
    parts.extend(dbs.iter().map(|d| d.to_string()));
    encode_command(&parts)
}

/// The master's native-protocol reply acknowledging a sync position:
/// `+ARSYNCED <server_key> <seq>\r\n`.
pub fn encode_arsynced(server_key: &str, seq: u64) -> Vec<u8> {
    encode_simple(&format!("ARSYNCED {} {}", server_key, seq))
}

/// Fake empty-RDB bulk header a legacy (`SYNC`) peer expects before the
/// plain command stream starts, per spec.md §4.3/§6. `REDIS0004` plus a
/// trailing 0xff (EOF marker) stands in for a real RDB payload: this
/// server has no RDB file to send, only the op-log replay that follows.
pub const LEGACY_RDB_PREAMBLE: &[u8] = b"$10\r\nREDIS0004\xff";

pub fn parse_arsynced(line: &str) -> Option<(String, u64)> {
    let mut it = line.split_whitespace();
    if it.next()? != "ARSYNCED" {
        return None;
    }
    let key = it.next()?.to_string();
    let seq: u64 = it.next()?.parse().ok()?;
    Some((key, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arsynced_round_trips() {
        let encoded = encode_arsynced("deadbeef", 42);
        let text = String::from_utf8(encoded).unwrap();
        let line = text.trim_start_matches('+').trim_end();
        let (key, seq) = parse_arsynced(line).unwrap();
        assert_eq!(key, "deadbeef");
        assert_eq!(seq, 42);
    }

    #[test]
    fn encode_command_is_resp_array_of_bulk_strings() {
        let bytes = encode_command(&["SET".to_string(), "a".to_string(), "1".to_string()]);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("*3\r\n"));
        assert!(text.contains("$3\r\nSET\r\n"));
    }
}
