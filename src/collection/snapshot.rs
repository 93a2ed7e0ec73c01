//! Compact collection snapshots
//!
//! Binary serialization of a profile's full entry sequence, built on the
//! cache record format. The file shape is a 4-byte magic, a `u32` entry
//! count, then one `[u32 length][username][u32 length][cache record]`
//! pair per entry. The record schema carries no username slot, so the
//! codec stores it alongside each record instead of growing the table.

use crate::collection::entry::VersionInfo;
use crate::error::{HoldingsError, HoldingsResult};
use crate::record::EntryRecord;
use std::path::Path;

const MAGIC: &[u8; 4] = b"hldc";

/// Serialize a full entry sequence
pub(crate) fn encode(items: &[VersionInfo]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
    for info in items {
        let rec = info.to_record();
        put_run(&mut buf, info.username.as_bytes());
        put_run(&mut buf, rec.as_bytes());
    }
    buf
}

/// Decode a snapshot back into its entry sequence
///
/// Strict on shape: a bad magic, a short buffer, or trailing garbage all
/// fail, as do the embedded records themselves.
pub(crate) fn decode(bytes: &[u8], path: &Path) -> HoldingsResult<Vec<VersionInfo>> {
    let malformed = |reason: String| HoldingsError::MalformedSnapshot {
        path: path.to_path_buf(),
        reason,
    };

    let mut r = Reader { buf: bytes, pos: 0 };

    match r.take(MAGIC.len()) {
        Some(m) if m == MAGIC => {}
        _ => return Err(malformed("missing snapshot magic".to_string())),
    }

    let count = r
        .u32()
        .ok_or_else(|| malformed("entry count truncated".to_string()))?;

    let mut items = Vec::with_capacity(count as usize);
    for idx in 0..count {
        let username = r
            .run()
            .ok_or_else(|| malformed(format!("entry {idx} username truncated")))?;
        let username = String::from_utf8(username.to_vec())
            .map_err(|_| malformed(format!("entry {idx} username is not valid UTF-8")))?;

        let record = r
            .run()
            .ok_or_else(|| malformed(format!("entry {idx} record truncated")))?;
        let record = EntryRecord::from_bytes(record.to_vec())?;

        let mut info = VersionInfo::from_record(&record)?;
        info.username = username;
        items.push(info);
    }

    if r.pos != bytes.len() {
        return Err(malformed(format!(
            "{} trailing bytes after {count} entries",
            bytes.len() - r.pos
        )));
    }

    Ok(items)
}

fn put_run(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let taken = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(taken)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    }

    fn run(&mut self) -> Option<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ProfileId;
    use std::path::PathBuf;

    fn entries() -> Vec<VersionInfo> {
        let pid = ProfileId::from_key_digest(b"snapshot test key");
        let mut a = VersionInfo::new(pid, "init-a", "alice", "air_quality");
        a.themes = vec!["environment".to_string()];
        a.top_index = 3;
        a.cursor_index = 1;
        let b = VersionInfo::new(pid, "init-b", "alice", "bike_counts");
        vec![a, b]
    }

    #[test]
    fn roundtrip() {
        let items = entries();
        let bytes = encode(&items);
        let decoded = decode(&bytes, &PathBuf::from("test.rec")).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn empty_sequence_roundtrips() {
        let bytes = encode(&[]);
        let decoded = decode(&bytes, &PathBuf::from("test.rec")).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(&entries());
        bytes[0] = b'X';
        let err = decode(&bytes, &PathBuf::from("test.rec")).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn rejects_truncation() {
        let bytes = encode(&entries());
        for cut in [3, 6, bytes.len() / 2, bytes.len() - 1] {
            assert!(decode(&bytes[..cut], &PathBuf::from("test.rec")).is_err());
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&entries());
        bytes.push(0);
        let err = decode(&bytes, &PathBuf::from("test.rec")).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }
}
