//! Compact binary cache records
//!
//! A fixed-layout table describing one cached dataset entry. The format
//! is tuned for two access patterns: byte-oriented fields (identifiers,
//! labels, references, paths) are read as raw byte ranges straight out of
//! the buffer, and fixed-width numeric fields (navigation indices, body
//! statistics, commit timestamp, error count) can be overwritten in place
//! without rewriting the surrounding record. The numeric fields churn on
//! every new version; the byte fields rarely change.
//!
//! Layout, little-endian throughout:
//!
//! ```text
//! [u16 slot count][u32 offset x slot count][payload]
//! ```
//!
//! Each slot offset is measured from the start of the record; `0` marks
//! the field absent. Numeric slots point at a bare fixed-width value,
//! byte slots at a `[u32 length][bytes]` run. The slot order is fixed:
//!
//! | slot | field        | kind  |
//! |------|--------------|-------|
//! | 0    | init_id      | bytes |
//! | 1    | profile_id   | bytes |
//! | 2    | top_index    | i32   |
//! | 3    | cursor_index | i32   |
//! | 4    | pretty_name  | bytes |
//! | 5    | meta_title   | bytes |
//! | 6    | theme_list   | bytes |
//! | 7    | body_size    | i64   |
//! | 8    | body_rows    | i32   |
//! | 9    | commit_time  | i64   |
//! | 10   | num_errors   | i32   |
//! | 11   | head_ref     | bytes |
//! | 12   | fsi_path     | bytes |
//!
//! There is no version field. Readers must treat trailing slots they do
//! not know as opaque, and records carrying fewer slots than expected as
//! having the missing fields absent, so the table can grow compatibly.

use crate::error::{HoldingsError, HoldingsResult};

/// Number of slots written by this crate
pub const SLOT_COUNT: u16 = 13;

mod slot {
    pub const INIT_ID: usize = 0;
    pub const PROFILE_ID: usize = 1;
    pub const TOP_INDEX: usize = 2;
    pub const CURSOR_INDEX: usize = 3;
    pub const PRETTY_NAME: usize = 4;
    pub const META_TITLE: usize = 5;
    pub const THEME_LIST: usize = 6;
    pub const BODY_SIZE: usize = 7;
    pub const BODY_ROWS: usize = 8;
    pub const COMMIT_TIME: usize = 9;
    pub const NUM_ERRORS: usize = 10;
    pub const HEAD_REF: usize = 11;
    pub const FSI_PATH: usize = 12;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Bytes,
    I32,
    I64,
}

const SLOT_KINDS: [SlotKind; SLOT_COUNT as usize] = [
    SlotKind::Bytes, // init_id
    SlotKind::Bytes, // profile_id
    SlotKind::I32,   // top_index
    SlotKind::I32,   // cursor_index
    SlotKind::Bytes, // pretty_name
    SlotKind::Bytes, // meta_title
    SlotKind::Bytes, // theme_list
    SlotKind::I64,   // body_size
    SlotKind::I32,   // body_rows
    SlotKind::I64,   // commit_time
    SlotKind::I32,   // num_errors
    SlotKind::Bytes, // head_ref
    SlotKind::Bytes, // fsi_path
];

fn read_u16(buf: &[u8], pos: usize) -> Option<u16> {
    buf.get(pos..pos + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    buf.get(pos..pos + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

/// One encoded cache record
///
/// Decode with [`EntryRecord::from_bytes`] (offsets are bounds-checked
/// once, up front) or construct with [`EntryRecordBuilder`]. Field
/// getters never fail: an absent field reads as its zero value — an
/// empty byte range or numeric zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    buf: Vec<u8>,
}

impl EntryRecord {
    /// Decode a record, validating the slot table against the buffer
    pub fn from_bytes(buf: Vec<u8>) -> HoldingsResult<Self> {
        let malformed = |reason: String| HoldingsError::MalformedRecord { reason };

        let count = read_u16(&buf, 0)
            .ok_or_else(|| malformed("shorter than the slot count header".to_string()))?
            as usize;
        let header_len = 2 + 4 * count;
        if buf.len() < header_len {
            return Err(malformed(format!(
                "slot table for {} slots truncated at {} bytes",
                count,
                buf.len()
            )));
        }

        for idx in 0..count {
            let off = read_u32(&buf, 2 + 4 * idx).unwrap_or(0) as usize;
            if off == 0 {
                continue;
            }
            if off < header_len || off > buf.len() {
                return Err(malformed(format!("slot {idx} offset {off} out of bounds")));
            }

            // Unknown trailing slots are opaque: the offset must land in
            // the buffer but the value's shape is not ours to check.
            let Some(kind) = SLOT_KINDS.get(idx) else {
                continue;
            };
            let value_len = match kind {
                SlotKind::I32 => 4,
                SlotKind::I64 => 8,
                SlotKind::Bytes => {
                    let run = read_u32(&buf, off)
                        .ok_or_else(|| malformed(format!("slot {idx} length truncated")))?;
                    4 + run as usize
                }
            };
            if off + value_len > buf.len() {
                return Err(malformed(format!(
                    "slot {idx} value overruns the buffer by {} bytes",
                    off + value_len - buf.len()
                )));
            }
        }

        Ok(Self { buf })
    }

    /// The encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the record, returning the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn offset(&self, idx: usize) -> Option<usize> {
        let count = read_u16(&self.buf, 0)? as usize;
        if idx >= count {
            return None;
        }
        match read_u32(&self.buf, 2 + 4 * idx)? as usize {
            0 => None,
            off => Some(off),
        }
    }

    fn byte_run(&self, idx: usize) -> &[u8] {
        let Some(off) = self.offset(idx) else {
            return &[];
        };
        let Some(len) = read_u32(&self.buf, off) else {
            return &[];
        };
        self.buf.get(off + 4..off + 4 + len as usize).unwrap_or(&[])
    }

    fn i32_at(&self, idx: usize) -> i32 {
        self.offset(idx)
            .and_then(|off| self.buf.get(off..off + 4))
            .and_then(|b| b.try_into().ok())
            .map(i32::from_le_bytes)
            .unwrap_or(0)
    }

    fn i64_at(&self, idx: usize) -> i64 {
        self.offset(idx)
            .and_then(|off| self.buf.get(off..off + 8))
            .and_then(|b| b.try_into().ok())
            .map(i64::from_le_bytes)
            .unwrap_or(0)
    }

    fn set_i32_at(&mut self, idx: usize, n: i32) -> bool {
        let Some(off) = self.offset(idx) else {
            return false;
        };
        let Some(dst) = self.buf.get_mut(off..off + 4) else {
            return false;
        };
        dst.copy_from_slice(&n.to_le_bytes());
        true
    }

    fn set_i64_at(&mut self, idx: usize, n: i64) -> bool {
        let Some(off) = self.offset(idx) else {
            return false;
        };
        let Some(dst) = self.buf.get_mut(off..off + 8) else {
            return false;
        };
        dst.copy_from_slice(&n.to_le_bytes());
        true
    }

    /// Stable identifier for the dataset's lineage
    pub fn init_id(&self) -> &[u8] {
        self.byte_run(slot::INIT_ID)
    }

    /// Owning profile's raw ID bytes
    pub fn profile_id(&self) -> &[u8] {
        self.byte_run(slot::PROFILE_ID)
    }

    /// Human-readable dataset handle
    pub fn pretty_name(&self) -> &[u8] {
        self.byte_run(slot::PRETTY_NAME)
    }

    /// Display title from dataset metadata
    pub fn meta_title(&self) -> &[u8] {
        self.byte_run(slot::META_TITLE)
    }

    /// Comma-joined theme tags
    pub fn theme_list(&self) -> &[u8] {
        self.byte_run(slot::THEME_LIST)
    }

    /// Reference to the head version in the content-addressed store
    pub fn head_ref(&self) -> &[u8] {
        self.byte_run(slot::HEAD_REF)
    }

    /// Checked-out filesystem path, if linked
    pub fn fsi_path(&self) -> &[u8] {
        self.byte_run(slot::FSI_PATH)
    }

    /// Position of the newest known version in the history sequence
    pub fn top_index(&self) -> i32 {
        self.i32_at(slot::TOP_INDEX)
    }

    /// Position of the currently selected version; may lag `top_index`
    pub fn cursor_index(&self) -> i32 {
        self.i32_at(slot::CURSOR_INDEX)
    }

    /// Body size in bytes
    pub fn body_size(&self) -> i64 {
        self.i64_at(slot::BODY_SIZE)
    }

    /// Body row count
    pub fn body_rows(&self) -> i32 {
        self.i32_at(slot::BODY_ROWS)
    }

    /// Unix timestamp of the last commit, in seconds
    pub fn commit_time(&self) -> i64 {
        self.i64_at(slot::COMMIT_TIME)
    }

    /// Count of validation errors on the head version
    pub fn num_errors(&self) -> i32 {
        self.i32_at(slot::NUM_ERRORS)
    }

    /// Overwrite `top_index` in place; false if the field is absent
    pub fn set_top_index(&mut self, n: i32) -> bool {
        self.set_i32_at(slot::TOP_INDEX, n)
    }

    /// Overwrite `cursor_index` in place; false if the field is absent
    pub fn set_cursor_index(&mut self, n: i32) -> bool {
        self.set_i32_at(slot::CURSOR_INDEX, n)
    }

    /// Overwrite `body_size` in place; false if the field is absent
    pub fn set_body_size(&mut self, n: i64) -> bool {
        self.set_i64_at(slot::BODY_SIZE, n)
    }

    /// Overwrite `body_rows` in place; false if the field is absent
    pub fn set_body_rows(&mut self, n: i32) -> bool {
        self.set_i32_at(slot::BODY_ROWS, n)
    }

    /// Overwrite `commit_time` in place; false if the field is absent
    pub fn set_commit_time(&mut self, n: i64) -> bool {
        self.set_i64_at(slot::COMMIT_TIME, n)
    }

    /// Overwrite `num_errors` in place; false if the field is absent
    pub fn set_num_errors(&mut self, n: i32) -> bool {
        self.set_i32_at(slot::NUM_ERRORS, n)
    }
}

enum SlotValue {
    Bytes(Vec<u8>),
    I32(i32),
    I64(i64),
}

/// Accumulates field values and lays out an [`EntryRecord`]
///
/// Fields left unset are written as absent and read back as zero values.
/// A numeric field explicitly set to zero is still materialized in the
/// payload so it remains mutable in place later.
#[derive(Default)]
pub struct EntryRecordBuilder {
    slots: [Option<SlotValue>; SLOT_COUNT as usize],
}

impl EntryRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bytes(mut self, idx: usize, value: &[u8]) -> Self {
        self.slots[idx] = Some(SlotValue::Bytes(value.to_vec()));
        self
    }

    pub fn init_id(self, value: &[u8]) -> Self {
        self.bytes(slot::INIT_ID, value)
    }

    pub fn profile_id(self, value: &[u8]) -> Self {
        self.bytes(slot::PROFILE_ID, value)
    }

    pub fn pretty_name(self, value: &[u8]) -> Self {
        self.bytes(slot::PRETTY_NAME, value)
    }

    pub fn meta_title(self, value: &[u8]) -> Self {
        self.bytes(slot::META_TITLE, value)
    }

    pub fn theme_list(self, value: &[u8]) -> Self {
        self.bytes(slot::THEME_LIST, value)
    }

    pub fn head_ref(self, value: &[u8]) -> Self {
        self.bytes(slot::HEAD_REF, value)
    }

    pub fn fsi_path(self, value: &[u8]) -> Self {
        self.bytes(slot::FSI_PATH, value)
    }

    pub fn top_index(mut self, n: i32) -> Self {
        self.slots[slot::TOP_INDEX] = Some(SlotValue::I32(n));
        self
    }

    pub fn cursor_index(mut self, n: i32) -> Self {
        self.slots[slot::CURSOR_INDEX] = Some(SlotValue::I32(n));
        self
    }

    pub fn body_size(mut self, n: i64) -> Self {
        self.slots[slot::BODY_SIZE] = Some(SlotValue::I64(n));
        self
    }

    pub fn body_rows(mut self, n: i32) -> Self {
        self.slots[slot::BODY_ROWS] = Some(SlotValue::I32(n));
        self
    }

    pub fn commit_time(mut self, n: i64) -> Self {
        self.slots[slot::COMMIT_TIME] = Some(SlotValue::I64(n));
        self
    }

    pub fn num_errors(mut self, n: i32) -> Self {
        self.slots[slot::NUM_ERRORS] = Some(SlotValue::I32(n));
        self
    }

    /// Lay out the record: slot table first, payload in slot order
    pub fn build(self) -> EntryRecord {
        let header_len = 2 + 4 * SLOT_COUNT as usize;
        let mut buf = vec![0u8; header_len];
        buf[0..2].copy_from_slice(&SLOT_COUNT.to_le_bytes());

        for (idx, value) in self.slots.into_iter().enumerate() {
            let Some(value) = value else {
                continue;
            };
            let off = buf.len() as u32;
            buf[2 + 4 * idx..2 + 4 * idx + 4].copy_from_slice(&off.to_le_bytes());
            match value {
                SlotValue::Bytes(b) => {
                    buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                    buf.extend_from_slice(&b);
                }
                SlotValue::I32(n) => buf.extend_from_slice(&n.to_le_bytes()),
                SlotValue::I64(n) => buf.extend_from_slice(&n.to_le_bytes()),
            }
        }

        EntryRecord { buf }
    }
}
