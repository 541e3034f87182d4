//! In-memory record index and free-list.
//!
//! Two growable arrays of file offsets: the live index (sorted by primary
//! key when one exists, insertion order otherwise) and the free-list of
//! tombstoned slots. Both are persisted as 4-byte offsets in the tail
//! region after the record data and reloaded at open using the header
//! counters.

use crate::error::{DbError, DbResult};
use crate::record::compare_scalars;
use flatdb_codec::Value;
use std::cmp::Ordering;

/// The live index and free-list.
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordIndex {
    live: Vec<u32>,
    free: Vec<u32>,
}

impl RecordIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Live record offsets, in index order.
    pub(crate) fn live(&self) -> &[u32] {
        &self.live
    }

    /// Tombstoned slot offsets.
    pub(crate) fn free(&self) -> &[u32] {
        &self.free
    }

    pub(crate) fn live_len(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Offset of the live record at `pos`.
    pub(crate) fn live_at(&self, pos: usize) -> u32 {
        self.live[pos]
    }

    pub(crate) fn insert_live(&mut self, pos: usize, offset: u32) {
        self.live.insert(pos, offset);
    }

    pub(crate) fn push_live(&mut self, offset: u32) {
        self.live.push(offset);
    }

    pub(crate) fn remove_live(&mut self, pos: usize) -> u32 {
        self.live.remove(pos)
    }

    pub(crate) fn set_live(&mut self, pos: usize, offset: u32) {
        self.live[pos] = offset;
    }

    pub(crate) fn push_free(&mut self, offset: u32) {
        self.free.push(offset);
    }

    pub(crate) fn remove_free(&mut self, pos: usize) -> u32 {
        self.free.remove(pos)
    }

    pub(crate) fn replace(&mut self, live: Vec<u32>, free: Vec<u32>) {
        self.live = live;
        self.free = free;
    }

    /// Scans the free-list first-fit: the first slot whose capacity can
    /// hold `needed` bytes wins.
    ///
    /// `slot_capacity` reads the stored capacity of the tombstone at an
    /// offset.
    pub(crate) fn first_fit<F>(&self, needed: u32, slot_capacity: F) -> DbResult<Option<usize>>
    where
        F: Fn(u32) -> DbResult<u32>,
    {
        for (pos, &offset) in self.free.iter().enumerate() {
            if slot_capacity(offset)? >= needed {
                return Ok(Some(pos));
            }
        }
        Ok(None)
    }

    /// Lower-bound binary search over the live index by primary key.
    ///
    /// `read_key` decodes the key of the record at an offset. Returns
    /// `Ok(pos)` when the key exists at `pos`, `Err(pos)` with the sorted
    /// insertion position otherwise.
    pub(crate) fn binary_search_key<F>(
        &self,
        key: &Value,
        read_key: F,
    ) -> DbResult<Result<usize, usize>>
    where
        F: Fn(u32) -> DbResult<Value>,
    {
        let mut lo = 0usize;
        let mut hi = self.live.len();

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let probe = read_key(self.live[mid])?;
            let order = compare_scalars(&probe, key, false).ok_or_else(|| {
                DbError::MismatchedKeyFieldTypes {
                    expected: probe.type_name(),
                    actual: key.type_name(),
                }
            })?;
            match order {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }

        Ok(Err(lo))
    }

    /// Serializes both arrays for the tail region: live offsets then free
    /// offsets, 4 bytes each.
    pub(crate) fn tail_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity((self.live.len() + self.free.len()) * 4);
        for &offset in self.live.iter().chain(self.free.iter()) {
            buf.extend_from_slice(&(offset as i32).to_le_bytes());
        }
        buf
    }

    /// Parses both arrays from tail bytes using the header counters.
    ///
    /// Returns the index and the number of bytes consumed.
    pub(crate) fn from_tail(
        bytes: &[u8],
        num_records: usize,
        num_deleted: usize,
    ) -> DbResult<(Self, usize)> {
        let needed = (num_records + num_deleted) * 4;
        if bytes.len() < needed {
            return Err(DbError::invalid_operation(format!(
                "index tail truncated: need {needed} bytes, have {}",
                bytes.len()
            )));
        }

        let read_offsets = |chunk: &[u8]| -> DbResult<Vec<u32>> {
            chunk
                .chunks_exact(4)
                .map(|b| {
                    let raw = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    u32::try_from(raw).map_err(|_| {
                        DbError::invalid_operation(format!("negative record offset {raw}"))
                    })
                })
                .collect()
        };

        let live = read_offsets(&bytes[..num_records * 4])?;
        let free = read_offsets(&bytes[num_records * 4..needed])?;

        Ok((Self { live, free }, needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_roundtrip() {
        let mut index = RecordIndex::new();
        index.push_live(100);
        index.push_live(250);
        index.push_free(175);

        let bytes = index.tail_bytes();
        assert_eq!(bytes.len(), 12);

        let (parsed, consumed) = RecordIndex::from_tail(&bytes, 2, 1).unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(parsed.live(), &[100, 250]);
        assert_eq!(parsed.free(), &[175]);
    }

    #[test]
    fn truncated_tail_rejected() {
        let bytes = [0u8; 7];
        assert!(RecordIndex::from_tail(&bytes, 1, 1).is_err());
    }

    #[test]
    fn negative_offset_rejected() {
        let bytes = (-5i32).to_le_bytes();
        assert!(RecordIndex::from_tail(&bytes, 1, 0).is_err());
    }

    #[test]
    fn first_fit_picks_first_adequate_slot() {
        let mut index = RecordIndex::new();
        index.push_free(10);
        index.push_free(20);
        index.push_free(30);

        // Capacities: offset 10 -> 8 bytes, 20 -> 32 bytes, 30 -> 64 bytes
        let capacity = |offset: u32| -> DbResult<u32> {
            Ok(match offset {
                10 => 8,
                20 => 32,
                _ => 64,
            })
        };

        assert_eq!(index.first_fit(16, capacity).unwrap(), Some(1));
        assert_eq!(index.first_fit(8, capacity).unwrap(), Some(0));
        assert_eq!(index.first_fit(100, capacity).unwrap(), None);
    }

    #[test]
    fn binary_search_over_keys() {
        let mut index = RecordIndex::new();
        // Offsets arranged so that key == offset / 10
        for offset in [10, 30, 50, 70] {
            index.push_live(offset);
        }
        let read_key = |offset: u32| -> DbResult<Value> { Ok(Value::Int32(offset as i32 / 10)) };

        assert_eq!(
            index.binary_search_key(&Value::Int32(3), read_key).unwrap(),
            Ok(1)
        );
        assert_eq!(
            index.binary_search_key(&Value::Int32(4), read_key).unwrap(),
            Err(2)
        );
        assert_eq!(
            index.binary_search_key(&Value::Int32(0), read_key).unwrap(),
            Err(0)
        );
        assert_eq!(
            index.binary_search_key(&Value::Int32(9), read_key).unwrap(),
            Err(4)
        );
    }

    #[test]
    fn binary_search_empty() {
        let index = RecordIndex::new();
        let read_key = |_: u32| -> DbResult<Value> { unreachable!() };
        assert_eq!(
            index.binary_search_key(&Value::Int32(1), read_key).unwrap(),
            Err(0)
        );
    }
}
