//! Bounds checks shared by the backing implementations.
//!
//! Every backing enforces the same two rules: reads must lie entirely
//! inside the store, and truncation may only shrink it. Centralizing the
//! checks keeps the error payloads consistent across file and memory
//! stores.

use crate::error::{StorageError, StorageResult};

/// Validates that `len` bytes starting at `offset` lie inside a store of
/// `size` bytes.
pub(crate) fn check_read(offset: u64, len: usize, size: u64) -> StorageResult<()> {
    match offset.checked_add(len as u64) {
        Some(end) if offset <= size && end <= size => Ok(()),
        _ => Err(StorageError::ReadPastEnd { offset, len, size }),
    }
}

/// Validates that truncating a store of `size` bytes to `requested` bytes
/// only shrinks it.
pub(crate) fn check_truncate(requested: u64, size: u64) -> StorageResult<()> {
    if requested > size {
        return Err(StorageError::TruncateBeyondEnd { requested, size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_inside_bounds() {
        assert!(check_read(0, 10, 10).is_ok());
        assert!(check_read(5, 5, 10).is_ok());
        assert!(check_read(10, 0, 10).is_ok());
    }

    #[test]
    fn read_outside_bounds() {
        assert!(matches!(
            check_read(11, 0, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            check_read(5, 6, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn read_overflowing_end_is_rejected() {
        assert!(matches!(
            check_read(u64::MAX, 2, u64::MAX),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn truncate_only_shrinks() {
        assert!(check_truncate(0, 10).is_ok());
        assert!(check_truncate(10, 10).is_ok());
        assert!(matches!(
            check_truncate(11, 10),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
    }
}
