//! Tag space for the shared completion queue.
//!
//! This module is the single owner of the integer-tag mapping. Everywhere
//! else the driver works with [`BenchTag`]; raw `u64` values exist only at
//! the completion-queue edge. Slot accepts use `0..NUM_SLOTS`, the two
//! per-iteration finish operations use the next two values, so all
//! concurrently outstanding operations carry distinct tags.

use crate::error::{BenchError, Result};

/// Number of server-side call slots kept armed at all times.
pub const NUM_SLOTS: usize = 2;

/// Tag for the server's response-finish operation.
pub const TAG_SERVER_FINISH: u64 = NUM_SLOTS as u64;

/// Tag for the client's receive-finish operation.
pub const TAG_CLIENT_FINISH: u64 = NUM_SLOTS as u64 + 1;

/// Decoded identity of one completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchTag {
    /// Slot `index` matched an incoming call.
    SlotAccepted(usize),
    /// The server's response write finished.
    ServerFinished,
    /// The client received the response.
    ClientFinished,
}

impl BenchTag {
    /// Encode into the opaque tag passed to the completion queue.
    pub fn encode(self) -> u64 {
        match self {
            BenchTag::SlotAccepted(index) => {
                debug_assert!(index < NUM_SLOTS);
                index as u64
            }
            BenchTag::ServerFinished => TAG_SERVER_FINISH,
            BenchTag::ClientFinished => TAG_CLIENT_FINISH,
        }
    }

    /// Decode a delivered tag. Any value outside the closed tag space is a
    /// protocol invariant violation.
    pub fn decode(tag: u64) -> Result<BenchTag> {
        match tag {
            t if (t as usize) < NUM_SLOTS => Ok(BenchTag::SlotAccepted(t as usize)),
            TAG_SERVER_FINISH => Ok(BenchTag::ServerFinished),
            TAG_CLIENT_FINISH => Ok(BenchTag::ClientFinished),
            _ => Err(BenchError::Invariant(format!(
                "unexpected completion tag {}",
                tag
            ))),
        }
    }
}

/// Set of tags still expected while draining completions.
///
/// The two finish completions race; a mask (rather than a fixed sequence)
/// accepts them in either order while still catching duplicates and
/// strays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMask(u8);

impl TagMask {
    /// Empty mask.
    pub fn empty() -> Self {
        TagMask(0)
    }

    /// The per-iteration drain set: both finish tags.
    pub fn both_finishes() -> Self {
        Self::empty()
            .with(BenchTag::ServerFinished)
            .with(BenchTag::ClientFinished)
    }

    /// Add a tag to the expected set.
    pub fn with(self, tag: BenchTag) -> Self {
        TagMask(self.0 | 1 << tag.encode())
    }

    /// Check membership.
    pub fn contains(&self, tag: BenchTag) -> bool {
        self.0 & (1 << tag.encode()) != 0
    }

    /// Clear a drained tag. Draining a tag that is not expected (or
    /// expected no longer) is a protocol invariant violation.
    pub fn clear(&mut self, tag: BenchTag) -> Result<()> {
        let bit = 1 << tag.encode();
        if self.0 & bit == 0 {
            return Err(BenchError::Invariant(format!(
                "drained tag {:?} which is not in the expected set",
                tag
            )));
        }
        self.0 &= !bit;
        Ok(())
    }

    /// True once every expected tag has been drained.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let tags = [
            BenchTag::SlotAccepted(0),
            BenchTag::SlotAccepted(1),
            BenchTag::ServerFinished,
            BenchTag::ClientFinished,
        ];
        for tag in tags {
            assert_eq!(BenchTag::decode(tag.encode()).unwrap(), tag);
        }
    }

    #[test]
    fn test_tag_values_are_distinct() {
        assert_eq!(BenchTag::SlotAccepted(0).encode(), 0);
        assert_eq!(BenchTag::SlotAccepted(1).encode(), 1);
        assert_eq!(BenchTag::ServerFinished.encode(), 2);
        assert_eq!(BenchTag::ClientFinished.encode(), 3);
    }

    #[test]
    fn test_decode_out_of_range() {
        assert!(BenchTag::decode(4).is_err());
        assert!(BenchTag::decode(u64::MAX).is_err());
    }

    #[test]
    fn test_mask_accepts_either_order() {
        for order in [
            [BenchTag::ServerFinished, BenchTag::ClientFinished],
            [BenchTag::ClientFinished, BenchTag::ServerFinished],
        ] {
            let mut mask = TagMask::both_finishes();
            for tag in order {
                mask.clear(tag).unwrap();
            }
            assert!(mask.is_empty());
        }
    }

    #[test]
    fn test_mask_rejects_duplicate() {
        let mut mask = TagMask::both_finishes();
        mask.clear(BenchTag::ClientFinished).unwrap();
        assert!(mask.clear(BenchTag::ClientFinished).is_err());
    }

    #[test]
    fn test_mask_rejects_stray_accept() {
        let mut mask = TagMask::both_finishes();
        assert!(mask.clear(BenchTag::SlotAccepted(0)).is_err());
    }
}
