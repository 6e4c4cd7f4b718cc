//! Error taxonomy for state mutations and merges.
//!
//! The split is deliberate: violations of a type's own invariants (negative
//! grow-only increments, out-of-range sequence indexes) fail fast with a
//! typed error at the call site, while problems caused by *remote* data
//! (a kind mismatch inside a gossiped snapshot) are surfaced to the merge
//! engine, which logs and skips rather than poisoning the whole exchange.

use crate::crdt::CrdtKind;

/// Errors raised by CRDT operations and merges.
#[derive(Debug, thiserror::Error)]
pub enum CrdtError {
    /// A grow-only counter was asked to shrink.
    #[error("negative amount {amount} on a grow-only counter")]
    NegativeAmount {
        /// The rejected amount.
        amount: i64,
    },

    /// A sequence operation addressed a position past the visible end.
    #[error("index {index} out of bounds for sequence of length {len}")]
    IndexOutOfBounds {
        /// Requested position.
        index: usize,
        /// Visible length at the time of the call.
        len: usize,
    },

    /// Two different CRDT kinds were asked to merge.
    #[error("cannot merge {found} state into a {expected}")]
    KindMismatch {
        /// Kind of the local instance.
        expected: CrdtKind,
        /// Kind carried by the remote state.
        found: CrdtKind,
    },

    /// A value could not be canonically serialized for keying.
    #[error("value is not serializable: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_lowercase_and_specific() {
        let err = CrdtError::NegativeAmount { amount: -3 };
        assert_eq!(err.to_string(), "negative amount -3 on a grow-only counter");

        let err = CrdtError::IndexOutOfBounds { index: 9, len: 2 };
        assert_eq!(
            err.to_string(),
            "index 9 out of bounds for sequence of length 2"
        );

        let err = CrdtError::KindMismatch {
            expected: CrdtKind::GCounter,
            found: CrdtKind::Rga,
        };
        assert_eq!(err.to_string(), "cannot merge rga state into a g-counter");
    }
}
