//! The semilattice join seam.
//!
//! Every replicated type in this crate converges by merging full states.
//! [`Merge`] is that seam: `a.merge(b)` folds replica `b`'s state into `a`,
//! and the result is the least upper bound of both.
//!
//! Implementations must satisfy the semilattice laws:
//!
//! - **Commutative**: merge(A, B) = merge(B, A)
//! - **Associative**: merge(merge(A, B), C) = merge(A, merge(B, C))
//! - **Idempotent**: merge(A, A) = A
//!
//! Those laws are what make gossip safe: duplicated, reordered, or
//! re-delivered state exchanges all land on the same value.

/// State-based merge. Folds `other` into `self`.
pub trait Merge {
    fn merge(&mut self, other: Self);
}
