//! Replica identity primitives.
//!
//! Every replica in a cluster is named by a [`NodeId`], an opaque string
//! chosen by the host application (a hostname, a UUID, a pod name). Node ids
//! order lexicographically; that order is load-bearing wherever a
//! deterministic tie-break between replicas is needed (LWW conflicts, RGA
//! sibling ordering).
//!
//! A [`Dot`] is the unique tag minted for a single tagged mutation: the pair
//! of the acting node and a per-node monotone counter. OR-Set add tags and
//! RGA element ids are dots. Two dots minted anywhere in the cluster are
//! equal only if they name the same mutation.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Opaque replica identifier.
///
/// Cheap to clone, ordered lexicographically, serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Dot
// ---------------------------------------------------------------------------

/// Unique mutation tag: `(node, counter)`.
///
/// The derived ordering (node first, then counter) is the total order used
/// when concurrent mutations must be ranked deterministically. On the wire a
/// dot is the string `"{node}:{counter}"`, which keeps JSON maps keyed by
/// dots legal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dot {
    /// Replica that minted the tag.
    pub node: NodeId,
    /// Per-node monotone counter, starting at 1.
    pub counter: u64,
}

impl Dot {
    /// Build a dot for `node` with an explicit counter value.
    #[must_use]
    pub fn new(node: NodeId, counter: u64) -> Self {
        Self { node, counter }
    }
}

impl fmt::Display for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.counter)
    }
}

/// Error from parsing a malformed dot string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed dot {0:?}, expected \"node:counter\"")]
pub struct ParseDotError(String);

impl FromStr for Dot {
    type Err = ParseDotError;

    /// Parse `"{node}:{counter}"`.
    ///
    /// Node ids may themselves contain `:` (socket addresses do), so the
    /// split happens at the *last* colon; the counter never contains one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, counter) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseDotError(s.to_owned()))?;
        let counter: u64 = counter
            .parse()
            .map_err(|_| ParseDotError(s.to_owned()))?;
        Ok(Self::new(NodeId::from(node), counter))
    }
}

impl Serialize for Dot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Wall clock
// ---------------------------------------------------------------------------

/// Current wall time as Unix milliseconds.
///
/// Convenience for callers feeding LWW timestamps from real time. Saturates
/// instead of panicking if the system clock is unrepresentable.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
