//! Proptest strategies shared by the property suites.
//!
//! States are built by replaying random operation scripts, so every
//! generated value is reachable through the public API (private
//! construction would let the generator invent states no replica can
//! produce).
//!
//! For the tag-based types (OR-Set, RGA) the law tests need *forked*
//! replicas: divergent continuations of one shared history, each acting as
//! its own node. Independently generated states could mint the same dot
//! for different payloads, which no real cluster can do; tags are unique
//! by construction there.

use proptest::prelude::*;
use rumor_core::clock::VectorClock;
use rumor_core::crdt::{GCounter, LwwSet, OrSet, PnCounter, Rga};
use rumor_core::node::NodeId;

const NODES: [&str; 4] = ["n0", "n1", "n2", "n3"];
const ELEMENTS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

pub fn arb_node() -> impl Strategy<Value = NodeId> + Clone {
    prop::sample::select(&NODES[..]).prop_map(NodeId::from)
}

fn arb_element() -> impl Strategy<Value = String> + Clone {
    prop::sample::select(&ELEMENTS[..]).prop_map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Independent states (safe where entries carry no minted tags)
// ---------------------------------------------------------------------------

pub fn arb_clock() -> impl Strategy<Value = VectorClock> + Clone {
    prop::collection::vec(arb_node(), 0..24).prop_map(|ticks| {
        let mut clock = VectorClock::new();
        for node in ticks {
            clock.increment(&node);
        }
        clock
    })
}

pub fn arb_gcounter() -> impl Strategy<Value = GCounter> + Clone {
    prop::collection::vec((arb_node(), 0_i64..100), 0..12).prop_map(|ops| {
        let mut counter = GCounter::new();
        for (node, amount) in ops {
            counter.increment(&node, amount).expect("non-negative");
        }
        counter
    })
}

pub fn arb_pncounter() -> impl Strategy<Value = PnCounter> + Clone {
    prop::collection::vec((arb_node(), -50_i64..50), 0..12).prop_map(|ops| {
        let mut counter = PnCounter::new();
        for (node, amount) in ops {
            if amount >= 0 {
                counter.increment(&node, amount).expect("non-negative");
            } else {
                counter.decrement(&node, -amount).expect("non-negative");
            }
        }
        counter
    })
}

pub fn arb_lwwset() -> impl Strategy<Value = LwwSet<String>> + Clone {
    prop::collection::vec((arb_node(), arb_element(), 0_u64..500, any::<bool>()), 0..16).prop_map(
        |ops| {
            let mut set = LwwSet::new();
            for (node, element, timestamp, is_add) in ops {
                if is_add {
                    set.add(&node, element, timestamp).expect("add");
                } else {
                    set.remove(&node, &element, timestamp).expect("remove");
                }
            }
            set
        },
    )
}

// ---------------------------------------------------------------------------
// Forked replicas (tag-minting types)
// ---------------------------------------------------------------------------

type SetOps = Vec<(String, bool)>;
type SeqOps = Vec<(String, usize, bool)>;

fn arb_set_ops() -> impl Strategy<Value = SetOps> + Clone {
    prop::collection::vec((arb_element(), any::<bool>()), 0..12)
}

fn arb_seq_ops() -> impl Strategy<Value = SeqOps> + Clone {
    prop::collection::vec((arb_element(), 0_usize..32, any::<bool>()), 0..12)
}

fn apply_set_ops(set: &mut OrSet<String>, node: &NodeId, ops: SetOps) {
    for (element, is_add) in ops {
        if is_add {
            set.add(node, element);
        } else {
            set.remove(&element);
        }
    }
}

fn apply_seq_ops(rga: &mut Rga<String>, node: &NodeId, ops: SeqOps) {
    for (element, raw_index, is_insert) in ops {
        if is_insert {
            let index = raw_index % (rga.len() + 1);
            rga.insert(node, index, element).expect("in bounds");
        } else if !rga.is_empty() {
            let index = raw_index % rga.len();
            rga.delete(index).expect("in bounds");
        }
    }
}

/// One OR-Set history (single replica). Useful for idempotence.
pub fn arb_orset() -> impl Strategy<Value = OrSet<String>> + Clone {
    arb_set_ops().prop_map(|ops| {
        let mut set = OrSet::new();
        apply_set_ops(&mut set, &NodeId::from("n0"), ops);
        set
    })
}

/// Three OR-Set replicas diverged from one shared history, each acting as
/// a distinct node.
pub fn arb_orset_forks() -> impl Strategy<Value = (OrSet<String>, OrSet<String>, OrSet<String>)> {
    (arb_set_ops(), arb_set_ops(), arb_set_ops(), arb_set_ops()).prop_map(
        |(base, ops_a, ops_b, ops_c)| {
            let mut root = OrSet::new();
            apply_set_ops(&mut root, &NodeId::from("n0"), base);

            let mut a = root.clone();
            let mut b = root.clone();
            let mut c = root;
            apply_set_ops(&mut a, &NodeId::from("n1"), ops_a);
            apply_set_ops(&mut b, &NodeId::from("n2"), ops_b);
            apply_set_ops(&mut c, &NodeId::from("n3"), ops_c);
            (a, b, c)
        },
    )
}

/// One RGA history (single replica).
pub fn arb_rga() -> impl Strategy<Value = Rga<String>> + Clone {
    arb_seq_ops().prop_map(|ops| {
        let mut rga = Rga::new();
        apply_seq_ops(&mut rga, &NodeId::from("n0"), ops);
        rga
    })
}

/// Three RGA replicas diverged from one shared history.
pub fn arb_rga_forks() -> impl Strategy<Value = (Rga<String>, Rga<String>, Rga<String>)> {
    (arb_seq_ops(), arb_seq_ops(), arb_seq_ops(), arb_seq_ops()).prop_map(
        |(base, ops_a, ops_b, ops_c)| {
            let mut root = Rga::new();
            apply_seq_ops(&mut root, &NodeId::from("n0"), base);

            let mut a = root.clone();
            let mut b = root.clone();
            let mut c = root;
            apply_seq_ops(&mut a, &NodeId::from("n1"), ops_a);
            apply_seq_ops(&mut b, &NodeId::from("n2"), ops_b);
            apply_seq_ops(&mut c, &NodeId::from("n3"), ops_c);
            (a, b, c)
        },
    )
}
