//! Semilattice laws for every replicated type, over generated op scripts.

use proptest::prelude::*;
use rumor_core::merge::Merge;

mod generators;
use generators::*;

proptest! {
    // 2,000 cases keeps a full run under a few seconds; raise locally when
    // hunting a shrink.
    #![proptest_config(proptest::test_runner::Config::with_cases(2000))]

    // === Vector clock ===

    #[test]
    fn clock_commutative(a in arb_clock(), b in arb_clock()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma, mb);
    }

    #[test]
    fn clock_associative(a in arb_clock(), b in arb_clock(), c in arb_clock()) {
        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut inner = b;
        inner.merge(c);
        let mut right = a;
        right.merge(inner);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn clock_idempotent(a in arb_clock()) {
        let mut ma = a.clone();
        ma.merge(a.clone());
        prop_assert_eq!(ma, a);
    }

    #[test]
    fn merged_clock_dominates_both(a in arb_clock(), b in arb_clock()) {
        let mut merged = a.clone();
        merged.merge(b.clone());
        prop_assert!(!merged.happens_before(&a));
        prop_assert!(!merged.happens_before(&b));
        prop_assert!(!merged.concurrent(&a));
        prop_assert!(!merged.concurrent(&b));
    }

    // === GCounter ===

    #[test]
    fn gcounter_commutative(a in arb_gcounter(), b in arb_gcounter()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma, mb);
    }

    #[test]
    fn gcounter_associative(a in arb_gcounter(), b in arb_gcounter(), c in arb_gcounter()) {
        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut inner = b;
        inner.merge(c);
        let mut right = a;
        right.merge(inner);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn gcounter_idempotent(a in arb_gcounter()) {
        let mut ma = a.clone();
        ma.merge(a.clone());
        prop_assert_eq!(ma, a);
    }

    #[test]
    fn gcounter_merge_never_shrinks(a in arb_gcounter(), b in arb_gcounter()) {
        let mut merged = a.clone();
        merged.merge(b.clone());
        prop_assert!(merged.value() >= a.value());
        prop_assert!(merged.value() >= b.value());
    }

    // === PnCounter ===

    #[test]
    fn pncounter_commutative(a in arb_pncounter(), b in arb_pncounter()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma, mb);
    }

    #[test]
    fn pncounter_associative(a in arb_pncounter(), b in arb_pncounter(), c in arb_pncounter()) {
        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut inner = b;
        inner.merge(c);
        let mut right = a;
        right.merge(inner);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn pncounter_idempotent(a in arb_pncounter()) {
        let mut ma = a.clone();
        ma.merge(a.clone());
        prop_assert_eq!(ma, a);
    }

    // === OrSet ===

    #[test]
    fn orset_commutative((a, b, _c) in arb_orset_forks()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma, mb);
    }

    #[test]
    fn orset_associative((a, b, c) in arb_orset_forks()) {
        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut inner = b;
        inner.merge(c);
        let mut right = a;
        right.merge(inner);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn orset_idempotent(a in arb_orset()) {
        let mut ma = a.clone();
        ma.merge(a.clone());
        prop_assert_eq!(ma, a);
    }

    #[test]
    fn orset_forks_agree_on_membership((a, b, _c) in arb_orset_forks()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma.value(), mb.value());
    }

    // === LwwSet ===

    #[test]
    fn lwwset_commutative(a in arb_lwwset(), b in arb_lwwset()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma, mb);
    }

    #[test]
    fn lwwset_associative(a in arb_lwwset(), b in arb_lwwset(), c in arb_lwwset()) {
        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut inner = b;
        inner.merge(c);
        let mut right = a;
        right.merge(inner);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn lwwset_idempotent(a in arb_lwwset()) {
        let mut ma = a.clone();
        ma.merge(a.clone());
        prop_assert_eq!(ma, a);
    }

    // === Rga ===

    #[test]
    fn rga_commutative((a, b, _c) in arb_rga_forks()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma, mb);
    }

    #[test]
    fn rga_associative((a, b, c) in arb_rga_forks()) {
        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut inner = b;
        inner.merge(c);
        let mut right = a;
        right.merge(inner);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn rga_idempotent(a in arb_rga()) {
        let mut ma = a.clone();
        ma.merge(a.clone());
        prop_assert_eq!(ma, a);
    }

    #[test]
    fn rga_forks_render_identically((a, b, _c) in arb_rga_forks()) {
        let mut ma = a.clone();
        ma.merge(b.clone());
        let mut mb = b;
        mb.merge(a);
        prop_assert_eq!(ma.value(), mb.value());
    }
}
