//! Tests for the LWW object and LWW set CRDTs.
//!
//! Verifies:
//! - Convergence of LWW field updates under every delivery order
//! - Convergence of set add/remove under every delivery order
//! - Add-wins tie-break on equal stamps
//! - Merge of divergent replicas (commutative, associative, idempotent)

use swarmdb_protocol::{Atom, Payload, Stamp};
use swarmdb_state::crdt::{LwwObject, LwwSet};

/// Every ordering of `items`.
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════
// LWW Object Convergence
// ═══════════════════════════════════════════════════════════════

#[test]
fn lww_converges_under_any_order() {
    let updates = vec![
        (Payload::new().with("x", 1).with("y", "a"), Stamp::new(1, "w1")),
        (Payload::new().with("x", 2), Stamp::new(2, "w2")),
        (Payload::new().with("y", Atom::Null), Stamp::new(3, "w1")),
        (Payload::new().with("x", 3).with("z", true), Stamp::new(2, "w1")),
        (Payload::new().with("y", "b"), Stamp::new(3, "w0")),
    ];

    let mut reference: Option<LwwObject> = None;
    for order in permutations(&updates) {
        let mut obj = LwwObject::new();
        for (payload, stamp) in &order {
            obj.apply(payload, stamp).unwrap();
        }
        match &reference {
            None => reference = Some(obj),
            Some(expected) => assert_eq!(&obj, expected, "order {:?} diverged", order),
        }
    }

    let converged = reference.unwrap();
    // (2, w2) beats (2, w1) on the writer tag.
    assert_eq!(converged.get("x"), Some(&Atom::Int(2)));
    // (3, w1) tombstone beats (3, w0).
    assert_eq!(converged.get("y"), Some(&Atom::Null));
    assert_eq!(converged.get("z"), Some(&Atom::Bool(true)));
    assert_eq!(converged.len(), 2);
}

#[test]
fn lww_equal_stamp_picks_greater_atom() {
    let stamp = Stamp::new(7, "w");
    let mut a = LwwObject::new();
    a.apply(&Payload::new().with("k", "apple"), &stamp).unwrap();
    a.apply(&Payload::new().with("k", "banana"), &stamp).unwrap();

    let mut b = LwwObject::new();
    b.apply(&Payload::new().with("k", "banana"), &stamp).unwrap();
    b.apply(&Payload::new().with("k", "apple"), &stamp).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.get("k"), Some(&Atom::from("banana")));
}

#[test]
fn lww_reapply_is_idempotent() {
    let mut obj = LwwObject::new();
    let payload = Payload::new().with("x", 1);
    assert_eq!(obj.apply(&payload, &Stamp::new(1, "w")).unwrap(), 1);
    assert_eq!(obj.apply(&payload, &Stamp::new(1, "w")).unwrap(), 0);
}

#[test]
fn lww_tombstone_keeps_stamp() {
    let mut obj = LwwObject::new();
    obj.apply(&Payload::new().with("x", Atom::Null), &Stamp::new(5, "w")).unwrap();
    let register = obj.field("x").unwrap();
    assert!(register.value.is_null());
    assert_eq!(register.stamp, Stamp::new(5, "w"));
    assert_eq!(obj.live_fields().count(), 0);
}

// ═══════════════════════════════════════════════════════════════
// LWW Set Convergence
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
enum SetOp {
    Add(Atom, Stamp),
    Remove(Atom, Stamp),
}

fn run(ops: &[SetOp]) -> LwwSet {
    let mut set = LwwSet::new();
    for op in ops {
        match op {
            SetOp::Add(v, s) => set.add(v.clone(), s.clone()),
            SetOp::Remove(v, s) => set.remove(v.clone(), s.clone()),
        };
    }
    set
}

#[test]
fn set_add_then_remove_same_stamp_matches_reverse() {
    let v = Atom::from("v");
    let t = Stamp::new(1, "w");
    let forward = run(&[SetOp::Add(v.clone(), t.clone()), SetOp::Remove(v.clone(), t.clone())]);
    let reverse = run(&[SetOp::Remove(v.clone(), t.clone()), SetOp::Add(v.clone(), t)]);
    assert_eq!(forward, reverse);
    assert!(forward.contains(&v), "Add must win on equal stamps");
}

#[test]
fn set_converges_under_any_order() {
    let ops = vec![
        SetOp::Add(Atom::from("a"), Stamp::new(1, "w1")),
        SetOp::Remove(Atom::from("a"), Stamp::new(2, "w2")),
        SetOp::Add(Atom::from("b"), Stamp::new(2, "w1")),
        SetOp::Remove(Atom::from("b"), Stamp::new(2, "w1")),
        SetOp::Add(Atom::Int(5), Stamp::new(3, "w2")),
    ];

    let expected = run(&ops);
    for order in permutations(&ops) {
        assert_eq!(run(&order), expected, "order {:?} diverged", order);
    }

    assert!(!expected.contains(&Atom::from("a")));
    assert!(expected.contains(&Atom::from("b")));
    assert!(expected.contains(&Atom::Int(5)));
    assert_eq!(expected.len(), 2);
}

#[test]
fn set_later_remove_beats_earlier_add() {
    let mut set = LwwSet::new();
    set.add(Atom::Int(1), Stamp::new(1, "w"));
    set.remove(Atom::Int(1), Stamp::new(2, "w"));
    set.add(Atom::Int(1), Stamp::new(3, "w"));
    assert!(set.contains(&Atom::Int(1)), "Re-add with newer stamp restores element");
}

#[test]
fn set_elements_in_canonical_order() {
    let mut set = LwwSet::new();
    let mut t = 0;
    for v in ["e", "c", "a", "d", "b"] {
        t += 1;
        set.add(Atom::from(v), Stamp::new(t, "w"));
    }
    set.add(Atom::Int(9), Stamp::new(10, "w"));
    assert_eq!(
        set.elements(),
        vec![
            Atom::Int(9),
            Atom::from("a"),
            Atom::from("b"),
            Atom::from("c"),
            Atom::from("d"),
            Atom::from("e"),
        ]
    );
}

// ═══════════════════════════════════════════════════════════════
// Merge Semantics
// ═══════════════════════════════════════════════════════════════

fn replicas() -> (LwwSet, LwwSet, LwwSet) {
    let mut a = LwwSet::new();
    let mut b = LwwSet::new();
    let mut c = LwwSet::new();
    a.add(Atom::from("x"), Stamp::new(1, "a"));
    b.remove(Atom::from("x"), Stamp::new(2, "b"));
    b.add(Atom::from("y"), Stamp::new(1, "b"));
    c.add(Atom::from("x"), Stamp::new(3, "c"));
    c.remove(Atom::from("y"), Stamp::new(1, "c"));
    (a, b, c)
}

#[test]
fn set_merge_is_commutative() {
    let (a, b, _) = replicas();
    let mut ab = a.clone();
    ab.merge(&b);
    let mut ba = b.clone();
    ba.merge(&a);
    assert_eq!(ab, ba);
    assert!(!ab.contains(&Atom::from("x")));
}

#[test]
fn set_merge_is_associative() {
    let (a, b, c) = replicas();
    let mut ab_c = a.clone();
    ab_c.merge(&b);
    ab_c.merge(&c);

    let mut bc = b.clone();
    bc.merge(&c);
    let mut a_bc = a.clone();
    a_bc.merge(&bc);

    assert_eq!(ab_c, a_bc);
    assert!(ab_c.contains(&Atom::from("x")));
    // "c" wins the tie on the writer tag: (1, "c") > (1, "b").
    assert!(!ab_c.contains(&Atom::from("y")));
}

#[test]
fn set_merge_is_idempotent() {
    let (a, b, _) = replicas();
    let mut merged = a.clone();
    merged.merge(&b);
    let once = merged.clone();
    assert_eq!(merged.merge(&b), 0);
    assert_eq!(merged, once);
}

#[test]
fn lww_merge_matches_applying_all_writes() {
    let mut a = LwwObject::new();
    let mut b = LwwObject::new();
    a.apply(&Payload::new().with("x", 1), &Stamp::new(1, "a")).unwrap();
    b.apply(&Payload::new().with("x", 2).with("y", 3), &Stamp::new(2, "b")).unwrap();

    let mut merged = a.clone();
    merged.merge(&b);

    let mut direct = LwwObject::new();
    direct.apply(&Payload::new().with("x", 2).with("y", 3), &Stamp::new(2, "b")).unwrap();
    direct.apply(&Payload::new().with("x", 1), &Stamp::new(1, "a")).unwrap();

    assert_eq!(merged, direct);
}
