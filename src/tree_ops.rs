//! Structural operations on a tree rooted at an `Arc<Node>` (§4.1 `Prune`,
//! `PopStateVector`, `InsertAtDepth`, `RemoveSeparableAtDepth`).
//!
//! Grounded on the teacher's `domain::quadtree` subdivide/insert routines
//! (`src/domain/quadtree.rs`) for the recursive-descent shape, and on
//! `src/domain/segment.rs`'s `split_into` for the idea of splitting a range
//! and re-linking the remainder once a piece is carved out — the same shape
//! `RemoveSeparableAtDepth` needs for the continuation below the separated
//! range. `RemoveSeparableAtDepth`'s separability test is implemented via
//! dense enumeration rather than the in-place graph surgery a handwritten
//! engine might use: at the qubit counts this crate targets it is the
//! clearer and more obviously-correct of the two, and it is documented as a
//! deliberate trade-off in `DESIGN.md`.

use std::sync::Arc;

use num_complex::Complex64;
use ordered_float::OrderedFloat;

use crate::node::{branch, scale_in_place, Node};

/// `Node::Prune` (§4.1): bottom-up, within the first `depth` tree levels.
/// Collapses any node whose both children are zero into the canonical zero
/// node, and shares children whose subtrees are equal up to the extracted
/// common scale factor.
pub fn prune(slot: &mut Arc<Node>, depth: usize, floor: f64, eps: f64) {
    if depth == 0 {
        return;
    }
    if slot.is_zero(floor) {
        *slot = Node::zero();
        return;
    }
    let node = branch(slot);
    if let Node::Interior { scale, branches } = node {
        if let Some(children) = branches {
            prune(&mut children[0], depth - 1, floor, eps);
            prune(&mut children[1], depth - 1, floor, eps);

            let z0 = children[0].is_zero(floor);
            let z1 = children[1].is_zero(floor);
            if z0 && z1 {
                *scale = Complex64::new(0.0, 0.0);
                *branches = None;
                return;
            }

            let dominant = if children[0].scale().norm() >= children[1].scale().norm() {
                children[0].scale()
            } else {
                children[1].scale()
            };
            if dominant.norm() > floor {
                let inv = Complex64::new(1.0, 0.0) / dominant;
                *scale *= dominant;
                if !z0 {
                    scale_in_place(&mut children[0], inv);
                }
                if !z1 {
                    scale_in_place(&mut children[1], inv);
                }
            }

            if !z0 && !z1 && nodes_equal(&children[0], &children[1], eps) {
                children[1] = children[0].clone();
            }
        }
    }
}

fn nodes_equal(a: &Arc<Node>, b: &Arc<Node>, eps: f64) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    match (&**a, &**b) {
        (
            Node::Interior {
                scale: s1,
                branches: br1,
            },
            Node::Interior {
                scale: s2,
                branches: br2,
            },
        ) => {
            if (*s1 - *s2).norm() > eps {
                return false;
            }
            match (br1, br2) {
                (None, None) => true,
                (Some(c1), Some(c2)) => {
                    nodes_equal(&c1[0], &c2[0], eps) && nodes_equal(&c1[1], &c2[1], eps)
                }
                _ => false,
            }
        }
        (
            Node::AttachedLeaf {
                scale: s1,
                engine: e1,
            },
            Node::AttachedLeaf {
                scale: s2,
                engine: e2,
            },
        ) => (*s1 - *s2).norm() <= eps && Arc::ptr_eq(e1, e2),
        _ => false,
    }
}

/// `Node::PopStateVector` (§4.1): pushes each interior node's scale down
/// into its children by multiplication, then resets it to 1, for the first
/// `depth` levels. Used after a bulk write leaves scale sitting at the root.
pub fn pop_state_vector(slot: &mut Arc<Node>, depth: usize) {
    if depth == 0 {
        return;
    }
    let node = branch(slot);
    if let Node::Interior { scale, branches } = node {
        let s = *scale;
        *scale = Complex64::new(1.0, 0.0);
        if let Some(children) = branches {
            scale_in_place(&mut children[0], s);
            scale_in_place(&mut children[1], s);
            pop_state_vector(&mut children[0], depth - 1);
            pop_state_vector(&mut children[1], depth - 1);
        }
    }
}

/// `InsertAtDepth` (§4.1): grafts `sub_root` (itself of depth `length`, with
/// no attached qubits) in at depth `start`, pushing whatever continued below
/// `start` further down by `length` levels.
pub fn insert_at_depth(slot: &mut Arc<Node>, sub_root: &Arc<Node>, start: usize, length: usize) {
    insert_at_depth_rec(slot, sub_root, start, length, 0)
}

fn insert_at_depth_rec(
    slot: &mut Arc<Node>,
    sub_root: &Arc<Node>,
    start: usize,
    length: usize,
    cur_depth: usize,
) {
    if cur_depth == start {
        *slot = graft(sub_root, slot, length);
        return;
    }
    let node = branch(slot);
    match node {
        Node::Interior {
            branches: Some(children),
            ..
        } => {
            insert_at_depth_rec(&mut children[0], sub_root, start, length, cur_depth + 1);
            insert_at_depth_rec(&mut children[1], sub_root, start, length, cur_depth + 1);
        }
        Node::Interior { branches: None, .. } => {
            // Zero subtree: no amplitude reaches this point, so there is
            // nothing to attach `sub_root` to.
        }
        Node::AttachedLeaf { .. } => {
            panic!("insert_at_depth reached an attached leaf above its target depth")
        }
    }
}

/// Rebuilds `sub_root`'s shape for the next `remaining` levels, attaching a
/// scaled copy of `tail` (the original subtree found at the insertion point)
/// at every one of `sub_root`'s own leaves.
fn graft(sub_root: &Arc<Node>, tail: &Arc<Node>, remaining: usize) -> Arc<Node> {
    if remaining == 0 {
        return crate::node::scaled_clone(tail, sub_root.scale());
    }
    match &**sub_root {
        Node::Interior {
            scale,
            branches: Some(children),
        } => Node::interior(
            *scale,
            graft(&children[0], tail, remaining - 1),
            graft(&children[1], tail, remaining - 1),
        ),
        Node::Interior {
            scale,
            branches: None,
        } => Arc::new(Node::Interior {
            scale: *scale,
            branches: None,
        }),
        Node::AttachedLeaf { .. } => crate::node::scaled_clone(tail, sub_root.scale()),
    }
}

/// Builds a tree of the given depth directly from a dense amplitude vector
/// (length `2^depth`), MSB-first: `amps[i]`'s bit at position `depth-1-d`
/// selects the branch taken at tree depth `d`. Used by bulk state-vector
/// writes and by `Decompose`'s reconstruction of the separated register;
/// callers are expected to `prune` the result afterward.
pub fn build_from_amplitudes(amps: &[Complex64], depth: usize) -> Arc<Node> {
    debug_assert_eq!(amps.len(), 1usize << depth);
    if depth == 0 {
        return Node::leaf_amplitude(amps[0]);
    }
    let half = amps.len() / 2;
    let left = build_from_amplitudes(&amps[..half], depth - 1);
    let right = build_from_amplitudes(&amps[half..], depth - 1);
    Node::interior(Complex64::new(1.0, 0.0), left, right)
}

/// The inverse of [`build_from_amplitudes`]: flattens the first `depth`
/// levels of a tree into a dense amplitude vector.
pub fn flatten_to_amplitudes(node: &Arc<Node>, depth: usize) -> Vec<Complex64> {
    let mut out = Vec::with_capacity(1usize << depth);
    flatten_rec(node, depth, Complex64::new(1.0, 0.0), &mut out);
    out
}

fn flatten_rec(node: &Node, depth: usize, prefix_scale: Complex64, out: &mut Vec<Complex64>) {
    let s = prefix_scale * node.scale();
    if depth == 0 {
        out.push(s);
        return;
    }
    match node {
        Node::Interior {
            branches: Some(children),
            ..
        } => {
            flatten_rec(&children[0], depth - 1, s, out);
            flatten_rec(&children[1], depth - 1, s, out);
        }
        Node::Interior { branches: None, .. } => {
            out.resize(out.len() + (1usize << depth), Complex64::new(0.0, 0.0));
        }
        Node::AttachedLeaf { .. } => {
            panic!("flatten_to_amplitudes reached an attached leaf before its target depth")
        }
    }
}

/// `RemoveSeparableAtDepth`'s separability test (§4.1): checks whether the
/// dense state `amps` (indexed MSB-first over `total_qubits` tree qubits)
/// factors as `rest ⊗ dest` across the `[start, start+length)` range, and if
/// so returns `(dest_amplitudes, rest_amplitudes)`, each independently
/// unit-normalized.
pub fn factor_separable(
    amps: &[Complex64],
    total_qubits: usize,
    start: usize,
    length: usize,
    eps: f64,
) -> Option<(Vec<Complex64>, Vec<Complex64>)> {
    let rest_qubits = total_qubits - length;
    let rest_len = 1usize << rest_qubits;
    let middle_len = 1usize << length;
    let suffix_bits = total_qubits - start - length;
    let suffix_len = 1usize << suffix_bits;

    let rest_index = |prefix: usize, suffix: usize| (prefix << suffix_bits) | suffix;
    let full_index =
        |prefix: usize, middle: usize, suffix: usize| (prefix << (length + suffix_bits)) | (middle << suffix_bits) | suffix;

    let mut best_rest_prefix = 0usize;
    let mut best_rest_suffix = 0usize;
    let mut best_mag = -1.0f64;
    for prefix in 0..(1usize << start) {
        for suffix in 0..suffix_len {
            let mag: f64 = (0..middle_len)
                .map(|m| amps[full_index(prefix, m, suffix)].norm_sqr())
                .sum();
            if mag > best_mag {
                best_mag = mag;
                best_rest_prefix = prefix;
                best_rest_suffix = suffix;
            }
        }
    }
    if best_mag <= eps * eps {
        return None;
    }

    let middle_vec: Vec<Complex64> = (0..middle_len)
        .map(|m| amps[full_index(best_rest_prefix, m, best_rest_suffix)])
        .collect();
    let best_middle = middle_vec
        .iter()
        .enumerate()
        .max_by_key(|(_, a)| OrderedFloat(a.norm_sqr()))
        .map(|(i, _)| i)?;
    let middle_ref = middle_vec[best_middle];
    if middle_ref.norm_sqr() <= eps * eps {
        return None;
    }

    let mut rest_vec = vec![Complex64::new(0.0, 0.0); rest_len];
    for prefix in 0..(1usize << start) {
        for suffix in 0..suffix_len {
            let r = rest_index(prefix, suffix);
            rest_vec[r] = amps[full_index(prefix, best_middle, suffix)] / middle_ref;
        }
    }

    for prefix in 0..(1usize << start) {
        for suffix in 0..suffix_len {
            let r = rest_index(prefix, suffix);
            for m in 0..middle_len {
                let expected = rest_vec[r] * middle_vec[m];
                let actual = amps[full_index(prefix, m, suffix)];
                if (expected - actual).norm() > eps {
                    return None;
                }
            }
        }
    }

    let dest_norm = middle_vec.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
    let rest_norm = rest_vec.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
    if dest_norm <= eps || rest_norm <= eps {
        return None;
    }
    let dest_amps: Vec<Complex64> = middle_vec.iter().map(|a| a / dest_norm).collect();
    let rest_amps: Vec<Complex64> = rest_vec.iter().map(|a| a / rest_norm).collect();
    Some((dest_amps, rest_amps))
}
