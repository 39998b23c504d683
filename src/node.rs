//! The compressed tree node (§3 `Node`, §4.1): an `Interior` node carrying a
//! complex edge `scale` and two children, or an `AttachedLeaf` delegating the
//! remainder of the register to an [`crate::engine::AttachedEngine`].
//!
//! Grounded on the teacher's `domain::quadtree::Node` (`Node::Tree`/`Node::Leaf`,
//! `src/domain/quadtree.rs`) for the interior/leaf shape, and on
//! `src/physics/gravity/quadtree.rs`'s scale/moment propagation for the idea
//! of an edge-weight carried on every node. The copy-on-write `Branch`
//! operation (§4.1) needed no hand-written unsharing logic: deriving `Clone`
//! on `Node` and routing every mutation through `Arc::make_mut` gives the
//! exact "fresh, uniquely-owned shallow copy, substructure still shared"
//! semantics the spec describes, for free.

use std::sync::Arc;

use num_complex::Complex64;

use crate::engine::AttachedEngine;

/// A node's two children are boxed together so the `Interior` variant does
/// not dominate `Node`'s stack size next to the much smaller `AttachedLeaf`.
pub type Children = Box<[Arc<Node>; 2]>;

#[derive(Clone, Debug)]
pub enum Node {
    /// `branches == None` is the canonical zero node: scale is (numerically)
    /// zero and the subtree below it is irrelevant, so it is never
    /// allocated (§4.1 "zero node").
    Interior {
        scale: Complex64,
        branches: Option<Children>,
    },
    AttachedLeaf {
        scale: Complex64,
        engine: Arc<dyn AttachedEngine>,
    },
}

impl Node {
    pub fn zero() -> Arc<Node> {
        Arc::new(Node::Interior {
            scale: Complex64::new(0.0, 0.0),
            branches: None,
        })
    }

    pub fn leaf_amplitude(scale: Complex64) -> Arc<Node> {
        Arc::new(Node::Interior {
            scale,
            branches: None,
        })
    }

    pub fn interior(scale: Complex64, left: Arc<Node>, right: Arc<Node>) -> Arc<Node> {
        Arc::new(Node::Interior {
            scale,
            branches: Some(Box::new([left, right])),
        })
    }

    pub fn attached(scale: Complex64, engine: Arc<dyn AttachedEngine>) -> Arc<Node> {
        Arc::new(Node::AttachedLeaf { scale, engine })
    }

    pub fn scale(&self) -> Complex64 {
        match self {
            Node::Interior { scale, .. } => *scale,
            Node::AttachedLeaf { scale, .. } => *scale,
        }
    }

    pub fn set_scale(&mut self, value: Complex64) {
        match self {
            Node::Interior { scale, .. } => *scale = value,
            Node::AttachedLeaf { scale, .. } => *scale = value,
        }
    }

    pub fn is_zero(&self, floor: f64) -> bool {
        self.scale().norm() <= floor
    }

    pub fn branches(&self) -> Option<&[Arc<Node>; 2]> {
        match self {
            Node::Interior {
                branches: Some(b), ..
            } => Some(b),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Node::Interior { branches: None, .. } | Node::AttachedLeaf { .. }
        )
    }
}

/// `Node::Branch` (§4.1): the sole mutation entry point. Equivalent to
/// `Arc::make_mut`, which is idempotent on an already-unique `Arc` exactly as
/// the spec requires ("re-branching a unique-owned child is a no-op").
pub fn branch(slot: &mut Arc<Node>) -> &mut Node {
    Arc::make_mut(slot)
}

/// Multiplies a node's edge scale in place, cloning it via `branch` only if
/// it is shared.
pub fn scale_in_place(slot: &mut Arc<Node>, factor: Complex64) {
    if factor == Complex64::new(1.0, 0.0) {
        return;
    }
    let node = branch(slot);
    let s = node.scale();
    node.set_scale(s * factor);
}

/// Returns a fresh node equal to `*node` but with its top scale multiplied
/// by `factor`, without disturbing the original `Arc` (used where the
/// original is still referenced elsewhere, e.g. grafting in `tree_ops`).
pub fn scaled_clone(node: &Arc<Node>, factor: Complex64) -> Arc<Node> {
    match &**node {
        Node::Interior { scale, branches } => Arc::new(Node::Interior {
            scale: *scale * factor,
            branches: branches.clone(),
        }),
        Node::AttachedLeaf { scale, engine } => Arc::new(Node::AttachedLeaf {
            scale: *scale * factor,
            engine: engine.clone(),
        }),
    }
}

/// A dense 2x2 unitary, row-major: `[[m00, m01], [m10, m11]]`. Shared by
/// `Mtrx`/`MCMtrx` at the tree level (§4.3 `Node::Apply2x2`) and by
/// [`crate::engine::AttachedEngine::mtrx`] at the leaf level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mtrx2x2 {
    pub m00: Complex64,
    pub m01: Complex64,
    pub m10: Complex64,
    pub m11: Complex64,
}

impl Mtrx2x2 {
    pub const fn new(m00: Complex64, m01: Complex64, m10: Complex64, m11: Complex64) -> Self {
        Self { m00, m01, m10, m11 }
    }

    pub fn identity() -> Self {
        Self::new(
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(1.0, 0.0),
        )
    }

    pub fn pauli_x() -> Self {
        Self::new(
            Complex64::new(0.0, 0.0),
            Complex64::new(1.0, 0.0),
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 0.0),
        )
    }

    pub fn hadamard() -> Self {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        Self::new(
            Complex64::new(h, 0.0),
            Complex64::new(h, 0.0),
            Complex64::new(h, 0.0),
            Complex64::new(-h, 0.0),
        )
    }

    pub fn phase(top_left: Complex64, bottom_right: Complex64) -> Self {
        Self::new(
            top_left,
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
            bottom_right,
        )
    }

    pub fn invert(top_right: Complex64, bottom_left: Complex64) -> Self {
        Self::new(
            Complex64::new(0.0, 0.0),
            top_right,
            bottom_left,
            Complex64::new(0.0, 0.0),
        )
    }

    /// Conjugate transpose, used when a dagger'd gate is dispatched.
    pub fn dagger(&self) -> Self {
        Self::new(
            self.m00.conj(),
            self.m10.conj(),
            self.m01.conj(),
            self.m11.conj(),
        )
    }

    /// Applies the matrix to a child-scale pair `(a, b)` == (scale of the
    /// `0` branch, scale of the `1` branch), per §4.3 `Node::Apply2x2`.
    pub fn apply(&self, a: Complex64, b: Complex64) -> (Complex64, Complex64) {
        (
            self.m00 * a + self.m01 * b,
            self.m10 * a + self.m11 * b,
        )
    }

    /// A gate that only rephases basis states (diagonal), letting callers
    /// skip a branch allocation on the untouched child (§4.3 dispatch note).
    pub fn is_phase_only(&self) -> bool {
        self.m01.norm_sqr() == 0.0 && self.m10.norm_sqr() == 0.0
    }
}

/// A node shaped exactly like [`Node::zero`]: no allocated children and a
/// literal-zero scale. Collapsed branches (`force_m`) and never-taken basis
/// branches (`Qbdt::build_basis`) both use this exact shape regardless of
/// tree depth, so it is safe to treat as "contributes nothing" wherever it
/// appears, not only at the terminal depth.
pub(crate) fn is_canonical_zero(node: &Node) -> bool {
    matches!(node, Node::Interior { branches: None, .. }) && node.scale() == Complex64::new(0.0, 0.0)
}

/// Returns `node`'s child `which`, with `node`'s own edge scale folded into
/// it, so the result's `scale()` already reflects the full path from
/// `node`'s parent. A zero or terminal node has no real child to fold and
/// yields the canonical zero instead.
pub(crate) fn child_scaled(node: &Arc<Node>, which: usize) -> Arc<Node> {
    match node.branches() {
        Some(children) => scaled_clone(&children[which], node.scale()),
        None => Node::zero(),
    }
}

/// Returns a node whose value is `ca * a + cb * b`, recursing into matching
/// substructure instead of only combining `a`/`b`'s own top scales — correct
/// for any depth, not just when `a`/`b` are themselves leaves (§4.3
/// `Node::Apply2x2`'s "recursive propagation down one qubit").
fn combine(ca: Complex64, a: &Arc<Node>, cb: Complex64, b: &Arc<Node>) -> Arc<Node> {
    let a_zero = is_canonical_zero(a);
    let b_zero = is_canonical_zero(b);
    if a_zero && b_zero {
        return Node::zero();
    }
    if a_zero {
        return scaled_clone(b, cb);
    }
    if b_zero {
        return scaled_clone(a, ca);
    }
    match (&**a, &**b) {
        (
            Node::Interior {
                scale: sa,
                branches: Some(a_children),
            },
            Node::Interior {
                scale: sb,
                branches: Some(b_children),
            },
        ) => {
            let left = combine(ca * sa, &a_children[0], cb * sb, &b_children[0]);
            let right = combine(ca * sa, &a_children[1], cb * sb, &b_children[1]);
            Node::interior(Complex64::new(1.0, 0.0), left, right)
        }
        (
            Node::Interior { scale: sa, branches: None },
            Node::Interior { scale: sb, branches: None },
        ) => Node::leaf_amplitude(ca * sa + cb * sb),
        (Node::AttachedLeaf { engine: ea, .. }, Node::AttachedLeaf { engine: eb, .. }) => {
            Node::attached(Complex64::new(1.0, 0.0), combine_engines(ca, ea, cb, eb))
        }
        _ => unreachable!("apply_2x2 combining mismatched leaf kinds at the same depth"),
    }
}

/// Builds a fresh engine holding `ca * a + cb * b`'s amplitudes, using only
/// the generic `AttachedEngine` surface (no backend-specific combine hook).
fn combine_engines(ca: Complex64, a: &Arc<dyn AttachedEngine>, cb: Complex64, b: &Arc<dyn AttachedEngine>) -> Arc<dyn AttachedEngine> {
    debug_assert_eq!(a.qubit_count(), b.qubit_count());
    let mut result = a.clone_engine();
    let out = Arc::get_mut(&mut result).expect("clone_engine always returns a uniquely-owned Arc");
    for perm in 0..(1u64 << a.qubit_count()) {
        out.set_amplitude(perm, ca * a.get_amplitude(perm) + cb * b.get_amplitude(perm));
    }
    result
}

/// Builds the two replacement branches for a 2x2 gate on the pair `(c0,
/// c1)`: each output branch is the full linear combination `m_i0 * c0 + m_i1
/// * c1` of both input subtrees. The two are only interchangeable with their
/// top scales alone when both are simple leaves; in general the substructure
/// below them must be mixed too.
pub(crate) fn combine_branches(u: &Mtrx2x2, c0: &Arc<Node>, c1: &Arc<Node>) -> (Arc<Node>, Arc<Node>) {
    let left = combine(u.m00, c0, u.m01, c1);
    let right = combine(u.m10, c0, u.m11, c1);
    (left, right)
}

/// Applies `u` to the two children of an interior node reached at `slot`,
/// per §4.3 `Node::Apply2x2`: the operation the tree-level `Mtrx`/`MCMtrx`
/// dispatch bottoms out in once it reaches the gate's target depth and no
/// deeper control remains to be consulted.
pub fn apply_2x2(slot: &mut Arc<Node>, u: &Mtrx2x2) {
    let node = branch(slot);
    match node {
        Node::Interior { branches, .. } => match branches {
            Some(children) => {
                let [c0, c1] = &mut **children;
                let (new_left, new_right) = combine_branches(u, c0, c1);
                *c0 = new_left;
                *c1 = new_right;
            }
            None => {
                // Zero node with no allocated children: a 2x2 gate on an
                // all-zero pair is still all zero, nothing to do.
            }
        },
        Node::AttachedLeaf { .. } => {
            panic!("apply_2x2 called on an attached leaf; gate should have been routed to the engine")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_node_has_no_branches() {
        let z = Node::zero();
        assert!(z.is_zero(1e-12));
        assert!(z.branches().is_none());
    }

    #[test]
    fn branch_is_idempotent_on_unique_arc() {
        let mut node = Node::leaf_amplitude(Complex64::new(1.0, 0.0));
        let ptr_before = Arc::as_ptr(&node);
        branch(&mut node);
        assert_eq!(ptr_before, Arc::as_ptr(&node));
    }

    #[test]
    fn branch_unshares_on_clone() {
        let shared = Node::leaf_amplitude(Complex64::new(1.0, 0.0));
        let mut a = shared.clone();
        let mut b = shared.clone();
        assert!(Arc::ptr_eq(&a, &b));
        branch(&mut a).set_scale(Complex64::new(0.5, 0.0));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.scale(), Complex64::new(1.0, 0.0));
    }

    #[test]
    fn hadamard_on_a_shallower_target_grafts_the_sibling_subtree() {
        // Root's "0" branch carries a real one-level subtree; its "1"
        // branch is the canonical zero with nothing below it. Rotating at
        // the root must graft the non-zero branch's structure into both
        // outputs, not just swap a pair of scalar scales.
        let subtree = Node::interior(
            Complex64::new(1.0, 0.0),
            Node::leaf_amplitude(Complex64::new(1.0, 0.0)),
            Node::zero(),
        );
        let mut root = Node::interior(Complex64::new(1.0, 0.0), subtree, Node::zero());
        apply_2x2(&mut root, &Mtrx2x2::hadamard());
        let h = std::f64::consts::FRAC_1_SQRT_2;
        if let Node::Interior {
            branches: Some(branches),
            ..
        } = &*root
        {
            for child in branches.iter() {
                if let Node::Interior {
                    scale,
                    branches: Some(grandchildren),
                } = &**child
                {
                    assert!((scale.re - h).abs() < 1e-9);
                    assert_eq!(grandchildren[0].scale(), Complex64::new(1.0, 0.0));
                    assert!(is_canonical_zero(&grandchildren[1]));
                } else {
                    panic!("expected the grafted subtree's structure, not a bare leaf");
                }
            }
        } else {
            panic!("expected interior node");
        }
    }

    #[test]
    fn hadamard_on_basis_state_splits_evenly() {
        let mut node = Node::interior(
            Complex64::new(1.0, 0.0),
            Node::leaf_amplitude(Complex64::new(1.0, 0.0)),
            Node::leaf_amplitude(Complex64::new(0.0, 0.0)),
        );
        apply_2x2(&mut node, &Mtrx2x2::hadamard());
        if let Node::Interior {
            branches: Some(b), ..
        } = &*node
        {
            let h = std::f64::consts::FRAC_1_SQRT_2;
            assert!((b[0].scale().re - h).abs() < 1e-9);
            assert!((b[1].scale().re - h).abs() < 1e-9);
        } else {
            panic!("expected interior node");
        }
    }
}
