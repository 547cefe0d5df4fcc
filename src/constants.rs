//! Numeric types and sentinels shared by every path and assignment routine.
//!
//! Distances are always [`Float`], node/edge positions are always [`Index`].
//! Both are 64 bits wide so results are bit-compatible wherever they are
//! produced.

/// Element type for costs, flows and skims.
pub type Float = f64;

/// Element type for node and edge positions inside a compiled graph.
pub type Index = u64;

/// Tolerance for treating two costs as equal.
pub const EPSILON: Float = 1e-15;

/// Marks "no predecessor" / "no connector" in shortest-path trees.
pub const NULL_INDEX: Index = Index::MAX;

/// Initial label of every node before relaxation. Larger than any finite
/// accumulated path cost.
pub const INFINITE: Float = Float::MAX;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Release codename, fixed per version.
pub const RELEASE_NAME: &str = "Queluz";

const _: () = assert!(std::mem::size_of::<Float>() == 8);
const _: () = assert!(std::mem::size_of::<Index>() == 8);

/// Convert a graph position into a `usize` for slice indexing.
#[inline(always)]
pub(crate) fn ix(i: Index) -> usize {
    i as usize
}
