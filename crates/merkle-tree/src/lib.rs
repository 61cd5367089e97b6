//! Node wire codec, incremental tree builder, and iterator adapter for the
//! content-addressed Merkle blob store.

mod builder;
mod codec;
mod iter;

pub use builder::{Rebalance, Side, TreeBuilder};
pub use codec::{decode_node, encode_interior, encode_leaf, CodecError, Node};
pub use iter::{IterError, Producer, PullIter};
