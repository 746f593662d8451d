//! Entity references used across the data-flow graph.
//!
//! Nodes and values are `u32` indexes into the graph's primary maps rather
//! than Rust references; there is a separate index type per entity so the
//! type system keeps them apart.

use cranelift_entity::entity_impl;

/// A node of the data-flow graph: one instruction, or the virtual source or
/// sink.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(u32);
entity_impl!(Node, "node");

/// A value: the contents written into one register by one node's write
/// slot. Renaming assigns each value an architectural register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");
