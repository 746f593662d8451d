//! The engine's intermediate representation: instructions, values, and the
//! data-flow graph.

pub mod dfg;
pub mod entities;
pub mod instruction;

pub use dfg::{build, BuildParams, Dfg, Edge, EdgeKind, NodeData, NodeKind, ValueData};
pub use entities::{Node, Value};
pub use instruction::{Instruction, Operand, RegName};
