//! The optimization engine: model encoding, the stalls search, solution
//! decoding, the loop transformer, and the independent self-check.

pub mod decode;
pub mod model;
pub mod pipeline;
pub mod search;
pub mod selfcheck;

pub use decode::{RenameEntry, Schedule, ScheduleKind, ScheduledInst};
pub use model::{encode, EncodeOpts, Encoding};
