//! Method bodies as streams of visitor events
//!
//! ### Structure
//!
//! A method body is never materialized as a byte array here. Instead, it flows through a
//! pipeline of [`MethodVisitor`]s one event at a time: each stage sees an event, does whatever
//! bookkeeping or rewriting it needs, and passes events on to the stage it owns. Jump targets
//! and positions are symbolic [`Label`]s, minted from a [`LabelArena`] shared by every stage of
//! the pipeline.
//!
//! [`MethodNode`] sits at either end of a pipeline: it records an event stream (validating that
//! each opcode arrives through the event that carries it) and can replay it in canonical order.

mod label;
mod method_node;
mod opcodes;
mod visitor;

pub use label::*;
pub use method_node::*;
pub use opcodes::*;
pub use visitor::*;
