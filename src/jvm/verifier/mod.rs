//! Frame tracking
//!
//! For any specific instruction inside a method body, the stack and locals have the same
//! structure, regardless of which control flow was used to reach that instruction. This
//! information is referred to as the _stack map frame_. Class files only store frames at jump
//! targets (see [`StackMapFrame`]), so any transformation that needs to know what is on the
//! stack or in the locals in between has to replay the instructions from the last frame.
//!
//! [`FrameAnalyzer`] does exactly that as a pipeline stage: it follows the events flowing
//! through it and keeps an abstract [`Frame`] up to date, using the [`FrameValue`]s of the
//! [verification type hierarchy][0] (plus `Top` for unusable slots).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod types;

pub use frame::*;
pub use types::*;
