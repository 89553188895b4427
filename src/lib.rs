//! Frame tracking and transformations for JVM method bodies
//!
//! Method bodies are streams of [`jvm::code::MethodVisitor`] events. On top of that model, this
//! crate provides pipeline stages that:
//!
//!   - simulate the stack and locals at every instruction ([`jvm::verifier::FrameAnalyzer`])
//!   - renumber locals so that new ones can be inserted ([`transform::LocalsRemapper`])
//!   - find where constructors call their superclass constructor ([`transform::AdviceAdapter`])
//!   - replace `jsr`/`ret` subroutines with inlined copies ([`transform::SubroutineInliner`])

pub mod jvm;
pub mod transform;
pub mod util;
