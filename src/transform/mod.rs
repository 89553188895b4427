//! Method transformations, as pipeline stages
//!
//! Each stage owns the next one and forwards the events it does not rewrite. A typical pipeline
//! for injecting code around method bodies is:
//!
//! ```text
//! reader -> SubroutineInliner -> AdviceAdapter -> LocalsRemapper -> FrameAnalyzer -> writer
//! ```
//!
//! [`SubroutineInliner`] has to come first, since the other stages do not understand `jsr` and
//! `ret`. Stages that need per-slot information ([`LocalsRemapper`] and
//! [`crate::jvm::verifier::FrameAnalyzer`]) only accept expanded stack map frames.

mod advice;
mod locals;
mod settings;
mod subroutines;

pub use advice::*;
pub use locals::*;
pub use settings::*;
pub use subroutines::*;
