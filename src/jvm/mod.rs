//! Model of JVM methods, as seen by visitor pipelines
//!
//! ### Simple example
//!
//! Consider the following simple Java constructor:
//!
//! ```java,ignore,no_run
//! public Point() {
//!     super();
//! }
//! ```
//!
//! Its body is a stream of events, which can be recorded and then simulated:
//!
//! ```
//! use bytecode_commons::jvm::code::{LabelArena, MethodNode, MethodVisitor, Opcode};
//! use bytecode_commons::jvm::verifier::{FrameAnalyzer, FrameValue};
//! use bytecode_commons::jvm::*;
//! use bytecode_commons::transform::Settings;
//!
//! # fn simulate() -> Result<(), Error> {
//! let header = MethodHeader::new(
//!     BinaryName::from_str("me/alec/Point").map_err(Error::MalformedName)?,
//!     MethodAccessFlags::PUBLIC,
//!     MethodSignature::new(UnqualifiedName::INIT, MethodDescriptor::parse("()V")?),
//! );
//! let mut analyzer = FrameAnalyzer::new(
//!     &header,
//!     LabelArena::new(),
//!     &Settings::default(),
//!     MethodNode::new(),
//! );
//!
//! analyzer.visit_code()?;
//! analyzer.visit_var_insn(Opcode::ALoad, 0)?;
//! analyzer.visit_method_insn(
//!     Opcode::InvokeSpecial,
//!     &RefType::OBJECT,
//!     &UnqualifiedName::INIT,
//!     &MethodDescriptor::parse("()V")?,
//!     false,
//! )?;
//!
//! // `this` is now initialized
//! let this = FrameValue::object(header.owner.clone());
//! assert_eq!(analyzer.frame().map(|f| f.locals.clone()), Some(vec![this]));
//!
//! analyzer.visit_insn(Opcode::Return)?;
//! analyzer.visit_maxs(0, 0)?;
//! analyzer.visit_end()?;
//!
//! let recorded: MethodNode = analyzer.into_delegate();
//! assert_eq!((recorded.max_stack, recorded.max_locals), (1, 1));
//! # Ok(())
//! # }
//! # simulate().unwrap();
//! ```

pub mod code;
mod constants;
mod descriptors;
mod errors;
mod method;
mod names;
pub mod verifier;

pub use constants::*;
pub use descriptors::*;
pub use errors::*;
pub use method::*;
pub use names::*;
