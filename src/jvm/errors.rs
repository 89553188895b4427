use super::code::{ApiVersion, InsnKind, Label, Opcode};
use thiserror::Error;

/// Everything that can go wrong while pushing a method body through a visitor pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Instruction is not acceptable at this point of the pipeline
    #[error("invalid instruction {0:?}: {1}")]
    InvalidInstruction(Opcode, &'static str),

    /// Opcode was delivered through an event that does not carry it
    #[error("opcode {opcode:?} cannot be visited as a {event:?} instruction")]
    InvalidEventOpcode { opcode: Opcode, event: InsnKind },

    /// Value return reached before the superclass constructor was called
    #[error("{0:?} in a constructor before the superclass constructor call")]
    ReturnInConstructor(Opcode),

    /// `ret` at this instruction index is not owned by any active subroutine
    #[error("ret at instruction {0} does not belong to any subroutine")]
    RetNotOwned(usize),

    /// Subroutine starting at this label (transitively) calls itself
    #[error("subroutine {0:?} is recursive")]
    RecursiveSubroutine(Label),

    /// Stack map frame is not in the expanded form
    #[error("compressed stack map frames are not supported, expand frames first")]
    CompressedFrame,

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("malformed name: {0}")]
    MalformedName(String),

    /// `newarray` operand is not one of the primitive array type codes
    #[error("invalid primitive array type code {0}")]
    InvalidArrayType(i32),

    /// Feature used in an event requires a newer API version than the visitor was declared with
    #[error("{feature} requires {required:?}, but the visitor was declared with {declared:?}")]
    UnsupportedByApi {
        feature: &'static str,
        required: ApiVersion,
        declared: ApiVersion,
    },

    /// Popped from an empty (simulated) operand stack
    #[error("operand stack underflow at {0:?}")]
    StackUnderflow(Opcode),

    /// Simulated stack height does not agree with the static effect of the opcode
    #[error("stack height after {opcode:?} changed by {actual}, expected {expected}")]
    FrameSizeMismatch {
        opcode: Opcode,
        expected: i32,
        actual: i32,
    },

    /// Local was accessed by type, but never allocated
    #[error("local {0} was never allocated")]
    UnknownLocal(u16),

    /// Label was referred to but never placed
    #[error("label {0:?} is referenced but never placed")]
    UnknownLabel(Label),

    /// `invokespecial <init>` consumed an uninitialized value whose `new` was never seen
    #[error("no `new` instruction recorded at label {0:?}")]
    UnknownUninitialized(Label),
}
