use crate::jvm::code::ApiVersion;

/// Configuration shared by the stages of a method pipeline
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Settings {
    /// API version every stage declares
    ///
    /// Events needing a newer version (method handle constants, `invokedynamic`, dynamic
    /// constants) are rejected.
    pub api: ApiVersion,

    /// Check the simulated stack height after every instruction with a static stack effect
    ///
    /// A mismatch means the frame simulation itself is inconsistent, so this is mostly useful
    /// while debugging new pipeline stages.
    pub check_stack_deltas: bool,

    /// What to put in stack map frames for locals inserted with `new_local`
    pub new_local_frame_type: NewLocalFrameType,
}

impl Settings {
    pub fn new(api: ApiVersion) -> Settings {
        Settings {
            api,
            check_stack_deltas: true,
            new_local_frame_type: NewLocalFrameType::Top,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new(ApiVersion::LATEST)
    }
}

/// Placeholder type for an inserted local in frames produced before the local is stored to
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum NewLocalFrameType {
    /// Unusable slot, always valid
    Top,

    /// The type the local was declared with
    ///
    /// Only valid if the local is definitely assigned at every frame in its range, which is the
    /// caller's responsibility.
    DeclaredType,
}
