use crate::jvm::code::Label;
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;

/// Abstract value in a local variable slot or on the operand stack
///
/// These types are from [this hierarchy][0], extended with `Top` for slots whose content is
/// unusable (including the second slot of a `long` or `double`).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum FrameValue {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(RefType<BinaryName>),

    /// Result of a `new` instruction (identified by the label placed just before it) on which
    /// `<init>` has not yet been called
    Uninitialized(Label),
}

impl FrameValue {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            FrameValue::Top
            | FrameValue::Integer
            | FrameValue::Float
            | FrameValue::Double
            | FrameValue::Long => false,

            FrameValue::Null
            | FrameValue::UninitializedThis
            | FrameValue::Object(_)
            | FrameValue::Uninitialized(_) => true,
        }
    }

    pub const fn object(class_name: BinaryName) -> FrameValue {
        FrameValue::Object(RefType::Object(class_name))
    }

    /// Rewrite the label of an uninitialized value
    pub fn map_label(&self, map: impl FnOnce(Label) -> Label) -> FrameValue {
        match self {
            FrameValue::Uninitialized(label) => FrameValue::Uninitialized(map(*label)),
            other => other.clone(),
        }
    }
}

impl Width for FrameValue {
    fn width(&self) -> usize {
        match self {
            FrameValue::Double | FrameValue::Long => 2,
            _ => 1,
        }
    }
}

impl From<FieldType<BinaryName>> for FrameValue {
    fn from(field_type: FieldType<BinaryName>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => FrameValue::Integer,
            FieldType::Base(BaseType::Float) => FrameValue::Float,
            FieldType::Base(BaseType::Long) => FrameValue::Long,
            FieldType::Base(BaseType::Double) => FrameValue::Double,
            FieldType::Ref(ref_type) => FrameValue::Object(ref_type),
        }
    }
}

/// Stack map frame event
///
/// Every variant lists values in compact form: a `long` or `double` is one entry even though it
/// occupies two slots.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StackMapFrame {
    /// Complete frame, as produced by a reader asked to expand frames
    Expanded {
        locals: Vec<FrameValue>,
        stack: Vec<FrameValue>,
    },

    /// Complete frame (compressed encoding)
    Full {
        locals: Vec<FrameValue>,
        stack: Vec<FrameValue>,
    },

    /// Previous locals plus some extra locals, empty stack
    Append { locals: Vec<FrameValue> },

    /// Previous locals minus the last `count`, empty stack
    Chop { count: u8 },

    /// Previous locals, empty stack
    Same,

    /// Previous locals, one stack entry
    SameOneStack { stack: FrameValue },
}

impl StackMapFrame {
    /// Rewrite labels of uninitialized values in the frame
    pub fn map_labels(&self, map: impl Fn(Label) -> Label) -> StackMapFrame {
        let map_all = |values: &[FrameValue]| -> Vec<FrameValue> {
            values.iter().map(|value| value.map_label(&map)).collect()
        };
        match self {
            StackMapFrame::Expanded { locals, stack } => StackMapFrame::Expanded {
                locals: map_all(locals),
                stack: map_all(stack),
            },
            StackMapFrame::Full { locals, stack } => StackMapFrame::Full {
                locals: map_all(locals),
                stack: map_all(stack),
            },
            StackMapFrame::Append { locals } => StackMapFrame::Append {
                locals: map_all(locals),
            },
            StackMapFrame::Chop { count } => StackMapFrame::Chop { count: *count },
            StackMapFrame::Same => StackMapFrame::Same,
            StackMapFrame::SameOneStack { stack } => StackMapFrame::SameOneStack {
                stack: stack.map_label(&map),
            },
        }
    }
}

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Unlike [`StackMapFrame`], both vectors here have one entry per slot: `long` and `double` are
/// followed by `Top`.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables in scope
    pub locals: Vec<FrameValue>,

    /// Types of values on the stack (top of the stack is last)
    pub stack: Vec<FrameValue>,
}

impl Frame {
    /// Expand compact frame entries into slots
    pub fn expand(compact: &[FrameValue]) -> Vec<FrameValue> {
        let mut slots = Vec::with_capacity(compact.len());
        for value in compact {
            slots.push(value.clone());
            if value.width() == 2 {
                slots.push(FrameValue::Top);
            }
        }
        slots
    }

    /// Collapse slots into compact frame entries (dropping the `Top` after wide values)
    pub fn compact(slots: &[FrameValue]) -> Vec<FrameValue> {
        let mut compact = Vec::with_capacity(slots.len());
        let mut i = 0;
        while i < slots.len() {
            let value = &slots[i];
            compact.push(value.clone());
            i += value.width();
        }
        compact
    }

    /// Frame from an expanded stack map frame event
    pub fn from_compact(locals: &[FrameValue], stack: &[FrameValue]) -> Frame {
        Frame {
            locals: Frame::expand(locals),
            stack: Frame::expand(stack),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expand_and_compact() {
        let compact = vec![
            FrameValue::Integer,
            FrameValue::Long,
            FrameValue::object(BinaryName::STRING),
            FrameValue::Double,
        ];
        let slots = Frame::expand(&compact);
        assert_eq!(
            slots,
            vec![
                FrameValue::Integer,
                FrameValue::Long,
                FrameValue::Top,
                FrameValue::object(BinaryName::STRING),
                FrameValue::Double,
                FrameValue::Top,
            ]
        );
        assert_eq!(Frame::compact(&slots), compact);
    }

    #[test]
    fn field_types_to_values() {
        assert_eq!(FrameValue::from(FieldType::boolean()), FrameValue::Integer);
        assert_eq!(FrameValue::from(FieldType::long()), FrameValue::Long);
        assert!(FrameValue::from(FieldType::object(BinaryName::OBJECT)).is_reference());
        assert!(!FrameValue::Top.is_reference());
    }
}
