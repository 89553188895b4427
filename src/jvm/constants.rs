use super::{BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};
use crate::util::Width;

/// Constants that can be loaded with `ldc` or passed as bootstrap arguments
#[derive(Clone, PartialEq, Debug)]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Constant object of type `java.lang.Class`
    Class(RefType<BinaryName>),

    /// Constant object of type `java.lang.invoke.MethodType`
    MethodType(MethodDescriptor<BinaryName>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle(Handle),

    /// Constant computed by a bootstrap method
    Dynamic(Box<ConstantDynamic>),
}

impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            Constant::Dynamic(dynamic) => dynamic.descriptor.width(),
            _ => 1,
        }
    }
}

/// Kind of a method handle
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

/// Descriptor of the member a handle refers to
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemberDescriptor {
    Field(FieldType<BinaryName>),
    Method(MethodDescriptor<BinaryName>),
}

/// Method handle, as found in `ldc` constants and bootstrap method references
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MemberDescriptor,
    pub is_interface: bool,
}

/// Dynamically-computed constant (`CONSTANT_Dynamic`)
#[derive(Clone, PartialEq, Debug)]
pub struct ConstantDynamic {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub bootstrap_method: Handle,
    pub bootstrap_arguments: Vec<Constant>,
}
