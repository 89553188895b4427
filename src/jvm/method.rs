use super::verifier::FrameValue;
use super::{BinaryName, MethodDescriptor, RefType, UnqualifiedName};
use crate::util::Width;
use bitflags::bitflags;

bitflags! {
    /// `access_flags` of a `method_info` structure
    ///
    /// Only `STATIC` changes how method bodies are transformed.
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// Name and descriptor of a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodSignature {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

impl MethodSignature {
    pub fn new(name: UnqualifiedName, descriptor: MethodDescriptor<BinaryName>) -> MethodSignature {
        MethodSignature { name, descriptor }
    }

    /// Is this an instance initialization method?
    pub fn is_constructor(&self) -> bool {
        self.name.is_constructor()
    }
}

/// Everything about a method that is known before its body is visited
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodHeader {
    /// Class declaring the method
    pub owner: BinaryName,
    pub access: MethodAccessFlags,
    pub signature: MethodSignature,
}

impl MethodHeader {
    pub fn new(
        owner: BinaryName,
        access: MethodAccessFlags,
        signature: MethodSignature,
    ) -> MethodHeader {
        MethodHeader {
            owner,
            access,
            signature,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.signature.is_constructor()
    }

    /// First local variable slot after `this` and the parameters
    pub fn first_local(&self) -> usize {
        self.signature
            .descriptor
            .parameter_length(!self.is_static())
    }

    /// Local variables on entry to the method, one entry per slot (so `long` and `double`
    /// parameters are followed by `Top`)
    pub fn initial_locals(&self) -> Vec<FrameValue> {
        let mut locals = Vec::with_capacity(self.first_local());
        if !self.is_static() {
            if self.is_constructor() {
                locals.push(FrameValue::UninitializedThis);
            } else {
                locals.push(FrameValue::Object(RefType::Object(self.owner.clone())));
            }
        }
        for parameter in &self.signature.descriptor.parameters {
            let value = FrameValue::from(parameter.clone());
            let width = value.width();
            locals.push(value);
            if width == 2 {
                locals.push(FrameValue::Top);
            }
        }
        locals
    }
}
