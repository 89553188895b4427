use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields, and local variables
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in internal form (eg. `java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Validated names
///
/// Invalid names are reported as a message, which callers usually wrap into
/// [`super::Error::MalformedName`].
pub trait Name: Sized {
    /// Reason why a string is not a valid name, if it isn't
    fn check_valid(name: &str) -> Result<(), String>;

    /// Wrap a string known to be valid
    fn wrap(name: Cow<'static, str>) -> Self;

    fn as_str(&self) -> &str;

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(Self::wrap(Cow::Owned(name)))
    }

    /// Try to construct a name from a string slice
    fn from_str(name: &str) -> Result<Self, String> {
        Self::from_string(name.to_owned())
    }
}

impl Name for UnqualifiedName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("Unqualified name is empty"));
        }
        if name.contains(&['.', ';', '[', '/'][..]) {
            return Err(format!("Unqualified name '{}' has an illegal character", name));
        }
        let special = name == "<init>" || name == "<clinit>";
        if !special && name.contains(&['<', '>'][..]) {
            return Err(format!("Only special names may contain angle brackets, not '{}'", name));
        }
        Ok(())
    }

    fn wrap(name: Cow<'static, str>) -> Self {
        UnqualifiedName(name)
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

impl Name for BinaryName {
    fn check_valid(name: &str) -> Result<(), String> {
        for segment in name.split('/') {
            if segment.contains(&['<', '>'][..]) {
                return Err(format!("Binary name '{}' has an angle bracket", name));
            }
            UnqualifiedName::check_valid(segment)
                .map_err(|err| format!("Binary name '{}' is malformed: {}", name, err))?;
        }
        Ok(())
    }

    fn wrap(name: Cow<'static, str>) -> Self {
        BinaryName(name)
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! name_formatting {
    ($name:ty) => {
        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
                f.write_str(&self.0)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
                f.write_str(&self.0)
            }
        }
    };
}

name_formatting!(UnqualifiedName);
name_formatting!(BinaryName);

impl UnqualifiedName {
    /// Is this the name of an instance initialization method?
    pub fn is_constructor(&self) -> bool {
        self.0 == "<init>"
    }

    pub const INIT: Self = UnqualifiedName(Cow::Borrowed("<init>"));
    pub const CLINIT: Self = UnqualifiedName(Cow::Borrowed("<clinit>"));
}

impl BinaryName {
    const fn jdk(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // Classes produced by simulating instructions
    pub const CLASS: Self = Self::jdk("java/lang/Class");
    pub const METHODHANDLE: Self = Self::jdk("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::jdk("java/lang/invoke/MethodType");
    pub const OBJECT: Self = Self::jdk("java/lang/Object");
    pub const STRING: Self = Self::jdk("java/lang/String");
    pub const THROWABLE: Self = Self::jdk("java/lang/Throwable");
}
