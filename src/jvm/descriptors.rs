use super::{BinaryName, Error, Name};
use crate::util::Width;

/// Descriptors that have a textual form in the class file format
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut out = String::new();
        self.render_to(&mut out);
        out
    }

    /// Append the descriptor to `out`
    fn render_to(&self, out: &mut String);
}

/// Descriptors that can be read back from their textual form
pub trait ParseDescriptor: Sized {
    /// Parse a whole string as one descriptor, rejecting trailing input
    fn parse(source: &str) -> Result<Self, Error> {
        let mut reader = DescriptorReader::new(source);
        let parsed = Self::read(&mut reader)?;
        if reader.peek().is_some() {
            return Err(reader.fail("trailing input"));
        }
        Ok(parsed)
    }

    fn read(reader: &mut DescriptorReader) -> Result<Self, Error>;
}

/// Cursor over a descriptor being parsed
pub struct DescriptorReader<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> DescriptorReader<'a> {
    pub fn new(source: &'a str) -> DescriptorReader<'a> {
        DescriptorReader {
            source,
            position: 0,
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    /// Consume `expected` if it is the next character
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.position += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consume everything up to (and including) `terminator`
    fn take_until(&mut self, terminator: char) -> Option<&'a str> {
        let rest = &self.source[self.position..];
        let end = rest.find(terminator)?;
        self.position += end + terminator.len_utf8();
        Some(&rest[..end])
    }

    fn fail(&self, problem: &str) -> Error {
        malformed(format!(
            "{} at offset {} of '{}'",
            problem, self.position, self.source
        ))
    }
}

fn malformed(msg: String) -> Error {
    log::error!("Malformed descriptor: {}", msg);
    Error::MalformedDescriptor(msg)
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

/// Descriptor character and `newarray` operand of each primitive
const BASE_TYPES: [(BaseType, char, i32); 8] = [
    (BaseType::Boolean, 'Z', 4),
    (BaseType::Char, 'C', 5),
    (BaseType::Float, 'F', 6),
    (BaseType::Double, 'D', 7),
    (BaseType::Byte, 'B', 8),
    (BaseType::Short, 'S', 9),
    (BaseType::Int, 'I', 10),
    (BaseType::Long, 'J', 11),
];

impl BaseType {
    fn entry(self) -> (BaseType, char, i32) {
        BASE_TYPES[self as usize]
    }

    fn from_char(c: char) -> Option<BaseType> {
        BASE_TYPES
            .iter()
            .find(|(_, code, _)| *code == c)
            .map(|(typ, _, _)| *typ)
    }

    /// Decode the operand of `newarray`
    pub fn from_array_type_code(code: i32) -> Result<BaseType, Error> {
        match BASE_TYPES.iter().find(|(_, _, atype)| *atype == code) {
            Some((typ, _, _)) => Ok(*typ),
            None => {
                log::error!("Invalid newarray operand {}", code);
                Err(Error::InvalidArrayType(code))
            }
        }
    }

    /// Operand of `newarray` for an array of this type
    pub fn array_type_code(self) -> i32 {
        self.entry().2
    }

    pub fn descriptor_char(self) -> char {
        self.entry().1
    }
}

// `entry` indexes `BASE_TYPES` by discriminant
const _: () = {
    assert!(BaseType::Boolean as usize == 0 && BaseType::Long as usize == 7);
};

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, out: &mut String) {
        out.push(self.descriptor_char());
    }
}

impl ParseDescriptor for BaseType {
    fn read(reader: &mut DescriptorReader) -> Result<Self, Error> {
        match reader.peek().and_then(BaseType::from_char) {
            Some(typ) => {
                reader.bump();
                Ok(typ)
            }
            None => Err(reader.fail("expected a primitive type")),
        }
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, out: &mut String) {
        out.push('L');
        out.push_str(self.as_str());
        out.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn read(reader: &mut DescriptorReader) -> Result<Self, Error> {
        if !reader.eat('L') {
            return Err(reader.fail("expected 'L'"));
        }
        let name = reader
            .take_until(';')
            .ok_or_else(|| reader.fail("unterminated class name"))?;
        BinaryName::from_str(name).map_err(malformed)
    }
}

/// Array whose innermost element type is `T`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Dimensions beyond the first (`T[]` has none, `T[][][]` has two)
    pub additional_dimensions: usize,

    pub element_type: T,
}

impl<T> ArrayType<T> {
    fn of(element_type: T) -> ArrayType<T> {
        ArrayType {
            additional_dimensions: 0,
            element_type,
        }
    }

    fn deeper(self) -> ArrayType<T> {
        ArrayType {
            additional_dimensions: self.additional_dimensions + 1,
            ..self
        }
    }

    /// Strip the outermost dimension, unless this array has only one
    fn shallower(&self) -> Option<ArrayType<T>>
    where
        T: Clone,
    {
        let additional_dimensions = self.additional_dimensions.checked_sub(1)?;
        Some(ArrayType {
            additional_dimensions,
            element_type: self.element_type.clone(),
        })
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, out: &mut String) {
        out.extend(std::iter::repeat('[').take(self.additional_dimensions + 1));
        self.element_type.render_to(out);
    }
}

/// Reference type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

impl<C> RefType<C> {
    /// Array type whose elements have type `element`
    pub fn array(element: FieldType<C>) -> RefType<C> {
        match element {
            FieldType::Base(base) => RefType::PrimitiveArray(ArrayType::of(base)),
            FieldType::Ref(RefType::Object(class)) => RefType::ObjectArray(ArrayType::of(class)),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(arr.deeper()),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(arr.deeper()),
        }
    }

    /// Type of the elements, if this is an array type
    pub fn element_type(&self) -> Option<FieldType<C>>
    where
        C: Clone,
    {
        Some(match self {
            RefType::Object(_) => return None,
            RefType::PrimitiveArray(arr) => match arr.shallower() {
                Some(inner) => FieldType::Ref(RefType::PrimitiveArray(inner)),
                None => FieldType::Base(arr.element_type),
            },
            RefType::ObjectArray(arr) => match arr.shallower() {
                Some(inner) => FieldType::Ref(RefType::ObjectArray(inner)),
                None => FieldType::object(arr.element_type.clone()),
            },
        })
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, out: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(out),
            RefType::ObjectArray(arr) => arr.render_to(out),
            RefType::PrimitiveArray(arr) => arr.render_to(out),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn read(reader: &mut DescriptorReader) -> Result<Self, Error> {
        if !reader.eat('[') {
            return C::read(reader).map(RefType::Object);
        }
        let mut additional_dimensions = 0;
        while reader.eat('[') {
            additional_dimensions += 1;
        }
        Ok(if reader.peek() == Some('L') {
            RefType::ObjectArray(ArrayType {
                additional_dimensions,
                element_type: C::read(reader)?,
            })
        } else {
            RefType::PrimitiveArray(ArrayType {
                additional_dimensions,
                element_type: BaseType::read(reader)?,
            })
        })
    }
}

impl RefType<BinaryName> {
    pub const OBJECT: Self = RefType::Object(BinaryName::OBJECT);
    pub const STRING: Self = RefType::Object(BinaryName::STRING);
    pub const CLASS: Self = RefType::Object(BinaryName::CLASS);
    pub const THROWABLE: Self = RefType::Object(BinaryName::THROWABLE);
    pub const METHODTYPE: Self = RefType::Object(BinaryName::METHODTYPE);
    pub const METHODHANDLE: Self = RefType::Object(BinaryName::METHODHANDLE);

    /// Parse a type instruction operand: a bare internal name for classes
    /// (`java/lang/String`) and a full descriptor for arrays (`[I`)
    pub fn parse_internal(source: &str) -> Result<Self, Error> {
        if source.starts_with('[') {
            RefType::parse(source)
        } else {
            BinaryName::from_str(source)
                .map(RefType::Object)
                .map_err(malformed)
        }
    }

    /// Inverse of [`RefType::parse_internal`]
    pub fn render_internal(&self) -> String {
        match self {
            RefType::Object(class) => class.as_str().to_owned(),
            array => array.render(),
        }
    }
}

/// Type of a field, local variable, or parameter
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base) => base.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn array(element: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(element))
    }

    pub const fn object(class: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base) => base.render_to(out),
            FieldType::Ref(ref_type) => ref_type.render_to(out),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn read(reader: &mut DescriptorReader) -> Result<Self, Error> {
        match reader.peek() {
            Some('L' | '[') => RefType::read(reader).map(FieldType::Ref),
            Some(_) => BaseType::read(reader).map(FieldType::Base),
            None => Err(reader.fail("expected a field type")),
        }
    }
}

/// Parameter and return types of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Slots taken by the arguments, counting the receiver if there is one
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let receiver = usize::from(has_this_param);
        receiver + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Slots taken by the return value
    pub fn return_length(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, out: &mut String) {
        out.push('(');
        self.parameters
            .iter()
            .for_each(|parameter| parameter.render_to(out));
        out.push(')');
        match &self.return_type {
            Some(typ) => typ.render_to(out),
            None => out.push('V'),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn read(reader: &mut DescriptorReader) -> Result<Self, Error> {
        if !reader.eat('(') {
            return Err(reader.fail("expected '('"));
        }
        let mut parameters = vec![];
        while !reader.eat(')') {
            if reader.peek().is_none() {
                return Err(reader.fail("unterminated parameter list"));
            }
            parameters.push(FieldType::read(reader)?);
        }
        let return_type = if reader.eat('V') {
            None
        } else {
            Some(FieldType::read(reader)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type FT = FieldType<BinaryName>;

    const INT: FT = FieldType::int();
    const LONG: FT = FieldType::long();
    const DOUBLE: FT = FieldType::double();
    const OBJECT: FT = FieldType::object(BinaryName::OBJECT);
    const STRING: FT = FieldType::object(BinaryName::STRING);

    #[test]
    fn field_types() {
        assert_eq!(FT::parse("I").unwrap(), INT);
        assert_eq!(FT::parse("Ljava/lang/Object;").unwrap(), OBJECT);

        let cube = FieldType::array(FieldType::array(FieldType::array(DOUBLE)));
        assert_eq!(FT::parse("[[[D").unwrap(), cube);
        assert_eq!(cube.render(), "[[[D");
        assert_eq!(FieldType::array(STRING).render(), "[Ljava/lang/String;");
    }

    #[test]
    fn method_descriptors() {
        let desc = MethodDescriptor::<BinaryName>::parse("(IDLjava/lang/String;)Ljava/lang/Object;")
            .unwrap();
        assert_eq!(desc.parameters, vec![INT, DOUBLE, STRING]);
        assert_eq!(desc.return_type, Some(OBJECT));
        assert_eq!(desc.render(), "(IDLjava/lang/String;)Ljava/lang/Object;");

        let void = MethodDescriptor::<BinaryName>::parse("()V").unwrap();
        assert!(void.parameters.is_empty());
        assert_eq!(void.return_type, None);
    }

    #[test]
    fn malformed_descriptors() {
        for bad in ["Q", "Ljava/lang/Object", "II", "", "[", "L;"] {
            assert!(
                matches!(FT::parse(bad), Err(Error::MalformedDescriptor(_))),
                "{:?} should not parse",
                bad
            );
        }
        for bad in ["(I", "I)V", "()", "(V)V"] {
            assert!(
                matches!(
                    MethodDescriptor::<BinaryName>::parse(bad),
                    Err(Error::MalformedDescriptor(_))
                ),
                "{:?} should not parse",
                bad
            );
        }
    }

    #[test]
    fn parameter_lengths() {
        let desc = MethodDescriptor::<BinaryName>::parse("(IJLjava/lang/String;D)J").unwrap();
        assert_eq!(desc.parameter_length(false), 6);
        assert_eq!(desc.parameter_length(true), 7);
        assert_eq!(desc.return_length(), 2);
        assert_eq!(desc.return_type, Some(LONG));
    }

    #[test]
    fn internal_names() {
        assert_eq!(
            RefType::parse_internal("java/lang/String").unwrap(),
            RefType::STRING
        );
        let arr = RefType::parse_internal("[[I").unwrap();
        assert_eq!(arr.render_internal(), "[[I");
        assert_eq!(arr.element_type(), Some(FieldType::array(INT)));
        assert_eq!(
            RefType::parse_internal("[Ljava/lang/String;")
                .unwrap()
                .element_type(),
            Some(STRING)
        );
        assert_eq!(RefType::STRING.element_type(), None);
        assert_eq!(RefType::STRING.render_internal(), "java/lang/String");
        assert!(RefType::parse_internal("java/lang/String;").is_err());
    }

    #[test]
    fn newarray_codes() {
        assert_eq!(BaseType::from_array_type_code(10).unwrap(), BaseType::Int);
        assert_eq!(BaseType::from_array_type_code(4).unwrap(), BaseType::Boolean);
        assert_eq!(BaseType::Long.array_type_code(), 11);
        assert_eq!(BaseType::Byte.array_type_code(), 8);
        assert!(matches!(
            BaseType::from_array_type_code(3),
            Err(Error::InvalidArrayType(3))
        ));
    }
}
