//! Field and method descriptors.
//!
//! ```txt
//! field_descriptor  := "["* <field_type_terminal> ;
//! field_type_terminal := "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" | "L" <class_name> ";" ;
//! method_descriptor := "(" <field_descriptor>* ")" ( <field_descriptor> | "V" ) ;
//! ```

use crate::{constant::Symbol, parse::ByteParser, ClassError, ClassResult};
use std::fmt;

/// The computational kinds that instructions and descriptors talk about.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeKind {
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Reference,
    Void,
}

impl TypeKind {
    pub fn from_descriptor_char(ch: u8) -> Option<TypeKind> {
        Some(match ch {
            b'B' => TypeKind::Byte,
            b'S' => TypeKind::Short,
            b'C' => TypeKind::Char,
            b'I' => TypeKind::Int,
            b'J' => TypeKind::Long,
            b'F' => TypeKind::Float,
            b'D' => TypeKind::Double,
            b'Z' => TypeKind::Boolean,
            b'L' | b'[' => TypeKind::Reference,
            b'V' => TypeKind::Void,
            _ => return None,
        })
    }

    /// The descriptor character, with `L` standing for every reference type.
    pub fn descriptor_char(self) -> char {
        match self {
            TypeKind::Byte => 'B',
            TypeKind::Short => 'S',
            TypeKind::Char => 'C',
            TypeKind::Int => 'I',
            TypeKind::Long => 'J',
            TypeKind::Float => 'F',
            TypeKind::Double => 'D',
            TypeKind::Boolean => 'Z',
            TypeKind::Reference => 'L',
            TypeKind::Void => 'V',
        }
    }

    /// Number of local variable or operand stack slots a value occupies.
    pub fn slot_size(self) -> u16 {
        match self {
            TypeKind::Long | TypeKind::Double => 2,
            TypeKind::Void => 0,
            _ => 1,
        }
    }

    /// The kind the JVM actually computes with; sub-int types widen to int.
    pub fn as_computational(self) -> TypeKind {
        match self {
            TypeKind::Byte | TypeKind::Short | TypeKind::Char | TypeKind::Boolean => TypeKind::Int,
            other => other,
        }
    }

    /// The `atype` operand of `newarray`.
    pub fn array_type_code(self) -> Option<u8> {
        Some(match self {
            TypeKind::Boolean => 4,
            TypeKind::Char => 5,
            TypeKind::Float => 6,
            TypeKind::Double => 7,
            TypeKind::Byte => 8,
            TypeKind::Short => 9,
            TypeKind::Int => 10,
            TypeKind::Long => 11,
            _ => return None,
        })
    }

    pub fn from_array_type_code(code: u8) -> Option<TypeKind> {
        Some(match code {
            4 => TypeKind::Boolean,
            5 => TypeKind::Char,
            6 => TypeKind::Float,
            7 => TypeKind::Double,
            8 => TypeKind::Byte,
            9 => TypeKind::Short,
            10 => TypeKind::Int,
            11 => TypeKind::Long,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Byte => "byte",
            TypeKind::Short => "short",
            TypeKind::Char => "char",
            TypeKind::Int => "int",
            TypeKind::Long => "long",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::Boolean => "boolean",
            TypeKind::Reference => "reference",
            TypeKind::Void => "void",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// An internal class name such as `java/lang/String`.
    Object(Symbol),
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FieldDescriptor {
    pub dimensions: usize,
    pub ty: FieldType,
}

impl FieldDescriptor {
    pub fn parse(text: &str) -> ClassResult<FieldDescriptor> {
        let mut input = ByteParser::new(text.as_bytes());
        let descriptor = parse_field_descriptor(&mut input)
            .map_err(|_| ClassError::BadDescriptor(text.into()))?;
        if input.remaining() != 0 {
            return Err(ClassError::BadDescriptor(text.into()));
        }
        Ok(descriptor)
    }

    pub fn object(class: &str) -> FieldDescriptor {
        FieldDescriptor {
            dimensions: 0,
            ty: FieldType::Object(class.into()),
        }
    }

    pub fn is_array(&self) -> bool {
        self.dimensions > 0
    }

    pub fn type_kind(&self) -> TypeKind {
        if self.dimensions > 0 {
            return TypeKind::Reference;
        }
        match self.ty {
            FieldType::Byte => TypeKind::Byte,
            FieldType::Char => TypeKind::Char,
            FieldType::Double => TypeKind::Double,
            FieldType::Float => TypeKind::Float,
            FieldType::Int => TypeKind::Int,
            FieldType::Long => TypeKind::Long,
            FieldType::Short => TypeKind::Short,
            FieldType::Boolean => TypeKind::Boolean,
            FieldType::Object(_) => TypeKind::Reference,
        }
    }

    /// The name used by `checkcast`, `anewarray` and verification frames:
    /// an internal class name, or a descriptor for arrays.
    pub fn class_name(&self) -> Option<String> {
        match (&self.ty, self.dimensions) {
            (FieldType::Object(name), 0) => Some(name.to_string()),
            (_, 0) => None,
            _ => Some(self.to_descriptor()),
        }
    }

    pub fn to_descriptor(&self) -> String {
        let mut out = "[".repeat(self.dimensions);
        match &self.ty {
            FieldType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            _ => out.push(self.type_kind().descriptor_char()),
        }
        out
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            FieldType::Object(name) => write!(f, "{}", name.replace('/', "."))?,
            _ => write!(f, "{}", self.type_kind().name())?,
        }

        for _ in 0..self.dimensions {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

pub(crate) fn parse_field_descriptor(input: &mut ByteParser<'_>) -> ClassResult<FieldDescriptor> {
    let dimensions = input.predicate_len(|ch| ch == b'[');
    if dimensions > 255 {
        return Err(ClassError::BadDescriptor("[".repeat(dimensions)));
    }
    input.skip(dimensions)?;

    Ok(FieldDescriptor {
        dimensions,
        ty: parse_field_descriptor_terminal(input)?,
    })
}

pub(crate) fn parse_field_descriptor_terminal(input: &mut ByteParser<'_>) -> ClassResult<FieldType> {
    Ok(match input.parse_u8()? {
        b'B' => FieldType::Byte,
        b'C' => FieldType::Char,
        b'D' => FieldType::Double,
        b'F' => FieldType::Float,
        b'I' => FieldType::Int,
        b'J' => FieldType::Long,
        b'S' => FieldType::Short,
        b'Z' => FieldType::Boolean,
        b'L' => {
            let name = input.take_while(|ch| ch != b';')?;
            if name.is_empty() {
                return Err(ClassError::BadDescriptor("L;".into()));
            }
            FieldType::Object(crate::parse_mutf8(name)?.into())
        }

        other => return Err(ClassError::BadDescriptor((other as char).to_string())),
    })
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ReturnDescriptor {
    Void,
    Type(FieldDescriptor),
}

impl ReturnDescriptor {
    pub fn type_kind(&self) -> TypeKind {
        match self {
            ReturnDescriptor::Void => TypeKind::Void,
            ReturnDescriptor::Type(ty) => ty.type_kind(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodDescriptor {
    pub ret: ReturnDescriptor,
    pub args: Box<[FieldDescriptor]>,
}

impl MethodDescriptor {
    pub fn parse(text: &str) -> ClassResult<MethodDescriptor> {
        let mut input = ByteParser::new(text.as_bytes());
        let descriptor = parse_method_descriptor(&mut input)
            .map_err(|_| ClassError::BadDescriptor(text.into()))?;
        if input.remaining() != 0 {
            return Err(ClassError::BadDescriptor(text.into()));
        }
        Ok(descriptor)
    }

    /// Local variable slots taken by the arguments, not counting a receiver.
    pub fn parameter_slots(&self) -> u16 {
        self.args.iter().map(|arg| arg.type_kind().slot_size()).sum()
    }

    /// The slot holding argument `index`, given whether a receiver occupies
    /// slot 0.
    pub fn parameter_slot(&self, index: usize, is_static: bool) -> Option<u16> {
        if index >= self.args.len() {
            return None;
        }
        let receiver = if is_static { 0 } else { 1 };
        Some(receiver + self.args[..index].iter().map(|arg| arg.type_kind().slot_size()).sum::<u16>())
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")?;
        match &self.ret {
            ReturnDescriptor::Void => write!(f, " -> void"),
            ReturnDescriptor::Type(ty) => write!(f, " -> {}", ty),
        }
    }
}

pub fn parse_method_descriptor(input: &mut ByteParser<'_>) -> ClassResult<MethodDescriptor> {
    input.expect(b"(")?;

    let mut args = Vec::new();
    loop {
        args.push(match input.peek(1)?[0] {
            b')' => break,
            _ => parse_field_descriptor(input)?,
        });
    }

    input.expect(b")")?;

    let ret = match input.peek(1)?[0] {
        b'V' => {
            input.skip(1)?;
            ReturnDescriptor::Void
        }
        _ => ReturnDescriptor::Type(parse_field_descriptor(input)?),
    };

    Ok(MethodDescriptor {
        ret,
        args: args.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_descriptors() {
        let string = FieldDescriptor::parse("[[Ljava/lang/String;").unwrap();
        assert_eq!(string.dimensions, 2);
        assert_eq!(string.ty, FieldType::Object("java/lang/String".into()));
        assert_eq!(string.to_string(), "java.lang.String[][]");
        assert_eq!(string.class_name().as_deref(), Some("[[Ljava/lang/String;"));
        assert_eq!(FieldDescriptor::parse("J").unwrap().type_kind().slot_size(), 2);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(matches!(FieldDescriptor::parse("II"), Err(ClassError::BadDescriptor(_))));
        assert!(matches!(FieldDescriptor::parse("Lfoo"), Err(ClassError::BadDescriptor(_))));
        assert!(matches!(MethodDescriptor::parse("()VV"), Err(ClassError::BadDescriptor(_))));
    }

    #[test]
    fn method_descriptor_slots() {
        let method = MethodDescriptor::parse("(IJLjava/lang/Object;[D)V").unwrap();
        assert_eq!(method.args.len(), 4);
        assert_eq!(method.ret, ReturnDescriptor::Void);
        assert_eq!(method.parameter_slots(), 5);
        assert_eq!(method.parameter_slot(2, false), Some(4));
        assert_eq!(method.parameter_slot(2, true), Some(3));
        assert_eq!(method.parameter_slot(4, true), None);
    }

    #[test]
    fn newarray_codes() {
        for code in 4..=11 {
            let kind = TypeKind::from_array_type_code(code).unwrap();
            assert_eq!(kind.array_type_code(), Some(code));
        }
        assert_eq!(TypeKind::Reference.array_type_code(), None);
    }
}
