//! Generic signatures, as found in `Signature` attributes.

use crate::{descriptor::TypeKind, ByteParser, ClassError, ClassResult};
use std::fmt;

// `<T>`, `<T extends A>`, `<T extends B1 & B2 & B3>`
/// Represents a single type parameter.
///
/// ```txt
/// type_param      := <ident> <class_bound> <interface_bound>* ;
/// class_bound     := ":" <object_type>? ;
/// interface_bound := ":" <object_type> ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TypeParameter {
    /// The name of the type parameter, something like `T`
    pub ident: String,
    /// The superclass bound, the `A` in `<T extends A>` where `A` is a class.
    pub class_bound: Option<ObjectType>,
    /// The superinterface bounds, `B1` and `B2` in `<T extends B1 & B2>` where
    /// `B1` and `B2` are interfaces.
    pub interface_bounds: Box<[ObjectType]>,
}

/// Represents some reference type.
///
/// ```txt
/// type_variable := "T" <ident> ";" ;
/// object_type   := <class_type_signature>
///                | <array_type_signature>
///                | <type_variable>
///                ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ObjectType {
    // Something like `Foo<T, U>`
    Class(Box<FullClassTypeSignature>),
    // Something like `Bar<T>[][]`, `int[]`
    Array(usize, Box<TypeSignature>),
    // T
    TypeVariable(String),
}

/// Represents the signature of a class; what type bounds it has, what it
/// extends, and what it implements.
///
/// ```txt
/// class_sig := <type_param>? <class_ty_sig> <class_ty_sig>* ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClassSignature {
    /// The type parameters declared on this class.
    pub type_params: Option<Box<[TypeParameter]>>,
    /// The class that this class extends.
    pub extends: FullClassTypeSignature,
    /// The interfaces that this class implements.
    pub implements: Box<[FullClassTypeSignature]>,
}

/// Represents the generic signature of a method.
///
/// ```txt
/// method_sig := <type_params>? "(" <type_sig>* ")" <return_type> <throws_sig>* ;
/// throws_sig := "^" <class_type_sig> | "^" <type_variable> ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodSignature {
    pub type_params: Option<Box<[TypeParameter]>>,
    pub params: Box<[TypeSignature]>,
    /// `None` for `void`.
    pub ret: Option<TypeSignature>,
    pub throws: Box<[ObjectType]>,
}

/// Represents a fully elaborated class.
///
/// This represents an object type. It has the full package specifier, the
/// furthest outer class, and all the inner classes between "this" and the
/// outer. "This" class is either the last item of `inner`, or `class`, if
/// `inner` is empty.
///
/// ```txt
/// package_specifier     := <ident> "/" <package_specifier>? ;
/// class_type_sig_suffix := "." <class_type_sig>;
/// full_class_type_sig   := "L" <package_specifier>? <class_type_sig> <class_type_sig_suffix>* ";" ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FullClassTypeSignature {
    /// The segments of the package that this class is in. This value for
    /// `java.lang.String` would be `["java", "lang"]`.
    pub package: Option<Box<[String]>>,
    /// The outer class.
    pub class: ClassTypeSignature,
    /// All of the classes between `class` and the last. eg, `Foo<A, B,
    /// C>.Bar<A, C>.Baz` would be `[Bar<A, C>, Baz]`.
    pub inner: Box<[ClassTypeSignature]>,
}

/// Represents a possibly parameterized class.
///
/// ```txt
/// class_type_sig := <ident> <type_arguments>? ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClassTypeSignature {
    /// The name of this class, without any package specifier.
    pub ident: String,
    /// The type arguments on this class.
    pub type_arguments: Option<Box<[TypeArgument]>>,
}

/// Represents a bound on a wildcard.
///
/// `Extends` means `<? extends T>`, and `Super` means `<? super T>`.
///
/// ```txt
/// wildcard_bound := "+" | "-" ;
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WildcardBound {
    Extends,
    Super,
}

/// Represents the use of a type parameter.
///
/// ```txt
/// type_argument := <wildcard_bound>? <object_type>
///                | "*"
///                ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeArgument {
    /// `<?>`
    Wildcard,
    /// `<? extends B>` or `<? super B>`
    Bounded(WildcardBound, ObjectType),
    /// `<T>`
    Normal(ObjectType),
}

/// Represents some type, whether it is an object type or a base type like
/// `int`.
///
/// ```txt
/// type_sig := <base_type> | <object_type> ;
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeSignature {
    Base(TypeKind),
    Object(ObjectType),
}

fn complete<T, F>(text: &str, parse: F) -> ClassResult<T>
where
    F: FnOnce(&mut ByteParser<'_>) -> ClassResult<T>,
{
    let mut input = ByteParser::new(text.as_bytes());
    match parse(&mut input) {
        Ok(value) if input.remaining() == 0 => Ok(value),
        _ => Err(ClassError::BadSignature(text.into())),
    }
}

impl ClassSignature {
    pub fn parse(text: &str) -> ClassResult<ClassSignature> {
        complete(text, parse_class_signature)
    }
}

impl MethodSignature {
    pub fn parse(text: &str) -> ClassResult<MethodSignature> {
        complete(text, parse_method_signature)
    }
}

impl ObjectType {
    /// Parses the signature of a field.
    pub fn parse(text: &str) -> ClassResult<ObjectType> {
        complete(text, parse_field_type_signature)
    }
}

pub fn parse_identifier(input: &mut ByteParser<'_>) -> ClassResult<String> {
    input.backtrace(|input| {
        let ident = input.peeking_take_while(|ch| {
            !matches!(ch, b'.' | b';' | b'[' | b'/' | b'<' | b'>' | b':')
        })?;
        if ident.is_empty() {
            return Err(ClassError::BadSignature(String::new()));
        }
        Ok(crate::parse_mutf8(ident)?.into())
    })
}

// ClassSignature:
//   FormalTypeParametersopt SuperclassSignature SuperinterfaceSignature*
pub fn parse_class_signature(input: &mut ByteParser<'_>) -> ClassResult<ClassSignature> {
    input.backtrace(|input| {
        let type_params = parse_formal_type_parameters(input).ok();
        let extends = parse_class_type_signature(input)?;
        let implements = input.repeat0(parse_class_type_signature).into();

        Ok(ClassSignature {
            type_params,
            extends,
            implements,
        })
    })
}

// MethodSignature:
//   FormalTypeParametersopt ( TypeSignature* ) ReturnType ThrowsSignature*
pub fn parse_method_signature(input: &mut ByteParser<'_>) -> ClassResult<MethodSignature> {
    input.backtrace(|input| {
        let type_params = parse_formal_type_parameters(input).ok();
        input.expect(b"(")?;
        let params = input.repeat0(parse_type_signature).into();
        input.expect(b")")?;
        let ret = match input.expect(b"V") {
            Ok(()) => None,
            Err(_) => Some(parse_type_signature(input)?),
        };
        let throws = input.repeat0(parse_throws_signature).into();

        Ok(MethodSignature {
            type_params,
            params,
            ret,
            throws,
        })
    })
}

// ThrowsSignature:
//   ^ ClassTypeSignature
//   ^ TypeVariableSignature
pub fn parse_throws_signature(input: &mut ByteParser<'_>) -> ClassResult<ObjectType> {
    input.backtrace(|input| {
        input.expect(b"^")?;
        match parse_class_type_signature(input) {
            Ok(class) => Ok(ObjectType::Class(Box::new(class))),
            Err(_) => parse_type_variable_signature(input).map(ObjectType::TypeVariable),
        }
    })
}

// FormalTypeParameters:
//   < FormalTypeParameter+ >
pub fn parse_formal_type_parameters(
    input: &mut ByteParser<'_>,
) -> ClassResult<Box<[TypeParameter]>> {
    input.backtrace(|input| {
        input.expect(b"<")?;
        let res = input.repeat1(parse_formal_type_parameter)?;
        input.expect(b">")?;

        Ok(res.into())
    })
}

// FormalTypeParameter:
//   Identifier ClassBound InterfaceBound*
pub fn parse_formal_type_parameter(input: &mut ByteParser<'_>) -> ClassResult<TypeParameter> {
    input.backtrace(|input| {
        let ident = parse_identifier(input)?;
        let class_bound = parse_class_bound(input)?;
        let interface_bounds = input.repeat0(parse_interface_bound);

        Ok(TypeParameter {
            ident,
            class_bound,
            interface_bounds: interface_bounds.into(),
        })
    })
}

// ClassBound:
//   : FieldTypeSignatureopt
pub fn parse_class_bound(input: &mut ByteParser<'_>) -> ClassResult<Option<ObjectType>> {
    input.backtrace(|input| {
        input.expect(b":")?;
        Ok(parse_field_type_signature(input).ok())
    })
}

// InterfaceBound:
//   : FieldTypeSignature
pub fn parse_interface_bound(input: &mut ByteParser<'_>) -> ClassResult<ObjectType> {
    input.backtrace(|input| {
        input.expect(b":")?;
        parse_field_type_signature(input)
    })
}

// FieldTypeSignature:
//   FullClassTypeSignature
//   ArrayTypeSignature
//   TypeVariableSignature
pub fn parse_field_type_signature(input: &mut ByteParser<'_>) -> ClassResult<ObjectType> {
    if let Ok(sig) = parse_class_type_signature(input) {
        return Ok(ObjectType::Class(Box::new(sig)));
    }

    if let Ok((len, ty)) = parse_array_type_signature(input) {
        return Ok(ObjectType::Array(len, Box::new(ty)));
    }

    parse_type_variable_signature(input).map(ObjectType::TypeVariable)
}

// ClassTypeSignature:
//   L PackageSpecifieropt SimpleClassTypeSignature ClassTypeSignatureSuffix* ;
pub fn parse_class_type_signature(
    input: &mut ByteParser<'_>,
) -> ClassResult<FullClassTypeSignature> {
    input.backtrace(|input| {
        input.expect(b"L")?;
        let package = parse_package_specifier(input).ok();
        let class = parse_simple_class_type_signature(input)?;
        let inner = input.repeat0(parse_class_type_signature_suffix).into();
        input.expect(b";")?;

        Ok(FullClassTypeSignature {
            package: package.map(|v| v.into()),
            class,
            inner,
        })
    })
}

// PackageSpecifier:
//   Identifier / PackageSpecifier*
pub fn parse_package_specifier(input: &mut ByteParser<'_>) -> ClassResult<Vec<String>> {
    input.backtrace(|input| {
        let segment = parse_identifier(input)?;
        input.expect(b"/")?;
        let mut vec = vec![segment];
        vec.extend(parse_package_specifier(input).unwrap_or_default());
        Ok(vec)
    })
}

// SimpleClassTypeSignature:
//   Identifier TypeArgumentsopt
pub fn parse_simple_class_type_signature(
    input: &mut ByteParser<'_>,
) -> ClassResult<ClassTypeSignature> {
    input.backtrace(|input| {
        let ident = parse_identifier(input)?;
        let type_arguments = parse_type_arguments(input).ok();
        Ok(ClassTypeSignature {
            ident,
            type_arguments,
        })
    })
}

// ClassTypeSignatureSuffix:
//   . SimpleClassTypeSignature
pub fn parse_class_type_signature_suffix(
    input: &mut ByteParser<'_>,
) -> ClassResult<ClassTypeSignature> {
    input.backtrace(|input| {
        input.expect(b".")?;
        parse_simple_class_type_signature(input)
    })
}

// TypeVariableSignature:
//   T Identifier ;
pub fn parse_type_variable_signature(input: &mut ByteParser<'_>) -> ClassResult<String> {
    input.backtrace(|input| {
        input.expect(b"T")?;
        let ident = parse_identifier(input)?;
        input.expect(b";")?;
        Ok(ident)
    })
}

// TypeArguments:
//   < TypeArgument+ >
pub fn parse_type_arguments(input: &mut ByteParser<'_>) -> ClassResult<Box<[TypeArgument]>> {
    input.backtrace(|input| {
        input.expect(b"<")?;
        let args = input.repeat1(parse_type_argument)?.into();
        input.expect(b">")?;
        Ok(args)
    })
}

// TypeArgument:
//   WildcardIndicatoropt FieldTypeSignature
//   *
pub fn parse_type_argument(input: &mut ByteParser<'_>) -> ClassResult<TypeArgument> {
    input.backtrace(|input| {
        Ok(match parse_wildcard_indicator(input).ok() {
            Some(bound) => TypeArgument::Bounded(bound, parse_field_type_signature(input)?),
            None => match input.expect(b"*").ok() {
                Some(_) => TypeArgument::Wildcard,
                None => TypeArgument::Normal(parse_field_type_signature(input)?),
            },
        })
    })
}

// WildcardIndicator:
//   +
//   -
pub fn parse_wildcard_indicator(input: &mut ByteParser<'_>) -> ClassResult<WildcardBound> {
    input.backtrace(|input| {
        Ok(match input.parse_u8()? {
            b'+' => WildcardBound::Extends,
            b'-' => WildcardBound::Super,
            k => return Err(ClassError::BadSignature((k as char).to_string())),
        })
    })
}

// ArrayTypeSignature:
//   [ TypeSignature
pub fn parse_array_type_signature(
    input: &mut ByteParser<'_>,
) -> ClassResult<(usize, TypeSignature)> {
    input.backtrace(|input| {
        input.expect(b"[")?;
        Ok(match parse_type_signature(input)? {
            TypeSignature::Object(ObjectType::Array(len, ty)) => (len + 1, *ty),
            other => (1, other),
        })
    })
}

// TypeSignature:
//   FieldTypeSignature
//   BaseType
pub fn parse_type_signature(input: &mut ByteParser<'_>) -> ClassResult<TypeSignature> {
    input.backtrace(|input| {
        Ok(match parse_base_type(input).ok() {
            Some(ty) => TypeSignature::Base(ty),
            None => TypeSignature::Object(parse_field_type_signature(input)?),
        })
    })
}

pub(crate) fn parse_base_type(input: &mut ByteParser<'_>) -> ClassResult<TypeKind> {
    input.backtrace(|input| {
        let ch = input.parse_u8()?;
        match TypeKind::from_descriptor_char(ch) {
            Some(TypeKind::Reference) | Some(TypeKind::Void) | None => {
                Err(ClassError::BadSignature((ch as char).to_string()))
            }
            Some(kind) => Ok(kind),
        }
    })
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_type_params(f: &mut fmt::Formatter<'_>, params: &Option<Box<[TypeParameter]>>) -> fmt::Result {
    if let Some(params) = params {
        write!(f, "<")?;
        write_list(f, params, ", ")?;
        write!(f, ">")?;
    }
    Ok(())
}

impl fmt::Display for TypeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ident)?;
        let bounds = self.class_bound.iter().chain(self.interface_bounds.iter());
        for (i, bound) in bounds.enumerate() {
            write!(f, "{}{}", if i == 0 { " extends " } else { " & " }, bound)?;
        }
        Ok(())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Class(class) => write!(f, "{}", class),
            ObjectType::Array(dims, ty) => {
                write!(f, "{}", ty)?;
                for _ in 0..*dims {
                    write!(f, "[]")?;
                }
                Ok(())
            }
            ObjectType::TypeVariable(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for FullClassTypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(package) = &self.package {
            for segment in package.iter() {
                write!(f, "{}.", segment)?;
            }
        }
        write!(f, "{}", self.class)?;
        for inner in self.inner.iter() {
            write!(f, ".{}", inner)?;
        }
        Ok(())
    }
}

impl fmt::Display for ClassTypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ident)?;
        if let Some(args) = &self.type_arguments {
            write!(f, "<")?;
            write_list(f, args, ", ")?;
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeArgument::Wildcard => write!(f, "?"),
            TypeArgument::Bounded(WildcardBound::Extends, ty) => write!(f, "? extends {}", ty),
            TypeArgument::Bounded(WildcardBound::Super, ty) => write!(f, "? super {}", ty),
            TypeArgument::Normal(ty) => write!(f, "{}", ty),
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Base(kind) => write!(f, "{}", kind.name()),
            TypeSignature::Object(ty) => write!(f, "{}", ty),
        }
    }
}

impl fmt::Display for ClassSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type_params(f, &self.type_params)?;
        if self.type_params.is_some() {
            write!(f, " ")?;
        }
        write!(f, "extends {}", self.extends)?;
        if !self.implements.is_empty() {
            write!(f, " implements ")?;
            write_list(f, &self.implements, ", ")?;
        }
        Ok(())
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type_params(f, &self.type_params)?;
        if self.type_params.is_some() {
            write!(f, " ")?;
        }
        match &self.ret {
            Some(ret) => write!(f, "{}", ret)?,
            None => write!(f, "void")?,
        }
        write!(f, " (")?;
        write_list(f, &self.params, ", ")?;
        write!(f, ")")?;
        if !self.throws.is_empty() {
            write!(f, " throws ")?;
            write_list(f, &self.throws, ", ")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sig_ident() {
        let input = b"one.two;three[four/five<six>seven:";
        let mut p = ByteParser::new(input);

        assert_eq!("one", parse_identifier(&mut p).unwrap());
        p.expect(b".").unwrap();
        assert_eq!("two", parse_identifier(&mut p).unwrap());
        p.expect(b";").unwrap();
        assert_eq!("three", parse_identifier(&mut p).unwrap());
        p.expect(b"[").unwrap();
        assert_eq!("four", parse_identifier(&mut p).unwrap());
        p.expect(b"/").unwrap();
        assert_eq!("five", parse_identifier(&mut p).unwrap());
        p.expect(b"<").unwrap();
        assert_eq!("six", parse_identifier(&mut p).unwrap());
        p.expect(b">").unwrap();
        assert_eq!("seven", parse_identifier(&mut p).unwrap());
        p.expect(b":").unwrap();
    }

    #[test]
    fn sig_object_type() {
        // net.xavil.MyObject<? extends T>[][]
        let res = ObjectType::Array(
            2,
            Box::new(TypeSignature::Object(ObjectType::Class(Box::new(
                FullClassTypeSignature {
                    package: Some(vec!["net".into(), "xavil".into()].into()),
                    class: ClassTypeSignature {
                        ident: "MyObject".into(),
                        type_arguments: Some(
                            vec![TypeArgument::Bounded(
                                WildcardBound::Extends,
                                ObjectType::TypeVariable("T".into()),
                            )]
                            .into(),
                        ),
                    },
                    inner: Box::new([]),
                },
            )))),
        );

        let parsed = ObjectType::parse("[[Lnet/xavil/MyObject<+TT;>;").unwrap();
        assert_eq!(res, parsed);
        assert_eq!(parsed.to_string(), "net.xavil.MyObject<? extends T>[][]");
    }

    #[test]
    fn class_signature() {
        let sig = ClassSignature::parse(
            "<K:Ljava/lang/Object;V::Ljava/lang/Comparable<TV;>;>Ljava/util/AbstractMap<TK;TV;>;Ljava/io/Serializable;",
        )
        .unwrap();
        assert_eq!(sig.type_params.as_ref().map(|p| p.len()), Some(2));
        assert_eq!(sig.implements.len(), 1);
        assert_eq!(
            sig.to_string(),
            "<K extends java.lang.Object, V extends java.lang.Comparable<V>> \
             extends java.util.AbstractMap<K, V> implements java.io.Serializable"
        );
    }

    #[test]
    fn method_signature() {
        let sig = MethodSignature::parse("<T:Ljava/lang/Object;>(TT;[I)Ljava/util/List<*>;^TE;").unwrap();
        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.throws.len(), 1);
        assert_eq!(
            sig.to_string(),
            "<T extends java.lang.Object> java.util.List<?> (T, int[]) throws E"
        );

        let void = MethodSignature::parse("()V").unwrap();
        assert_eq!(void.ret, None);
    }

    #[test]
    fn malformed_signature() {
        assert!(matches!(ClassSignature::parse("Lfoo"), Err(ClassError::BadSignature(_))));
        assert!(matches!(MethodSignature::parse("(I)Vx"), Err(ClassError::BadSignature(_))));
    }
}
