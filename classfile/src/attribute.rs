//! # Attribute Formats
//!
//! ## General Form
//! Every attribute is an index into the constant pool naming the attribute,
//! followed by the byte length of the *rest* of the attribute, followed by
//! attribute-specific information.
//!
//! ```txt
//! AttributeInfo {
//!     name_index: u16,
//!     length: u32,
//!     info: [u8; length],
//! }
//! ```
//!
//! The length lets a reader skip any attribute it does not understand. Those
//! are kept as [`Attribute::Unknown`] so that they survive a rewrite that
//! shares the original constant pool.
//!
//! ## Representation
//! Attributes here are symbolic: wherever the binary form holds a constant
//! pool index, the types below hold the resolved name, descriptor or value.
//! Writing an attribute interns those values into the pool of the class
//! being written, so an attribute read from one class can be written into
//! any other.
//!
//! Bytecode offsets stay numeric. Code bodies are turned into labels by
//! [`CodeModel`], which also owns the `LineNumberTable`,
//! `LocalVariableTable`, `LocalVariableTypeTable` and `CharacterRangeTable`
//! attributes of a body.

use crate::{
    access::AccessFlags,
    constant::{BootstrapMethodRef, Constant, LoadableConstant, Symbol},
    mapper::AttributeMapper,
    model::CodeModel,
    parse::ByteParser,
    reader::ClassReader,
    writer::BufWriter,
    ClassError, ClassResult,
};
use std::{any::Any, fmt, sync::Arc};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    Object(Symbol),
    /// A value created by the `new` instruction at this bytecode offset,
    /// whose constructor has not run yet.
    Uninitialized(u16),
}

impl VerificationType {
    pub fn is_wide(&self) -> bool {
        matches!(self, VerificationType::Long | VerificationType::Double)
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationType::Top => write!(f, "top"),
            VerificationType::Integer => write!(f, "int"),
            VerificationType::Float => write!(f, "float"),
            VerificationType::Long => write!(f, "long"),
            VerificationType::Double => write!(f, "double"),
            VerificationType::Null => write!(f, "null"),
            VerificationType::UninitializedThis => write!(f, "uninitialized this"),
            VerificationType::Object(class) => write!(f, "{}", class),
            VerificationType::Uninitialized(offset) => write!(f, "uninitialized @{}", offset),
        }
    }
}

/// One entry of a `StackMapTable`. The compact and extended encodings are
/// distinct variants so that a frame is written back exactly as it was read.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum StackMapFrame {
    /// Frame types 0 to 63.
    Same { offset_delta: u16 },
    /// Frame type 251.
    SameExtended { offset_delta: u16 },
    /// Frame types 64 to 127.
    SameLocalsOneStackItem { offset_delta: u16, stack: VerificationType },
    /// Frame type 247.
    SameLocalsOneStackItemExtended { offset_delta: u16, stack: VerificationType },
    /// Frame types 248 to 250.
    Chop { offset_delta: u16, chopped: u8 },
    /// Frame types 252 to 254.
    Append { offset_delta: u16, locals: Vec<VerificationType> },
    /// Frame type 255.
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameExtended { offset_delta }
            | StackMapFrame::SameLocalsOneStackItem { offset_delta, .. }
            | StackMapFrame::SameLocalsOneStackItemExtended { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct InnerClassInfo {
    pub inner: Symbol,
    pub outer: Option<Symbol>,
    /// `None` for anonymous classes.
    pub name: Option<Symbol>,
    pub flags: AccessFlags,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LineNumberInfo {
    pub start_pc: u16,
    pub line: u16,
}

/// An entry of a `LocalVariableTable`, or of a `LocalVariableTypeTable`, in
/// which case `descriptor` holds a field signature.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: Symbol,
    pub descriptor: Symbol,
    pub slot: u16,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CharacterRange {
    pub start_pc: u16,
    /// Inclusive, unlike most bytecode ranges.
    pub end_pc: u16,
    pub range_start: u32,
    pub range_end: u32,
    pub flags: u16,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodParameter {
    pub name: Option<Symbol>,
    pub flags: AccessFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface.
    pub ty: Symbol,
    pub elements: Vec<AnnotationElement>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationElement {
    pub name: Symbol,
    pub value: ElementValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    /// `B`, `C`, `I`, `S` or `Z`; all stored as `CONSTANT_Integer`.
    Int { tag: u8, value: i32 },
    Long(i64),
    Float(f32),
    Double(f64),
    String(Symbol),
    Enum { ty: Symbol, name: Symbol },
    /// A return descriptor, e.g. `Ljava/lang/String;` or `V`.
    Class(Symbol),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

/// Where a type annotation applies, keyed by its `target_type` byte.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeAnnotationTarget {
    /// 0x00 and 0x01: a type parameter of a class or method.
    TypeParameter { target_type: u8, index: u8 },
    /// 0x10: 65535 for the superclass, otherwise an index into the
    /// interfaces.
    Supertype(u16),
    /// 0x11 and 0x12.
    TypeParameterBound { target_type: u8, parameter: u8, bound: u8 },
    /// 0x13 to 0x15: a field, return or receiver type.
    Empty { target_type: u8 },
    /// 0x16.
    FormalParameter(u8),
    /// 0x17: an index into the `Exceptions` attribute.
    Throws(u16),
    /// 0x40 and 0x41: the live ranges of a local variable.
    LocalVariable { target_type: u8, table: Vec<LocalVariableTarget> },
    /// 0x42: an index into the exception table.
    Catch(u16),
    /// 0x43 to 0x46: an `instanceof`, `new` or method reference expression.
    Offset { target_type: u8, offset: u16 },
    /// 0x47 to 0x4B: a cast, or a type argument of a call.
    TypeArgument { target_type: u8, offset: u16, index: u8 },
}

impl TypeAnnotationTarget {
    pub fn target_type(&self) -> u8 {
        use TypeAnnotationTarget::*;
        match self {
            TypeParameter { target_type, .. }
            | TypeParameterBound { target_type, .. }
            | Empty { target_type }
            | LocalVariable { target_type, .. }
            | Offset { target_type, .. }
            | TypeArgument { target_type, .. } => *target_type,
            Supertype(_) => 0x10,
            FormalParameter(_) => 0x16,
            Throws(_) => 0x17,
            Catch(_) => 0x42,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LocalVariableTarget {
    pub start_pc: u16,
    pub length: u16,
    pub slot: u16,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TypePathEntry {
    pub kind: u8,
    pub argument: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAnnotation {
    pub target: TypeAnnotationTarget,
    pub path: Vec<TypePathEntry>,
    pub annotation: Annotation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordComponent {
    pub name: Symbol,
    pub descriptor: Symbol,
    pub attributes: Vec<Attribute>,
}

/// The body of a `Module` attribute. Modules and packages are held by name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ModuleInfo {
    pub name: Symbol,
    pub flags: AccessFlags,
    pub version: Option<Symbol>,
    pub requires: Vec<ModuleRequire>,
    pub exports: Vec<ModuleExport>,
    pub opens: Vec<ModuleExport>,
    /// Service interfaces, as class names.
    pub uses: Vec<Symbol>,
    pub provides: Vec<ModuleProvide>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ModuleRequire {
    pub module: Symbol,
    pub flags: AccessFlags,
    pub version: Option<Symbol>,
}

/// An `exports` or `opens` entry. An empty `to` list is unqualified.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ModuleExport {
    pub package: Symbol,
    pub flags: AccessFlags,
    pub to: Vec<Symbol>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ModuleProvide {
    pub service: Symbol,
    pub with: Vec<Symbol>,
}

/// An attribute read by a user-supplied mapper.
#[derive(Clone)]
pub struct CustomAttribute {
    pub mapper: Arc<dyn AttributeMapper>,
    pub data: Arc<dyn Any + Send + Sync>,
}

impl CustomAttribute {
    pub fn new<T: Any + Send + Sync>(mapper: Arc<dyn AttributeMapper>, data: T) -> Self {
        CustomAttribute {
            mapper,
            data: Arc::new(data),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref()
    }
}

impl fmt::Debug for CustomAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAttribute")
            .field("name", &self.mapper.name())
            .finish()
    }
}

impl PartialEq for CustomAttribute {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.data) as *const () == Arc::as_ptr(&other.data) as *const ()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    /// The value of a constant field. It must be ignored on non-static
    /// fields.
    ConstantValue(LoadableConstant),

    /// The body of a non-abstract, non-native method.
    Code(CodeModel),

    /// Frames for the type-checking verifier. Only copied verbatim when
    /// frames are not being generated.
    StackMapTable(Vec<StackMapFrame>),

    /// Checked exceptions a method declares.
    Exceptions(Vec<Symbol>),

    InnerClasses(Vec<InnerClassInfo>),

    /// The immediately enclosing method of a local or anonymous class, as a
    /// name and descriptor.
    EnclosingMethod {
        class: Symbol,
        method: Option<(Symbol, Symbol)>,
    },

    Synthetic,
    Deprecated,

    /// A class, method or field signature, depending on where it appears.
    Signature(Symbol),

    SourceFile(Symbol),

    /// Arbitrary debugging data, kept as the raw modified UTF-8 bytes.
    SourceDebugExtension(Vec<u8>),

    LineNumberTable(Vec<LineNumberInfo>),
    LocalVariableTable(Vec<LocalVariable>),
    LocalVariableTypeTable(Vec<LocalVariable>),
    CharacterRangeTable(Vec<CharacterRange>),

    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    RuntimeVisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeInvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    AnnotationDefault(ElementValue),
    RuntimeVisibleTypeAnnotations(Vec<TypeAnnotation>),
    RuntimeInvisibleTypeAnnotations(Vec<TypeAnnotation>),

    /// The bootstrap table of a class. When writing a class the table is
    /// rebuilt from the constant pool, so this is informational.
    BootstrapMethods(Vec<BootstrapMethodRef>),

    MethodParameters(Vec<MethodParameter>),
    NestHost(Symbol),
    NestMembers(Vec<Symbol>),
    PermittedSubclasses(Vec<Symbol>),
    ModulePackages(Vec<Symbol>),
    ModuleMainClass(Symbol),
    Module(Box<ModuleInfo>),
    Record(Vec<RecordComponent>),

    /// An attribute no mapper recognized, with its body bytes. Pool indices
    /// inside the body are only meaningful against the pool it was read
    /// from.
    Unknown { name: Symbol, data: Arc<[u8]> },

    Custom(CustomAttribute),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::ConstantValue(_) => "ConstantValue",
            Attribute::Code(_) => "Code",
            Attribute::StackMapTable(_) => "StackMapTable",
            Attribute::Exceptions(_) => "Exceptions",
            Attribute::InnerClasses(_) => "InnerClasses",
            Attribute::EnclosingMethod { .. } => "EnclosingMethod",
            Attribute::Synthetic => "Synthetic",
            Attribute::Deprecated => "Deprecated",
            Attribute::Signature(_) => "Signature",
            Attribute::SourceFile(_) => "SourceFile",
            Attribute::SourceDebugExtension(_) => "SourceDebugExtension",
            Attribute::LineNumberTable(_) => "LineNumberTable",
            Attribute::LocalVariableTable(_) => "LocalVariableTable",
            Attribute::LocalVariableTypeTable(_) => "LocalVariableTypeTable",
            Attribute::CharacterRangeTable(_) => "CharacterRangeTable",
            Attribute::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            Attribute::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            Attribute::RuntimeVisibleParameterAnnotations(_) => "RuntimeVisibleParameterAnnotations",
            Attribute::RuntimeInvisibleParameterAnnotations(_) => "RuntimeInvisibleParameterAnnotations",
            Attribute::AnnotationDefault(_) => "AnnotationDefault",
            Attribute::RuntimeVisibleTypeAnnotations(_) => "RuntimeVisibleTypeAnnotations",
            Attribute::RuntimeInvisibleTypeAnnotations(_) => "RuntimeInvisibleTypeAnnotations",
            Attribute::BootstrapMethods(_) => "BootstrapMethods",
            Attribute::MethodParameters(_) => "MethodParameters",
            Attribute::NestHost(_) => "NestHost",
            Attribute::NestMembers(_) => "NestMembers",
            Attribute::PermittedSubclasses(_) => "PermittedSubclasses",
            Attribute::ModulePackages(_) => "ModulePackages",
            Attribute::ModuleMainClass(_) => "ModuleMainClass",
            Attribute::Module(_) => "Module",
            Attribute::Record(_) => "Record",
            Attribute::Unknown { name, .. } => name,
            Attribute::Custom(custom) => custom.mapper.name(),
        }
    }
}

// Verification types and frames
//
// verification_type_info {
//     u1 tag;
//     u2 cpool_index_or_offset; // only for Object (7) and Uninitialized (8)
// }

pub fn parse_verification_type(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<VerificationType> {
    Ok(match input.parse_u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(reader.pool().class_name(input.parse_u16()?)?.clone()),
        8 => VerificationType::Uninitialized(input.parse_u16()?),

        other => return Err(ClassError::UnknownVerificationType(other)),
    })
}

pub fn write_verification_type(out: &mut BufWriter<'_>, ty: &VerificationType) {
    match ty {
        VerificationType::Top => out.write_u8(0),
        VerificationType::Integer => out.write_u8(1),
        VerificationType::Float => out.write_u8(2),
        VerificationType::Double => out.write_u8(3),
        VerificationType::Long => out.write_u8(4),
        VerificationType::Null => out.write_u8(5),
        VerificationType::UninitializedThis => out.write_u8(6),
        VerificationType::Object(class) => {
            out.write_u8(7);
            out.write_class_index(class);
        }
        VerificationType::Uninitialized(offset) => {
            out.write_u8(8);
            out.write_u16(*offset);
        }
    }
}

fn parse_verification_types(
    reader: &ClassReader,
    input: &mut ByteParser<'_>,
    len: usize,
) -> ClassResult<Vec<VerificationType>> {
    input.seq(len, |input| parse_verification_type(reader, input))
}

fn write_verification_types(out: &mut BufWriter<'_>, types: &[VerificationType]) -> ClassResult<()> {
    out.write_count(types.len(), "verification types")?;
    for ty in types {
        write_verification_type(out, ty);
    }
    Ok(())
}

pub fn parse_stack_map_frame(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<StackMapFrame> {
    let frame_type = input.parse_u8()?;

    Ok(match frame_type {
        0..=63 => StackMapFrame::Same {
            offset_delta: frame_type as u16,
        },
        64..=127 => StackMapFrame::SameLocalsOneStackItem {
            offset_delta: frame_type as u16 - 64,
            stack: parse_verification_type(reader, input)?,
        },
        247 => StackMapFrame::SameLocalsOneStackItemExtended {
            offset_delta: input.parse_u16()?,
            stack: parse_verification_type(reader, input)?,
        },
        248..=250 => StackMapFrame::Chop {
            offset_delta: input.parse_u16()?,
            chopped: 251 - frame_type,
        },
        251 => StackMapFrame::SameExtended {
            offset_delta: input.parse_u16()?,
        },
        252..=254 => {
            let offset_delta = input.parse_u16()?;
            let locals = parse_verification_types(reader, input, frame_type as usize - 251)?;
            StackMapFrame::Append { offset_delta, locals }
        }
        255 => {
            let offset_delta = input.parse_u16()?;
            let locals_len = input.parse_u16()? as usize;
            let locals = parse_verification_types(reader, input, locals_len)?;
            let stack_len = input.parse_u16()? as usize;
            let stack = parse_verification_types(reader, input, stack_len)?;
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            }
        }
        other => return Err(ClassError::UnknownStackMapFrameType(other)),
    })
}

pub fn write_stack_map_frame(out: &mut BufWriter<'_>, frame: &StackMapFrame) -> ClassResult<()> {
    let bad_frame = |reason: &str| ClassError::illegal(format!("bad stack map frame: {}", reason));

    match frame {
        StackMapFrame::Same { offset_delta } => {
            if *offset_delta > 63 {
                return Err(bad_frame("compact delta above 63"));
            }
            out.write_u8(*offset_delta as u8);
        }
        StackMapFrame::SameLocalsOneStackItem { offset_delta, stack } => {
            if *offset_delta > 63 {
                return Err(bad_frame("compact delta above 63"));
            }
            out.write_u8(64 + *offset_delta as u8);
            write_verification_type(out, stack);
        }
        StackMapFrame::SameLocalsOneStackItemExtended { offset_delta, stack } => {
            out.write_u8(247);
            out.write_u16(*offset_delta);
            write_verification_type(out, stack);
        }
        StackMapFrame::Chop { offset_delta, chopped } => {
            if !(1..=3).contains(chopped) {
                return Err(bad_frame("can only chop 1 to 3 locals"));
            }
            out.write_u8(251 - chopped);
            out.write_u16(*offset_delta);
        }
        StackMapFrame::SameExtended { offset_delta } => {
            out.write_u8(251);
            out.write_u16(*offset_delta);
        }
        StackMapFrame::Append { offset_delta, locals } => {
            if !(1..=3).contains(&locals.len()) {
                return Err(bad_frame("can only append 1 to 3 locals"));
            }
            out.write_u8(251 + locals.len() as u8);
            out.write_u16(*offset_delta);
            for local in locals {
                write_verification_type(out, local);
            }
        }
        StackMapFrame::Full {
            offset_delta,
            locals,
            stack,
        } => {
            out.write_u8(255);
            out.write_u16(*offset_delta);
            write_verification_types(out, locals)?;
            write_verification_types(out, stack)?;
        }
    }
    Ok(())
}

// Annotations
//
// annotation {
//     u2 type_index;
//     u2 num_element_value_pairs;
//     {   u2            element_name_index;
//         element_value value;
//     } element_value_pairs[num_element_value_pairs];
// }

pub fn parse_element_value(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<ElementValue> {
    let pool = reader.pool();
    let at = input.offset;
    let tag = input.parse_u8()?;
    Ok(match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' => {
            let index = input.parse_u16()?;
            match pool.entry(index)? {
                Constant::Integer(value) => ElementValue::Int { tag, value: *value },
                other => {
                    return Err(ClassError::WrongPoolTag {
                        index,
                        expected: "Integer",
                        found: other.describe(),
                    })
                }
            }
        }
        b'J' | b'F' | b'D' => {
            let index = input.parse_u16()?;
            match (tag, pool.entry(index)?) {
                (b'J', Constant::Long(value)) => ElementValue::Long(*value),
                (b'F', Constant::Float(value)) => ElementValue::Float(*value),
                (b'D', Constant::Double(value)) => ElementValue::Double(*value),
                (_, other) => {
                    return Err(ClassError::WrongPoolTag {
                        index,
                        expected: "numeric constant",
                        found: other.describe(),
                    })
                }
            }
        }
        b's' => ElementValue::String(pool.utf8(input.parse_u16()?)?.clone()),
        b'e' => ElementValue::Enum {
            ty: pool.utf8(input.parse_u16()?)?.clone(),
            name: pool.utf8(input.parse_u16()?)?.clone(),
        },
        b'c' => ElementValue::Class(pool.utf8(input.parse_u16()?)?.clone()),
        b'@' => ElementValue::Annotation(Box::new(parse_annotation(reader, input)?)),
        b'[' => {
            let len = input.parse_u16()? as usize;
            ElementValue::Array(input.seq(len, |input| parse_element_value(reader, input))?)
        }
        other => {
            return Err(ClassError::MalformedAttribute {
                name: "annotation".into(),
                offset: at,
                reason: format!("unknown element value tag `{}`", other as char),
            })
        }
    })
}

pub fn write_element_value(out: &mut BufWriter<'_>, value: &ElementValue) -> ClassResult<()> {
    match value {
        ElementValue::Int { tag, value } => {
            out.write_u8(*tag);
            let index = out.pool().integer(*value);
            out.write_index(index);
        }
        ElementValue::Long(value) => {
            out.write_u8(b'J');
            let index = out.pool().long(*value);
            out.write_index(index);
        }
        ElementValue::Float(value) => {
            out.write_u8(b'F');
            let index = out.pool().float(*value);
            out.write_index(index);
        }
        ElementValue::Double(value) => {
            out.write_u8(b'D');
            let index = out.pool().double(*value);
            out.write_index(index);
        }
        ElementValue::String(text) => {
            out.write_u8(b's');
            out.write_utf8_index(text);
        }
        ElementValue::Enum { ty, name } => {
            out.write_u8(b'e');
            out.write_utf8_index(ty);
            out.write_utf8_index(name);
        }
        ElementValue::Class(descriptor) => {
            out.write_u8(b'c');
            out.write_utf8_index(descriptor);
        }
        ElementValue::Annotation(annotation) => {
            out.write_u8(b'@');
            write_annotation(out, annotation)?;
        }
        ElementValue::Array(values) => {
            out.write_u8(b'[');
            out.write_count(values.len(), "array elements")?;
            for value in values {
                write_element_value(out, value)?;
            }
        }
    }
    Ok(())
}

pub fn parse_annotation(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<Annotation> {
    let ty = reader.pool().utf8(input.parse_u16()?)?.clone();
    let len = input.parse_u16()? as usize;
    let elements = input.seq(len, |input| {
        Ok::<_, ClassError>(AnnotationElement {
            name: reader.pool().utf8(input.parse_u16()?)?.clone(),
            value: parse_element_value(reader, input)?,
        })
    })?;
    Ok(Annotation { ty, elements })
}

pub fn write_annotation(out: &mut BufWriter<'_>, annotation: &Annotation) -> ClassResult<()> {
    out.write_utf8_index(&annotation.ty);
    out.write_count(annotation.elements.len(), "annotation elements")?;
    for element in &annotation.elements {
        out.write_utf8_index(&element.name);
        write_element_value(out, &element.value)?;
    }
    Ok(())
}

pub fn parse_annotations(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<Vec<Annotation>> {
    let len = input.parse_u16()? as usize;
    input.seq(len, |input| parse_annotation(reader, input))
}

pub fn write_annotations(out: &mut BufWriter<'_>, annotations: &[Annotation]) -> ClassResult<()> {
    out.write_count(annotations.len(), "annotations")?;
    for annotation in annotations {
        write_annotation(out, annotation)?;
    }
    Ok(())
}

pub fn parse_parameter_annotations(
    reader: &ClassReader,
    input: &mut ByteParser<'_>,
) -> ClassResult<Vec<Vec<Annotation>>> {
    let len = input.parse_u8()? as usize;
    input.seq(len, |input| parse_annotations(reader, input))
}

pub fn write_parameter_annotations(out: &mut BufWriter<'_>, parameters: &[Vec<Annotation>]) -> ClassResult<()> {
    if parameters.len() > u8::MAX as usize {
        return Err(ClassError::illegal("more than 255 annotated parameters"));
    }
    out.write_u8(parameters.len() as u8);
    for annotations in parameters {
        write_annotations(out, annotations)?;
    }
    Ok(())
}

// type_annotation {
//     u1 target_type;
//     union { ... } target_info;
//     u1 path_length;
//     { u1 type_path_kind; u1 type_argument_index; } path[path_length];
//     annotation;   // without the outer count
// }

pub fn parse_type_annotation(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<TypeAnnotation> {
    use TypeAnnotationTarget::*;
    let target_type = input.parse_u8()?;
    let target = match target_type {
        0x00 | 0x01 => TypeParameter {
            target_type,
            index: input.parse_u8()?,
        },
        0x10 => Supertype(input.parse_u16()?),
        0x11 | 0x12 => TypeParameterBound {
            target_type,
            parameter: input.parse_u8()?,
            bound: input.parse_u8()?,
        },
        0x13..=0x15 => Empty { target_type },
        0x16 => FormalParameter(input.parse_u8()?),
        0x17 => Throws(input.parse_u16()?),
        0x40 | 0x41 => {
            let len = input.parse_u16()? as usize;
            let table = input.seq(len, |input| {
                Ok::<_, ClassError>(LocalVariableTarget {
                    start_pc: input.parse_u16()?,
                    length: input.parse_u16()?,
                    slot: input.parse_u16()?,
                })
            })?;
            LocalVariable { target_type, table }
        }
        0x42 => Catch(input.parse_u16()?),
        0x43..=0x46 => Offset {
            target_type,
            offset: input.parse_u16()?,
        },
        0x47..=0x4b => TypeArgument {
            target_type,
            offset: input.parse_u16()?,
            index: input.parse_u8()?,
        },
        other => return Err(ClassError::UnknownTypeAnnotationTarget(other)),
    };

    let len = input.parse_u8()? as usize;
    let path = input.seq(len, |input| {
        Ok::<_, ClassError>(TypePathEntry {
            kind: input.parse_u8()?,
            argument: input.parse_u8()?,
        })
    })?;
    let annotation = parse_annotation(reader, input)?;
    Ok(TypeAnnotation { target, path, annotation })
}

pub fn write_type_annotation(out: &mut BufWriter<'_>, annotation: &TypeAnnotation) -> ClassResult<()> {
    use TypeAnnotationTarget::*;
    out.write_u8(annotation.target.target_type());
    match &annotation.target {
        TypeParameter { index, .. } => out.write_u8(*index),
        Supertype(index) | Throws(index) | Catch(index) => out.write_u16(*index),
        TypeParameterBound { parameter, bound, .. } => {
            out.write_u8(*parameter);
            out.write_u8(*bound);
        }
        Empty { .. } => {}
        FormalParameter(index) => out.write_u8(*index),
        LocalVariable { table, .. } => {
            out.write_count(table.len(), "local variable targets")?;
            for entry in table {
                out.write_u16(entry.start_pc);
                out.write_u16(entry.length);
                out.write_u16(entry.slot);
            }
        }
        Offset { offset, .. } => out.write_u16(*offset),
        TypeArgument { offset, index, .. } => {
            out.write_u16(*offset);
            out.write_u8(*index);
        }
    }

    if annotation.path.len() > u8::MAX as usize {
        return Err(ClassError::illegal("type path longer than 255 steps"));
    }
    out.write_u8(annotation.path.len() as u8);
    for step in &annotation.path {
        out.write_u8(step.kind);
        out.write_u8(step.argument);
    }
    write_annotation(out, &annotation.annotation)
}

pub fn parse_type_annotations(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<Vec<TypeAnnotation>> {
    let len = input.parse_u16()? as usize;
    input.seq(len, |input| parse_type_annotation(reader, input))
}

pub fn write_type_annotations(out: &mut BufWriter<'_>, annotations: &[TypeAnnotation]) -> ClassResult<()> {
    out.write_count(annotations.len(), "type annotations")?;
    for annotation in annotations {
        write_type_annotation(out, annotation)?;
    }
    Ok(())
}
