//! # Constant Pool
//! Entries in the constant pool start at 1, and indices into the pool are
//! likewise 1-based. Each entry is comprised of a 1-byte tag, followed by a
//! variable length of bytes decided by the type of constant.
//!
//! ### Oddities
//! Utf8 constants aren't actually UTF-8, but a slightly modified UTF-8 as
//! described in §4.4.7
//!
//! Long and Double entries take up two slots in the constant pool, but the
//! upper entry is never directly referenced.
//! ```txt
//! Utf8               (1)  length: u16, data: [u8; length]
//! Integer            (3)  data: i32
//! Float              (4)  data: f32
//! Long               (5)  data: i64
//! Double             (6)  data: f64
//! Class              (7)  name: u16
//! String             (8)  utf8: u16
//! FieldRef           (9)  class: u16, name_and_type: u16
//! MethodRef          (10) class: u16, name_and_type: u16
//! InterfaceMethodRef (11) class: u16, name_and_type: u16
//! NameAndType        (12) name: u16, descriptor: u16
//! MethodHandle       (15) kind: u8, reference: u16
//! MethodType         (16) descriptor: u16
//! Dynamic            (17) bootstrap: u16, name_and_type: u16
//! InvokeDynamic      (18) bootstrap: u16, name_and_type: u16
//! Module             (19) name: u16
//! Package            (20) name: u16
//! ```
//!
//! Alongside the raw [`Constant`] entries this module defines the symbolic
//! values that models and builders exchange: [`MemberRef`],
//! [`LoadableConstant`] and friends. They carry names rather than indices, so
//! they can be moved between classes with different pools.

use crate::{
    descriptor::TypeKind,
    parse::ByteParser,
    writer::BufWriter,
    ClassError, ClassResult,
};
use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Range,
    sync::Arc,
};

pub type PoolIndex = u16;

/// An interned name or descriptor.
pub type Symbol = Arc<str>;

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_INTEGER: u8 = 3;
pub const CONSTANT_FLOAT: u8 = 4;
pub const CONSTANT_LONG: u8 = 5;
pub const CONSTANT_DOUBLE: u8 = 6;
pub const CONSTANT_CLASS: u8 = 7;
pub const CONSTANT_STRING: u8 = 8;
pub const CONSTANT_FIELD_REF: u8 = 9;
pub const CONSTANT_METHOD_REF: u8 = 10;
pub const CONSTANT_INTERFACE_METHOD_REF: u8 = 11;
pub const CONSTANT_NAME_AND_TYPE: u8 = 12;
pub const CONSTANT_METHOD_HANDLE: u8 = 15;
pub const CONSTANT_METHOD_TYPE: u8 = 16;
pub const CONSTANT_DYNAMIC: u8 = 17;
pub const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
pub const CONSTANT_MODULE: u8 = 19;
pub const CONSTANT_PACKAGE: u8 = 20;

// Symbolic references by an instruction sequence to fields or methods are
// indicated by C.x:T, where x and T are the name and descriptor of the field
// or method, and C is the class or interface in which the field or method is
// to be found.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MethodHandleKind {
    /// getfield C.f:T
    GetField = 1,
    /// getstatic C.f:T
    GetStatic = 2,
    /// putfield C.f:T
    PutField = 3,
    /// putstatic C.f:T
    PutStatic = 4,
    /// invokevirtual C.m:(A*)T
    InvokeVirtual = 5,
    /// invokestatic C.m:(A*)T
    InvokeStatic = 6,
    /// invokespecial C.m:(A*)T
    InvokeSpecial = 7,
    /// new C; dup; invokespecial C.<init>:(A*)void
    NewInvokeSpecial = 8,
    /// invokeinterface C.m:(A*)T
    InvokeInterface = 9,
}

impl MethodHandleKind {
    pub fn from(ty: u8) -> ClassResult<MethodHandleKind> {
        Ok(match ty {
            1 => MethodHandleKind::GetField,
            2 => MethodHandleKind::GetStatic,
            3 => MethodHandleKind::PutField,
            4 => MethodHandleKind::PutStatic,
            5 => MethodHandleKind::InvokeVirtual,
            6 => MethodHandleKind::InvokeStatic,
            7 => MethodHandleKind::InvokeSpecial,
            8 => MethodHandleKind::NewInvokeSpecial,
            9 => MethodHandleKind::InvokeInterface,
            other => return Err(ClassError::UnknownMethodHandleKind(other)),
        })
    }

    pub fn is_field(self) -> bool {
        (self as u8) <= 4
    }
}

#[derive(Clone, Debug)]
pub enum Constant {
    /// Occupies index 0 and the upper half of 64-bit entries.
    Nothing,

    Utf8(Symbol),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    Class(PoolIndex),
    String(PoolIndex),
    MethodType(PoolIndex),
    Module(PoolIndex),
    Package(PoolIndex),

    FieldRef {
        class: PoolIndex,
        name_and_type: PoolIndex,
    },
    MethodRef {
        class: PoolIndex,
        name_and_type: PoolIndex,
    },
    InterfaceMethodRef {
        class: PoolIndex,
        name_and_type: PoolIndex,
    },
    NameAndType {
        name: PoolIndex,
        descriptor: PoolIndex,
    },

    MethodHandle {
        kind: MethodHandleKind,
        reference: PoolIndex,
    },

    Dynamic {
        bootstrap: u16,
        name_and_type: PoolIndex,
    },
    InvokeDynamic {
        bootstrap: u16,
        name_and_type: PoolIndex,
    },
}

// Floating point entries compare by bit pattern so that pool deduplication
// keeps NaN payloads and signed zeros apart.
impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        use Constant::*;
        match (self, other) {
            (Nothing, Nothing) => true,
            (Utf8(a), Utf8(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Class(a), Class(b))
            | (String(a), String(b))
            | (MethodType(a), MethodType(b))
            | (Module(a), Module(b))
            | (Package(a), Package(b)) => a == b,
            (
                FieldRef { class: c1, name_and_type: n1 },
                FieldRef { class: c2, name_and_type: n2 },
            )
            | (
                MethodRef { class: c1, name_and_type: n1 },
                MethodRef { class: c2, name_and_type: n2 },
            )
            | (
                InterfaceMethodRef { class: c1, name_and_type: n1 },
                InterfaceMethodRef { class: c2, name_and_type: n2 },
            ) => c1 == c2 && n1 == n2,
            (
                NameAndType { name: n1, descriptor: d1 },
                NameAndType { name: n2, descriptor: d2 },
            ) => n1 == n2 && d1 == d2,
            (
                MethodHandle { kind: k1, reference: r1 },
                MethodHandle { kind: k2, reference: r2 },
            ) => k1 == k2 && r1 == r2,
            (
                Dynamic { bootstrap: b1, name_and_type: n1 },
                Dynamic { bootstrap: b2, name_and_type: n2 },
            )
            | (
                InvokeDynamic { bootstrap: b1, name_and_type: n1 },
                InvokeDynamic { bootstrap: b2, name_and_type: n2 },
            ) => b1 == b2 && n1 == n2,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Constant::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Nothing => {}
            Utf8(s) => s.hash(state),
            Integer(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Long(v) => v.hash(state),
            Double(v) => v.to_bits().hash(state),
            Class(i) | String(i) | MethodType(i) | Module(i) | Package(i) => i.hash(state),
            FieldRef { class, name_and_type }
            | MethodRef { class, name_and_type }
            | InterfaceMethodRef { class, name_and_type } => (class, name_and_type).hash(state),
            NameAndType { name, descriptor } => (name, descriptor).hash(state),
            MethodHandle { kind, reference } => (kind, reference).hash(state),
            Dynamic { bootstrap, name_and_type } | InvokeDynamic { bootstrap, name_and_type } => {
                (bootstrap, name_and_type).hash(state)
            }
        }
    }
}

impl Constant {
    pub fn is_nothing(&self) -> bool {
        matches!(self, Constant::Nothing)
    }

    /// Long and Double entries occupy two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    pub fn tag(&self) -> u8 {
        match self {
            Constant::Nothing => 0,
            Constant::Utf8(_) => CONSTANT_UTF8,
            Constant::Integer(_) => CONSTANT_INTEGER,
            Constant::Float(_) => CONSTANT_FLOAT,
            Constant::Long(_) => CONSTANT_LONG,
            Constant::Double(_) => CONSTANT_DOUBLE,
            Constant::Class(_) => CONSTANT_CLASS,
            Constant::String(_) => CONSTANT_STRING,
            Constant::MethodType(_) => CONSTANT_METHOD_TYPE,
            Constant::Module(_) => CONSTANT_MODULE,
            Constant::Package(_) => CONSTANT_PACKAGE,
            Constant::FieldRef { .. } => CONSTANT_FIELD_REF,
            Constant::MethodRef { .. } => CONSTANT_METHOD_REF,
            Constant::InterfaceMethodRef { .. } => CONSTANT_INTERFACE_METHOD_REF,
            Constant::NameAndType { .. } => CONSTANT_NAME_AND_TYPE,
            Constant::MethodHandle { .. } => CONSTANT_METHOD_HANDLE,
            Constant::Dynamic { .. } => CONSTANT_DYNAMIC,
            Constant::InvokeDynamic { .. } => CONSTANT_INVOKE_DYNAMIC,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Constant::Nothing => "an unusable slot",
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::MethodType(_) => "MethodType",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
        }
    }

    pub fn as_utf8(&self) -> Option<&Symbol> {
        match self {
            Constant::Utf8(data) => Some(data),
            _ => None,
        }
    }
}

pub fn parse_constant(input: &mut ByteParser<'_>) -> ClassResult<Constant> {
    let offset = input.offset;
    Ok(match input.parse_u8()? {
        CONSTANT_UTF8 => {
            let len = input.parse_u16()? as usize;
            Constant::Utf8(crate::parse_mutf8(input.take(len)?)?.into())
        }
        CONSTANT_INTEGER => input.parse_i32().map(Constant::Integer)?,
        CONSTANT_FLOAT => input.parse_f32().map(Constant::Float)?,
        CONSTANT_LONG => input.parse_i64().map(Constant::Long)?,
        CONSTANT_DOUBLE => input.parse_f64().map(Constant::Double)?,

        CONSTANT_CLASS => input.parse_u16().map(Constant::Class)?,
        CONSTANT_STRING => input.parse_u16().map(Constant::String)?,
        CONSTANT_METHOD_TYPE => input.parse_u16().map(Constant::MethodType)?,
        CONSTANT_MODULE => input.parse_u16().map(Constant::Module)?,
        CONSTANT_PACKAGE => input.parse_u16().map(Constant::Package)?,

        CONSTANT_FIELD_REF => Constant::FieldRef {
            class: input.parse_u16()?,
            name_and_type: input.parse_u16()?,
        },

        CONSTANT_METHOD_REF => Constant::MethodRef {
            class: input.parse_u16()?,
            name_and_type: input.parse_u16()?,
        },

        CONSTANT_INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
            class: input.parse_u16()?,
            name_and_type: input.parse_u16()?,
        },

        CONSTANT_NAME_AND_TYPE => Constant::NameAndType {
            name: input.parse_u16()?,
            descriptor: input.parse_u16()?,
        },

        CONSTANT_METHOD_HANDLE => Constant::MethodHandle {
            kind: MethodHandleKind::from(input.parse_u8()?)?,
            reference: input.parse_u16()?,
        },

        CONSTANT_DYNAMIC => Constant::Dynamic {
            bootstrap: input.parse_u16()?,
            name_and_type: input.parse_u16()?,
        },

        CONSTANT_INVOKE_DYNAMIC => Constant::InvokeDynamic {
            bootstrap: input.parse_u16()?,
            name_and_type: input.parse_u16()?,
        },

        tag => return Err(ClassError::UnknownConstantTag { offset, tag }),
    })
}

pub(crate) fn write_constant(out: &mut Vec<u8>, constant: &Constant) -> ClassResult<()> {
    fn u16(out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    if constant.is_nothing() {
        return Ok(());
    }

    out.push(constant.tag());
    match constant {
        Constant::Nothing => {}
        Constant::Utf8(text) => {
            let bytes = crate::encode_mutf8(text);
            let len = u16::try_from(bytes.len()).map_err(|_| ClassError::Utf8TooLong(bytes.len()))?;
            u16(out, len);
            out.extend_from_slice(&bytes);
        }
        Constant::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
        Constant::Float(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Constant::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
        Constant::Double(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Constant::Class(i)
        | Constant::String(i)
        | Constant::MethodType(i)
        | Constant::Module(i)
        | Constant::Package(i) => u16(out, *i),
        Constant::FieldRef { class, name_and_type }
        | Constant::MethodRef { class, name_and_type }
        | Constant::InterfaceMethodRef { class, name_and_type } => {
            u16(out, *class);
            u16(out, *name_and_type);
        }
        Constant::NameAndType { name, descriptor } => {
            u16(out, *name);
            u16(out, *descriptor);
        }
        Constant::MethodHandle { kind, reference } => {
            out.push(*kind as u8);
            u16(out, *reference);
        }
        Constant::Dynamic { bootstrap, name_and_type }
        | Constant::InvokeDynamic { bootstrap, name_and_type } => {
            u16(out, *bootstrap);
            u16(out, *name_and_type);
        }
    }
    Ok(())
}

/// A parsed constant pool, along with the bytes it was parsed from so that an
/// unchanged pool can be copied wholesale into a new class.
#[derive(Debug)]
pub struct ConstantPool {
    entries: Box<[Constant]>,
    source: Arc<[u8]>,
    raw: Range<usize>,
}

pub fn parse_constant_pool(input: &mut ByteParser<'_>, source: Arc<[u8]>) -> ClassResult<ConstantPool> {
    let num_consts = match input.parse_u16()? as usize {
        0 => return Err(ClassError::ConstantPoolTooSmall),
        num => num - 1,
    };

    let start = input.offset;
    let mut consts = Vec::with_capacity(num_consts + 1);

    // First slot is unused. Everything uses 1-based indices into the pool.
    consts.push(Constant::Nothing);

    let mut cur = 0;
    while cur < num_consts {
        let constant = parse_constant(input)?;
        let is_double_wide = constant.is_wide();

        cur += 1;
        consts.push(constant);
        if is_double_wide {
            cur += 1;
            consts.push(Constant::Nothing);
        }
    }

    // A trailing wide entry may claim a slot past the declared count.
    consts.truncate(num_consts + 1);
    log::trace!("parsed {} constant pool slots", consts.len());

    Ok(ConstantPool {
        entries: consts.into(),
        source,
        raw: start..input.offset,
    })
}

impl ConstantPool {
    /// The `constant_pool_count` value: one more than the highest index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }

    /// The encoded entries, without the leading count.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.source[self.raw.clone()]
    }

    pub fn entry(&self, index: PoolIndex) -> ClassResult<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Nothing) | None => Err(ClassError::InvalidPoolIndex(index)),
            Some(constant) => Ok(constant),
        }
    }

    fn wrong_tag(&self, index: PoolIndex, expected: &'static str, found: &Constant) -> ClassError {
        ClassError::WrongPoolTag {
            index,
            expected,
            found: found.describe(),
        }
    }

    pub fn utf8(&self, index: PoolIndex) -> ClassResult<&Symbol> {
        match self.entry(index)? {
            Constant::Utf8(text) => Ok(text),
            other => Err(self.wrong_tag(index, "Utf8", other)),
        }
    }

    pub fn class_name(&self, index: PoolIndex) -> ClassResult<&Symbol> {
        match self.entry(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(self.wrong_tag(index, "Class", other)),
        }
    }

    pub fn module_name(&self, index: PoolIndex) -> ClassResult<&Symbol> {
        match self.entry(index)? {
            Constant::Module(name) => self.utf8(*name),
            other => Err(self.wrong_tag(index, "Module", other)),
        }
    }

    pub fn package_name(&self, index: PoolIndex) -> ClassResult<&Symbol> {
        match self.entry(index)? {
            Constant::Package(name) => self.utf8(*name),
            other => Err(self.wrong_tag(index, "Package", other)),
        }
    }

    /// Like `class_name`, but index 0 means "none".
    pub fn optional_class_name(&self, index: PoolIndex) -> ClassResult<Option<Symbol>> {
        match index {
            0 => Ok(None),
            index => self.class_name(index).map(|name| Some(name.clone())),
        }
    }

    pub fn optional_utf8(&self, index: PoolIndex) -> ClassResult<Option<Symbol>> {
        match index {
            0 => Ok(None),
            index => self.utf8(index).map(|text| Some(text.clone())),
        }
    }

    pub fn name_and_type(&self, index: PoolIndex) -> ClassResult<(Symbol, Symbol)> {
        match self.entry(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?.clone(), self.utf8(*descriptor)?.clone()))
            }
            other => Err(self.wrong_tag(index, "NameAndType", other)),
        }
    }

    /// Resolves a field, method or interface method reference.
    pub fn member_ref(&self, index: PoolIndex) -> ClassResult<(MemberKind, MemberRef)> {
        let (kind, class, name_and_type) = match self.entry(index)? {
            Constant::FieldRef { class, name_and_type } => (MemberKind::Field, class, name_and_type),
            Constant::MethodRef { class, name_and_type } => (MemberKind::Method, class, name_and_type),
            Constant::InterfaceMethodRef { class, name_and_type } => {
                (MemberKind::InterfaceMethod, class, name_and_type)
            }
            other => return Err(self.wrong_tag(index, "member reference", other)),
        };
        let (name, descriptor) = self.name_and_type(*name_and_type)?;
        Ok((
            kind,
            MemberRef {
                owner: self.class_name(*class)?.clone(),
                name,
                descriptor,
            },
        ))
    }

    pub fn method_handle(&self, index: PoolIndex) -> ClassResult<MethodHandleRef> {
        match self.entry(index)? {
            Constant::MethodHandle { kind, reference } => {
                let (member_kind, member) = self.member_ref(*reference)?;
                Ok(MethodHandleRef {
                    kind: *kind,
                    member,
                    interface: member_kind == MemberKind::InterfaceMethod,
                })
            }
            other => Err(self.wrong_tag(index, "MethodHandle", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A symbolic reference to a field or method: `owner.name:descriptor`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MemberRef {
    pub owner: Symbol,
    pub name: Symbol,
    pub descriptor: Symbol,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        MemberRef {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodHandleRef {
    pub kind: MethodHandleKind,
    pub member: MemberRef,
    /// Whether the referenced method lives in an interface.
    pub interface: bool,
}

/// One entry of the `BootstrapMethods` table.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BootstrapMethodRef {
    pub handle: MethodHandleRef,
    pub arguments: Vec<LoadableConstant>,
}

/// The target of an `invokedynamic` call site or a dynamically computed
/// constant.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DynamicRef {
    pub name: Symbol,
    pub descriptor: Symbol,
    pub bootstrap: Arc<BootstrapMethodRef>,
}

/// A value that `ldc` can push, or that can appear as a static bootstrap
/// argument.
#[derive(Clone, Debug)]
pub enum LoadableConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(Symbol),
    Class(Symbol),
    MethodType(Symbol),
    MethodHandle(MethodHandleRef),
    Dynamic(DynamicRef),
}

impl PartialEq for LoadableConstant {
    fn eq(&self, other: &Self) -> bool {
        use LoadableConstant::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) | (Class(a), Class(b)) | (MethodType(a), MethodType(b)) => a == b,
            (MethodHandle(a), MethodHandle(b)) => a == b,
            (Dynamic(a), Dynamic(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for LoadableConstant {}

impl Hash for LoadableConstant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use LoadableConstant::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Integer(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Long(v) => v.hash(state),
            Double(v) => v.to_bits().hash(state),
            String(s) | Class(s) | MethodType(s) => s.hash(state),
            MethodHandle(h) => h.hash(state),
            Dynamic(d) => d.hash(state),
        }
    }
}

impl LoadableConstant {
    pub fn type_kind(&self) -> TypeKind {
        match self {
            LoadableConstant::Integer(_) => TypeKind::Int,
            LoadableConstant::Float(_) => TypeKind::Float,
            LoadableConstant::Long(_) => TypeKind::Long,
            LoadableConstant::Double(_) => TypeKind::Double,
            LoadableConstant::Dynamic(dynamic) => dynamic
                .descriptor
                .bytes()
                .next()
                .and_then(TypeKind::from_descriptor_char)
                .unwrap_or(TypeKind::Reference),
            _ => TypeKind::Reference,
        }
    }

    /// Whether the value takes two stack slots, and so needs `ldc2_w`.
    pub fn is_wide(&self) -> bool {
        self.type_kind().slot_size() == 2
    }
}

impl From<i32> for LoadableConstant {
    fn from(value: i32) -> Self {
        LoadableConstant::Integer(value)
    }
}

impl From<i64> for LoadableConstant {
    fn from(value: i64) -> Self {
        LoadableConstant::Long(value)
    }
}

impl From<f32> for LoadableConstant {
    fn from(value: f32) -> Self {
        LoadableConstant::Float(value)
    }
}

impl From<f64> for LoadableConstant {
    fn from(value: f64) -> Self {
        LoadableConstant::Double(value)
    }
}

impl From<&str> for LoadableConstant {
    fn from(value: &str) -> Self {
        LoadableConstant::String(value.into())
    }
}

impl fmt::Display for LoadableConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadableConstant::Integer(v) => write!(f, "{}", v),
            LoadableConstant::Float(v) => write!(f, "{}f", v),
            LoadableConstant::Long(v) => write!(f, "{}L", v),
            LoadableConstant::Double(v) => write!(f, "{}d", v),
            LoadableConstant::String(s) => write!(f, "{:?}", s),
            LoadableConstant::Class(c) => write!(f, "{}.class", c),
            LoadableConstant::MethodType(d) => write!(f, "MethodType {}", d),
            LoadableConstant::MethodHandle(h) => write!(f, "MethodHandle {:?} {}", h.kind, h.member),
            LoadableConstant::Dynamic(d) => write!(f, "Dynamic {}:{}", d.name, d.descriptor),
        }
    }
}

/// Writes a constant pool index for a loadable value.
pub(crate) fn write_loadable(out: &mut BufWriter<'_>, value: &LoadableConstant) {
    let index = out.pool().loadable(value);
    out.write_u16(index);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(bytes: &[u8]) -> ClassResult<ConstantPool> {
        let source: Arc<[u8]> = bytes.into();
        let mut input = ByteParser::new(&source);
        parse_constant_pool(&mut input, source.clone())
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let pool = pool_of(&[
            0x00, 0x05, // count
            CONSTANT_LONG, 0, 0, 0, 0, 0, 0, 0, 7,
            CONSTANT_UTF8, 0x00, 0x02, b'h', b'i',
            CONSTANT_STRING, 0x00, 0x03,
        ])
        .unwrap();

        assert_eq!(pool.len(), 5);
        assert_eq!(pool.entry(1).unwrap(), &Constant::Long(7));
        assert!(matches!(pool.entry(2), Err(ClassError::InvalidPoolIndex(2))));
        assert_eq!(&**pool.utf8(3).unwrap(), "hi");
        assert_eq!(pool.raw_bytes().len(), 9 + 5 + 3);
    }

    #[test]
    fn wrong_tag_is_distinct_from_bad_index() {
        let pool = pool_of(&[0x00, 0x02, CONSTANT_INTEGER, 0, 0, 0, 1]).unwrap();
        assert!(matches!(
            pool.utf8(1),
            Err(ClassError::WrongPoolTag { index: 1, expected: "Utf8", found: "Integer" })
        ));
        assert!(matches!(pool.utf8(0), Err(ClassError::InvalidPoolIndex(0))));
        assert!(matches!(pool.utf8(9), Err(ClassError::InvalidPoolIndex(9))));
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let err = pool_of(&[0x00, 0x02, 2, 0, 0]).unwrap_err();
        assert!(matches!(err, ClassError::UnknownConstantTag { offset: 2, tag: 2 }));
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(matches!(pool_of(&[0, 0]), Err(ClassError::ConstantPoolTooSmall)));
    }

    #[test]
    fn floats_compare_by_bits() {
        assert_ne!(Constant::Float(0.0), Constant::Float(-0.0));
        assert_eq!(Constant::Double(f64::NAN), Constant::Double(f64::NAN));
        assert_ne!(LoadableConstant::Float(0.0), LoadableConstant::Float(-0.0));
    }

    #[test]
    fn encoding_matches_parsing() {
        let constants = [
            Constant::Utf8("a\0b".into()),
            Constant::Double(1.5),
            Constant::MethodHandle {
                kind: MethodHandleKind::InvokeStatic,
                reference: 4,
            },
        ];
        for constant in constants.iter() {
            let mut out = vec![];
            write_constant(&mut out, constant).unwrap();
            let mut input = ByteParser::new(&out);
            assert_eq!(&parse_constant(&mut input).unwrap(), constant);
            assert_eq!(input.remaining(), 0);
        }
    }
}
