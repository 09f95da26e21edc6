use crate::{
    attribute::Attribute,
    constant::{DynamicRef, LoadableConstant, MemberKind, MemberRef, Symbol},
    descriptor::{FieldDescriptor, MethodDescriptor, TypeKind},
    opcode::{Opcode, OpcodeKind, WIDE},
    parse::ByteParser,
    reader::ClassReader,
    ClassError, ClassResult,
};
use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

/// A position in a code body. Labels are created by a code builder, or by a
/// parsed code model for each bytecode offset, and are bound to a position by
/// a [`CodeElement::Label`] element.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Label {
    context: u32,
    id: u32,
}

static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_label_context() -> u32 {
    NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)
}

impl Label {
    pub(crate) fn new(context: u32, id: u32) -> Self {
        Label { context, id }
    }

    /// Identifies the builder or code model that owns this label.
    pub fn context(self) -> u32 {
        self.context
    }

    /// For labels of a parsed code body, the bytecode offset they stand for.
    pub fn id(self) -> u32 {
        self.id
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SwitchCase {
    pub value: i32,
    pub target: Label,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstantInstruction {
    /// An operand-free opcode such as `iconst_2` or `aconst_null`.
    Intrinsic(Opcode),
    /// `bipush` or `sipush`.
    Argument { op: Opcode, value: i32 },
    /// `ldc`, `ldc_w` or `ldc2_w`. The narrow form is widened when the pool
    /// index does not fit in a byte.
    Load { op: Opcode, value: LoadableConstant },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Load { op: Opcode, slot: u16 },
    Store { op: Opcode, slot: u16 },
    Increment { slot: u16, value: i16 },
    Branch { op: Opcode, target: Label },
    LookupSwitch { default: Label, cases: Vec<SwitchCase> },
    TableSwitch { low: i32, high: i32, default: Label, cases: Vec<SwitchCase> },
    Return(Opcode),
    Throw,
    Field { op: Opcode, field: MemberRef },
    Invoke { op: Opcode, method: MemberRef, interface: bool },
    InvokeDynamic(DynamicRef),
    NewObject(Symbol),
    NewPrimitiveArray(TypeKind),
    NewReferenceArray(Symbol),
    NewMultiArray { class: Symbol, dimensions: u8 },
    ArrayLoad(Opcode),
    ArrayStore(Opcode),
    TypeCheck { op: Opcode, class: Symbol },
    Convert(Opcode),
    Operator(Opcode),
    Constant(ConstantInstruction),
    Stack(Opcode),
    Monitor(Opcode),
    Nop,
    Jsr { op: Opcode, target: Label },
    Ret { op: Opcode, slot: u16 },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Load { op, .. }
            | Instruction::Store { op, .. }
            | Instruction::Branch { op, .. }
            | Instruction::Field { op, .. }
            | Instruction::Invoke { op, .. }
            | Instruction::TypeCheck { op, .. }
            | Instruction::Jsr { op, .. }
            | Instruction::Ret { op, .. } => *op,
            Instruction::Increment { slot, value } => {
                if *slot > 0xff || *value < i8::MIN as i16 || *value > i8::MAX as i16 {
                    Opcode::IincW
                } else {
                    Opcode::Iinc
                }
            }
            Instruction::LookupSwitch { .. } => Opcode::Lookupswitch,
            Instruction::TableSwitch { .. } => Opcode::Tableswitch,
            Instruction::Return(op)
            | Instruction::ArrayLoad(op)
            | Instruction::ArrayStore(op)
            | Instruction::Convert(op)
            | Instruction::Operator(op)
            | Instruction::Stack(op)
            | Instruction::Monitor(op) => *op,
            Instruction::Throw => Opcode::Athrow,
            Instruction::InvokeDynamic(_) => Opcode::Invokedynamic,
            Instruction::NewObject(_) => Opcode::New,
            Instruction::NewPrimitiveArray(_) => Opcode::Newarray,
            Instruction::NewReferenceArray(_) => Opcode::Anewarray,
            Instruction::NewMultiArray { .. } => Opcode::Multianewarray,
            Instruction::Constant(ConstantInstruction::Intrinsic(op))
            | Instruction::Constant(ConstantInstruction::Argument { op, .. })
            | Instruction::Constant(ConstantInstruction::Load { op, .. }) => *op,
            Instruction::Nop => Opcode::Nop,
        }
    }

    /// Whether execution never continues with the following instruction.
    pub fn is_unconditional(&self) -> bool {
        self.opcode().is_unconditional()
    }

    /// Every label this instruction may transfer control to.
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instruction::Branch { target, .. } | Instruction::Jsr { target, .. } => vec![*target],
            Instruction::LookupSwitch { default, cases } | Instruction::TableSwitch { default, cases, .. } => {
                std::iter::once(*default).chain(cases.iter().map(|c| c.target)).collect()
            }
            _ => vec![],
        }
    }

    /// Checks that the opcode belongs to the variant carrying it.
    pub fn validate(&self) -> ClassResult<()> {
        let op = self.opcode();
        let expected = match self {
            Instruction::Load { .. } => OpcodeKind::Load,
            Instruction::Store { .. } => OpcodeKind::Store,
            Instruction::Branch { .. } => OpcodeKind::Branch,
            Instruction::Return(_) => OpcodeKind::Return,
            Instruction::Field { .. } => OpcodeKind::FieldAccess,
            Instruction::Invoke { .. } => OpcodeKind::Invoke,
            Instruction::ArrayLoad(_) => OpcodeKind::ArrayLoad,
            Instruction::ArrayStore(_) => OpcodeKind::ArrayStore,
            Instruction::TypeCheck { .. } => OpcodeKind::TypeCheck,
            Instruction::Convert(_) => OpcodeKind::Convert,
            Instruction::Operator(_) => OpcodeKind::Operator,
            Instruction::Constant(_) => OpcodeKind::Constant,
            Instruction::Stack(_) => OpcodeKind::Stack,
            Instruction::Monitor(_) => OpcodeKind::Monitor,
            Instruction::Jsr { .. } => OpcodeKind::DiscontinuedJsr,
            Instruction::Ret { .. } => OpcodeKind::DiscontinuedRet,
            Instruction::NewPrimitiveArray(kind) => {
                if kind.array_type_code().is_none() {
                    return Err(ClassError::illegal(format!("no primitive array of {}", kind.name())));
                }
                return Ok(());
            }
            _ => return Ok(()),
        };
        if op.kind() != expected {
            return Err(ClassError::illegal(format!(
                "opcode {} cannot be used as a {:?} instruction",
                op, expected
            )));
        }

        match self {
            Instruction::Load { op, slot } | Instruction::Store { op, slot } => match op.implicit_slot() {
                Some(implicit) if implicit != *slot => Err(ClassError::illegal(format!(
                    "{} cannot address slot {}",
                    op, slot
                ))),
                _ => Ok(()),
            },
            Instruction::Constant(ConstantInstruction::Argument { op, value }) => {
                let fits = match op {
                    Opcode::Bipush => *value >= i8::MIN as i32 && *value <= i8::MAX as i32,
                    Opcode::Sipush => *value >= i16::MIN as i32 && *value <= i16::MAX as i32,
                    _ => false,
                };
                if fits {
                    Ok(())
                } else {
                    Err(ClassError::illegal(format!("{} cannot push {}", op, value)))
                }
            }
            Instruction::Constant(ConstantInstruction::Load { op, value }) => {
                if (*op == Opcode::Ldc2W) != value.is_wide() || !matches!(op, Opcode::Ldc | Opcode::LdcW | Opcode::Ldc2W) {
                    Err(ClassError::illegal(format!("{} cannot load {}", op, value)))
                } else {
                    Ok(())
                }
            }
            Instruction::Constant(ConstantInstruction::Intrinsic(op)) if op.size() != Some(1) => {
                Err(ClassError::illegal(format!("{} needs an operand", op)))
            }
            _ => Ok(()),
        }
    }

    /// Operand stack slots popped and pushed.
    pub fn stack_effect(&self) -> ClassResult<(u16, u16)> {
        fn size(kind: TypeKind) -> u16 {
            kind.slot_size()
        }

        Ok(match self {
            Instruction::Load { op, .. } => (0, size(op.primary_type())),
            Instruction::Store { op, .. } => (size(op.primary_type()), 0),
            Instruction::Increment { .. } | Instruction::Nop | Instruction::Ret { .. } => (0, 0),
            Instruction::Branch { op, .. } => match op {
                Opcode::Goto | Opcode::GotoW => (0, 0),
                Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
                | Opcode::IfAcmpeq
                | Opcode::IfAcmpne => (2, 0),
                _ => (1, 0),
            },
            Instruction::LookupSwitch { .. } | Instruction::TableSwitch { .. } => (1, 0),
            Instruction::Return(op) => (size(op.primary_type()), 0),
            Instruction::Throw | Instruction::Monitor(_) => (1, 0),
            Instruction::Field { op, field } => {
                let value = size(FieldDescriptor::parse(&field.descriptor)?.type_kind());
                match op {
                    Opcode::Getstatic => (0, value),
                    Opcode::Putstatic => (value, 0),
                    Opcode::Getfield => (1, value),
                    _ => (1 + value, 0),
                }
            }
            Instruction::Invoke { op, method, .. } => {
                let descriptor = MethodDescriptor::parse(&method.descriptor)?;
                let receiver = if *op == Opcode::Invokestatic { 0 } else { 1 };
                (descriptor.parameter_slots() + receiver, size(descriptor.ret.type_kind()))
            }
            Instruction::InvokeDynamic(call_site) => {
                let descriptor = MethodDescriptor::parse(&call_site.descriptor)?;
                (descriptor.parameter_slots(), size(descriptor.ret.type_kind()))
            }
            Instruction::NewObject(_) | Instruction::Jsr { .. } => (0, 1),
            Instruction::NewPrimitiveArray(_) | Instruction::NewReferenceArray(_) => (1, 1),
            Instruction::NewMultiArray { dimensions, .. } => (*dimensions as u16, 1),
            Instruction::ArrayLoad(op) => (2, size(op.primary_type())),
            Instruction::ArrayStore(op) => (2 + size(op.primary_type()), 0),
            Instruction::TypeCheck { .. } => (1, 1),
            Instruction::Convert(op) => (size(op.primary_type()), size(op.secondary_type())),
            Instruction::Operator(op) => {
                let s = size(op.primary_type());
                match op {
                    Opcode::Ineg | Opcode::Lneg | Opcode::Fneg | Opcode::Dneg => (s, s),
                    Opcode::Ishl | Opcode::Ishr | Opcode::Iushr => (2, 1),
                    Opcode::Lshl | Opcode::Lshr | Opcode::Lushr => (3, 2),
                    Opcode::Lcmp | Opcode::Dcmpl | Opcode::Dcmpg => (4, 1),
                    Opcode::Fcmpl | Opcode::Fcmpg => (2, 1),
                    Opcode::Arraylength => (1, 1),
                    _ => (2 * s, s),
                }
            }
            Instruction::Constant(constant) => match constant {
                ConstantInstruction::Intrinsic(op) => (0, size(op.primary_type())),
                ConstantInstruction::Argument { .. } => (0, 1),
                ConstantInstruction::Load { value, .. } => (0, size(value.type_kind())),
            },
            Instruction::Stack(op) => match op {
                Opcode::Pop => (1, 0),
                Opcode::Pop2 => (2, 0),
                Opcode::Dup => (1, 2),
                Opcode::DupX1 => (2, 3),
                Opcode::DupX2 => (3, 4),
                Opcode::Dup2 => (2, 4),
                Opcode::Dup2X1 => (3, 5),
                Opcode::Dup2X2 => (4, 6),
                _ => (2, 2),
            },
        })
    }

    /// The highest local slot touched, plus one.
    pub fn locals_extent(&self) -> Option<u16> {
        match self {
            Instruction::Load { op, slot } | Instruction::Store { op, slot } => {
                Some(slot + op.primary_type().slot_size())
            }
            Instruction::Increment { slot, .. } | Instruction::Ret { slot, .. } => Some(slot + 1),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        write!(f, "{}", op)?;
        match self {
            Instruction::Load { slot, .. } | Instruction::Store { slot, .. } | Instruction::Ret { slot, .. } => {
                if op.implicit_slot().is_none() {
                    write!(f, " {}", slot)?;
                }
                Ok(())
            }
            Instruction::Increment { slot, value } => write!(f, " {} {}", slot, value),
            Instruction::Branch { target, .. } | Instruction::Jsr { target, .. } => write!(f, " {}", target),
            Instruction::LookupSwitch { default, cases } | Instruction::TableSwitch { default, cases, .. } => {
                write!(f, " {{")?;
                for case in cases {
                    write!(f, " {}: {},", case.value, case.target)?;
                }
                write!(f, " default: {} }}", default)
            }
            Instruction::Field { field, .. } | Instruction::Invoke { method: field, .. } => write!(f, " {}", field),
            Instruction::InvokeDynamic(call_site) => write!(f, " {}:{}", call_site.name, call_site.descriptor),
            Instruction::NewObject(class)
            | Instruction::NewReferenceArray(class)
            | Instruction::TypeCheck { class, .. } => write!(f, " {}", class),
            Instruction::NewPrimitiveArray(kind) => write!(f, " {}", kind.name()),
            Instruction::NewMultiArray { class, dimensions } => write!(f, " {} {}", class, dimensions),
            Instruction::Constant(ConstantInstruction::Argument { value, .. }) => write!(f, " {}", value),
            Instruction::Constant(ConstantInstruction::Load { value, .. }) => write!(f, " {}", value),
            _ => Ok(()),
        }
    }
}

/// An exception table entry. A `catch_type` of `None` catches everything.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExceptionCatch {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<Symbol>,
}

/// A `LocalVariableTable` or `LocalVariableTypeTable` entry. `descriptor`
/// holds a generic signature for the latter.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LocalVariableInfo {
    pub slot: u16,
    pub name: Symbol,
    pub descriptor: Symbol,
    pub start: Label,
    pub end: Label,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CharacterRangeInfo {
    pub start: Label,
    pub end: Label,
    pub range_start: u32,
    pub range_end: u32,
    pub flags: u16,
}

/// One element of a code body: an instruction, a label binding, or a pseudo
/// element that describes positions without occupying bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum CodeElement {
    Instruction(Instruction),
    Label(Label),
    LineNumber(u16),
    LocalVariable(LocalVariableInfo),
    LocalVariableType(LocalVariableInfo),
    ExceptionCatch(ExceptionCatch),
    CharacterRange(CharacterRangeInfo),
    Attribute(Attribute),
}

impl CodeElement {
    /// Labels this element refers to without binding them.
    pub fn referenced_labels(&self) -> Vec<Label> {
        match self {
            CodeElement::Instruction(instruction) => instruction.targets(),
            CodeElement::LocalVariable(var) | CodeElement::LocalVariableType(var) => vec![var.start, var.end],
            CodeElement::ExceptionCatch(catch) => vec![catch.start, catch.end, catch.handler],
            CodeElement::CharacterRange(range) => vec![range.start, range.end],
            _ => vec![],
        }
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(
            self,
            CodeElement::LineNumber(_)
                | CodeElement::LocalVariable(_)
                | CodeElement::LocalVariableType(_)
                | CodeElement::ExceptionCatch(_)
                | CodeElement::CharacterRange(_)
        )
    }
}

impl From<Instruction> for CodeElement {
    fn from(instruction: Instruction) -> Self {
        CodeElement::Instruction(instruction)
    }
}

/// Decodes a bytecode array into instructions paired with their offsets.
/// Branch targets become labels in `context` whose id is the target offset.
pub(crate) fn decode(reader: &ClassReader, code: &[u8], context: u32) -> ClassResult<Vec<(u32, Instruction)>> {
    let mut input = ByteParser::new(code);
    let mut out = vec![];

    while input.remaining() > 0 {
        let pc = input.offset;
        let byte = input.parse_u8()?;
        let op = if byte == WIDE {
            let modified = input.parse_u8()?;
            Opcode::wide_from_byte(modified).ok_or(ClassError::UnknownOpcode {
                offset: pc,
                opcode: modified,
            })?
        } else {
            Opcode::from_byte(byte).ok_or(ClassError::UnknownOpcode { offset: pc, opcode: byte })?
        };

        let label = |offset: i64| -> ClassResult<Label> {
            let target = pc as i64 + offset;
            if target < 0 || target >= code.len() as i64 {
                return Err(ClassError::BadBranchTarget { offset: pc, target });
            }
            Ok(Label::new(context, target as u32))
        };

        let instruction = match op.kind() {
            OpcodeKind::Load | OpcodeKind::Store | OpcodeKind::DiscontinuedRet => {
                let slot = match op.implicit_slot() {
                    Some(slot) => slot,
                    None if op.is_wide() => input.parse_u16()?,
                    None => input.parse_u8()? as u16,
                };
                match op.kind() {
                    OpcodeKind::Load => Instruction::Load { op, slot },
                    OpcodeKind::Store => Instruction::Store { op, slot },
                    _ => Instruction::Ret { op, slot },
                }
            }
            OpcodeKind::Increment => {
                if op.is_wide() {
                    Instruction::Increment {
                        slot: input.parse_u16()?,
                        value: input.parse_i16()?,
                    }
                } else {
                    Instruction::Increment {
                        slot: input.parse_u8()? as u16,
                        value: input.parse_i8()? as i16,
                    }
                }
            }
            OpcodeKind::Branch | OpcodeKind::DiscontinuedJsr => {
                let offset = if matches!(op, Opcode::GotoW | Opcode::JsrW) {
                    input.parse_i32()? as i64
                } else {
                    input.parse_i16()? as i64
                };
                let target = label(offset)?;
                if op.kind() == OpcodeKind::Branch {
                    Instruction::Branch { op, target }
                } else {
                    Instruction::Jsr { op, target }
                }
            }
            OpcodeKind::TableSwitch | OpcodeKind::LookupSwitch => {
                input.skip((4 - (pc + 1) % 4) % 4)?;
                let default = label(input.parse_i32()? as i64)?;
                if op == Opcode::Tableswitch {
                    let low = input.parse_i32()?;
                    let high = input.parse_i32()?;
                    if high < low {
                        return Err(ClassError::BadBranchTarget {
                            offset: pc,
                            target: high as i64,
                        });
                    }
                    let count = (high as i64 - low as i64 + 1) as usize;
                    let mut cases = Vec::with_capacity(count.min(input.remaining() / 4));
                    for i in 0..count {
                        let target = label(input.parse_i32()? as i64)?;
                        cases.push(SwitchCase {
                            value: (low as i64 + i as i64) as i32,
                            target,
                        });
                    }
                    Instruction::TableSwitch { low, high, default, cases }
                } else {
                    let count = input.parse_i32()?;
                    if count < 0 {
                        return Err(ClassError::BadBranchTarget {
                            offset: pc,
                            target: count as i64,
                        });
                    }
                    let mut cases = Vec::with_capacity((count as usize).min(input.remaining() / 8));
                    for _ in 0..count {
                        let value = input.parse_i32()?;
                        let target = label(input.parse_i32()? as i64)?;
                        cases.push(SwitchCase { value, target });
                    }
                    Instruction::LookupSwitch { default, cases }
                }
            }
            OpcodeKind::Return => Instruction::Return(op),
            OpcodeKind::Throw => Instruction::Throw,
            OpcodeKind::FieldAccess => {
                let index = input.parse_u16()?;
                match reader.pool().member_ref(index)? {
                    (MemberKind::Field, field) => Instruction::Field { op, field },
                    _ => {
                        return Err(ClassError::WrongPoolTag {
                            index,
                            expected: "Fieldref",
                            found: reader.pool().entry(index)?.describe(),
                        })
                    }
                }
            }
            OpcodeKind::Invoke => {
                let index = input.parse_u16()?;
                let (kind, method) = reader.pool().member_ref(index)?;
                if kind == MemberKind::Field {
                    return Err(ClassError::WrongPoolTag {
                        index,
                        expected: "Methodref",
                        found: "Fieldref",
                    });
                }
                if op == Opcode::Invokeinterface {
                    input.skip(2)?;
                }
                Instruction::Invoke {
                    op,
                    method,
                    interface: kind == MemberKind::InterfaceMethod,
                }
            }
            OpcodeKind::InvokeDynamic => {
                let index = input.parse_u16()?;
                input.skip(2)?;
                Instruction::InvokeDynamic(reader.invoke_dynamic(index)?)
            }
            OpcodeKind::NewObject => Instruction::NewObject(reader.pool().class_name(input.parse_u16()?)?.clone()),
            OpcodeKind::NewPrimitiveArray => {
                let code = input.parse_u8()?;
                let kind = TypeKind::from_array_type_code(code).ok_or(ClassError::MalformedAttribute {
                    name: "Code".into(),
                    offset: pc,
                    reason: format!("bad newarray type code {}", code),
                })?;
                Instruction::NewPrimitiveArray(kind)
            }
            OpcodeKind::NewReferenceArray => {
                Instruction::NewReferenceArray(reader.pool().class_name(input.parse_u16()?)?.clone())
            }
            OpcodeKind::NewMultiArray => Instruction::NewMultiArray {
                class: reader.pool().class_name(input.parse_u16()?)?.clone(),
                dimensions: input.parse_u8()?,
            },
            OpcodeKind::ArrayLoad => Instruction::ArrayLoad(op),
            OpcodeKind::ArrayStore => Instruction::ArrayStore(op),
            OpcodeKind::TypeCheck => Instruction::TypeCheck {
                op,
                class: reader.pool().class_name(input.parse_u16()?)?.clone(),
            },
            OpcodeKind::Convert => Instruction::Convert(op),
            OpcodeKind::Operator => Instruction::Operator(op),
            OpcodeKind::Constant => Instruction::Constant(match op {
                Opcode::Bipush => ConstantInstruction::Argument {
                    op,
                    value: input.parse_i8()? as i32,
                },
                Opcode::Sipush => ConstantInstruction::Argument {
                    op,
                    value: input.parse_i16()? as i32,
                },
                Opcode::Ldc => ConstantInstruction::Load {
                    op,
                    value: reader.loadable(input.parse_u8()? as u16)?,
                },
                Opcode::LdcW | Opcode::Ldc2W => ConstantInstruction::Load {
                    op,
                    value: reader.loadable(input.parse_u16()?)?,
                },
                _ => ConstantInstruction::Intrinsic(op),
            }),
            OpcodeKind::Stack => Instruction::Stack(op),
            OpcodeKind::Monitor => Instruction::Monitor(op),
            OpcodeKind::Nop => Instruction::Nop,
        };

        out.push((pc as u32, instruction));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: u32) -> Label {
        Label::new(0, id)
    }

    #[test]
    fn stack_effects() {
        let invoke = Instruction::Invoke {
            op: Opcode::Invokevirtual,
            method: MemberRef::new("java/io/PrintStream", "println", "(J)V"),
            interface: false,
        };
        assert_eq!(invoke.stack_effect().unwrap(), (3, 0));

        let get = Instruction::Field {
            op: Opcode::Getstatic,
            field: MemberRef::new("java/lang/System", "out", "Ljava/io/PrintStream;"),
        };
        assert_eq!(get.stack_effect().unwrap(), (0, 1));
        assert_eq!(Instruction::Operator(Opcode::Lshl).stack_effect().unwrap(), (3, 2));
        assert_eq!(Instruction::Convert(Opcode::I2d).stack_effect().unwrap(), (1, 2));
        assert_eq!(Instruction::Stack(Opcode::Dup2X1).stack_effect().unwrap(), (3, 5));
    }

    #[test]
    fn validation_catches_mismatched_opcodes() {
        assert!(Instruction::Branch { op: Opcode::Iadd, target: label(0) }.validate().is_err());
        assert!(Instruction::Load { op: Opcode::Aload1, slot: 2 }.validate().is_err());
        assert!(Instruction::Load { op: Opcode::Aload1, slot: 1 }.validate().is_ok());
        let push = |value| Instruction::Constant(ConstantInstruction::Argument { op: Opcode::Bipush, value });
        assert!(push(127).validate().is_ok());
        assert!(push(128).validate().is_err());
        let ldc = Instruction::Constant(ConstantInstruction::Load {
            op: Opcode::Ldc,
            value: LoadableConstant::Long(1),
        });
        assert!(ldc.validate().is_err());
    }

    #[test]
    fn increment_picks_wide_form() {
        assert_eq!(Instruction::Increment { slot: 1, value: 1 }.opcode(), Opcode::Iinc);
        assert_eq!(Instruction::Increment { slot: 1, value: 200 }.opcode(), Opcode::IincW);
        assert_eq!(Instruction::Increment { slot: 256, value: 1 }.opcode(), Opcode::IincW);
    }

    #[test]
    fn switch_targets_include_default() {
        let switch = Instruction::LookupSwitch {
            default: label(9),
            cases: vec![SwitchCase { value: 3, target: label(4) }],
        };
        assert_eq!(switch.targets(), vec![label(9), label(4)]);
        assert!(switch.is_unconditional());
    }
}
