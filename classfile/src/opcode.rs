//! The instruction set: every opcode with its encoded size, kind, operand
//! types and implicit operand. Wide forms are distinct opcodes whose code is
//! `0xc4` followed by the modified opcode, e.g. `0xc415` for `wide iload`.

use crate::descriptor::TypeKind;
use lazy_static::lazy_static;
use std::{collections::HashMap, fmt};

pub const WIDE: u8 = 0xc4;

/// Groups opcodes by the shape of their operands and their effect on control
/// flow.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OpcodeKind {
    Load,
    Store,
    Increment,
    Branch,
    LookupSwitch,
    TableSwitch,
    Return,
    Throw,
    FieldAccess,
    Invoke,
    InvokeDynamic,
    NewObject,
    NewPrimitiveArray,
    NewReferenceArray,
    NewMultiArray,
    ArrayLoad,
    ArrayStore,
    TypeCheck,
    Convert,
    Operator,
    Constant,
    Stack,
    Monitor,
    Nop,
    DiscontinuedJsr,
    DiscontinuedRet,
}

macro_rules! opcodes {
    ($($code:expr => $name:ident, $mnemonic:expr, $size:expr, $kind:ident, $primary:ident, $secondary:ident, $implicit:expr;)*) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// The encoded opcode; wide forms include the `wide` prefix in
            /// the high byte.
            pub fn code(self) -> u16 {
                match self {
                    $(Opcode::$name => $code,)*
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Encoded size in bytes, or `None` for the switches, whose size
            /// depends on alignment and case count.
            pub fn size(self) -> Option<usize> {
                let size: usize = match self {
                    $(Opcode::$name => $size,)*
                };
                if size == 0 { None } else { Some(size) }
            }

            pub fn kind(self) -> OpcodeKind {
                match self {
                    $(Opcode::$name => OpcodeKind::$kind,)*
                }
            }

            /// The operand type this opcode works on, `Void` when it has none.
            pub fn primary_type(self) -> TypeKind {
                match self {
                    $(Opcode::$name => TypeKind::$primary,)*
                }
            }

            /// The result type of a conversion, `Void` otherwise.
            pub fn secondary_type(self) -> TypeKind {
                match self {
                    $(Opcode::$name => TypeKind::$secondary,)*
                }
            }

            fn implicit(self) -> i32 {
                match self {
                    $(Opcode::$name => $implicit,)*
                }
            }
        }
    };
}

opcodes! {
    0x00 => Nop, "nop", 1, Nop, Void, Void, -1;
    0x01 => AconstNull, "aconst_null", 1, Constant, Reference, Void, -1;
    0x02 => IconstM1, "iconst_m1", 1, Constant, Int, Void, -1;
    0x03 => Iconst0, "iconst_0", 1, Constant, Int, Void, 0;
    0x04 => Iconst1, "iconst_1", 1, Constant, Int, Void, 1;
    0x05 => Iconst2, "iconst_2", 1, Constant, Int, Void, 2;
    0x06 => Iconst3, "iconst_3", 1, Constant, Int, Void, 3;
    0x07 => Iconst4, "iconst_4", 1, Constant, Int, Void, 4;
    0x08 => Iconst5, "iconst_5", 1, Constant, Int, Void, 5;
    0x09 => Lconst0, "lconst_0", 1, Constant, Long, Void, 0;
    0x0a => Lconst1, "lconst_1", 1, Constant, Long, Void, 1;
    0x0b => Fconst0, "fconst_0", 1, Constant, Float, Void, 0;
    0x0c => Fconst1, "fconst_1", 1, Constant, Float, Void, 1;
    0x0d => Fconst2, "fconst_2", 1, Constant, Float, Void, 2;
    0x0e => Dconst0, "dconst_0", 1, Constant, Double, Void, 0;
    0x0f => Dconst1, "dconst_1", 1, Constant, Double, Void, 1;
    0x10 => Bipush, "bipush", 2, Constant, Int, Void, -1;
    0x11 => Sipush, "sipush", 3, Constant, Int, Void, -1;
    0x12 => Ldc, "ldc", 2, Constant, Void, Void, -1;
    0x13 => LdcW, "ldc_w", 3, Constant, Void, Void, -1;
    0x14 => Ldc2W, "ldc2_w", 3, Constant, Void, Void, -1;
    0x15 => Iload, "iload", 2, Load, Int, Void, -1;
    0x16 => Lload, "lload", 2, Load, Long, Void, -1;
    0x17 => Fload, "fload", 2, Load, Float, Void, -1;
    0x18 => Dload, "dload", 2, Load, Double, Void, -1;
    0x19 => Aload, "aload", 2, Load, Reference, Void, -1;
    0x1a => Iload0, "iload_0", 1, Load, Int, Void, 0;
    0x1b => Iload1, "iload_1", 1, Load, Int, Void, 1;
    0x1c => Iload2, "iload_2", 1, Load, Int, Void, 2;
    0x1d => Iload3, "iload_3", 1, Load, Int, Void, 3;
    0x1e => Lload0, "lload_0", 1, Load, Long, Void, 0;
    0x1f => Lload1, "lload_1", 1, Load, Long, Void, 1;
    0x20 => Lload2, "lload_2", 1, Load, Long, Void, 2;
    0x21 => Lload3, "lload_3", 1, Load, Long, Void, 3;
    0x22 => Fload0, "fload_0", 1, Load, Float, Void, 0;
    0x23 => Fload1, "fload_1", 1, Load, Float, Void, 1;
    0x24 => Fload2, "fload_2", 1, Load, Float, Void, 2;
    0x25 => Fload3, "fload_3", 1, Load, Float, Void, 3;
    0x26 => Dload0, "dload_0", 1, Load, Double, Void, 0;
    0x27 => Dload1, "dload_1", 1, Load, Double, Void, 1;
    0x28 => Dload2, "dload_2", 1, Load, Double, Void, 2;
    0x29 => Dload3, "dload_3", 1, Load, Double, Void, 3;
    0x2a => Aload0, "aload_0", 1, Load, Reference, Void, 0;
    0x2b => Aload1, "aload_1", 1, Load, Reference, Void, 1;
    0x2c => Aload2, "aload_2", 1, Load, Reference, Void, 2;
    0x2d => Aload3, "aload_3", 1, Load, Reference, Void, 3;
    0x2e => Iaload, "iaload", 1, ArrayLoad, Int, Void, -1;
    0x2f => Laload, "laload", 1, ArrayLoad, Long, Void, -1;
    0x30 => Faload, "faload", 1, ArrayLoad, Float, Void, -1;
    0x31 => Daload, "daload", 1, ArrayLoad, Double, Void, -1;
    0x32 => Aaload, "aaload", 1, ArrayLoad, Reference, Void, -1;
    0x33 => Baload, "baload", 1, ArrayLoad, Byte, Void, -1;
    0x34 => Caload, "caload", 1, ArrayLoad, Char, Void, -1;
    0x35 => Saload, "saload", 1, ArrayLoad, Short, Void, -1;
    0x36 => Istore, "istore", 2, Store, Int, Void, -1;
    0x37 => Lstore, "lstore", 2, Store, Long, Void, -1;
    0x38 => Fstore, "fstore", 2, Store, Float, Void, -1;
    0x39 => Dstore, "dstore", 2, Store, Double, Void, -1;
    0x3a => Astore, "astore", 2, Store, Reference, Void, -1;
    0x3b => Istore0, "istore_0", 1, Store, Int, Void, 0;
    0x3c => Istore1, "istore_1", 1, Store, Int, Void, 1;
    0x3d => Istore2, "istore_2", 1, Store, Int, Void, 2;
    0x3e => Istore3, "istore_3", 1, Store, Int, Void, 3;
    0x3f => Lstore0, "lstore_0", 1, Store, Long, Void, 0;
    0x40 => Lstore1, "lstore_1", 1, Store, Long, Void, 1;
    0x41 => Lstore2, "lstore_2", 1, Store, Long, Void, 2;
    0x42 => Lstore3, "lstore_3", 1, Store, Long, Void, 3;
    0x43 => Fstore0, "fstore_0", 1, Store, Float, Void, 0;
    0x44 => Fstore1, "fstore_1", 1, Store, Float, Void, 1;
    0x45 => Fstore2, "fstore_2", 1, Store, Float, Void, 2;
    0x46 => Fstore3, "fstore_3", 1, Store, Float, Void, 3;
    0x47 => Dstore0, "dstore_0", 1, Store, Double, Void, 0;
    0x48 => Dstore1, "dstore_1", 1, Store, Double, Void, 1;
    0x49 => Dstore2, "dstore_2", 1, Store, Double, Void, 2;
    0x4a => Dstore3, "dstore_3", 1, Store, Double, Void, 3;
    0x4b => Astore0, "astore_0", 1, Store, Reference, Void, 0;
    0x4c => Astore1, "astore_1", 1, Store, Reference, Void, 1;
    0x4d => Astore2, "astore_2", 1, Store, Reference, Void, 2;
    0x4e => Astore3, "astore_3", 1, Store, Reference, Void, 3;
    0x4f => Iastore, "iastore", 1, ArrayStore, Int, Void, -1;
    0x50 => Lastore, "lastore", 1, ArrayStore, Long, Void, -1;
    0x51 => Fastore, "fastore", 1, ArrayStore, Float, Void, -1;
    0x52 => Dastore, "dastore", 1, ArrayStore, Double, Void, -1;
    0x53 => Aastore, "aastore", 1, ArrayStore, Reference, Void, -1;
    0x54 => Bastore, "bastore", 1, ArrayStore, Byte, Void, -1;
    0x55 => Castore, "castore", 1, ArrayStore, Char, Void, -1;
    0x56 => Sastore, "sastore", 1, ArrayStore, Short, Void, -1;
    0x57 => Pop, "pop", 1, Stack, Void, Void, -1;
    0x58 => Pop2, "pop2", 1, Stack, Void, Void, -1;
    0x59 => Dup, "dup", 1, Stack, Void, Void, -1;
    0x5a => DupX1, "dup_x1", 1, Stack, Void, Void, -1;
    0x5b => DupX2, "dup_x2", 1, Stack, Void, Void, -1;
    0x5c => Dup2, "dup2", 1, Stack, Void, Void, -1;
    0x5d => Dup2X1, "dup2_x1", 1, Stack, Void, Void, -1;
    0x5e => Dup2X2, "dup2_x2", 1, Stack, Void, Void, -1;
    0x5f => Swap, "swap", 1, Stack, Void, Void, -1;
    0x60 => Iadd, "iadd", 1, Operator, Int, Void, -1;
    0x61 => Ladd, "ladd", 1, Operator, Long, Void, -1;
    0x62 => Fadd, "fadd", 1, Operator, Float, Void, -1;
    0x63 => Dadd, "dadd", 1, Operator, Double, Void, -1;
    0x64 => Isub, "isub", 1, Operator, Int, Void, -1;
    0x65 => Lsub, "lsub", 1, Operator, Long, Void, -1;
    0x66 => Fsub, "fsub", 1, Operator, Float, Void, -1;
    0x67 => Dsub, "dsub", 1, Operator, Double, Void, -1;
    0x68 => Imul, "imul", 1, Operator, Int, Void, -1;
    0x69 => Lmul, "lmul", 1, Operator, Long, Void, -1;
    0x6a => Fmul, "fmul", 1, Operator, Float, Void, -1;
    0x6b => Dmul, "dmul", 1, Operator, Double, Void, -1;
    0x6c => Idiv, "idiv", 1, Operator, Int, Void, -1;
    0x6d => Ldiv, "ldiv", 1, Operator, Long, Void, -1;
    0x6e => Fdiv, "fdiv", 1, Operator, Float, Void, -1;
    0x6f => Ddiv, "ddiv", 1, Operator, Double, Void, -1;
    0x70 => Irem, "irem", 1, Operator, Int, Void, -1;
    0x71 => Lrem, "lrem", 1, Operator, Long, Void, -1;
    0x72 => Frem, "frem", 1, Operator, Float, Void, -1;
    0x73 => Drem, "drem", 1, Operator, Double, Void, -1;
    0x74 => Ineg, "ineg", 1, Operator, Int, Void, -1;
    0x75 => Lneg, "lneg", 1, Operator, Long, Void, -1;
    0x76 => Fneg, "fneg", 1, Operator, Float, Void, -1;
    0x77 => Dneg, "dneg", 1, Operator, Double, Void, -1;
    0x78 => Ishl, "ishl", 1, Operator, Int, Void, -1;
    0x79 => Lshl, "lshl", 1, Operator, Long, Void, -1;
    0x7a => Ishr, "ishr", 1, Operator, Int, Void, -1;
    0x7b => Lshr, "lshr", 1, Operator, Long, Void, -1;
    0x7c => Iushr, "iushr", 1, Operator, Int, Void, -1;
    0x7d => Lushr, "lushr", 1, Operator, Long, Void, -1;
    0x7e => Iand, "iand", 1, Operator, Int, Void, -1;
    0x7f => Land, "land", 1, Operator, Long, Void, -1;
    0x80 => Ior, "ior", 1, Operator, Int, Void, -1;
    0x81 => Lor, "lor", 1, Operator, Long, Void, -1;
    0x82 => Ixor, "ixor", 1, Operator, Int, Void, -1;
    0x83 => Lxor, "lxor", 1, Operator, Long, Void, -1;
    0x84 => Iinc, "iinc", 3, Increment, Int, Void, -1;
    0x85 => I2l, "i2l", 1, Convert, Int, Long, -1;
    0x86 => I2f, "i2f", 1, Convert, Int, Float, -1;
    0x87 => I2d, "i2d", 1, Convert, Int, Double, -1;
    0x88 => L2i, "l2i", 1, Convert, Long, Int, -1;
    0x89 => L2f, "l2f", 1, Convert, Long, Float, -1;
    0x8a => L2d, "l2d", 1, Convert, Long, Double, -1;
    0x8b => F2i, "f2i", 1, Convert, Float, Int, -1;
    0x8c => F2l, "f2l", 1, Convert, Float, Long, -1;
    0x8d => F2d, "f2d", 1, Convert, Float, Double, -1;
    0x8e => D2i, "d2i", 1, Convert, Double, Int, -1;
    0x8f => D2l, "d2l", 1, Convert, Double, Long, -1;
    0x90 => D2f, "d2f", 1, Convert, Double, Float, -1;
    0x91 => I2b, "i2b", 1, Convert, Int, Byte, -1;
    0x92 => I2c, "i2c", 1, Convert, Int, Char, -1;
    0x93 => I2s, "i2s", 1, Convert, Int, Short, -1;
    0x94 => Lcmp, "lcmp", 1, Operator, Long, Void, -1;
    0x95 => Fcmpl, "fcmpl", 1, Operator, Float, Void, -1;
    0x96 => Fcmpg, "fcmpg", 1, Operator, Float, Void, -1;
    0x97 => Dcmpl, "dcmpl", 1, Operator, Double, Void, -1;
    0x98 => Dcmpg, "dcmpg", 1, Operator, Double, Void, -1;
    0x99 => Ifeq, "ifeq", 3, Branch, Int, Void, -1;
    0x9a => Ifne, "ifne", 3, Branch, Int, Void, -1;
    0x9b => Iflt, "iflt", 3, Branch, Int, Void, -1;
    0x9c => Ifge, "ifge", 3, Branch, Int, Void, -1;
    0x9d => Ifgt, "ifgt", 3, Branch, Int, Void, -1;
    0x9e => Ifle, "ifle", 3, Branch, Int, Void, -1;
    0x9f => IfIcmpeq, "if_icmpeq", 3, Branch, Int, Void, -1;
    0xa0 => IfIcmpne, "if_icmpne", 3, Branch, Int, Void, -1;
    0xa1 => IfIcmplt, "if_icmplt", 3, Branch, Int, Void, -1;
    0xa2 => IfIcmpge, "if_icmpge", 3, Branch, Int, Void, -1;
    0xa3 => IfIcmpgt, "if_icmpgt", 3, Branch, Int, Void, -1;
    0xa4 => IfIcmple, "if_icmple", 3, Branch, Int, Void, -1;
    0xa5 => IfAcmpeq, "if_acmpeq", 3, Branch, Reference, Void, -1;
    0xa6 => IfAcmpne, "if_acmpne", 3, Branch, Reference, Void, -1;
    0xa7 => Goto, "goto", 3, Branch, Void, Void, -1;
    0xa8 => Jsr, "jsr", 3, DiscontinuedJsr, Void, Void, -1;
    0xa9 => Ret, "ret", 2, DiscontinuedRet, Void, Void, -1;
    0xaa => Tableswitch, "tableswitch", 0, TableSwitch, Int, Void, -1;
    0xab => Lookupswitch, "lookupswitch", 0, LookupSwitch, Int, Void, -1;
    0xac => Ireturn, "ireturn", 1, Return, Int, Void, -1;
    0xad => Lreturn, "lreturn", 1, Return, Long, Void, -1;
    0xae => Freturn, "freturn", 1, Return, Float, Void, -1;
    0xaf => Dreturn, "dreturn", 1, Return, Double, Void, -1;
    0xb0 => Areturn, "areturn", 1, Return, Reference, Void, -1;
    0xb1 => Return, "return", 1, Return, Void, Void, -1;
    0xb2 => Getstatic, "getstatic", 3, FieldAccess, Void, Void, -1;
    0xb3 => Putstatic, "putstatic", 3, FieldAccess, Void, Void, -1;
    0xb4 => Getfield, "getfield", 3, FieldAccess, Void, Void, -1;
    0xb5 => Putfield, "putfield", 3, FieldAccess, Void, Void, -1;
    0xb6 => Invokevirtual, "invokevirtual", 3, Invoke, Void, Void, -1;
    0xb7 => Invokespecial, "invokespecial", 3, Invoke, Void, Void, -1;
    0xb8 => Invokestatic, "invokestatic", 3, Invoke, Void, Void, -1;
    0xb9 => Invokeinterface, "invokeinterface", 5, Invoke, Void, Void, -1;
    0xba => Invokedynamic, "invokedynamic", 5, InvokeDynamic, Void, Void, -1;
    0xbb => New, "new", 3, NewObject, Reference, Void, -1;
    0xbc => Newarray, "newarray", 2, NewPrimitiveArray, Reference, Void, -1;
    0xbd => Anewarray, "anewarray", 3, NewReferenceArray, Reference, Void, -1;
    0xbe => Arraylength, "arraylength", 1, Operator, Int, Void, -1;
    0xbf => Athrow, "athrow", 1, Throw, Reference, Void, -1;
    0xc0 => Checkcast, "checkcast", 3, TypeCheck, Reference, Void, -1;
    0xc1 => Instanceof, "instanceof", 3, TypeCheck, Reference, Void, -1;
    0xc2 => Monitorenter, "monitorenter", 1, Monitor, Reference, Void, -1;
    0xc3 => Monitorexit, "monitorexit", 1, Monitor, Reference, Void, -1;
    0xc5 => Multianewarray, "multianewarray", 4, NewMultiArray, Reference, Void, -1;
    0xc6 => Ifnull, "ifnull", 3, Branch, Reference, Void, -1;
    0xc7 => Ifnonnull, "ifnonnull", 3, Branch, Reference, Void, -1;
    0xc8 => GotoW, "goto_w", 5, Branch, Void, Void, -1;
    0xc9 => JsrW, "jsr_w", 5, DiscontinuedJsr, Void, Void, -1;
    0xc415 => IloadW, "wide iload", 4, Load, Int, Void, -1;
    0xc416 => LloadW, "wide lload", 4, Load, Long, Void, -1;
    0xc417 => FloadW, "wide fload", 4, Load, Float, Void, -1;
    0xc418 => DloadW, "wide dload", 4, Load, Double, Void, -1;
    0xc419 => AloadW, "wide aload", 4, Load, Reference, Void, -1;
    0xc436 => IstoreW, "wide istore", 4, Store, Int, Void, -1;
    0xc437 => LstoreW, "wide lstore", 4, Store, Long, Void, -1;
    0xc438 => FstoreW, "wide fstore", 4, Store, Float, Void, -1;
    0xc439 => DstoreW, "wide dstore", 4, Store, Double, Void, -1;
    0xc43a => AstoreW, "wide astore", 4, Store, Reference, Void, -1;
    0xc484 => IincW, "wide iinc", 6, Increment, Int, Void, -1;
    0xc4a9 => RetW, "wide ret", 4, DiscontinuedRet, Void, Void, -1;

}

lazy_static! {
    static ref BY_CODE: HashMap<u16, Opcode> = Opcode::ALL.iter().map(|&op| (op.code(), op)).collect();
}

impl Opcode {
    /// Looks up a single-byte opcode.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        BY_CODE.get(&(byte as u16)).cloned()
    }

    /// Looks up the wide form of `byte`, the opcode following a `wide` prefix.
    pub fn wide_from_byte(byte: u8) -> Option<Opcode> {
        BY_CODE.get(&(((WIDE as u16) << 8) | byte as u16)).cloned()
    }

    pub fn is_wide(self) -> bool {
        self.code() > 0xff
    }

    /// The local slot encoded in the opcode itself, as in `aload_0`.
    pub fn implicit_slot(self) -> Option<u16> {
        match self.kind() {
            OpcodeKind::Load | OpcodeKind::Store if self.implicit() >= 0 => Some(self.implicit() as u16),
            _ => None,
        }
    }

    /// The value pushed by an operand-free constant opcode such as
    /// `iconst_m1`.
    pub fn implicit_value(self) -> Option<i32> {
        match self.kind() {
            OpcodeKind::Constant if self.implicit() >= -1 && self.size() == Some(1) => {
                match self {
                    Opcode::AconstNull => None,
                    _ => Some(self.implicit()),
                }
            }
            _ => None,
        }
    }

    pub fn is_conditional_branch(self) -> bool {
        self.kind() == OpcodeKind::Branch && self.primary_type() != TypeKind::Void
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_unconditional(self) -> bool {
        match self.kind() {
            OpcodeKind::Branch => !self.is_conditional_branch(),
            OpcodeKind::Return
            | OpcodeKind::Throw
            | OpcodeKind::TableSwitch
            | OpcodeKind::LookupSwitch
            | OpcodeKind::DiscontinuedRet => true,
            _ => false,
        }
    }

    /// The conditional branch taken exactly when this one is not.
    pub fn reversed_branch(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self {
            Ifeq => Ifne,
            Ifne => Ifeq,
            Iflt => Ifge,
            Ifge => Iflt,
            Ifgt => Ifle,
            Ifle => Ifgt,
            IfIcmpeq => IfIcmpne,
            IfIcmpne => IfIcmpeq,
            IfIcmplt => IfIcmpge,
            IfIcmpge => IfIcmplt,
            IfIcmpgt => IfIcmple,
            IfIcmple => IfIcmpgt,
            IfAcmpeq => IfAcmpne,
            IfAcmpne => IfAcmpeq,
            Ifnull => Ifnonnull,
            Ifnonnull => Ifnull,
            _ => return None,
        })
    }

    /// The general form of an implicit-slot or wide load/store, e.g.
    /// `iload` for `iload_2` or `wide iload`.
    pub fn general_form(self) -> Opcode {
        match (self.kind(), self.primary_type()) {
            (OpcodeKind::Load, ty) => Opcode::load(ty),
            (OpcodeKind::Store, ty) => Opcode::store(ty),
            (OpcodeKind::Increment, _) => Opcode::Iinc,
            (OpcodeKind::DiscontinuedRet, _) => Opcode::Ret,
            _ => self,
        }
    }

    /// The wide counterpart of a general load, store, `iinc` or `ret`.
    pub fn wide_form(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self.general_form() {
            Iload => IloadW,
            Lload => LloadW,
            Fload => FloadW,
            Dload => DloadW,
            Aload => AloadW,
            Istore => IstoreW,
            Lstore => LstoreW,
            Fstore => FstoreW,
            Dstore => DstoreW,
            Astore => AstoreW,
            Iinc => IincW,
            Ret => RetW,
            _ => return None,
        })
    }

    pub fn load(kind: TypeKind) -> Opcode {
        match kind.as_computational() {
            TypeKind::Long => Opcode::Lload,
            TypeKind::Float => Opcode::Fload,
            TypeKind::Double => Opcode::Dload,
            TypeKind::Reference => Opcode::Aload,
            _ => Opcode::Iload,
        }
    }

    pub fn store(kind: TypeKind) -> Opcode {
        match kind.as_computational() {
            TypeKind::Long => Opcode::Lstore,
            TypeKind::Float => Opcode::Fstore,
            TypeKind::Double => Opcode::Dstore,
            TypeKind::Reference => Opcode::Astore,
            _ => Opcode::Istore,
        }
    }

    /// The shortest load for `slot`: an implicit-slot form when one exists.
    pub fn load_for_slot(kind: TypeKind, slot: u16) -> Opcode {
        Opcode::narrowest(Opcode::load(kind), slot)
    }

    pub fn store_for_slot(kind: TypeKind, slot: u16) -> Opcode {
        Opcode::narrowest(Opcode::store(kind), slot)
    }

    fn narrowest(general: Opcode, slot: u16) -> Opcode {
        if slot < 4 {
            let implicit = Opcode::ALL.iter().find(|op| {
                op.kind() == general.kind()
                    && op.primary_type() == general.primary_type()
                    && op.implicit_slot() == Some(slot)
            });
            if let Some(&op) = implicit {
                return op;
            }
        }
        if slot > 0xff {
            return general.wide_form().unwrap_or(general);
        }
        general
    }

    pub fn return_for(kind: TypeKind) -> Opcode {
        match kind.as_computational() {
            TypeKind::Long => Opcode::Lreturn,
            TypeKind::Float => Opcode::Freturn,
            TypeKind::Double => Opcode::Dreturn,
            TypeKind::Reference => Opcode::Areturn,
            TypeKind::Void => Opcode::Return,
            _ => Opcode::Ireturn,
        }
    }

    pub fn array_load(kind: TypeKind) -> Opcode {
        match kind {
            TypeKind::Long => Opcode::Laload,
            TypeKind::Float => Opcode::Faload,
            TypeKind::Double => Opcode::Daload,
            TypeKind::Reference => Opcode::Aaload,
            TypeKind::Byte | TypeKind::Boolean => Opcode::Baload,
            TypeKind::Char => Opcode::Caload,
            TypeKind::Short => Opcode::Saload,
            _ => Opcode::Iaload,
        }
    }

    pub fn array_store(kind: TypeKind) -> Opcode {
        match kind {
            TypeKind::Long => Opcode::Lastore,
            TypeKind::Float => Opcode::Fastore,
            TypeKind::Double => Opcode::Dastore,
            TypeKind::Reference => Opcode::Aastore,
            TypeKind::Byte | TypeKind::Boolean => Opcode::Bastore,
            TypeKind::Char => Opcode::Castore,
            TypeKind::Short => Opcode::Sastore,
            _ => Opcode::Iastore,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_round_trip() {
        assert_eq!(BY_CODE.len(), Opcode::ALL.len());
        for &op in Opcode::ALL {
            let found = if op.is_wide() {
                Opcode::wide_from_byte(op.code() as u8)
            } else {
                Opcode::from_byte(op.code() as u8)
            };
            assert_eq!(found, Some(op), "{}", op);
        }
        assert_eq!(Opcode::from_byte(0xba), Some(Opcode::Invokedynamic));
        assert_eq!(Opcode::from_byte(WIDE), None);
        assert_eq!(Opcode::from_byte(0xca), None);
    }

    #[test]
    fn implicit_operands() {
        assert_eq!(Opcode::Aload0.implicit_slot(), Some(0));
        assert_eq!(Opcode::Dstore3.implicit_slot(), Some(3));
        assert_eq!(Opcode::Iload.implicit_slot(), None);
        assert_eq!(Opcode::IconstM1.implicit_value(), Some(-1));
        assert_eq!(Opcode::Fconst2.implicit_value(), Some(2));
        assert_eq!(Opcode::AconstNull.implicit_value(), None);
        assert_eq!(Opcode::Bipush.implicit_value(), None);
    }

    #[test]
    fn branch_reversal() {
        for &op in Opcode::ALL {
            if op.is_conditional_branch() {
                let reversed = op.reversed_branch().unwrap();
                assert_eq!(reversed.reversed_branch(), Some(op));
            }
        }
        assert!(Opcode::Goto.reversed_branch().is_none());
        assert!(Opcode::Goto.is_unconditional());
        assert!(!Opcode::Ifnull.is_unconditional());
    }

    #[test]
    fn load_selection() {
        assert_eq!(Opcode::load_for_slot(TypeKind::Reference, 0), Opcode::Aload0);
        assert_eq!(Opcode::load_for_slot(TypeKind::Boolean, 2), Opcode::Iload2);
        assert_eq!(Opcode::load_for_slot(TypeKind::Long, 9), Opcode::Lload);
        assert_eq!(Opcode::store_for_slot(TypeKind::Double, 300), Opcode::DstoreW);
        assert_eq!(Opcode::Istore1.general_form(), Opcode::Istore);
        assert_eq!(Opcode::Iinc.wide_form(), Some(Opcode::IincW));
    }
}
