mod common;

use classfile::{
    attribute::Attribute,
    constant::LoadableConstant,
    descriptor::TypeKind,
    instruction::ConstantInstruction,
    opcode::Opcode,
    ClassError, ClassFile, Instruction, Label,
};
use common::*;

#[test]
fn short_constants_use_sipush() {
    let cf = ClassFile::new();
    let bytes = cf
        .build("demo/Consts", |class| {
            class.with_method_body("get", "()I", PUBLIC_STATIC, |code| {
                code.load_constant(200)?;
                assert_eq!(code.stack_depth(), Some(1));
                code.ireturn()?;
                assert_eq!(code.stack_depth(), None);
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

    let code = code_of(&cf.parse(bytes).unwrap(), "get");
    assert_eq!(
        code.instructions().unwrap()[0].1,
        Instruction::Constant(ConstantInstruction::Argument { op: Opcode::Sipush, value: 200 })
    );
    assert_eq!(code.max_stack(), 1);
    assert_eq!(code.max_locals(), 0);
}

#[test]
fn long_constants_take_a_wide_pool_entry() {
    let cf = ClassFile::new();
    let bytes = cf
        .build("demo/Consts", |class| {
            class.with_method_body("big", "()J", PUBLIC_STATIC, |code| {
                code.load_constant(1_234_567_890_123i64)?.return_(TypeKind::Long)?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

    let code = code_of(&cf.parse(bytes).unwrap(), "big");
    assert_eq!(
        code.instructions().unwrap()[0].1,
        Instruction::Constant(ConstantInstruction::Load {
            op: Opcode::Ldc2W,
            value: LoadableConstant::Long(1_234_567_890_123),
        })
    );
    assert_eq!(code.max_stack(), 2);
}

#[test]
fn table_switch_targets_survive_parsing() {
    let cf = ClassFile::new();
    let bytes = cf
        .build("demo/Switch", |class| {
            class.with_method_body("pick", "(I)I", PUBLIC_STATIC, |code| {
                let zero = code.new_label();
                let one = code.new_label();
                let other = code.new_label();
                code.load_local(TypeKind::Int, 0)?.table_switch(0, 1, other, &[zero, one])?;
                code.bind(zero)?.load_constant(10)?.ireturn()?;
                code.bind(one)?.load_constant(20)?.ireturn()?;
                code.bind(other)?.load_constant(-1)?.ireturn()?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

    let code = code_of(&cf.parse(bytes).unwrap(), "pick");
    let instructions = code.instructions().unwrap();
    assert_eq!(instructions.len(), 8);

    let at = |index: usize| code.label_at(instructions[index].0);
    match &instructions[1].1 {
        Instruction::TableSwitch { low, high, default, cases } => {
            assert_eq!((*low, *high), (0, 1));
            assert_eq!(*default, at(6));
            let targets: Vec<(i32, Label)> = cases.iter().map(|case| (case.value, case.target)).collect();
            assert_eq!(targets, vec![(0, at(2)), (1, at(4))]);
        }
        other => panic!("expected a tableswitch, got {:?}", other),
    }

    let names: Vec<&str> = code.attributes().unwrap().iter().map(Attribute::name).collect();
    assert_eq!(names, vec!["StackMapTable"]);
}

#[test]
fn returning_then_branch_needs_no_jump() {
    let cf = ClassFile::new();
    let bytes = cf
        .build("demo/Max", |class| {
            class.with_method_body("max", "(II)I", PUBLIC_STATIC, |code| {
                code.load_local(TypeKind::Int, 0)?.load_local(TypeKind::Int, 1)?;
                code.if_then_else(
                    Opcode::IfIcmpge,
                    |then| {
                        then.load_local(TypeKind::Int, 0)?.ireturn()?;
                        Ok(())
                    },
                    |otherwise| {
                        otherwise.load_local(TypeKind::Int, 1)?.ireturn()?;
                        Ok(())
                    },
                )?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

    let code = code_of(&cf.parse(bytes).unwrap(), "max");
    assert_eq!(
        opcodes(&code),
        vec![
            Opcode::Iload0,
            Opcode::Iload1,
            Opcode::IfIcmplt,
            Opcode::Iload0,
            Opcode::Ireturn,
            Opcode::Iload1,
            Opcode::Ireturn,
        ]
    );
    assert_eq!(code.max_locals(), 2);
}

#[test]
fn labels_cannot_cross_methods() {
    let result = ClassFile::new().build("demo/Leak", |class| {
        let mut leaked = None;
        class.with_method_body("first", "()V", PUBLIC_STATIC, |code| {
            leaked = Some(code.new_bound_label()?);
            code.return_void()?;
            Ok(())
        })?;
        let leaked = leaked.ok_or_else(|| ClassError::IllegalArgument("no label".into()))?;
        class.with_method_body("second", "()V", PUBLIC_STATIC, |code| {
            code.goto_(leaked)?;
            Ok(())
        })?;
        Ok(())
    });
    assert!(matches!(result, Err(ClassError::ForeignLabel(_))));
}

#[test]
fn catch_handlers_get_frames_and_table_entries() {
    let model = ClassFile::new().parse(sample_class()).unwrap();
    let code = code_of(&model, "safe");

    let handlers = code.exception_table().unwrap();
    assert_eq!(handlers.len(), 1);
    let handler_pc = handlers[0].handler.id();
    let instructions = code.instructions().unwrap();
    let (_, first) = instructions.iter().find(|(pc, _)| *pc == handler_pc).unwrap();
    assert_eq!(first.opcode(), Opcode::Pop);
    assert!(code
        .attributes()
        .unwrap()
        .iter()
        .any(|attribute| attribute.name() == "StackMapTable"));
}

#[test]
fn oversized_string_constants_fail_the_build() {
    let result = ClassFile::new().build("demo/Huge", |class| {
        class.with_method_body("text", "()Ljava/lang/String;", PUBLIC_STATIC, |code| {
            code.load_constant("a".repeat(70_000).as_str())?.areturn()?;
            Ok(())
        })?;
        Ok(())
    });
    assert!(matches!(result, Err(ClassError::Utf8TooLong(70_000))));
}
