#![allow(dead_code)]

use classfile::{
    access::AccessFlags,
    attribute::Attribute,
    constant::LoadableConstant,
    descriptor::TypeKind,
    opcode::Opcode,
    ClassFile, ClassModel, CodeModel,
};

pub const PUBLIC_STATIC: AccessFlags = AccessFlags(AccessFlags::PUBLIC.0 | AccessFlags::STATIC.0);

/// A small class exercising fields, constructors, loops, exception handlers,
/// debug tables and a call to `demo/Foo.bar`.
pub fn sample_class() -> Vec<u8> {
    ClassFile::new()
        .build("demo/Sample", |class| {
            class.with_flags(AccessFlags::PUBLIC | AccessFlags::SUPER)?;
            class.with_interfaces(&["java/lang/Runnable"])?;

            class.with_field("LIMIT", "I", |field| {
                field.with_flags(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL)?;
                field.with_attribute(Attribute::ConstantValue(LoadableConstant::Integer(10)))?;
                Ok(())
            })?;
            class.with_field("name", "Ljava/lang/String;", |field| {
                field.with_flags(AccessFlags::PRIVATE)?;
                field.with_attribute(Attribute::Deprecated)?;
                Ok(())
            })?;

            class.with_method_body("<init>", "()V", AccessFlags::PUBLIC, |code| {
                code.load_local(TypeKind::Reference, 0)?
                    .invoke_special("java/lang/Object", "<init>", "()V")?
                    .return_void()?;
                Ok(())
            })?;

            class.with_method("run", "()V", AccessFlags::PUBLIC, |method| {
                method.with_attribute(Attribute::Exceptions(vec!["java/lang/Exception".into()]))?;
                method.with_code(|code| {
                    code.line_number(10)?;
                    code.load_constant(3)?.invoke_static("demo/Foo", "bar", "(I)I")?.pop()?;
                    code.line_number(11)?;
                    code.load_constant("done")?.pop()?;
                    code.return_void()?;
                    Ok(())
                })?;
                Ok(())
            })?;

            class.with_method_body("count", "(I)I", PUBLIC_STATIC, |code| {
                let start = code.new_bound_label()?;
                let sum = code.allocate_local(TypeKind::Int);
                let i = code.allocate_local(TypeKind::Int);
                code.load_constant(0)?.store_local(TypeKind::Int, sum)?;
                code.load_constant(0)?.store_local(TypeKind::Int, i)?;

                let head = code.new_bound_label()?;
                let exit = code.new_label();
                code.load_local(TypeKind::Int, i)?
                    .load_local(TypeKind::Int, 0)?
                    .branch(Opcode::IfIcmpge, exit)?;
                code.load_local(TypeKind::Int, sum)?
                    .load_local(TypeKind::Int, i)?
                    .operator(Opcode::Iadd)?
                    .store_local(TypeKind::Int, sum)?;
                code.iinc(i, 1)?.goto_(head)?;

                code.bind(exit)?;
                code.load_local(TypeKind::Int, sum)?.ireturn()?;
                let end = code.new_bound_label()?;
                code.local_variable(sum, "sum", "I", start, end)?;
                code.local_variable(i, "i", "I", start, end)?;
                Ok(())
            })?;

            class.with_method_body("safe", "(Ljava/lang/Runnable;)Z", PUBLIC_STATIC, |code| {
                code.trying(
                    |body| {
                        body.load_local(TypeKind::Reference, 0)?
                            .invoke_interface("java/lang/Runnable", "run", "()V")?;
                        Ok(())
                    },
                    |catches| {
                        catches.catching("java/lang/RuntimeException", |handler| {
                            handler.pop()?.load_constant(0)?.ireturn()?;
                            Ok(())
                        })?;
                        Ok(())
                    },
                )?;
                code.load_constant(1)?.ireturn()?;
                Ok(())
            })?;

            class.with_attribute(Attribute::SourceFile("Sample.java".into()))?;
            class.with_attribute(Attribute::Signature("Ljava/lang/Object;Ljava/lang/Runnable;".into()))?;
            Ok(())
        })
        .expect("sample class builds")
}

pub fn code_of(model: &ClassModel, name: &str) -> CodeModel {
    model
        .methods()
        .iter()
        .find(|method| &*method.name() == name)
        .and_then(|method| method.code().unwrap())
        .unwrap_or_else(|| panic!("no code for {}", name))
}

pub fn opcodes(code: &CodeModel) -> Vec<Opcode> {
    code.instructions().unwrap().iter().map(|(_, instruction)| instruction.opcode()).collect()
}

/// Whether any Utf8 pool entry spells `text`.
pub fn pool_has_utf8(model: &ClassModel, text: &str) -> bool {
    model
        .pool()
        .entries()
        .iter()
        .any(|entry| entry.as_utf8().map_or(false, |s| &**s == text))
}
