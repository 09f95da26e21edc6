//! Printing of constant pool entries.

use crate::style;
use classfile::constant::{Constant, ConstantPool, PoolIndex};

const MISSING: &str = "<invalid>";

fn text(pool: &ConstantPool, index: PoolIndex) -> &str {
    pool.utf8(index).map(|s| &**s).unwrap_or(MISSING)
}

fn class_name(pool: &ConstantPool, index: PoolIndex) -> &str {
    pool.class_name(index).map(|s| &**s).unwrap_or(MISSING)
}

fn name_and_type(pool: &ConstantPool, index: PoolIndex) -> String {
    match pool.name_and_type(index) {
        Ok((name, descriptor)) => format!("{}:{}", name, descriptor),
        Err(_) => MISSING.into(),
    }
}

fn print_name(name: &str, path: &str) {
    print!("{}: ", style::get(path).paint(name));
    for _ in name.len()..("InterfaceMethodref".len()) {
        print!(" ");
    }
}

fn print_refs(indices: &[PoolIndex], comment: &str) {
    let index = style::get("pool.index");
    let refs: Vec<String> = indices.iter().map(|i| format!("#{}", i)).collect();
    println!(
        "{} {}",
        index.paint(refs.join(" ")),
        style::get("comment").paint(format!("// {}", comment))
    );
}

pub fn print_constant(pool: &ConstantPool, index: usize) {
    let constant = match pool.entries().get(index) {
        Some(constant) => constant,
        None => return,
    };

    match constant {
        Constant::Nothing => println!("<nothing>"),
        Constant::Utf8(text) => {
            print_name("Utf8", "pool.val.string");
            println!("{}", text)
        }
        Constant::Integer(value) => {
            print_name("Integer", "pool.val");
            println!("{}", value)
        }
        Constant::Float(value) => {
            print_name("Float", "pool.val");
            println!("{}f", value)
        }
        Constant::Long(value) => {
            print_name("Long", "pool.val");
            println!("{}l", value)
        }
        Constant::Double(value) => {
            print_name("Double", "pool.val");
            println!("{}d", value)
        }

        Constant::Class(idx) | Constant::String(idx) | Constant::MethodType(idx) | Constant::Module(idx)
        | Constant::Package(idx) => {
            print_name(constant.describe(), "pool.ref");
            print_refs(&[*idx], text(pool, *idx));
        }

        Constant::FieldRef { class, name_and_type: nat }
        | Constant::MethodRef { class, name_and_type: nat }
        | Constant::InterfaceMethodRef { class, name_and_type: nat } => {
            print_name(constant.describe(), "pool.ref");
            let comment = format!("{}.{}", class_name(pool, *class), name_and_type(pool, *nat));
            print_refs(&[*class, *nat], &comment);
        }

        Constant::NameAndType { name, descriptor } => {
            print_name("NameAndType", "pool.ref.name_and_type");
            let comment = format!("{}:{}", text(pool, *name), text(pool, *descriptor));
            print_refs(&[*name, *descriptor], &comment);
        }

        Constant::MethodHandle { kind, reference } => {
            print_name("MethodHandle", "pool.ref.dynamic");
            let comment = match pool.method_handle(index as PoolIndex) {
                Ok(handle) => format!(
                    "{:?} {}.{}:{}",
                    kind, handle.member.owner, handle.member.name, handle.member.descriptor
                ),
                Err(_) => MISSING.into(),
            };
            print_refs(&[*reference], &comment);
        }

        Constant::Dynamic { bootstrap, name_and_type: nat }
        | Constant::InvokeDynamic { bootstrap, name_and_type: nat } => {
            print_name(constant.describe(), "pool.ref.dynamic");
            let comment = format!("bootstrap {} {}", bootstrap, name_and_type(pool, *nat));
            print_refs(&[*nat], &comment);
        }
    }
}

pub fn print_pool(pool: &ConstantPool) {
    let index = style::get("pool.index");
    for entry in 1..pool.len() {
        if pool.entries()[entry].is_nothing() {
            continue;
        }
        print!("{} = ", index.paint(format!("{:5}", entry)));
        print_constant(pool, entry);
    }
}
