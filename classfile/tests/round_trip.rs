mod common;

use classfile::{
    access::AccessFlags,
    attribute::Attribute,
    constant::LoadableConstant,
    mapper::AttributeLocation,
    transform::{self, ElementBuilder},
    ClassBuilder, ClassElement, ClassError, ClassFile, ClassResult, CodeBuilder, FieldBuilder, MethodBuilder, Options,
};
use common::*;

#[test]
fn untouched_transform_is_byte_identical() {
    let bytes = sample_class();
    let cf = ClassFile::new();
    let model = cf.parse(bytes.clone()).unwrap();
    let out = cf.transform(&model, transform::accept_all::<ClassBuilder>()).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn members_rebuilt_through_mappers_are_byte_identical() {
    let bytes = sample_class();
    let cf = ClassFile::new();
    let model = cf.parse(bytes.clone()).unwrap();

    let out = cf
        .transform(&model, |class: &mut ClassBuilder, element: ClassElement| -> ClassResult<()> {
            match element {
                ClassElement::Field(field) => {
                    class.transform_field(&field, transform::accept_all::<FieldBuilder>())?;
                }
                ClassElement::Method(method) => {
                    class.transform_method(&method, transform::accept_all::<MethodBuilder>())?;
                }
                other => {
                    class.with(other)?;
                }
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn rebuilt_code_matches_the_original() {
    let bytes = sample_class();
    let cf = ClassFile::new();
    let model = cf.parse(bytes).unwrap();
    let out = cf.transform(&model, transform::code_in_methods(transform::accept_all::<CodeBuilder>)).unwrap();
    let rebuilt = cf.parse(out).unwrap();

    for name in &["<init>", "run", "count", "safe"] {
        let before = code_of(&model, name);
        let after = code_of(&rebuilt, name);
        assert_eq!(before.code_bytes(), after.code_bytes(), "{}", name);
        assert_eq!(before.max_stack(), after.max_stack(), "{}", name);
        assert_eq!(before.max_locals(), after.max_locals(), "{}", name);
        assert_eq!(before.attributes().unwrap(), after.attributes().unwrap(), "{}", name);
    }
}

#[test]
fn fresh_pool_keeps_the_meaning() {
    let bytes = sample_class();
    let cf = ClassFile::with_options(Options::new().share_constant_pool(false));
    let model = cf.parse(bytes).unwrap();
    let out = cf.transform(&model, transform::accept_all::<ClassBuilder>()).unwrap();
    let rebuilt = cf.parse(out).unwrap();

    assert_eq!(rebuilt.this_class(), model.this_class());
    assert_eq!(rebuilt.interfaces(), model.interfaces());
    assert_eq!(rebuilt.fields().len(), 2);
    assert_eq!(rebuilt.fields()[0].attributes().unwrap(), model.fields()[0].attributes().unwrap());
    assert_eq!(opcodes(&code_of(&rebuilt, "count")), opcodes(&code_of(&model, "count")));
    assert_eq!(rebuilt.attributes().unwrap(), model.attributes().unwrap());
}

#[test]
fn standard_attributes_read_back_as_written() {
    let model = ClassFile::new().parse(sample_class()).unwrap();
    let names: Vec<&str> = model.attributes().unwrap().iter().map(Attribute::name).collect();
    assert_eq!(names, vec!["SourceFile", "Signature"]);

    let run = &model.methods()[1];
    assert!(matches!(
        run.attributes().unwrap(),
        [Attribute::Exceptions(classes), Attribute::Code(_)] if &*classes[0] == "java/lang/Exception"
    ));

    let count = code_of(&model, "count");
    let tables: Vec<&str> = count.attributes().unwrap().iter().map(Attribute::name).collect();
    assert_eq!(tables, vec!["LocalVariableTable", "StackMapTable"]);
    let safe = code_of(&model, "safe");
    let handlers = safe.exception_table().unwrap();
    assert_eq!(handlers.len(), 1);
    assert_eq!(handlers[0].catch_type.as_deref(), Some("java/lang/RuntimeException"));
}

#[test]
fn debug_elements_can_be_left_out() {
    let cf = ClassFile::with_options(Options::new().debug_elements(false).line_numbers(false));
    let model = cf.parse(sample_class()).unwrap();
    let out = cf.transform(&model, transform::code_in_methods(transform::accept_all::<CodeBuilder>)).unwrap();
    let rebuilt = cf.parse(out).unwrap();

    let code = code_of(&rebuilt, "run");
    let names: Vec<&str> = code.attributes().unwrap().iter().map(Attribute::name).collect();
    assert!(names.is_empty());
    let code = code_of(&rebuilt, "count");
    let names: Vec<&str> = code.attributes().unwrap().iter().map(Attribute::name).collect();
    assert_eq!(names, vec!["StackMapTable"]);
}

/// Every attribute of the class and of its methods, in order.
fn all_attributes(cf: &ClassFile, bytes: Vec<u8>) -> ClassResult<Vec<Attribute>> {
    let model = cf.parse(bytes)?;
    let mut all = model.attributes()?.to_vec();
    for method in model.methods() {
        all.extend(method.attributes()?.iter().cloned());
    }
    Ok(all)
}

fn constant_on_method() -> Vec<u8> {
    ClassFile::new()
        .build("demo/Odd", |class| {
            class.with_method("m", "()V", AccessFlags::PUBLIC | AccessFlags::ABSTRACT, |method| {
                method.with_attribute(Attribute::ConstantValue(LoadableConstant::Integer(1)))?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap()
}

fn two_source_files() -> Vec<u8> {
    ClassFile::new()
        .build("demo/Odd", |class| {
            class.with_attribute(Attribute::SourceFile("A.java".into()))?;
            class.with_attribute(Attribute::SourceFile("B.java".into()))?;
            Ok(())
        })
        .unwrap()
}

fn nest_host_too_early() -> Vec<u8> {
    ClassFile::new()
        .build("demo/Odd$Inner", |class| {
            class.with_version(52, 0)?;
            class.with_attribute(Attribute::NestHost("demo/Odd".into()))?;
            Ok(())
        })
        .unwrap()
}

#[test]
fn strict_reading_rejects_misplaced_attributes() {
    let strict = ClassFile::with_options(Options::new().strict_attributes(true));

    let err = all_attributes(&strict, constant_on_method()).unwrap_err();
    assert!(matches!(
        &err,
        ClassError::AttributeNotAllowed { name, location } if name == "ConstantValue" && *location == AttributeLocation::METHOD
    ));

    let err = all_attributes(&strict, two_source_files()).unwrap_err();
    assert!(matches!(
        &err,
        ClassError::DuplicateAttribute { name, location } if name == "SourceFile" && *location == AttributeLocation::CLASS
    ));

    let err = all_attributes(&strict, nest_host_too_early()).unwrap_err();
    assert!(matches!(&err, ClassError::AttributeVersion { name, required: 55 } if name == "NestHost"));
}

#[test]
fn lenient_reading_keeps_misplaced_attributes() {
    let cf = ClassFile::new();

    match &all_attributes(&cf, constant_on_method()).unwrap()[..] {
        [Attribute::Unknown { name, data }] => {
            assert_eq!(&**name, "ConstantValue");
            assert_eq!(data.len(), 2);
        }
        other => panic!("unexpected attributes {:?}", other),
    }

    let files = all_attributes(&cf, two_source_files()).unwrap();
    assert_eq!(
        files,
        vec![Attribute::SourceFile("A.java".into()), Attribute::SourceFile("B.java".into())]
    );

    let host = all_attributes(&cf, nest_host_too_early()).unwrap();
    assert_eq!(host, vec![Attribute::NestHost("demo/Odd".into())]);
}
