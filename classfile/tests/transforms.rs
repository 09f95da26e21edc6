mod common;

use classfile::{
    access::AccessFlags,
    attribute::{
        Annotation, Attribute, CustomAttribute, RecordComponent, TypeAnnotation, TypeAnnotationTarget, TypePathEntry,
    },
    mapper::AttributeMapper,
    reader::ClassReader,
    transform::{self, Transform},
    writer::BufWriter,
    AttributeLocation, ByteParser, ClassBuilder, ClassError, ClassFile, ClassModel, ClassResult, CodeBuilder, CodeElement,
    ElementBuilder, FieldBuilder, FieldElement, Instruction, MethodModel, Options,
};
use common::*;
use std::sync::Arc;

fn drop_line_numbers() -> impl Transform<CodeBuilder> {
    transform::drop_if::<CodeBuilder, _>(|element: &CodeElement| matches!(element, CodeElement::LineNumber(_)))
}

fn redirect_foo() -> impl Transform<CodeBuilder> {
    |code: &mut CodeBuilder, element: CodeElement| -> ClassResult<()> {
        match element {
            CodeElement::Instruction(Instruction::Invoke { op, mut method, interface }) if &*method.owner == "demo/Foo" => {
                method.owner = "demo/Bar".into();
                code.with(CodeElement::Instruction(Instruction::Invoke { op, method, interface }))?;
            }
            other => {
                code.with(other)?;
            }
        }
        Ok(())
    }
}

fn invoked_owners(model: &ClassModel, name: &str) -> Vec<String> {
    code_of(model, name)
        .instructions()
        .unwrap()
        .iter()
        .filter_map(|(_, instruction)| match instruction {
            Instruction::Invoke { method, .. } => Some(method.owner.to_string()),
            _ => None,
        })
        .collect()
}

fn code_attribute_names(model: &ClassModel, name: &str) -> Vec<String> {
    code_of(model, name)
        .attributes()
        .unwrap()
        .iter()
        .map(|attribute| attribute.name().to_string())
        .collect()
}

#[test]
fn chained_transforms_match_separate_passes() {
    let cf = ClassFile::new();
    let model = cf.parse(sample_class()).unwrap();

    let chained = cf
        .transform(&model, transform::code_in_methods(|| drop_line_numbers().and_then(redirect_foo())))
        .unwrap();
    let chained = cf.parse(chained).unwrap();

    let first = cf.transform(&model, transform::code_in_methods(drop_line_numbers)).unwrap();
    let first = cf.parse(first).unwrap();
    let second = cf.transform(&first, transform::code_in_methods(redirect_foo)).unwrap();
    let separate = cf.parse(second).unwrap();

    for name in &["<init>", "run", "count", "safe"] {
        assert_eq!(opcodes(&code_of(&chained, name)), opcodes(&code_of(&separate, name)), "{}", name);
        assert_eq!(invoked_owners(&chained, name), invoked_owners(&separate, name), "{}", name);
        assert_eq!(code_attribute_names(&chained, name), code_attribute_names(&separate, name), "{}", name);
    }
    assert_eq!(invoked_owners(&chained, "run"), vec!["demo/Bar"]);
    assert!(code_attribute_names(&chained, "run").is_empty());
}

#[test]
fn fresh_pool_forgets_replaced_owners() {
    let cf = ClassFile::with_options(Options::new().share_constant_pool(false));
    let model = cf.parse(sample_class()).unwrap();
    let out = cf.transform(&model, transform::code_in_methods(redirect_foo)).unwrap();
    let rebuilt = cf.parse(out).unwrap();

    assert!(pool_has_utf8(&model, "demo/Foo"));
    assert!(!pool_has_utf8(&rebuilt, "demo/Foo"));
    assert!(pool_has_utf8(&rebuilt, "demo/Bar"));
}

#[test]
fn shared_pool_keeps_replaced_owners() {
    let cf = ClassFile::new();
    let model = cf.parse(sample_class()).unwrap();
    let out = cf.transform(&model, transform::code_in_methods(redirect_foo)).unwrap();
    let rebuilt = cf.parse(out).unwrap();

    assert!(pool_has_utf8(&rebuilt, "demo/Foo"));
    assert!(pool_has_utf8(&rebuilt, "demo/Bar"));
    assert_eq!(invoked_owners(&rebuilt, "run"), vec!["demo/Bar"]);
}

#[test]
fn method_filter_leaves_other_methods_alone() {
    let cf = ClassFile::new();
    let model = cf.parse(sample_class()).unwrap();
    let only_count = |method: &MethodModel| &*method.name() == "count";
    let out = cf
        .transform(&model, transform::methods_where(only_count, redirect_foo))
        .unwrap();
    let rebuilt = cf.parse(out).unwrap();

    assert_eq!(invoked_owners(&rebuilt, "run"), vec!["demo/Foo"]);
    assert_eq!(code_of(&rebuilt, "run").code_bytes(), code_of(&model, "run").code_bytes());
}

#[test]
fn field_transforms_drop_attributes() {
    let cf = ClassFile::new();
    let model = cf.parse(sample_class()).unwrap();
    let out = cf
        .transform(
            &model,
            transform::fields(|| {
                transform::drop_if::<FieldBuilder, _>(|element: &FieldElement| {
                    matches!(element, FieldElement::Attribute(Attribute::Deprecated))
                })
            }),
        )
        .unwrap();
    let rebuilt = cf.parse(out).unwrap();

    assert_eq!(rebuilt.fields()[0].attributes().unwrap(), model.fields()[0].attributes().unwrap());
    assert!(rebuilt.fields()[1].attributes().unwrap().is_empty());
}

/// `demo.Marker`: a single Utf8 index naming the tool that touched a class.
struct Marker;

impl AttributeMapper for Marker {
    fn name(&self) -> &str {
        "demo.Marker"
    }

    fn locations(&self) -> AttributeLocation {
        AttributeLocation::CLASS
    }

    fn read(&self, reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
        let tool = reader.pool().utf8(input.parse_u16()?)?.to_string();
        Ok(Attribute::Custom(CustomAttribute::new(Arc::new(Marker), tool)))
    }

    fn write(&self, attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
        match attribute {
            Attribute::Custom(custom) => {
                let tool = custom
                    .downcast_ref::<String>()
                    .ok_or_else(|| ClassError::IllegalArgument("marker data must be a String".into()))?;
                out.write_utf8_index(tool);
                Ok(())
            }
            other => Err(ClassError::IllegalArgument(format!("not a marker: {}", other.name()))),
        }
    }
}

fn marked_class() -> Vec<u8> {
    ClassFile::new()
        .build("demo/Marked", |class| {
            class.with_attribute(Attribute::Custom(CustomAttribute::new(Arc::new(Marker), "shrinker".to_string())))?;
            Ok(())
        })
        .unwrap()
}

#[test]
fn custom_mappers_read_their_attributes() {
    let cf = ClassFile::with_options(Options::new().attribute_mapper(|name| {
        if name == "demo.Marker" {
            Some(Arc::new(Marker) as Arc<dyn AttributeMapper>)
        } else {
            None
        }
    }));
    let model = cf.parse(marked_class()).unwrap();

    match model.attributes().unwrap() {
        [Attribute::Custom(custom)] => {
            assert_eq!(custom.mapper.name(), "demo.Marker");
            assert_eq!(custom.downcast_ref::<String>().map(String::as_str), Some("shrinker"));
        }
        other => panic!("unexpected attributes {:?}", other),
    }

    // Written back through the mapper against a fresh pool.
    let fresh = ClassFile::with_options(cf.options().clone().share_constant_pool(false));
    let again = fresh.parse(fresh.transform(&model, transform::accept_all::<ClassBuilder>()).unwrap()).unwrap();
    assert!(matches!(again.attributes().unwrap(), [Attribute::Custom(_)]));
}

#[test]
fn unmapped_attributes_stay_raw() {
    let model = ClassFile::new().parse(marked_class()).unwrap();
    match model.attributes().unwrap() {
        [Attribute::Unknown { name, data }] => {
            assert_eq!(&**name, "demo.Marker");
            assert_eq!(data.len(), 2);
        }
        other => panic!("unexpected attributes {:?}", other),
    }

    let dropping = ClassFile::with_options(Options::new().unknown_attributes(false));
    assert!(dropping.parse(marked_class()).unwrap().attributes().unwrap().is_empty());
}

#[test]
fn unmapped_attributes_cannot_move_to_a_fresh_pool() {
    let fresh = ClassFile::with_options(Options::new().share_constant_pool(false));
    let model = fresh.parse(marked_class()).unwrap();
    let err = fresh.transform(&model, transform::accept_all::<ClassBuilder>()).unwrap_err();
    assert!(matches!(&err, ClassError::UnmappedAttribute(name) if name == "demo.Marker"));

    let shared = ClassFile::new();
    let out = shared.transform(&model, transform::accept_all::<ClassBuilder>()).unwrap();
    assert_eq!(out, marked_class());
}

#[test]
fn unmapped_attributes_are_refused_at_every_level() {
    let blob = || Attribute::Unknown {
        name: "demo.Blob".into(),
        data: Arc::from(&[0u8, 1][..]),
    };
    let cf = ClassFile::new();

    let on_field = cf.build("demo/A", |class| {
        class.with_field("f", "I", |field| {
            field.with_attribute(blob())?;
            Ok(())
        })?;
        Ok(())
    });
    let on_method = cf.build("demo/A", |class| {
        class.with_method("m", "()V", AccessFlags::PUBLIC | AccessFlags::ABSTRACT, |method| {
            method.with_attribute(blob())?;
            Ok(())
        })?;
        Ok(())
    });
    let on_code = cf.build("demo/A", |class| {
        class.with_method_body("m", "()V", PUBLIC_STATIC, |code| {
            code.return_void()?;
            code.with(CodeElement::Attribute(blob()))?;
            Ok(())
        })?;
        Ok(())
    });

    for result in vec![on_field, on_method, on_code] {
        assert!(matches!(&result, Err(ClassError::UnmappedAttribute(name)) if name == "demo.Blob"));
    }
}

fn non_null() -> Annotation {
    Annotation {
        ty: "Ldemo/NonNull;".into(),
        elements: vec![],
    }
}

/// `record Pair(int left, List<String> right)`, as far as its attributes go.
fn record_class() -> Vec<u8> {
    ClassFile::new()
        .build("demo/Pair", |class| {
            class.with_version(61, 0)?;
            class.with_superclass("java/lang/Record")?;
            class.with_attribute(Attribute::Record(vec![
                RecordComponent {
                    name: "left".into(),
                    descriptor: "I".into(),
                    attributes: vec![],
                },
                RecordComponent {
                    name: "right".into(),
                    descriptor: "Ljava/util/List;".into(),
                    attributes: vec![
                        Attribute::Signature("Ljava/util/List<Ljava/lang/String;>;".into()),
                        Attribute::RuntimeVisibleTypeAnnotations(vec![TypeAnnotation {
                            target: TypeAnnotationTarget::Empty { target_type: 0x13 },
                            path: vec![TypePathEntry { kind: 3, argument: 0 }],
                            annotation: non_null(),
                        }]),
                    ],
                },
            ]))?;
            class.with_field("right", "Ljava/util/List;", |field| {
                field.with_flags(AccessFlags::PRIVATE | AccessFlags::FINAL)?;
                field.with_attribute(Attribute::RuntimeVisibleTypeAnnotations(vec![TypeAnnotation {
                    target: TypeAnnotationTarget::Empty { target_type: 0x13 },
                    path: vec![],
                    annotation: non_null(),
                }]))?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap()
}

#[test]
fn records_survive_a_fresh_pool() {
    let fresh = ClassFile::with_options(Options::new().share_constant_pool(false).strict_attributes(true));
    let model = fresh.parse(record_class()).unwrap();
    match model.attributes().unwrap() {
        [Attribute::Record(components)] => {
            assert_eq!(components.len(), 2);
            assert_eq!(components[1].attributes.len(), 2);
        }
        other => panic!("unexpected attributes {:?}", other),
    }

    let rebuilt = fresh.parse(fresh.transform(&model, transform::accept_all::<ClassBuilder>()).unwrap()).unwrap();
    assert_eq!(rebuilt.attributes().unwrap(), model.attributes().unwrap());
    assert_eq!(rebuilt.fields()[0].attributes().unwrap(), model.fields()[0].attributes().unwrap());
}
