//! Builders for classes, members and code bodies.
//!
//! A [`ClassBuilder`] is bound to one constant pool, either fresh or seeded
//! from the class being transformed. Members that arrive from a model whose
//! pool is the seed are copied as raw bytes; everything else is re-encoded
//! against the builder's pool when [`ClassBuilder::build`] runs.

mod code;
mod member;

pub use self::{
    code::{BlockCodeBuilder, CatchBuilder, CodeBuilder},
    member::{FieldBuilder, MethodBuilder},
};
pub(crate) use self::{
    code::BuiltCode,
    member::{CodeOutput, MethodPart},
};

use crate::{
    access::AccessFlags,
    attribute::Attribute,
    constant::Symbol,
    emit::{self, MethodInfo},
    model::{ClassElement, FieldModel, MethodModel, Version, MAGIC},
    options::Options,
    pool::PoolBuilder,
    transform::{self, ElementBuilder, Pipeline, Transform},
    writer::BufWriter,
    ClassResult,
};
use byteorder::{BigEndian, WriteBytesExt};
use std::sync::Arc;

enum FieldEntry {
    Raw(FieldModel),
    Built(FieldBuilder),
}

enum MethodEntry {
    Raw(MethodModel),
    Built(MethodBuilder),
}

pub struct ClassBuilder {
    this_class: Symbol,
    options: Arc<Options>,
    pool: PoolBuilder,
    pipeline: Pipeline<ClassBuilder>,
    version: Version,
    flags: AccessFlags,
    superclass: Option<Symbol>,
    interfaces: Vec<Symbol>,
    fields: Vec<FieldEntry>,
    methods: Vec<MethodEntry>,
    attributes: Vec<Attribute>,
    /// Where the source class kept its `BootstrapMethods` attribute.
    bootstrap_position: Option<usize>,
}

impl ClassBuilder {
    pub(crate) fn new(this_class: &str, options: Arc<Options>, pool: PoolBuilder) -> Self {
        ClassBuilder {
            this_class: this_class.into(),
            options,
            pool,
            pipeline: Pipeline::new(),
            version: Version::DEFAULT,
            flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            superclass: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            bootstrap_position: None,
        }
    }

    pub fn this_class(&self) -> &str {
        &self.this_class
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn pool(&mut self) -> &mut PoolBuilder {
        &mut self.pool
    }

    pub fn with_version(&mut self, major: u16, minor: u16) -> ClassResult<&mut Self> {
        self.with(ClassElement::Version(Version::new(major, minor)))
    }

    pub fn with_flags(&mut self, flags: AccessFlags) -> ClassResult<&mut Self> {
        self.with(ClassElement::Flags(flags))
    }

    pub fn with_superclass(&mut self, name: &str) -> ClassResult<&mut Self> {
        self.with(ClassElement::Superclass(name.into()))
    }

    pub fn with_interfaces(&mut self, names: &[&str]) -> ClassResult<&mut Self> {
        self.with(ClassElement::Interfaces(names.iter().map(|&name| Symbol::from(name)).collect()))
    }

    pub fn with_attribute(&mut self, attribute: Attribute) -> ClassResult<&mut Self> {
        self.with(ClassElement::Attribute(attribute))
    }

    pub fn with_field<F>(&mut self, name: &str, descriptor: &str, handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut FieldBuilder) -> ClassResult<()>,
    {
        let mut field = FieldBuilder::new(name, descriptor, AccessFlags::NONE);
        handler(&mut field)?;
        self.fields.push(FieldEntry::Built(field));
        Ok(self)
    }

    pub fn with_method<F>(&mut self, name: &str, descriptor: &str, flags: AccessFlags, handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut MethodBuilder) -> ClassResult<()>,
    {
        let mut method = MethodBuilder::new(name, descriptor, flags);
        handler(&mut method)?;
        self.methods.push(MethodEntry::Built(method));
        Ok(self)
    }

    /// Adds a method whose only content is the body built by `handler`.
    pub fn with_method_body<F>(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: AccessFlags,
        handler: F,
    ) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut CodeBuilder) -> ClassResult<()>,
    {
        self.with_method(name, descriptor, flags, |method| {
            method.with_code(handler)?;
            Ok(())
        })
    }

    /// Adds a copy of `model` rebuilt through `transform`.
    pub fn transform_method<T: Transform<MethodBuilder>>(&mut self, model: &MethodModel, transform: T) -> ClassResult<&mut Self> {
        let mut method = MethodBuilder::new(&model.name(), &model.descriptor(), model.flags());
        method.pipeline().push(transform);
        transform::feed(&mut method, model.elements()?)?;
        self.methods.push(MethodEntry::Built(method));
        Ok(self)
    }

    pub fn transform_field<T: Transform<FieldBuilder>>(&mut self, model: &FieldModel, transform: T) -> ClassResult<&mut Self> {
        let mut field = FieldBuilder::new(&model.name(), &model.descriptor(), model.flags());
        field.pipeline().push(transform);
        transform::feed(&mut field, model.elements()?)?;
        self.fields.push(FieldEntry::Built(field));
        Ok(self)
    }

    /// Encodes the class.
    pub fn build(self) -> ClassResult<Vec<u8>> {
        let ClassBuilder {
            this_class,
            options,
            mut pool,
            version,
            flags,
            superclass,
            interfaces,
            fields,
            methods,
            attributes,
            bootstrap_position,
            ..
        } = self;

        let mut body = BufWriter::new(&mut pool);
        body.write_u16(flags.into_raw());
        body.write_class_index(&this_class);
        body.write_optional_class_index(superclass.as_deref());
        body.write_count(interfaces.len(), "interfaces")?;
        for interface in &interfaces {
            body.write_class_index(interface);
        }

        body.write_count(fields.len(), "fields")?;
        for field in &fields {
            match field {
                FieldEntry::Raw(model) => body.write_bytes(model.raw_bytes()),
                FieldEntry::Built(field) => {
                    body.write_u16(field.flags().into_raw());
                    body.write_utf8_index(field.name());
                    body.write_utf8_index(field.descriptor());
                    body.write_attributes(field.attributes())?;
                }
            }
        }

        body.write_count(methods.len(), "methods")?;
        for method in &methods {
            match method {
                MethodEntry::Raw(model) => body.write_bytes(model.raw_bytes()),
                MethodEntry::Built(method) => {
                    let info = MethodInfo {
                        this_class: &this_class,
                        name: method.name(),
                        descriptor: method.descriptor(),
                        flags: method.flags(),
                        version,
                        options: &options,
                    };
                    body.write_u16(method.flags().into_raw());
                    body.write_utf8_index(method.name());
                    body.write_utf8_index(method.descriptor());
                    body.write_count(method.parts().len(), "method attributes")?;
                    for part in method.parts() {
                        match part {
                            MethodPart::Code(code) => emit::write_code(&mut body, &info, code)?,
                            MethodPart::Other(attribute) => body.write_attribute(attribute)?,
                        }
                    }
                }
            }
        }

        // Attributes are encoded separately so the bootstrap table, which
        // only settles once everything else is interned, can be slotted in.
        let mut chunks = Vec::with_capacity(attributes.len() + 1);
        for attribute in &attributes {
            let mut chunk = BufWriter::new(body.pool());
            chunk.write_attribute(attribute)?;
            chunks.push(chunk.into_bytes());
        }
        let bootstrap = body.pool().bootstrap_methods().to_vec();
        if !bootstrap.is_empty() {
            let mut chunk = BufWriter::new(body.pool());
            chunk.write_utf8_index("BootstrapMethods");
            let at = chunk.reserve_u32();
            chunk.write_count(bootstrap.len(), "bootstrap methods")?;
            for (handle, arguments) in &bootstrap {
                chunk.write_index(*handle);
                chunk.write_count(arguments.len(), "bootstrap arguments")?;
                for argument in arguments {
                    chunk.write_index(*argument);
                }
            }
            chunk.patch_length(at)?;
            let position = bootstrap_position.unwrap_or(chunks.len()).min(chunks.len());
            chunks.insert(position, chunk.into_bytes());
        }
        body.write_count(chunks.len(), "class attributes")?;
        for chunk in &chunks {
            body.write_bytes(chunk);
        }
        let body = body.into_bytes();

        let mut out = Vec::with_capacity(body.len() + 10 + pool.len() * 8);
        out.write_u32::<BigEndian>(MAGIC)?;
        out.write_u16::<BigEndian>(version.minor)?;
        out.write_u16::<BigEndian>(version.major)?;
        pool.write(&mut out)?;
        out.extend_from_slice(&body);
        log::debug!(
            "built {} ({} bytes, {} pool entries, {} fields, {} methods)",
            this_class,
            out.len(),
            pool.len(),
            fields.len(),
            methods.len()
        );
        Ok(out)
    }
}

impl ElementBuilder for ClassBuilder {
    type Element = ClassElement;

    fn pipeline(&mut self) -> &mut Pipeline<Self> {
        &mut self.pipeline
    }

    fn accept_terminal(&mut self, element: ClassElement) -> ClassResult<()> {
        match element {
            ClassElement::Version(version) => self.version = version,
            ClassElement::Flags(flags) => self.flags = flags,
            ClassElement::Superclass(name) => self.superclass = Some(name),
            ClassElement::Interfaces(names) => self.interfaces = names,
            ClassElement::Field(model) => {
                if self.pool.is_shared_with(model.reader().pool()) {
                    log::trace!("copying field {} verbatim", model.name());
                    self.fields.push(FieldEntry::Raw(model));
                } else {
                    self.transform_field(&model, transform::accept_all::<FieldBuilder>())?;
                }
            }
            ClassElement::Method(model) => {
                if self.pool.is_shared_with(model.reader().pool()) {
                    log::trace!("copying method {}{} verbatim", model.name(), model.descriptor());
                    self.methods.push(MethodEntry::Raw(model));
                } else {
                    self.transform_method(&model, transform::accept_all::<MethodBuilder>())?;
                }
            }
            ClassElement::Attribute(Attribute::BootstrapMethods(_)) => {
                self.bootstrap_position = Some(self.attributes.len());
            }
            ClassElement::Attribute(attribute) => {
                self.attributes.push(attribute);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{descriptor::TypeKind, ClassFile};

    #[test]
    fn fresh_class_round_trips() {
        let cf = ClassFile::new();
        let bytes = cf
            .build("demo/Point", |class| {
                class.with_interfaces(&["java/io/Serializable"])?;
                class.with_field("x", "I", |field| {
                    field.with_flags(AccessFlags::PRIVATE)?;
                    Ok(())
                })?;
                class.with_method_body("getX", "()I", AccessFlags::PUBLIC, |code| {
                    code.load_local(TypeKind::Reference, 0)?
                        .get_field("demo/Point", "x", "I")?
                        .ireturn()?;
                    Ok(())
                })?;
                class.with_attribute(Attribute::SourceFile("Point.java".into()))?;
                Ok(())
            })
            .unwrap();

        let model = cf.parse(bytes).unwrap();
        assert_eq!(&*model.this_class(), "demo/Point");
        assert_eq!(model.superclass().as_deref(), Some("java/lang/Object"));
        assert_eq!(model.interfaces().len(), 1);
        assert_eq!(model.fields()[0].flags(), AccessFlags::PRIVATE);
        let code = model.methods()[0].code().unwrap().unwrap();
        assert_eq!(code.max_stack(), 1);
        assert_eq!(code.max_locals(), 1);
        let bytes = code.code_bytes();
        assert_eq!(bytes.len(), 5);
        assert_eq!((bytes[0], bytes[1], bytes[4]), (0x2a, 0xb4, 0xac));
        assert!(matches!(model.attributes().unwrap(), [Attribute::SourceFile(name)] if &**name == "Point.java"));
    }

    #[test]
    fn version_element_is_written() {
        let cf = ClassFile::new();
        let bytes = cf
            .build("demo/Old", |class| {
                class.with_version(49, 0)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(&bytes[..8], &[0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 49]);
    }
}
