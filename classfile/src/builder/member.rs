use super::code::{BuiltCode, CodeBuilder};
use crate::{
    access::AccessFlags,
    attribute::Attribute,
    constant::Symbol,
    model::{CodeModel, FieldElement, MethodElement},
    transform::{self, ElementBuilder, Pipeline, Transform},
    ClassResult,
};

/// The body of a method under construction: either a parsed body that went
/// through untouched, or one produced by a [`CodeBuilder`].
#[derive(Clone, Debug)]
pub(crate) enum CodeOutput {
    Model(CodeModel),
    Built(BuiltCode),
}

#[derive(Clone, Debug)]
pub(crate) enum MethodPart {
    Code(CodeOutput),
    Other(Attribute),
}

pub struct MethodBuilder {
    name: Symbol,
    descriptor: Symbol,
    flags: AccessFlags,
    parts: Vec<MethodPart>,
    pipeline: Pipeline<MethodBuilder>,
}

impl MethodBuilder {
    pub(crate) fn new(name: &str, descriptor: &str, flags: AccessFlags) -> Self {
        MethodBuilder {
            name: name.into(),
            descriptor: descriptor.into(),
            flags,
            parts: vec![],
            pipeline: Pipeline::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    pub(crate) fn parts(&self) -> &[MethodPart] {
        &self.parts
    }

    pub fn with_flags(&mut self, flags: AccessFlags) -> ClassResult<&mut Self> {
        self.with(MethodElement::Flags(flags))
    }

    pub fn with_attribute(&mut self, attribute: Attribute) -> ClassResult<&mut Self> {
        self.with(MethodElement::Attribute(attribute))
    }

    fn code_builder(&self) -> ClassResult<CodeBuilder> {
        CodeBuilder::new(&self.descriptor, self.flags.is(AccessFlags::STATIC))
    }

    /// Gives the method a body produced by `handler`, replacing any body it
    /// already has.
    pub fn with_code<F>(&mut self, handler: F) -> ClassResult<&mut Self>
    where
        F: FnOnce(&mut CodeBuilder) -> ClassResult<()>,
    {
        let mut code = self.code_builder()?;
        handler(&mut code)?;
        self.set_code(CodeOutput::Built(code.finish()));
        Ok(self)
    }

    /// Rebuilds `model` through `transform` and makes it this method's body.
    pub fn transform_code<T: Transform<CodeBuilder>>(&mut self, model: &CodeModel, transform: T) -> ClassResult<&mut Self> {
        let mut code = self.code_builder()?.with_source(model.label_context());
        code.reserve_locals(model.max_locals());
        code.pipeline().push(transform);
        transform::feed(&mut code, model.elements()?.iter().cloned())?;
        self.set_code(CodeOutput::Built(code.finish()));
        Ok(self)
    }

    fn set_code(&mut self, code: CodeOutput) {
        for part in &mut self.parts {
            if let MethodPart::Code(existing) = part {
                *existing = code;
                return;
            }
        }
        self.parts.push(MethodPart::Code(code));
    }
}

impl ElementBuilder for MethodBuilder {
    type Element = MethodElement;

    fn pipeline(&mut self) -> &mut Pipeline<Self> {
        &mut self.pipeline
    }

    fn accept_terminal(&mut self, element: MethodElement) -> ClassResult<()> {
        match element {
            MethodElement::Flags(flags) => self.flags = flags,
            MethodElement::Code(code) | MethodElement::Attribute(Attribute::Code(code)) => {
                self.set_code(CodeOutput::Model(code))
            }
            MethodElement::Attribute(attribute) => self.parts.push(MethodPart::Other(attribute)),
        }
        Ok(())
    }
}

pub struct FieldBuilder {
    name: Symbol,
    descriptor: Symbol,
    flags: AccessFlags,
    attributes: Vec<Attribute>,
    pipeline: Pipeline<FieldBuilder>,
}

impl FieldBuilder {
    pub(crate) fn new(name: &str, descriptor: &str, flags: AccessFlags) -> Self {
        FieldBuilder {
            name: name.into(),
            descriptor: descriptor.into(),
            flags,
            attributes: vec![],
            pipeline: Pipeline::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    pub(crate) fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn with_flags(&mut self, flags: AccessFlags) -> ClassResult<&mut Self> {
        self.with(FieldElement::Flags(flags))
    }

    pub fn with_attribute(&mut self, attribute: Attribute) -> ClassResult<&mut Self> {
        self.with(FieldElement::Attribute(attribute))
    }
}

impl ElementBuilder for FieldBuilder {
    type Element = FieldElement;

    fn pipeline(&mut self) -> &mut Pipeline<Self> {
        &mut self.pipeline
    }

    fn accept_terminal(&mut self, element: FieldElement) -> ClassResult<()> {
        match element {
            FieldElement::Flags(flags) => self.flags = flags,
            FieldElement::Attribute(attribute) => self.attributes.push(attribute),
        }
        Ok(())
    }
}
