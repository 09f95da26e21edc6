//! Immutable views over a parsed class file.
//!
//! Parsing a class reads its header, constant pool and the boundaries of
//! every member. Attributes, code bodies and instructions are decoded the
//! first time they are asked for and cached from then on. Every view can be
//! walked as a sequence of elements, which is what transforms consume.

use crate::{
    access::AccessFlags,
    attribute::Attribute,
    constant::{parse_constant_pool, Symbol},
    descriptor::MethodDescriptor,
    flow::ControlFlowGraph,
    instruction::{
        decode, next_label_context, CharacterRangeInfo, CodeElement, ExceptionCatch, Instruction, Label,
        LocalVariableInfo,
    },
    mapper::AttributeLocation,
    options::Options,
    parse::{ByteParser, ParseError},
    reader::ClassReader,
    ClassError, ClassResult,
};
use once_cell::sync::OnceCell;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    ops::Range,
    sync::Arc,
};

pub const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    /// Java 8, the version of classes built from scratch.
    pub const DEFAULT: Version = Version { major: 52, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Version { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClassElement {
    Version(Version),
    Flags(AccessFlags),
    Superclass(Symbol),
    Interfaces(Vec<Symbol>),
    Field(FieldModel),
    Method(MethodModel),
    Attribute(Attribute),
}

#[derive(Clone, Debug, PartialEq)]
pub enum MethodElement {
    Flags(AccessFlags),
    Code(CodeModel),
    Attribute(Attribute),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldElement {
    Flags(AccessFlags),
    Attribute(Attribute),
}

/// Skips an attribute table without resolving anything, for the first pass
/// over the members of a class.
fn skip_attributes(input: &mut ByteParser<'_>) -> ClassResult<()> {
    let count = input.parse_u16()?;
    for _ in 0..count {
        input.skip(2)?;
        let len = input.parse_u32()? as usize;
        input.skip(len)?;
    }
    Ok(())
}

struct MemberSpan {
    range: Range<usize>,
    flags: AccessFlags,
    name: u16,
    descriptor: u16,
}

fn parse_member_spans(input: &mut ByteParser<'_>) -> ClassResult<Vec<MemberSpan>> {
    let count = input.parse_u16()? as usize;
    let mut spans = Vec::with_capacity(count);
    for _ in 0..count {
        let start = input.offset;
        let flags = AccessFlags(input.parse_u16()?);
        let name = input.parse_u16()?;
        let descriptor = input.parse_u16()?;
        skip_attributes(input)?;
        spans.push(MemberSpan {
            range: start..input.offset,
            flags,
            name,
            descriptor,
        });
    }
    Ok(spans)
}

#[derive(Clone)]
pub struct ClassModel {
    inner: Arc<ClassInner>,
}

struct ClassInner {
    reader: ClassReader,
    version: Version,
    flags: AccessFlags,
    this_class: Symbol,
    superclass: Option<Symbol>,
    interfaces: Vec<Symbol>,
    fields: Vec<FieldModel>,
    methods: Vec<MethodModel>,
    attributes_offset: usize,
    attributes: OnceCell<Vec<Attribute>>,
}

impl ClassModel {
    pub fn parse(bytes: Arc<[u8]>, options: Arc<Options>) -> ClassResult<ClassModel> {
        let mut input = ByteParser::new(&bytes);

        let magic = input.parse_u32()?;
        if magic != MAGIC {
            return Err(ClassError::WrongMagic(magic));
        }
        let minor = input.parse_u16()?;
        let major = input.parse_u16()?;
        let pool = Arc::new(parse_constant_pool(&mut input, bytes.clone())?);

        let flags = AccessFlags(input.parse_u16()?);
        let this_class = pool.class_name(input.parse_u16()?)?.clone();
        let superclass = pool.optional_class_name(input.parse_u16()?)?;
        let interface_count = input.parse_u16()? as usize;
        let interfaces = input.seq(interface_count, |input| -> ClassResult<Symbol> {
            Ok(pool.class_name(input.parse_u16()?)?.clone())
        })?;

        let field_spans = parse_member_spans(&mut input)?;
        let method_spans = parse_member_spans(&mut input)?;
        let attributes_offset = input.offset;
        skip_attributes(&mut input)?;
        if input.remaining() > 0 {
            return Err(ParseError::Error(input.offset).into());
        }

        let reader = ClassReader::new(bytes.clone(), pool.clone(), options, (major, minor), attributes_offset)?;
        let member = |span: MemberSpan| -> ClassResult<Arc<MemberInner>> {
            Ok(Arc::new(MemberInner {
                reader: reader.clone(),
                flags: span.flags,
                name: pool.utf8(span.name)?.clone(),
                descriptor: pool.utf8(span.descriptor)?.clone(),
                attributes_offset: span.range.start + 6,
                range: span.range,
                attributes: OnceCell::new(),
            }))
        };

        let fields = field_spans
            .into_iter()
            .map(|span| member(span).map(|inner| FieldModel { inner }))
            .collect::<ClassResult<Vec<_>>>()?;
        let methods = method_spans
            .into_iter()
            .map(|span| member(span).map(|inner| MethodModel { inner }))
            .collect::<ClassResult<Vec<_>>>()?;

        log::debug!(
            "parsed {} (version {}.{}, {} pool entries, {} fields, {} methods)",
            this_class,
            major,
            minor,
            pool.len(),
            fields.len(),
            methods.len()
        );

        Ok(ClassModel {
            inner: Arc::new(ClassInner {
                reader,
                version: Version::new(major, minor),
                flags,
                this_class,
                superclass,
                interfaces,
                fields,
                methods,
                attributes_offset,
                attributes: OnceCell::new(),
            }),
        })
    }

    pub fn reader(&self) -> &ClassReader {
        &self.inner.reader
    }

    pub fn pool(&self) -> &Arc<crate::constant::ConstantPool> {
        self.inner.reader.pool()
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        self.inner.reader.source()
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    pub fn flags(&self) -> AccessFlags {
        self.inner.flags
    }

    pub fn this_class(&self) -> Symbol {
        self.inner.this_class.clone()
    }

    pub fn superclass(&self) -> Option<Symbol> {
        self.inner.superclass.clone()
    }

    pub fn interfaces(&self) -> &[Symbol] {
        &self.inner.interfaces
    }

    pub fn fields(&self) -> &[FieldModel] {
        &self.inner.fields
    }

    pub fn methods(&self) -> &[MethodModel] {
        &self.inner.methods
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodModel> {
        self.methods()
            .iter()
            .find(|method| &*method.name() == name && &*method.descriptor() == descriptor)
    }

    pub fn attributes(&self) -> ClassResult<&[Attribute]> {
        self.inner
            .attributes
            .get_or_try_init(|| {
                self.reader()
                    .read_attributes(self.inner.attributes_offset, AttributeLocation::CLASS)
                    .map(|(attributes, _)| attributes)
            })
            .map(Vec::as_slice)
    }

    pub fn elements(&self) -> ClassResult<Vec<ClassElement>> {
        let mut elements = vec![ClassElement::Version(self.version()), ClassElement::Flags(self.flags())];
        if let Some(superclass) = self.superclass() {
            elements.push(ClassElement::Superclass(superclass));
        }
        if !self.interfaces().is_empty() {
            elements.push(ClassElement::Interfaces(self.interfaces().to_vec()));
        }
        elements.extend(self.fields().iter().cloned().map(ClassElement::Field));
        elements.extend(self.methods().iter().cloned().map(ClassElement::Method));
        elements.extend(self.attributes()?.iter().cloned().map(ClassElement::Attribute));
        Ok(elements)
    }
}

impl PartialEq for ClassModel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ClassModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassModel")
            .field("this_class", &self.inner.this_class)
            .field("version", &self.inner.version)
            .finish()
    }
}

struct MemberInner {
    reader: ClassReader,
    range: Range<usize>,
    flags: AccessFlags,
    name: Symbol,
    descriptor: Symbol,
    attributes_offset: usize,
    attributes: OnceCell<Vec<Attribute>>,
}

impl MemberInner {
    fn attributes(&self, location: AttributeLocation) -> ClassResult<&[Attribute]> {
        self.attributes
            .get_or_try_init(|| {
                self.reader
                    .read_attributes(self.attributes_offset, location)
                    .map(|(attributes, _)| attributes)
            })
            .map(Vec::as_slice)
    }

    fn raw_bytes(&self) -> &[u8] {
        &self.reader.buf()[self.range.clone()]
    }
}

macro_rules! member_accessors {
    ($model:ident) => {
        impl $model {
            pub fn flags(&self) -> AccessFlags {
                self.inner.flags
            }

            pub fn name(&self) -> Symbol {
                self.inner.name.clone()
            }

            pub fn descriptor(&self) -> Symbol {
                self.inner.descriptor.clone()
            }

            pub fn reader(&self) -> &ClassReader {
                &self.inner.reader
            }

            /// The encoded `field_info` or `method_info`, for verbatim copies.
            pub fn raw_bytes(&self) -> &[u8] {
                self.inner.raw_bytes()
            }
        }

        impl PartialEq for $model {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.inner, &other.inner)
            }
        }

        impl fmt::Debug for $model {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($model))
                    .field("name", &self.inner.name)
                    .field("descriptor", &self.inner.descriptor)
                    .finish()
            }
        }
    };
}

#[derive(Clone)]
pub struct FieldModel {
    inner: Arc<MemberInner>,
}

member_accessors!(FieldModel);

impl FieldModel {
    pub fn attributes(&self) -> ClassResult<&[Attribute]> {
        self.inner.attributes(AttributeLocation::FIELD)
    }

    pub fn elements(&self) -> ClassResult<Vec<FieldElement>> {
        let mut elements = vec![FieldElement::Flags(self.flags())];
        elements.extend(self.attributes()?.iter().cloned().map(FieldElement::Attribute));
        Ok(elements)
    }
}

#[derive(Clone)]
pub struct MethodModel {
    inner: Arc<MemberInner>,
}

member_accessors!(MethodModel);

impl MethodModel {
    pub fn attributes(&self) -> ClassResult<&[Attribute]> {
        self.inner.attributes(AttributeLocation::METHOD)
    }

    pub fn method_type(&self) -> ClassResult<MethodDescriptor> {
        MethodDescriptor::parse(&self.inner.descriptor)
    }

    pub fn code(&self) -> ClassResult<Option<CodeModel>> {
        Ok(self.attributes()?.iter().find_map(|attribute| match attribute {
            Attribute::Code(code) => Some(code.clone()),
            _ => None,
        }))
    }

    pub fn elements(&self) -> ClassResult<Vec<MethodElement>> {
        let mut elements = vec![MethodElement::Flags(self.flags())];
        for attribute in self.attributes()? {
            elements.push(match attribute {
                Attribute::Code(code) => MethodElement::Code(code.clone()),
                other => MethodElement::Attribute(other.clone()),
            });
        }
        Ok(elements)
    }
}

/// A parsed `Code` attribute. Instructions are decoded on first access, and
/// every bytecode offset maps to a [`Label`] in this model's own context.
#[derive(Clone)]
pub struct CodeModel {
    inner: Arc<CodeInner>,
}

struct CodeInner {
    reader: ClassReader,
    body: Range<usize>,
    max_stack: u16,
    max_locals: u16,
    code: Range<usize>,
    exceptions_offset: usize,
    attributes_offset: usize,
    context: u32,
    instructions: OnceCell<Vec<(u32, Instruction)>>,
    attributes: OnceCell<Vec<Attribute>>,
    elements: OnceCell<Vec<CodeElement>>,
}

impl CodeModel {
    /// Records the layout of a `Code` body of `len` bytes at `input`.
    pub(crate) fn read(reader: &ClassReader, input: &mut ByteParser<'_>, len: usize) -> ClassResult<CodeModel> {
        let start = input.offset;
        let max_stack = input.parse_u16()?;
        let max_locals = input.parse_u16()?;
        let code_len = input.parse_u32()? as usize;
        if code_len == 0 || code_len > u16::MAX as usize {
            return Err(ClassError::MalformedAttribute {
                name: "Code".into(),
                offset: start,
                reason: format!("code length {} is not between 1 and 65535", code_len),
            });
        }
        let code = input.offset..input.offset + code_len;
        input.skip(code_len)?;

        let exceptions_offset = input.offset;
        let exception_count = input.parse_u16()? as usize;
        input.skip(exception_count * 8)?;

        let attributes_offset = input.offset;
        input.offset = reader.skip_attributes(attributes_offset)?;
        if input.offset > start + len {
            return Err(ParseError::Incomplete {
                offset: start + len,
                needed: input.offset - start - len,
            }
            .into());
        }

        Ok(CodeModel {
            inner: Arc::new(CodeInner {
                reader: reader.clone(),
                body: start..start + len,
                max_stack,
                max_locals,
                code,
                exceptions_offset,
                attributes_offset,
                context: next_label_context(),
                instructions: OnceCell::new(),
                attributes: OnceCell::new(),
                elements: OnceCell::new(),
            }),
        })
    }

    pub fn reader(&self) -> &ClassReader {
        &self.inner.reader
    }

    pub fn max_stack(&self) -> u16 {
        self.inner.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.inner.max_locals
    }

    pub fn code_bytes(&self) -> &[u8] {
        &self.inner.reader.buf()[self.inner.code.clone()]
    }

    /// The encoded attribute body, without the name and length.
    pub fn raw_body(&self) -> &[u8] {
        &self.inner.reader.buf()[self.inner.body.clone()]
    }

    pub fn label_context(&self) -> u32 {
        self.inner.context
    }

    /// The label standing for bytecode offset `pc`.
    pub fn label_at(&self, pc: u32) -> Label {
        Label::new(self.inner.context, pc)
    }

    pub fn instructions(&self) -> ClassResult<&[(u32, Instruction)]> {
        self.inner
            .instructions
            .get_or_try_init(|| {
                let decoded = decode(self.reader(), self.code_bytes(), self.inner.context)?;
                log::trace!("decoded {} instructions", decoded.len());
                Ok::<_, ClassError>(decoded)
            })
            .map(Vec::as_slice)
    }

    /// Attributes of the body itself: line numbers, local variables, frames.
    pub fn attributes(&self) -> ClassResult<&[Attribute]> {
        self.inner
            .attributes
            .get_or_try_init(|| {
                self.reader()
                    .read_attributes(self.inner.attributes_offset, AttributeLocation::CODE)
                    .map(|(attributes, _)| attributes)
            })
            .map(Vec::as_slice)
    }

    pub fn exception_table(&self) -> ClassResult<Vec<ExceptionCatch>> {
        let reader = self.reader();
        let mut input = ByteParser::at(reader.buf(), self.inner.exceptions_offset);
        let count = input.parse_u16()? as usize;
        input.seq(count, |input| -> ClassResult<ExceptionCatch> {
            Ok(ExceptionCatch {
                start: self.label_at(input.parse_u16()? as u32),
                end: self.label_at(input.parse_u16()? as u32),
                handler: self.label_at(input.parse_u16()? as u32),
                catch_type: reader.pool().optional_class_name(input.parse_u16()?)?,
            })
        })
    }

    pub fn control_flow(&self) -> ClassResult<ControlFlowGraph> {
        ControlFlowGraph::build(self.instructions()?, &self.exception_table()?, self.code_bytes().len() as u32)
    }

    /// The body as an ordered sequence of elements: exception handlers and
    /// variable scopes first, then instructions with the labels and line
    /// numbers that belong before them, then remaining attributes.
    pub fn elements(&self) -> ClassResult<&[CodeElement]> {
        self.inner
            .elements
            .get_or_try_init(|| self.build_elements())
            .map(Vec::as_slice)
    }

    fn build_elements(&self) -> ClassResult<Vec<CodeElement>> {
        let options = self.reader().options();
        let instructions = self.instructions()?;
        let code_len = self.code_bytes().len() as u32;

        let mut head = vec![];
        let mut tail = vec![];
        let mut lines: BTreeMap<u32, Vec<u16>> = BTreeMap::new();
        let mut referenced = BTreeSet::new();

        for catch in self.exception_table()? {
            referenced.extend([catch.start.id(), catch.end.id(), catch.handler.id()]);
            head.push(CodeElement::ExceptionCatch(catch));
        }

        let mut variables = vec![];
        let mut variable_types = vec![];
        let mut ranges = vec![];
        for attribute in self.attributes()? {
            match attribute {
                Attribute::LineNumberTable(table) if options.line_numbers => {
                    for entry in table {
                        lines.entry(entry.start_pc as u32).or_default().push(entry.line);
                    }
                }
                Attribute::LocalVariableTable(table) if options.debug_elements => {
                    variables.extend(table.iter().map(|var| self.variable_info(var)));
                }
                Attribute::LocalVariableTypeTable(table) if options.debug_elements => {
                    variable_types.extend(table.iter().map(|var| self.variable_info(var)));
                }
                Attribute::CharacterRangeTable(table) if options.debug_elements => {
                    ranges.extend(table.iter().map(|range| CharacterRangeInfo {
                        start: self.label_at(range.start_pc as u32),
                        end: self.label_at(range.end_pc as u32 + 1),
                        range_start: range.range_start,
                        range_end: range.range_end,
                        flags: range.flags,
                    }));
                }
                Attribute::LineNumberTable(_)
                | Attribute::LocalVariableTable(_)
                | Attribute::LocalVariableTypeTable(_)
                | Attribute::CharacterRangeTable(_) => {}
                Attribute::StackMapTable(_) if options.generate_stack_maps => {}
                other => tail.push(CodeElement::Attribute(other.clone())),
            }
        }

        for var in &variables {
            referenced.extend([var.start.id(), var.end.id()]);
        }
        for var in &variable_types {
            referenced.extend([var.start.id(), var.end.id()]);
        }
        for range in &ranges {
            referenced.extend([range.start.id(), range.end.id()]);
        }
        head.extend(variables.into_iter().map(CodeElement::LocalVariable));
        head.extend(variable_types.into_iter().map(CodeElement::LocalVariableType));
        head.extend(ranges.into_iter().map(CodeElement::CharacterRange));

        for (_, instruction) in instructions {
            referenced.extend(instruction.targets().iter().map(|label| label.id()));
        }

        let boundaries: BTreeSet<u32> = instructions
            .iter()
            .map(|(pc, _)| *pc)
            .chain(std::iter::once(code_len))
            .collect();
        if let Some(bad) = referenced.iter().find(|pc| !boundaries.contains(pc)) {
            return Err(ClassError::MalformedAttribute {
                name: "Code".into(),
                offset: self.inner.code.start,
                reason: format!("offset {} is not an instruction boundary", bad),
            });
        }

        let mut elements = head;
        elements.reserve(instructions.len() * 2 + tail.len() + 1);
        for (pc, instruction) in instructions {
            if referenced.contains(pc) {
                elements.push(CodeElement::Label(self.label_at(*pc)));
            }
            if let Some(lines) = lines.get(pc) {
                elements.extend(lines.iter().map(|&line| CodeElement::LineNumber(line)));
            }
            elements.push(CodeElement::Instruction(instruction.clone()));
        }
        if referenced.contains(&code_len) {
            elements.push(CodeElement::Label(self.label_at(code_len)));
        }
        elements.extend(tail);
        Ok(elements)
    }

    fn variable_info(&self, var: &crate::attribute::LocalVariable) -> LocalVariableInfo {
        LocalVariableInfo {
            slot: var.slot,
            name: var.name.clone(),
            descriptor: var.descriptor.clone(),
            start: self.label_at(var.start_pc as u32),
            end: self.label_at(var.start_pc as u32 + var.length as u32),
        }
    }
}

impl PartialEq for CodeModel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeModel")
            .field("max_stack", &self.inner.max_stack)
            .field("max_locals", &self.inner.max_locals)
            .field("code_len", &self.inner.code.len())
            .finish()
    }
}
