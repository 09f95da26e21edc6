//! The attribute registry: one [`AttributeMapper`] per attribute name, each
//! knowing how to read and write the body of that attribute and where the
//! attribute may appear.

use crate::{
    access::AccessFlags,
    attribute::*,
    constant::{write_loadable, Constant, Symbol},
    model::CodeModel,
    parse::ByteParser,
    reader::ClassReader,
    writer::BufWriter,
    ClassError, ClassResult,
};
use lazy_static::lazy_static;
use std::{collections::HashMap, fmt, ops::BitOr, sync::Arc};

/// A set of places an attribute may appear.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AttributeLocation(u8);

impl AttributeLocation {
    pub const CLASS: AttributeLocation = AttributeLocation(1);
    pub const FIELD: AttributeLocation = AttributeLocation(2);
    pub const METHOD: AttributeLocation = AttributeLocation(4);
    pub const CODE: AttributeLocation = AttributeLocation(8);
    pub const RECORD_COMPONENT: AttributeLocation = AttributeLocation(16);
    pub const MEMBERS: AttributeLocation = AttributeLocation(1 | 2 | 4);
    pub const ANY: AttributeLocation = AttributeLocation(1 | 2 | 4 | 8 | 16);

    pub fn contains(self, other: AttributeLocation) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AttributeLocation {
    type Output = AttributeLocation;

    fn bitor(self, other: Self) -> Self {
        AttributeLocation(self.0 | other.0)
    }
}

impl fmt::Display for AttributeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [(1, "class"), (2, "field"), (4, "method"), (8, "code"), (16, "record component")];
        let mut first = true;
        for (bit, name) in names {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, "/")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Reads and writes the body of one kind of attribute. The six-byte header
/// (name index and length) is handled by the caller.
pub trait AttributeMapper: Send + Sync {
    fn name(&self) -> &str;

    fn locations(&self) -> AttributeLocation {
        AttributeLocation::ANY
    }

    /// The first class file major version the attribute is defined for.
    fn min_version(&self) -> u16 {
        45
    }

    fn allow_multiple(&self) -> bool {
        false
    }

    /// Reads a body of `len` bytes. `input` is bounded to the body, and its
    /// offsets are positions in the whole class file.
    fn read(&self, reader: &ClassReader, input: &mut ByteParser<'_>, len: usize) -> ClassResult<Attribute>;

    fn write(&self, attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()>;
}

type ReadFn = fn(&ClassReader, &mut ByteParser<'_>, usize) -> ClassResult<Attribute>;
type WriteFn = fn(&Attribute, &mut BufWriter<'_>) -> ClassResult<()>;

struct StandardMapper {
    name: &'static str,
    locations: AttributeLocation,
    min_version: u16,
    allow_multiple: bool,
    read: ReadFn,
    write: WriteFn,
}

impl AttributeMapper for StandardMapper {
    fn name(&self) -> &str {
        self.name
    }

    fn locations(&self) -> AttributeLocation {
        self.locations
    }

    fn min_version(&self) -> u16 {
        self.min_version
    }

    fn allow_multiple(&self) -> bool {
        self.allow_multiple
    }

    fn read(&self, reader: &ClassReader, input: &mut ByteParser<'_>, len: usize) -> ClassResult<Attribute> {
        (self.read)(reader, input, len)
    }

    fn write(&self, attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
        (self.write)(attribute, out)
    }
}

macro_rules! standard_mappers {
    ($($name:literal, $locations:expr, $version:literal, $multiple:literal => $read:ident, $write:ident;)*) => {
        lazy_static! {
            static ref STANDARD_MAPPERS: HashMap<&'static str, Arc<dyn AttributeMapper>> = {
                let mut map: HashMap<&'static str, Arc<dyn AttributeMapper>> = HashMap::new();
                $(map.insert($name, Arc::new(StandardMapper {
                    name: $name,
                    locations: $locations,
                    min_version: $version,
                    allow_multiple: $multiple,
                    read: $read,
                    write: $write,
                }));)*
                map
            };
        }
    };
}

use self::AttributeLocation as At;

standard_mappers! {
    "ConstantValue", At::FIELD, 45, false => read_constant_value, write_constant_value;
    "Code", At::METHOD, 45, false => read_code, write_code;
    "StackMapTable", At::CODE, 50, false => read_stack_map_table, write_stack_map_table;
    "Exceptions", At::METHOD, 45, false => read_exceptions, write_exceptions;
    "InnerClasses", At::CLASS, 45, false => read_inner_classes, write_inner_classes;
    "EnclosingMethod", At::CLASS, 49, false => read_enclosing_method, write_enclosing_method;
    "Synthetic", At::MEMBERS, 45, false => read_synthetic, write_empty;
    "Deprecated", At::MEMBERS, 45, false => read_deprecated, write_empty;
    "Signature", At::MEMBERS | At::RECORD_COMPONENT, 49, false => read_signature, write_signature;
    "SourceFile", At::CLASS, 45, false => read_source_file, write_source_file;
    "SourceDebugExtension", At::CLASS, 49, false => read_source_debug_extension, write_source_debug_extension;
    "LineNumberTable", At::CODE, 45, true => read_line_number_table, write_line_number_table;
    "LocalVariableTable", At::CODE, 45, true => read_local_variable_table, write_local_variable_table;
    "LocalVariableTypeTable", At::CODE, 49, true => read_local_variable_type_table, write_local_variable_table;
    "CharacterRangeTable", At::CODE, 45, true => read_character_range_table, write_character_range_table;
    "RuntimeVisibleAnnotations", At::MEMBERS | At::RECORD_COMPONENT, 49, false => read_visible_annotations, write_annotations_attribute;
    "RuntimeInvisibleAnnotations", At::MEMBERS | At::RECORD_COMPONENT, 49, false => read_invisible_annotations, write_annotations_attribute;
    "RuntimeVisibleParameterAnnotations", At::METHOD, 49, false => read_visible_parameter_annotations, write_parameter_annotations_attribute;
    "RuntimeInvisibleParameterAnnotations", At::METHOD, 49, false => read_invisible_parameter_annotations, write_parameter_annotations_attribute;
    "AnnotationDefault", At::METHOD, 49, false => read_annotation_default, write_annotation_default;
    "RuntimeVisibleTypeAnnotations", At::ANY, 52, false => read_visible_type_annotations, write_type_annotations_attribute;
    "RuntimeInvisibleTypeAnnotations", At::ANY, 52, false => read_invisible_type_annotations, write_type_annotations_attribute;
    "BootstrapMethods", At::CLASS, 51, false => read_bootstrap_methods, write_bootstrap_methods;
    "MethodParameters", At::METHOD, 52, false => read_method_parameters, write_method_parameters;
    "NestHost", At::CLASS, 55, false => read_nest_host, write_nest_host;
    "NestMembers", At::CLASS, 55, false => read_nest_members, write_class_list;
    "PermittedSubclasses", At::CLASS, 61, false => read_permitted_subclasses, write_class_list;
    "ModulePackages", At::CLASS, 53, false => read_module_packages, write_module_packages;
    "ModuleMainClass", At::CLASS, 53, false => read_module_main_class, write_module_main_class;
    "Module", At::CLASS, 53, false => read_module, write_module;
    "Record", At::CLASS, 60, false => read_record, write_record;
}

/// Looks up the mapper of a standard attribute.
pub fn standard_mapper(name: &str) -> Option<Arc<dyn AttributeMapper>> {
    STANDARD_MAPPERS.get(name).cloned()
}

pub fn standard_mapper_names() -> impl Iterator<Item = &'static str> {
    STANDARD_MAPPERS.keys().copied()
}

fn mismatch(expected: &str, found: &Attribute) -> ClassError {
    ClassError::illegal(format!(
        "the `{}` mapper cannot write a `{}` attribute",
        expected,
        found.name()
    ))
}

fn read_class_list(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<Vec<Symbol>> {
    let len = input.parse_u16()? as usize;
    input.seq(len, |input| Ok::<_, ClassError>(reader.pool().class_name(input.parse_u16()?)?.clone()))
}

fn write_classes(out: &mut BufWriter<'_>, classes: &[Symbol]) -> ClassResult<()> {
    out.write_count(classes.len(), "classes")?;
    for class in classes {
        out.write_class_index(class);
    }
    Ok(())
}

fn read_constant_value(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let index = input.parse_u16()?;
    match reader.pool().entry(index)? {
        Constant::Integer(_) | Constant::Float(_) | Constant::Long(_) | Constant::Double(_) | Constant::String(_) => {
            Ok(Attribute::ConstantValue(reader.loadable(index)?))
        }
        other => Err(ClassError::WrongPoolTag {
            index,
            expected: "constant value",
            found: other.describe(),
        }),
    }
}

fn write_constant_value(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::ConstantValue(value) => {
            write_loadable(out, value);
            Ok(())
        }
        other => Err(mismatch("ConstantValue", other)),
    }
}

fn read_code(reader: &ClassReader, input: &mut ByteParser<'_>, len: usize) -> ClassResult<Attribute> {
    CodeModel::read(reader, input, len).map(Attribute::Code)
}

fn write_code(attribute: &Attribute, _: &mut BufWriter<'_>) -> ClassResult<()> {
    Err(ClassError::illegal(format!(
        "`{}` can only be written by a method builder",
        attribute.name()
    )))
}

fn read_stack_map_table(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let len = input.parse_u16()? as usize;
    let frames = input.seq(len, |input| parse_stack_map_frame(reader, input))?;
    Ok(Attribute::StackMapTable(frames))
}

fn write_stack_map_table(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::StackMapTable(frames) => {
            out.write_count(frames.len(), "stack map frames")?;
            for frame in frames {
                write_stack_map_frame(out, frame)?;
            }
            Ok(())
        }
        other => Err(mismatch("StackMapTable", other)),
    }
}

fn read_exceptions(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    read_class_list(reader, input).map(Attribute::Exceptions)
}

fn write_exceptions(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::Exceptions(classes) => write_classes(out, classes),
        other => Err(mismatch("Exceptions", other)),
    }
}

fn read_inner_classes(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let pool = reader.pool();
    let len = input.parse_u16()? as usize;
    let classes = input.seq(len, |input| {
        Ok::<_, ClassError>(InnerClassInfo {
            inner: pool.class_name(input.parse_u16()?)?.clone(),
            outer: pool.optional_class_name(input.parse_u16()?)?,
            name: pool.optional_utf8(input.parse_u16()?)?,
            flags: AccessFlags(input.parse_u16()?),
        })
    })?;
    Ok(Attribute::InnerClasses(classes))
}

fn write_inner_classes(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::InnerClasses(classes) => {
            out.write_count(classes.len(), "inner classes")?;
            for class in classes {
                out.write_class_index(&class.inner);
                out.write_optional_class_index(class.outer.as_deref());
                out.write_optional_utf8_index(class.name.as_deref());
                out.write_u16(class.flags.into_raw());
            }
            Ok(())
        }
        other => Err(mismatch("InnerClasses", other)),
    }
}

fn read_enclosing_method(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let class = reader.pool().class_name(input.parse_u16()?)?.clone();
    let method = match input.parse_u16()? {
        0 => None,
        index => Some(reader.pool().name_and_type(index)?),
    };
    Ok(Attribute::EnclosingMethod { class, method })
}

fn write_enclosing_method(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::EnclosingMethod { class, method } => {
            out.write_class_index(class);
            match method {
                Some((name, descriptor)) => {
                    let index = out.pool().name_and_type(name, descriptor);
                    out.write_index(index);
                }
                None => out.write_u16(0),
            }
            Ok(())
        }
        other => Err(mismatch("EnclosingMethod", other)),
    }
}

fn read_synthetic(_: &ClassReader, _: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    Ok(Attribute::Synthetic)
}

fn read_deprecated(_: &ClassReader, _: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    Ok(Attribute::Deprecated)
}

fn write_empty(attribute: &Attribute, _: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::Synthetic | Attribute::Deprecated => Ok(()),
        other => Err(mismatch("Synthetic", other)),
    }
}

fn read_signature(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    Ok(Attribute::Signature(reader.pool().utf8(input.parse_u16()?)?.clone()))
}

fn write_signature(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::Signature(signature) => {
            out.write_utf8_index(signature);
            Ok(())
        }
        other => Err(mismatch("Signature", other)),
    }
}

fn read_source_file(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    Ok(Attribute::SourceFile(reader.pool().utf8(input.parse_u16()?)?.clone()))
}

fn write_source_file(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::SourceFile(file) => {
            out.write_utf8_index(file);
            Ok(())
        }
        other => Err(mismatch("SourceFile", other)),
    }
}

fn read_source_debug_extension(_: &ClassReader, input: &mut ByteParser<'_>, len: usize) -> ClassResult<Attribute> {
    Ok(Attribute::SourceDebugExtension(input.take(len)?.to_vec()))
}

fn write_source_debug_extension(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::SourceDebugExtension(data) => {
            out.write_bytes(data);
            Ok(())
        }
        other => Err(mismatch("SourceDebugExtension", other)),
    }
}

fn read_line_number_table(_: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let len = input.parse_u16()? as usize;
    let lines = input.seq(len, |input| {
        Ok::<_, ClassError>(LineNumberInfo {
            start_pc: input.parse_u16()?,
            line: input.parse_u16()?,
        })
    })?;
    Ok(Attribute::LineNumberTable(lines))
}

fn write_line_number_table(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::LineNumberTable(lines) => {
            out.write_count(lines.len(), "line numbers")?;
            for line in lines {
                out.write_u16(line.start_pc);
                out.write_u16(line.line);
            }
            Ok(())
        }
        other => Err(mismatch("LineNumberTable", other)),
    }
}

fn parse_local_variables(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<Vec<LocalVariable>> {
    let pool = reader.pool();
    let len = input.parse_u16()? as usize;
    input.seq(len, |input| {
        Ok::<_, ClassError>(LocalVariable {
            start_pc: input.parse_u16()?,
            length: input.parse_u16()?,
            name: pool.utf8(input.parse_u16()?)?.clone(),
            descriptor: pool.utf8(input.parse_u16()?)?.clone(),
            slot: input.parse_u16()?,
        })
    })
}

fn read_local_variable_table(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    parse_local_variables(reader, input).map(Attribute::LocalVariableTable)
}

fn read_local_variable_type_table(
    reader: &ClassReader,
    input: &mut ByteParser<'_>,
    _: usize,
) -> ClassResult<Attribute> {
    parse_local_variables(reader, input).map(Attribute::LocalVariableTypeTable)
}

fn write_local_variable_table(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::LocalVariableTable(vars) | Attribute::LocalVariableTypeTable(vars) => {
            out.write_count(vars.len(), "local variables")?;
            for var in vars {
                out.write_u16(var.start_pc);
                out.write_u16(var.length);
                out.write_utf8_index(&var.name);
                out.write_utf8_index(&var.descriptor);
                out.write_u16(var.slot);
            }
            Ok(())
        }
        other => Err(mismatch("LocalVariableTable", other)),
    }
}

fn read_character_range_table(_: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let len = input.parse_u16()? as usize;
    let ranges = input.seq(len, |input| {
        Ok::<_, ClassError>(CharacterRange {
            start_pc: input.parse_u16()?,
            end_pc: input.parse_u16()?,
            range_start: input.parse_u32()?,
            range_end: input.parse_u32()?,
            flags: input.parse_u16()?,
        })
    })?;
    Ok(Attribute::CharacterRangeTable(ranges))
}

fn write_character_range_table(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::CharacterRangeTable(ranges) => {
            out.write_count(ranges.len(), "character ranges")?;
            for range in ranges {
                out.write_u16(range.start_pc);
                out.write_u16(range.end_pc);
                out.write_u32(range.range_start);
                out.write_u32(range.range_end);
                out.write_u16(range.flags);
            }
            Ok(())
        }
        other => Err(mismatch("CharacterRangeTable", other)),
    }
}

fn read_visible_annotations(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    parse_annotations(reader, input).map(Attribute::RuntimeVisibleAnnotations)
}

fn read_invisible_annotations(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    parse_annotations(reader, input).map(Attribute::RuntimeInvisibleAnnotations)
}

fn write_annotations_attribute(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::RuntimeVisibleAnnotations(annotations) | Attribute::RuntimeInvisibleAnnotations(annotations) => {
            write_annotations(out, annotations)
        }
        other => Err(mismatch("RuntimeVisibleAnnotations", other)),
    }
}

fn read_visible_type_annotations(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    parse_type_annotations(reader, input).map(Attribute::RuntimeVisibleTypeAnnotations)
}

fn read_invisible_type_annotations(
    reader: &ClassReader,
    input: &mut ByteParser<'_>,
    _: usize,
) -> ClassResult<Attribute> {
    parse_type_annotations(reader, input).map(Attribute::RuntimeInvisibleTypeAnnotations)
}

fn write_type_annotations_attribute(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::RuntimeVisibleTypeAnnotations(annotations)
        | Attribute::RuntimeInvisibleTypeAnnotations(annotations) => write_type_annotations(out, annotations),
        other => Err(mismatch("RuntimeVisibleTypeAnnotations", other)),
    }
}

fn read_visible_parameter_annotations(
    reader: &ClassReader,
    input: &mut ByteParser<'_>,
    _: usize,
) -> ClassResult<Attribute> {
    parse_parameter_annotations(reader, input).map(Attribute::RuntimeVisibleParameterAnnotations)
}

fn read_invisible_parameter_annotations(
    reader: &ClassReader,
    input: &mut ByteParser<'_>,
    _: usize,
) -> ClassResult<Attribute> {
    parse_parameter_annotations(reader, input).map(Attribute::RuntimeInvisibleParameterAnnotations)
}

fn write_parameter_annotations_attribute(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::RuntimeVisibleParameterAnnotations(parameters)
        | Attribute::RuntimeInvisibleParameterAnnotations(parameters) => write_parameter_annotations(out, parameters),
        other => Err(mismatch("RuntimeVisibleParameterAnnotations", other)),
    }
}

fn read_annotation_default(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    parse_element_value(reader, input).map(Attribute::AnnotationDefault)
}

fn write_annotation_default(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::AnnotationDefault(value) => write_element_value(out, value),
        other => Err(mismatch("AnnotationDefault", other)),
    }
}

fn read_bootstrap_methods(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let len = input.parse_u16()? as usize;
    let mut methods = Vec::with_capacity(len);
    for index in 0..len {
        // Entries resolve through the reader's table of raw indices.
        input.skip(2)?;
        let argc = input.parse_u16()? as usize;
        input.skip(argc * 2)?;
        methods.push((*reader.bootstrap_method(index as u16)?).clone());
    }
    Ok(Attribute::BootstrapMethods(methods))
}

fn write_bootstrap_methods(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::BootstrapMethods(methods) => {
            out.write_count(methods.len(), "bootstrap methods")?;
            for method in methods {
                let handle = out.pool().method_handle(&method.handle);
                out.write_index(handle);
                out.write_count(method.arguments.len(), "bootstrap arguments")?;
                for argument in &method.arguments {
                    write_loadable(out, argument);
                }
            }
            Ok(())
        }
        other => Err(mismatch("BootstrapMethods", other)),
    }
}

fn read_method_parameters(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let len = input.parse_u8()? as usize;
    let parameters = input.seq(len, |input| {
        Ok::<_, ClassError>(MethodParameter {
            name: reader.pool().optional_utf8(input.parse_u16()?)?,
            flags: AccessFlags(input.parse_u16()?),
        })
    })?;
    Ok(Attribute::MethodParameters(parameters))
}

fn write_method_parameters(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::MethodParameters(parameters) => {
            if parameters.len() > u8::MAX as usize {
                return Err(ClassError::illegal("more than 255 method parameters"));
            }
            out.write_u8(parameters.len() as u8);
            for parameter in parameters {
                out.write_optional_utf8_index(parameter.name.as_deref());
                out.write_u16(parameter.flags.into_raw());
            }
            Ok(())
        }
        other => Err(mismatch("MethodParameters", other)),
    }
}

fn read_nest_host(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    Ok(Attribute::NestHost(reader.pool().class_name(input.parse_u16()?)?.clone()))
}

fn write_nest_host(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::NestHost(class) => {
            out.write_class_index(class);
            Ok(())
        }
        other => Err(mismatch("NestHost", other)),
    }
}

fn read_nest_members(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    read_class_list(reader, input).map(Attribute::NestMembers)
}

fn read_permitted_subclasses(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    read_class_list(reader, input).map(Attribute::PermittedSubclasses)
}

fn write_class_list(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::NestMembers(classes) | Attribute::PermittedSubclasses(classes) => write_classes(out, classes),
        other => Err(mismatch("NestMembers", other)),
    }
}

fn read_module_packages(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let pool = reader.pool();
    let len = input.parse_u16()? as usize;
    let packages = input.seq(len, |input| Ok::<_, ClassError>(pool.package_name(input.parse_u16()?)?.clone()))?;
    Ok(Attribute::ModulePackages(packages))
}

fn write_module_packages(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::ModulePackages(packages) => {
            out.write_count(packages.len(), "packages")?;
            for package in packages {
                let index = out.pool().package(package);
                out.write_index(index);
            }
            Ok(())
        }
        other => Err(mismatch("ModulePackages", other)),
    }
}

fn read_module_main_class(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    Ok(Attribute::ModuleMainClass(reader.pool().class_name(input.parse_u16()?)?.clone()))
}

fn write_module_main_class(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::ModuleMainClass(class) => {
            out.write_class_index(class);
            Ok(())
        }
        other => Err(mismatch("ModuleMainClass", other)),
    }
}

// Module {
//     u2 name; u2 flags; u2 version;
//     u2 requires_count; { u2 module; u2 flags; u2 version; }[requires_count]
//     u2 exports_count;  { u2 package; u2 flags; u2 to_count; u2 to[to_count]; }[exports_count]
//     u2 opens_count;    (same layout as exports)
//     u2 uses_count;     u2 uses[uses_count]
//     u2 provides_count; { u2 service; u2 with_count; u2 with[with_count]; }[provides_count]
// }

fn read_module_exports(reader: &ClassReader, input: &mut ByteParser<'_>) -> ClassResult<Vec<ModuleExport>> {
    let pool = reader.pool();
    let len = input.parse_u16()? as usize;
    input.seq(len, |input| {
        let package = pool.package_name(input.parse_u16()?)?.clone();
        let flags = AccessFlags(input.parse_u16()?);
        let count = input.parse_u16()? as usize;
        let to = input.seq(count, |input| Ok::<_, ClassError>(pool.module_name(input.parse_u16()?)?.clone()))?;
        Ok::<_, ClassError>(ModuleExport { package, flags, to })
    })
}

fn read_module(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let pool = reader.pool();
    let name = pool.module_name(input.parse_u16()?)?.clone();
    let flags = AccessFlags(input.parse_u16()?);
    let version = pool.optional_utf8(input.parse_u16()?)?;

    let len = input.parse_u16()? as usize;
    let requires = input.seq(len, |input| {
        Ok::<_, ClassError>(ModuleRequire {
            module: pool.module_name(input.parse_u16()?)?.clone(),
            flags: AccessFlags(input.parse_u16()?),
            version: pool.optional_utf8(input.parse_u16()?)?,
        })
    })?;
    let exports = read_module_exports(reader, input)?;
    let opens = read_module_exports(reader, input)?;
    let uses = read_class_list(reader, input)?;

    let len = input.parse_u16()? as usize;
    let provides = input.seq(len, |input| {
        Ok::<_, ClassError>(ModuleProvide {
            service: pool.class_name(input.parse_u16()?)?.clone(),
            with: read_class_list(reader, input)?,
        })
    })?;

    Ok(Attribute::Module(Box::new(ModuleInfo {
        name,
        flags,
        version,
        requires,
        exports,
        opens,
        uses,
        provides,
    })))
}

fn write_module_exports(out: &mut BufWriter<'_>, exports: &[ModuleExport]) -> ClassResult<()> {
    out.write_count(exports.len(), "module exports")?;
    for export in exports {
        let package = out.pool().package(&export.package);
        out.write_index(package);
        out.write_u16(export.flags.into_raw());
        out.write_count(export.to.len(), "export targets")?;
        for module in &export.to {
            let index = out.pool().module(module);
            out.write_index(index);
        }
    }
    Ok(())
}

fn write_module(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    let module = match attribute {
        Attribute::Module(module) => module,
        other => return Err(mismatch("Module", other)),
    };

    let name = out.pool().module(&module.name);
    out.write_index(name);
    out.write_u16(module.flags.into_raw());
    out.write_optional_utf8_index(module.version.as_deref());

    out.write_count(module.requires.len(), "module requires")?;
    for require in &module.requires {
        let index = out.pool().module(&require.module);
        out.write_index(index);
        out.write_u16(require.flags.into_raw());
        out.write_optional_utf8_index(require.version.as_deref());
    }
    write_module_exports(out, &module.exports)?;
    write_module_exports(out, &module.opens)?;
    write_classes(out, &module.uses)?;

    out.write_count(module.provides.len(), "module provides")?;
    for provide in &module.provides {
        out.write_class_index(&provide.service);
        write_classes(out, &provide.with)?;
    }
    Ok(())
}

fn read_record(reader: &ClassReader, input: &mut ByteParser<'_>, _: usize) -> ClassResult<Attribute> {
    let len = input.parse_u16()? as usize;
    let mut components = Vec::with_capacity(len);
    for _ in 0..len {
        let name = reader.pool().utf8(input.parse_u16()?)?.clone();
        let descriptor = reader.pool().utf8(input.parse_u16()?)?.clone();
        let (attributes, end) = reader.read_attributes(input.offset, AttributeLocation::RECORD_COMPONENT)?;
        input.offset = end;
        components.push(RecordComponent {
            name,
            descriptor,
            attributes,
        });
    }
    Ok(Attribute::Record(components))
}

fn write_record(attribute: &Attribute, out: &mut BufWriter<'_>) -> ClassResult<()> {
    match attribute {
        Attribute::Record(components) => {
            out.write_count(components.len(), "record components")?;
            for component in components {
                out.write_utf8_index(&component.name);
                out.write_utf8_index(&component.descriptor);
                out.write_attributes(&component.attributes)?;
            }
            Ok(())
        }
        other => Err(mismatch("Record", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constant::{parse_constant_pool, BootstrapMethodRef, LoadableConstant, MemberRef, MethodHandleKind, MethodHandleRef},
        options::Options,
        pool::PoolBuilder,
    };

    /// Writes `attribute` as the only class attribute after a fresh pool,
    /// then reads its body back through `mapper`. Returns the body bytes,
    /// the value read back and the reader.
    fn write_then_read(mapper: &dyn AttributeMapper, attribute: &Attribute) -> (Vec<u8>, Attribute, ClassReader) {
        let mut pool = PoolBuilder::new();
        let name = pool.utf8(mapper.name());
        let mut out = BufWriter::new(&mut pool);
        mapper.write(attribute, &mut out).unwrap();
        let body = out.into_bytes();

        let mut buf = vec![];
        pool.write(&mut buf).unwrap();
        let attributes_at = buf.len();
        buf.extend_from_slice(&[0, 1]);
        buf.extend_from_slice(&name.to_be_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        let start = buf.len();
        buf.extend_from_slice(&body);

        let source: Arc<[u8]> = buf.into();
        let parsed = parse_constant_pool(&mut ByteParser::new(&source), source.clone()).unwrap();
        let reader = ClassReader::new(
            source.clone(),
            Arc::new(parsed),
            Arc::new(Options::new()),
            (61, 0),
            attributes_at,
        )
        .unwrap();
        let mut input = ByteParser::at(&source, start);
        let read = mapper.read(&reader, &mut input, body.len()).unwrap();
        assert_eq!(input.offset, source.len(), "{} left bytes unread", mapper.name());
        (body, read, reader)
    }

    fn annotation(ty: &str) -> Annotation {
        Annotation {
            ty: ty.into(),
            elements: vec![
                AnnotationElement {
                    name: "value".into(),
                    value: ElementValue::Array(vec![
                        ElementValue::Int { tag: b'I', value: 7 },
                        ElementValue::String("seven".into()),
                    ]),
                },
                AnnotationElement {
                    name: "kind".into(),
                    value: ElementValue::Enum {
                        ty: "Ldemo/Kind;".into(),
                        name: "FAST".into(),
                    },
                },
            ],
        }
    }

    fn sample_attributes() -> Vec<Attribute> {
        let metafactory = MethodHandleRef {
            kind: MethodHandleKind::InvokeStatic,
            member: MemberRef::new("demo/Factory", "make", "()Ljava/lang/Object;"),
            interface: false,
        };
        vec![
            Attribute::InnerClasses(vec![
                InnerClassInfo {
                    inner: "demo/Outer$Inner".into(),
                    outer: Some("demo/Outer".into()),
                    name: Some("Inner".into()),
                    flags: AccessFlags(0x0008),
                },
                InnerClassInfo {
                    inner: "demo/Outer$1".into(),
                    outer: None,
                    name: None,
                    flags: AccessFlags(0),
                },
            ]),
            Attribute::EnclosingMethod {
                class: "demo/Outer".into(),
                method: Some(("run".into(), "()V".into())),
            },
            Attribute::EnclosingMethod {
                class: "demo/Outer".into(),
                method: None,
            },
            Attribute::BootstrapMethods(vec![BootstrapMethodRef {
                handle: metafactory,
                arguments: vec![
                    LoadableConstant::MethodType("()V".into()),
                    LoadableConstant::String("tag".into()),
                    LoadableConstant::Integer(3),
                ],
            }]),
            Attribute::RuntimeVisibleAnnotations(vec![annotation("Ldemo/Visible;")]),
            Attribute::RuntimeInvisibleAnnotations(vec![annotation("Ldemo/Invisible;")]),
            Attribute::RuntimeVisibleParameterAnnotations(vec![vec![annotation("Ldemo/P;")], vec![]]),
            Attribute::RuntimeInvisibleParameterAnnotations(vec![vec![], vec![annotation("Ldemo/Q;")]]),
            Attribute::AnnotationDefault(ElementValue::Class("Ljava/lang/String;".into())),
            Attribute::MethodParameters(vec![
                MethodParameter {
                    name: Some("first".into()),
                    flags: AccessFlags(0x0010),
                },
                MethodParameter {
                    name: None,
                    flags: AccessFlags(0x1000),
                },
            ]),
            Attribute::NestHost("demo/Outer".into()),
            Attribute::NestMembers(vec!["demo/Outer$Inner".into(), "demo/Outer$1".into()]),
            Attribute::PermittedSubclasses(vec!["demo/Circle".into()]),
            Attribute::CharacterRangeTable(vec![CharacterRange {
                start_pc: 0,
                end_pc: 4,
                range_start: 0x0001_0002,
                range_end: 0x0001_0010,
                flags: 0x0001,
            }]),
            Attribute::LocalVariableTypeTable(vec![LocalVariable {
                start_pc: 0,
                length: 9,
                name: "items".into(),
                descriptor: "Ljava/util/List<Ljava/lang/String;>;".into(),
                slot: 1,
            }]),
            Attribute::SourceDebugExtension(b"SMAP\nDemo.kt\n".to_vec()),
            Attribute::ModulePackages(vec!["demo/api".into(), "demo/impl".into()]),
            Attribute::ModuleMainClass("demo/Main".into()),
            Attribute::Synthetic,
            Attribute::RuntimeVisibleTypeAnnotations(vec![
                TypeAnnotation {
                    target: TypeAnnotationTarget::Supertype(0xffff),
                    path: vec![],
                    annotation: annotation("Ldemo/NonNull;"),
                },
                TypeAnnotation {
                    target: TypeAnnotationTarget::LocalVariable {
                        target_type: 0x40,
                        table: vec![LocalVariableTarget {
                            start_pc: 2,
                            length: 6,
                            slot: 3,
                        }],
                    },
                    path: vec![TypePathEntry { kind: 3, argument: 0 }],
                    annotation: annotation("Ldemo/NonNull;"),
                },
            ]),
            Attribute::RuntimeInvisibleTypeAnnotations(vec![TypeAnnotation {
                target: TypeAnnotationTarget::TypeArgument {
                    target_type: 0x47,
                    offset: 12,
                    index: 0,
                },
                path: vec![],
                annotation: annotation("Ldemo/Tainted;"),
            }]),
            Attribute::Module(Box::new(ModuleInfo {
                name: "demo.app".into(),
                flags: AccessFlags(0x0020),
                version: Some("1.0".into()),
                requires: vec![ModuleRequire {
                    module: "java.base".into(),
                    flags: AccessFlags(0x8000),
                    version: None,
                }],
                exports: vec![ModuleExport {
                    package: "demo/api".into(),
                    flags: AccessFlags(0),
                    to: vec![],
                }],
                opens: vec![ModuleExport {
                    package: "demo/impl".into(),
                    flags: AccessFlags(0),
                    to: vec!["demo.tests".into()],
                }],
                uses: vec!["demo/api/Plugin".into()],
                provides: vec![ModuleProvide {
                    service: "demo/api/Plugin".into(),
                    with: vec!["demo/impl/Default".into()],
                }],
            })),
            Attribute::Record(vec![
                RecordComponent {
                    name: "x".into(),
                    descriptor: "I".into(),
                    attributes: vec![],
                },
                RecordComponent {
                    name: "tags".into(),
                    descriptor: "Ljava/util/List;".into(),
                    attributes: vec![
                        Attribute::Signature("Ljava/util/List<Ljava/lang/String;>;".into()),
                        Attribute::RuntimeVisibleAnnotations(vec![annotation("Ldemo/Component;")]),
                    ],
                },
            ]),
        ]
    }

    #[test]
    fn mappers_write_back_what_they_read() {
        for attribute in sample_attributes() {
            let mapper = standard_mapper(attribute.name()).unwrap();
            let (body, read, reader) = write_then_read(&*mapper, &attribute);
            assert_eq!(read, attribute);

            let mut pool = PoolBuilder::shared(reader.pool().clone(), reader.raw_bootstrap_methods().unwrap());
            let mut out = BufWriter::new(&mut pool);
            mapper.write(&read, &mut out).unwrap();
            assert_eq!(out.bytes(), &body[..], "{}", attribute.name());
        }
    }

    #[test]
    fn unknown_type_annotation_targets_are_rejected() {
        let mapper = standard_mapper("RuntimeVisibleTypeAnnotations").unwrap();
        let attribute = Attribute::RuntimeVisibleTypeAnnotations(vec![TypeAnnotation {
            target: TypeAnnotationTarget::Empty { target_type: 0x13 },
            path: vec![],
            annotation: annotation("Ldemo/A;"),
        }]);
        let (mut body, _, reader) = write_then_read(&*mapper, &attribute);
        body[2] = 0x30;
        let err = mapper.read(&reader, &mut ByteParser::new(&body), body.len()).unwrap_err();
        assert!(matches!(err, ClassError::UnknownTypeAnnotationTarget(0x30)));
    }

    #[test]
    fn registry_metadata() {
        let code = standard_mapper("Code").unwrap();
        assert_eq!(code.locations(), AttributeLocation::METHOD);
        assert!(!code.allow_multiple());

        let lines = standard_mapper("LineNumberTable").unwrap();
        assert!(lines.allow_multiple());
        assert!(lines.locations().contains(AttributeLocation::CODE));

        assert_eq!(standard_mapper("NestHost").unwrap().min_version(), 55);
        assert!(standard_mapper("RuntimeVisibleTypeAnnotations")
            .unwrap()
            .locations()
            .contains(AttributeLocation::CODE));
        assert_eq!(standard_mapper("Record").unwrap().min_version(), 60);
        assert_eq!(standard_mapper_names().count(), 31);
    }

    #[test]
    fn location_display() {
        assert_eq!(AttributeLocation::METHOD.to_string(), "method");
        assert_eq!(AttributeLocation::MEMBERS.to_string(), "class/field/method");
        assert!(AttributeLocation::MEMBERS.contains(AttributeLocation::FIELD));
        assert!(!AttributeLocation::MEMBERS.contains(AttributeLocation::CODE));
    }

    #[test]
    fn mapper_rejects_other_attributes() {
        let mut pool = crate::pool::PoolBuilder::new();
        let mut out = BufWriter::new(&mut pool);
        let mapper = standard_mapper("SourceFile").unwrap();
        assert!(mapper.write(&Attribute::Deprecated, &mut out).is_err());
        mapper.write(&Attribute::SourceFile("A.java".into()), &mut out).unwrap();
        assert_eq!(out.bytes(), &[0, 1]);
    }
}
