use crate::{
    attribute::Attribute,
    constant::{BootstrapMethodRef, Constant, ConstantPool, DynamicRef, LoadableConstant, PoolIndex, Symbol},
    mapper::{standard_mapper, AttributeLocation, AttributeMapper},
    options::Options,
    parse::ByteParser,
    pool::RawBootstrapMethod,
    ClassError, ClassResult,
};
use byteorder::{BigEndian, ByteOrder};
use once_cell::sync::OnceCell;
use std::{collections::HashSet, sync::Arc};

/// Dynamic constants may take other dynamic constants as bootstrap
/// arguments; this bounds how deep resolution goes.
const MAX_DYNAMIC_DEPTH: usize = 32;

/// Random access to the bytes of one class file, together with its parsed
/// constant pool and the options it is being processed with. Cheap to clone;
/// every model of a class shares one reader.
#[derive(Clone)]
pub struct ClassReader {
    inner: Arc<ReaderInner>,
}

struct ReaderInner {
    buf: Arc<[u8]>,
    pool: Arc<ConstantPool>,
    options: Arc<Options>,
    major_version: u16,
    minor_version: u16,
    bootstrap_offset: Option<usize>,
    raw_bootstrap: OnceCell<Vec<RawBootstrapMethod>>,
}

impl std::fmt::Debug for ClassReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassReader")
            .field("len", &self.inner.buf.len())
            .field("pool", &self.inner.pool.len())
            .field("version", &(self.inner.major_version, self.inner.minor_version))
            .finish()
    }
}

impl ClassReader {
    /// `class_attributes` is the offset of the class-level
    /// `attributes_count`, where the bootstrap method table is looked for.
    pub(crate) fn new(
        buf: Arc<[u8]>,
        pool: Arc<ConstantPool>,
        options: Arc<Options>,
        (major_version, minor_version): (u16, u16),
        class_attributes: usize,
    ) -> ClassResult<Self> {
        let mut input = ByteParser::at(&buf, class_attributes);
        let count = input.parse_u16()?;
        let mut bootstrap_offset = None;
        for _ in 0..count {
            let name = pool.utf8(input.parse_u16()?)?;
            let len = input.parse_u32()? as usize;
            if &**name == "BootstrapMethods" && bootstrap_offset.is_none() {
                bootstrap_offset = Some(input.offset);
            }
            input.skip(len)?;
        }

        Ok(ClassReader {
            inner: Arc::new(ReaderInner {
                buf,
                pool,
                options,
                major_version,
                minor_version,
                bootstrap_offset,
                raw_bootstrap: OnceCell::new(),
            }),
        })
    }

    pub fn buf(&self) -> &[u8] {
        &self.inner.buf
    }

    pub fn source(&self) -> &Arc<[u8]> {
        &self.inner.buf
    }

    pub fn pool(&self) -> &Arc<ConstantPool> {
        &self.inner.pool
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn major_version(&self) -> u16 {
        self.inner.major_version
    }

    pub fn minor_version(&self) -> u16 {
        self.inner.minor_version
    }

    fn bytes_at(&self, offset: usize, len: usize) -> ClassResult<&[u8]> {
        ByteParser::at(self.buf(), offset).take(len).map_err(Into::into)
    }

    pub fn read_u8(&self, offset: usize) -> ClassResult<u8> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    pub fn read_i8(&self, offset: usize) -> ClassResult<i8> {
        Ok(self.read_u8(offset)? as i8)
    }

    pub fn read_u16(&self, offset: usize) -> ClassResult<u16> {
        Ok(BigEndian::read_u16(self.bytes_at(offset, 2)?))
    }

    pub fn read_i16(&self, offset: usize) -> ClassResult<i16> {
        Ok(BigEndian::read_i16(self.bytes_at(offset, 2)?))
    }

    pub fn read_u32(&self, offset: usize) -> ClassResult<u32> {
        Ok(BigEndian::read_u32(self.bytes_at(offset, 4)?))
    }

    pub fn read_i32(&self, offset: usize) -> ClassResult<i32> {
        Ok(BigEndian::read_i32(self.bytes_at(offset, 4)?))
    }

    /// Reads a pool index at `offset` and resolves it as a Utf8 entry.
    pub fn read_utf8_entry(&self, offset: usize) -> ClassResult<&Symbol> {
        self.pool().utf8(self.read_u16(offset)?)
    }

    /// Reads a pool index at `offset` and resolves it as a Class entry.
    pub fn read_class_entry(&self, offset: usize) -> ClassResult<&Symbol> {
        self.pool().class_name(self.read_u16(offset)?)
    }

    /// The mapper for an attribute name: a standard one, or else whatever
    /// the configured lookup supplies.
    pub fn mapper_for(&self, name: &str) -> Option<Arc<dyn AttributeMapper>> {
        standard_mapper(name).or_else(|| self.options().custom_mapper(name))
    }

    /// Skips an `attributes_count` and its attributes, returning the offset
    /// just past them.
    pub fn skip_attributes(&self, offset: usize) -> ClassResult<usize> {
        let mut input = ByteParser::at(self.buf(), offset);
        let count = input.parse_u16()?;
        for _ in 0..count {
            input.skip(2)?;
            let len = input.parse_u32()? as usize;
            input.skip(len)?;
        }
        Ok(input.offset)
    }

    /// Reads an `attributes_count` and its attributes at `offset`, returning
    /// them along with the offset just past them.
    pub fn read_attributes(&self, offset: usize, location: AttributeLocation) -> ClassResult<(Vec<Attribute>, usize)> {
        let mut input = ByteParser::at(self.buf(), offset);
        let count = input.parse_u16()? as usize;
        let mut attributes = Vec::with_capacity(count);
        let mut seen = HashSet::new();

        for _ in 0..count {
            let name = self.pool().utf8(input.parse_u16()?)?.clone();
            let len = input.parse_u32()? as usize;
            let start = input.offset;
            input.skip(len)?;

            if let Some(attribute) = self.read_attribute(&name, start, len, location, &mut seen)? {
                attributes.push(attribute);
            }
        }

        Ok((attributes, input.offset))
    }

    fn read_attribute(
        &self,
        name: &Symbol,
        start: usize,
        len: usize,
        location: AttributeLocation,
        seen: &mut HashSet<Symbol>,
    ) -> ClassResult<Option<Attribute>> {
        let strict = self.options().strict_attributes;
        let mapper = match self.mapper_for(name) {
            Some(mapper) => mapper,
            None => return Ok(self.unknown_attribute(name, start, len)),
        };

        if !mapper.locations().contains(location) {
            if strict {
                return Err(ClassError::AttributeNotAllowed {
                    name: name.to_string(),
                    location,
                });
            }
            log::warn!("attribute `{}` is not allowed on {}; keeping its raw bytes", name, location);
            return Ok(self.unknown_attribute(name, start, len));
        }

        if self.major_version() < mapper.min_version() {
            if strict {
                return Err(ClassError::AttributeVersion {
                    name: name.to_string(),
                    required: mapper.min_version(),
                });
            }
            log::warn!(
                "attribute `{}` needs class file version {}, found {}",
                name,
                mapper.min_version(),
                self.major_version()
            );
        }

        if !mapper.allow_multiple() && !seen.insert(name.clone()) {
            if strict {
                return Err(ClassError::DuplicateAttribute {
                    name: name.to_string(),
                    location,
                });
            }
            log::warn!("attribute `{}` repeated on one {}", name, location);
        }

        let mut input = ByteParser::at(&self.buf()[..start + len], start);
        let attribute = mapper.read(self, &mut input, len)?;
        if input.offset != start + len {
            return Err(ClassError::MalformedAttribute {
                name: name.to_string(),
                offset: start,
                reason: format!("body is {} bytes but {} were read", len, input.offset - start),
            });
        }
        log::trace!("read `{}` attribute ({} bytes) at {}", name, len, start);
        Ok(Some(attribute))
    }

    fn unknown_attribute(&self, name: &Symbol, start: usize, len: usize) -> Option<Attribute> {
        if !self.options().unknown_attributes {
            log::debug!("dropping unknown attribute `{}`", name);
            return None;
        }
        Some(Attribute::Unknown {
            name: name.clone(),
            data: self.buf()[start..start + len].into(),
        })
    }

    /// The bootstrap method table as raw pool indices.
    pub fn raw_bootstrap_methods(&self) -> ClassResult<Vec<RawBootstrapMethod>> {
        self.raw_bootstrap().map(<[_]>::to_vec)
    }

    fn raw_bootstrap(&self) -> ClassResult<&[RawBootstrapMethod]> {
        self.inner
            .raw_bootstrap
            .get_or_try_init(|| {
                let offset = match self.inner.bootstrap_offset {
                    Some(offset) => offset,
                    None => return Ok(vec![]),
                };
                let mut input = ByteParser::at(self.buf(), offset);
                let count = input.parse_u16()? as usize;
                input.seq(count, |input| -> ClassResult<RawBootstrapMethod> {
                    let handle = input.parse_u16()?;
                    let argc = input.parse_u16()? as usize;
                    let arguments = input.seq(argc, ByteParser::parse_u16)?;
                    Ok((handle, arguments))
                })
            })
            .map(Vec::as_slice)
    }

    pub fn bootstrap_method(&self, index: u16) -> ClassResult<Arc<BootstrapMethodRef>> {
        self.bootstrap_method_at_depth(index, 0)
    }

    fn bootstrap_method_at_depth(&self, index: u16, depth: usize) -> ClassResult<Arc<BootstrapMethodRef>> {
        let (handle, arguments) = self.raw_bootstrap()?.get(index as usize).cloned().ok_or_else(|| {
            ClassError::MalformedAttribute {
                name: "BootstrapMethods".into(),
                offset: self.inner.bootstrap_offset.unwrap_or(0),
                reason: format!("no bootstrap method {}", index),
            }
        })?;

        Ok(Arc::new(BootstrapMethodRef {
            handle: self.pool().method_handle(handle)?,
            arguments: arguments
                .into_iter()
                .map(|argument| self.loadable_at_depth(argument, depth + 1))
                .collect::<ClassResult<_>>()?,
        }))
    }

    /// Resolves an entry `ldc` can load, or that can be a bootstrap argument.
    pub fn loadable(&self, index: PoolIndex) -> ClassResult<LoadableConstant> {
        self.loadable_at_depth(index, 0)
    }

    fn loadable_at_depth(&self, index: PoolIndex, depth: usize) -> ClassResult<LoadableConstant> {
        let pool = self.pool();
        Ok(match pool.entry(index)? {
            Constant::Integer(value) => LoadableConstant::Integer(*value),
            Constant::Float(value) => LoadableConstant::Float(*value),
            Constant::Long(value) => LoadableConstant::Long(*value),
            Constant::Double(value) => LoadableConstant::Double(*value),
            Constant::String(text) => LoadableConstant::String(pool.utf8(*text)?.clone()),
            Constant::Class(name) => LoadableConstant::Class(pool.utf8(*name)?.clone()),
            Constant::MethodType(descriptor) => LoadableConstant::MethodType(pool.utf8(*descriptor)?.clone()),
            Constant::MethodHandle { .. } => LoadableConstant::MethodHandle(pool.method_handle(index)?),
            Constant::Dynamic { .. } => LoadableConstant::Dynamic(self.dynamic_at_depth(index, depth)?),
            other => {
                return Err(ClassError::WrongPoolTag {
                    index,
                    expected: "loadable constant",
                    found: other.describe(),
                })
            }
        })
    }

    /// Resolves an `InvokeDynamic` entry.
    pub fn invoke_dynamic(&self, index: PoolIndex) -> ClassResult<DynamicRef> {
        match self.pool().entry(index)? {
            Constant::InvokeDynamic { .. } => self.dynamic_at_depth(index, 0),
            other => Err(ClassError::WrongPoolTag {
                index,
                expected: "InvokeDynamic",
                found: other.describe(),
            }),
        }
    }

    fn dynamic_at_depth(&self, index: PoolIndex, depth: usize) -> ClassResult<DynamicRef> {
        if depth > MAX_DYNAMIC_DEPTH {
            return Err(ClassError::MalformedAttribute {
                name: "BootstrapMethods".into(),
                offset: self.inner.bootstrap_offset.unwrap_or(0),
                reason: format!("dynamic constant {} nests too deeply", index),
            });
        }
        match self.pool().entry(index)? {
            Constant::Dynamic { bootstrap, name_and_type } | Constant::InvokeDynamic { bootstrap, name_and_type } => {
                let (name, descriptor) = self.pool().name_and_type(*name_and_type)?;
                Ok(DynamicRef {
                    name,
                    descriptor,
                    bootstrap: self.bootstrap_method_at_depth(*bootstrap, depth)?,
                })
            }
            other => Err(ClassError::WrongPoolTag {
                index,
                expected: "Dynamic",
                found: other.describe(),
            }),
        }
    }
}
