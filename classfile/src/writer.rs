use crate::{
    attribute::Attribute,
    constant::PoolIndex,
    mapper::{self, AttributeMapper},
    pool::PoolBuilder,
    ClassError, ClassResult,
};
use byteorder::{BigEndian, ByteOrder};
use std::sync::Arc;

/// An output buffer tied to the constant pool of the class being written.
/// Symbolic values are interned into the pool as they are written.
pub struct BufWriter<'p> {
    bytes: Vec<u8>,
    pool: &'p mut PoolBuilder,
}

impl<'p> BufWriter<'p> {
    pub fn new(pool: &'p mut PoolBuilder) -> Self {
        BufWriter { bytes: vec![], pool }
    }

    pub fn pool(&mut self) -> &mut PoolBuilder {
        self.pool
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.bytes.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut buf = [0; 2];
        BigEndian::write_u16(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut buf = [0; 4];
        BigEndian::write_u32(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Writes a two-byte count, failing if `len` does not fit.
    pub fn write_count(&mut self, len: usize, what: &str) -> ClassResult<()> {
        if len > u16::MAX as usize {
            return Err(ClassError::illegal(format!("too many {} ({})", what, len)));
        }
        self.write_u16(len as u16);
        Ok(())
    }

    pub fn write_index(&mut self, index: PoolIndex) {
        self.write_u16(index);
    }

    pub fn write_utf8_index(&mut self, text: &str) {
        let index = self.pool.utf8(text);
        self.write_u16(index);
    }

    pub fn write_class_index(&mut self, name: &str) {
        let index = self.pool.class(name);
        self.write_u16(index);
    }

    /// Writes a class index, or 0 for `None`.
    pub fn write_optional_class_index(&mut self, name: Option<&str>) {
        match name {
            Some(name) => self.write_class_index(name),
            None => self.write_u16(0),
        }
    }

    pub fn write_optional_utf8_index(&mut self, text: Option<&str>) {
        match text {
            Some(text) => self.write_utf8_index(text),
            None => self.write_u16(0),
        }
    }

    /// Reserves four bytes for a length, returning their position.
    pub fn reserve_u32(&mut self) -> usize {
        let at = self.bytes.len();
        self.bytes.extend_from_slice(&[0; 4]);
        at
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) {
        BigEndian::write_u32(&mut self.bytes[at..at + 4], value);
    }

    /// Writes the length of everything after the placeholder at `at`.
    pub fn patch_length(&mut self, at: usize) -> ClassResult<()> {
        let len = self.bytes.len() - at - 4;
        if len > u32::MAX as usize {
            return Err(ClassError::illegal("attribute body too long"));
        }
        self.patch_u32(at, len as u32);
        Ok(())
    }

    /// Writes a complete `attribute_info` structure.
    ///
    /// An unknown attribute is copied byte for byte, which is only sound
    /// when the pool being written extends the one it was read against.
    pub fn write_attribute(&mut self, attribute: &Attribute) -> ClassResult<()> {
        match attribute {
            Attribute::Unknown { name, .. } if !self.pool.is_shared() => {
                Err(ClassError::UnmappedAttribute(name.to_string()))
            }
            Attribute::Unknown { name, data } => {
                self.write_utf8_index(name);
                self.write_u32(data.len() as u32);
                self.write_bytes(data);
                Ok(())
            }
            Attribute::Code(_) => Err(ClassError::illegal(
                "a Code attribute can only be written as part of a method",
            )),
            _ => {
                let mapper: Arc<dyn AttributeMapper> = match attribute {
                    Attribute::Custom(custom) => custom.mapper.clone(),
                    other => mapper::standard_mapper(other.name()).ok_or_else(|| {
                        ClassError::illegal(format!("no mapper for attribute `{}`", other.name()))
                    })?,
                };
                self.write_utf8_index(mapper.name());
                let at = self.reserve_u32();
                mapper.write(attribute, self)?;
                self.patch_length(at)
            }
        }
    }

    pub fn write_attributes(&mut self, attributes: &[Attribute]) -> ClassResult<()> {
        self.write_count(attributes.len(), "attributes")?;
        for attribute in attributes {
            self.write_attribute(attribute)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant::parse_constant_pool, parse::ByteParser};

    #[test]
    fn lengths_are_patched() {
        let mut pool = PoolBuilder::new();
        let mut out = BufWriter::new(&mut pool);
        out.write_u16(0xbeef);
        let at = out.reserve_u32();
        out.write_bytes(b"abc");
        out.patch_length(at).unwrap();
        assert_eq!(out.bytes(), &[0xbe, 0xef, 0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn indices_are_interned() {
        let mut pool = PoolBuilder::new();
        let mut out = BufWriter::new(&mut pool);
        out.write_class_index("Foo");
        out.write_utf8_index("Foo");
        out.write_optional_class_index(None);
        assert_eq!(out.into_bytes(), vec![0, 2, 0, 1, 0, 0]);
        assert_eq!(pool.len(), 3);
    }

    fn blob() -> Attribute {
        Attribute::Unknown {
            name: "Blob".into(),
            data: Arc::from(&[1u8, 2][..]),
        }
    }

    #[test]
    fn unknown_attributes_are_copied_into_shared_pools() {
        let source: Arc<[u8]> = Arc::from(&[0u8, 2, 1, 0, 4, b'B', b'l', b'o', b'b'][..]);
        let parsed = parse_constant_pool(&mut ByteParser::new(&source), source.clone()).unwrap();
        let mut pool = PoolBuilder::shared(Arc::new(parsed), vec![]);
        let mut out = BufWriter::new(&mut pool);
        out.write_attribute(&blob()).unwrap();
        assert_eq!(out.bytes(), &[0, 1, 0, 0, 0, 2, 1, 2]);
    }

    #[test]
    fn unknown_attributes_need_a_shared_pool() {
        let mut pool = PoolBuilder::new();
        let mut out = BufWriter::new(&mut pool);
        let err = out.write_attribute(&blob()).unwrap_err();
        assert!(matches!(&err, ClassError::UnmappedAttribute(name) if name == "Blob"));
        assert!(out.bytes().is_empty());
    }
}
