use crate::{
    constant::{
        write_constant, BootstrapMethodRef, Constant, ConstantPool, DynamicRef, LoadableConstant,
        MemberKind, MemberRef, MethodHandleRef, PoolIndex,
    },
    ClassError, ClassResult,
};
use std::{collections::HashMap, sync::Arc};

/// A raw `BootstrapMethods` entry: a method handle index and the indices of
/// its static arguments.
pub type RawBootstrapMethod = (PoolIndex, Vec<PoolIndex>);

/// Accumulates the constant pool and bootstrap method table of a class under
/// construction.
///
/// Every interning call returns the index of an equal existing entry when
/// there is one. A builder created with [`PoolBuilder::shared`] starts from an
/// existing pool, so indices in the original class remain valid and its pool
/// bytes are copied verbatim ahead of any appended entries.
#[derive(Debug)]
pub struct PoolBuilder {
    shared: Option<Arc<ConstantPool>>,
    entries: Vec<Constant>,
    lookup: HashMap<Constant, PoolIndex>,
    bootstrap: Vec<RawBootstrapMethod>,
    bootstrap_lookup: HashMap<RawBootstrapMethod, u16>,
    overflowed: bool,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        PoolBuilder::new()
    }
}

impl PoolBuilder {
    pub fn new() -> Self {
        PoolBuilder {
            shared: None,
            entries: vec![Constant::Nothing],
            lookup: HashMap::new(),
            bootstrap: vec![],
            bootstrap_lookup: HashMap::new(),
            overflowed: false,
        }
    }

    pub fn shared(pool: Arc<ConstantPool>, bootstrap: Vec<RawBootstrapMethod>) -> Self {
        let mut lookup = HashMap::with_capacity(pool.len());
        for (index, constant) in pool.entries().iter().enumerate() {
            if !constant.is_nothing() {
                lookup.entry(constant.clone()).or_insert(index as PoolIndex);
            }
        }

        let mut bootstrap_lookup = HashMap::with_capacity(bootstrap.len());
        for (index, entry) in bootstrap.iter().enumerate() {
            bootstrap_lookup.entry(entry.clone()).or_insert(index as u16);
        }

        PoolBuilder {
            entries: pool.entries().to_vec(),
            shared: Some(pool),
            lookup,
            bootstrap,
            bootstrap_lookup,
            overflowed: false,
        }
    }

    /// Whether this builder was seeded from exactly `pool`, in which case raw
    /// bytes that refer into `pool` remain valid here.
    pub fn is_shared_with(&self, pool: &Arc<ConstantPool>) -> bool {
        self.shared.as_ref().map_or(false, |shared| Arc::ptr_eq(shared, pool))
    }

    pub fn is_shared(&self) -> bool {
        self.shared.is_some()
    }

    /// The `constant_pool_count` value.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn entry(&self, index: PoolIndex) -> Option<&Constant> {
        self.entries.get(index as usize).filter(|c| !c.is_nothing())
    }

    pub fn bootstrap_methods(&self) -> &[RawBootstrapMethod] {
        &self.bootstrap
    }

    fn intern(&mut self, constant: Constant) -> PoolIndex {
        if let Some(&index) = self.lookup.get(&constant) {
            return index;
        }

        let index = self.entries.len();
        let wide = constant.is_wide();
        if index + wide as usize > u16::MAX as usize {
            self.overflowed = true;
        }

        self.lookup.insert(constant.clone(), index as PoolIndex);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Nothing);
        }
        index as PoolIndex
    }

    pub fn utf8(&mut self, text: &str) -> PoolIndex {
        self.intern(Constant::Utf8(text.into()))
    }

    pub fn integer(&mut self, value: i32) -> PoolIndex {
        self.intern(Constant::Integer(value))
    }

    pub fn float(&mut self, value: f32) -> PoolIndex {
        self.intern(Constant::Float(value))
    }

    pub fn long(&mut self, value: i64) -> PoolIndex {
        self.intern(Constant::Long(value))
    }

    pub fn double(&mut self, value: f64) -> PoolIndex {
        self.intern(Constant::Double(value))
    }

    pub fn class(&mut self, name: &str) -> PoolIndex {
        let name = self.utf8(name);
        self.intern(Constant::Class(name))
    }

    pub fn string(&mut self, text: &str) -> PoolIndex {
        let text = self.utf8(text);
        self.intern(Constant::String(text))
    }

    pub fn method_type(&mut self, descriptor: &str) -> PoolIndex {
        let descriptor = self.utf8(descriptor);
        self.intern(Constant::MethodType(descriptor))
    }

    pub fn module(&mut self, name: &str) -> PoolIndex {
        let name = self.utf8(name);
        self.intern(Constant::Module(name))
    }

    pub fn package(&mut self, name: &str) -> PoolIndex {
        let name = self.utf8(name);
        self.intern(Constant::Package(name))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> PoolIndex {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.intern(Constant::NameAndType { name, descriptor })
    }

    pub fn member(&mut self, kind: MemberKind, member: &MemberRef) -> PoolIndex {
        let class = self.class(&member.owner);
        let name_and_type = self.name_and_type(&member.name, &member.descriptor);
        self.intern(match kind {
            MemberKind::Field => Constant::FieldRef { class, name_and_type },
            MemberKind::Method => Constant::MethodRef { class, name_and_type },
            MemberKind::InterfaceMethod => Constant::InterfaceMethodRef { class, name_and_type },
        })
    }

    pub fn method_handle(&mut self, handle: &MethodHandleRef) -> PoolIndex {
        let kind = if handle.kind.is_field() {
            MemberKind::Field
        } else if handle.interface {
            MemberKind::InterfaceMethod
        } else {
            MemberKind::Method
        };
        let reference = self.member(kind, &handle.member);
        self.intern(Constant::MethodHandle {
            kind: handle.kind,
            reference,
        })
    }

    /// Interns a bootstrap method and returns its index in the
    /// `BootstrapMethods` table.
    pub fn bootstrap_method(&mut self, method: &BootstrapMethodRef) -> u16 {
        let handle = self.method_handle(&method.handle);
        let arguments = method.arguments.iter().map(|arg| self.loadable(arg)).collect();
        let entry = (handle, arguments);
        if let Some(&index) = self.bootstrap_lookup.get(&entry) {
            return index;
        }

        let index = self.bootstrap.len() as u16;
        self.bootstrap_lookup.insert(entry.clone(), index);
        self.bootstrap.push(entry);
        index
    }

    pub fn dynamic(&mut self, dynamic: &DynamicRef) -> PoolIndex {
        let bootstrap = self.bootstrap_method(&dynamic.bootstrap);
        let name_and_type = self.name_and_type(&dynamic.name, &dynamic.descriptor);
        self.intern(Constant::Dynamic {
            bootstrap,
            name_and_type,
        })
    }

    pub fn invoke_dynamic(&mut self, call_site: &DynamicRef) -> PoolIndex {
        let bootstrap = self.bootstrap_method(&call_site.bootstrap);
        let name_and_type = self.name_and_type(&call_site.name, &call_site.descriptor);
        self.intern(Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        })
    }

    pub fn loadable(&mut self, value: &LoadableConstant) -> PoolIndex {
        match value {
            LoadableConstant::Integer(v) => self.integer(*v),
            LoadableConstant::Float(v) => self.float(*v),
            LoadableConstant::Long(v) => self.long(*v),
            LoadableConstant::Double(v) => self.double(*v),
            LoadableConstant::String(s) => self.string(s),
            LoadableConstant::Class(c) => self.class(c),
            LoadableConstant::MethodType(d) => self.method_type(d),
            LoadableConstant::MethodHandle(h) => self.method_handle(h),
            LoadableConstant::Dynamic(d) => self.dynamic(d),
        }
    }

    /// Writes `constant_pool_count` followed by the entries.
    pub fn write(&self, out: &mut Vec<u8>) -> ClassResult<()> {
        if self.overflowed || self.entries.len() > u16::MAX as usize {
            return Err(ClassError::PoolOverflow);
        }

        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        let appended = match &self.shared {
            Some(shared) => {
                out.extend_from_slice(shared.raw_bytes());
                &self.entries[shared.len()..]
            }
            None => &self.entries[1..],
        };

        log::trace!("writing {} appended constant pool entries", appended.len());
        for constant in appended {
            write_constant(out, constant)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant::parse_constant_pool, parse::ByteParser};

    fn reparse(builder: &PoolBuilder) -> ConstantPool {
        let mut out = vec![];
        builder.write(&mut out).unwrap();
        let source: Arc<[u8]> = out.into();
        parse_constant_pool(&mut ByteParser::new(&source), source.clone()).unwrap()
    }

    #[test]
    fn interning_deduplicates() {
        let mut pool = PoolBuilder::new();
        let a = pool.class("java/lang/String");
        let b = pool.class("java/lang/String");
        assert_eq!(a, b);
        assert_eq!(pool.utf8("java/lang/String"), 1);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn wide_entries_reserve_the_next_slot() {
        let mut pool = PoolBuilder::new();
        assert_eq!(pool.long(5), 1);
        assert_eq!(pool.integer(5), 3);
        assert!(pool.entry(2).is_none());

        let parsed = reparse(&pool);
        assert_eq!(parsed.entry(3).unwrap(), &Constant::Integer(5));
    }

    #[test]
    fn shared_pool_keeps_original_indices() {
        let mut original = PoolBuilder::new();
        let method = MemberRef::new("Foo", "run", "()V");
        let index = original.member(MemberKind::Method, &method);
        let shared = Arc::new(reparse(&original));

        let mut pool = PoolBuilder::shared(shared.clone(), vec![]);
        assert!(pool.is_shared_with(&shared));
        assert_eq!(pool.member(MemberKind::Method, &method), index);

        let appended = pool.utf8("extra");
        assert_eq!(appended as usize, shared.len());

        let mut out = vec![];
        pool.write(&mut out).unwrap();
        assert_eq!(&out[2..2 + shared.raw_bytes().len()], shared.raw_bytes());
        assert_eq!(&**reparse(&pool).utf8(appended).unwrap(), "extra");
    }

    #[test]
    fn bootstrap_methods_are_deduplicated() {
        let mut pool = PoolBuilder::new();
        let bootstrap = BootstrapMethodRef {
            handle: MethodHandleRef {
                kind: crate::constant::MethodHandleKind::InvokeStatic,
                member: MemberRef::new("Boot", "strap", "()V"),
                interface: false,
            },
            arguments: vec![LoadableConstant::Integer(1)],
        };
        assert_eq!(pool.bootstrap_method(&bootstrap), 0);
        assert_eq!(pool.bootstrap_method(&bootstrap), 0);
        assert_eq!(pool.bootstrap_methods().len(), 1);
    }

    #[test]
    fn oversized_strings_are_rejected_on_write() {
        let mut pool = PoolBuilder::new();
        pool.string(&"a".repeat(70_000));
        assert!(matches!(pool.write(&mut vec![]), Err(ClassError::Utf8TooLong(70_000))));

        let mut pool = PoolBuilder::new();
        pool.utf8(&"a".repeat(u16::MAX as usize));
        assert!(pool.write(&mut vec![]).is_ok());
    }

    #[test]
    fn overflow_is_reported_on_write() {
        let mut pool = PoolBuilder::new();
        for i in 0..0x8000 {
            pool.long(i);
        }
        assert!(matches!(pool.write(&mut vec![]), Err(ClassError::PoolOverflow)));
    }
}
