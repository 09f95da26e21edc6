//! Superclass lookups for stack map frame merging.
//!
//! A resolver answers "what is the superclass of `X`, and is `X` an
//! interface?". Missing answers are never errors: merging falls back to
//! `java/lang/Object`.

use crate::{access::AccessFlags, constant::Symbol, model::ClassModel};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

pub const OBJECT: &str = "java/lang/Object";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClassHierarchyInfo {
    pub this_class: Symbol,
    pub is_interface: bool,
    pub super_class: Option<Symbol>,
}

impl ClassHierarchyInfo {
    pub fn class(name: &str, super_class: Option<&str>) -> Self {
        ClassHierarchyInfo {
            this_class: name.into(),
            is_interface: false,
            super_class: super_class.map(Into::into),
        }
    }

    pub fn interface(name: &str) -> Self {
        ClassHierarchyInfo {
            this_class: name.into(),
            is_interface: true,
            super_class: Some(OBJECT.into()),
        }
    }
}

pub trait ClassHierarchyResolver: Send + Sync {
    /// Looks up a class by internal name, e.g. `java/lang/String`.
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo>;

    /// Tries `self`, then `other`.
    fn or_else<R: ClassHierarchyResolver>(self, other: R) -> OrElse<Self, R>
    where
        Self: Sized,
    {
        OrElse { first: self, second: other }
    }

    /// Remembers every answer, including negative ones.
    fn cached(self) -> Cached<Self>
    where
        Self: Sized,
    {
        Cached {
            inner: self,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl ClassHierarchyResolver for Arc<dyn ClassHierarchyResolver> {
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo> {
        (**self).resolve(class)
    }
}

impl<R: ClassHierarchyResolver + ?Sized> ClassHierarchyResolver for &R {
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo> {
        (**self).resolve(class)
    }
}

/// Adapts a closure into a resolver.
pub struct FnResolver<F>(pub F);

impl<F> ClassHierarchyResolver for FnResolver<F>
where
    F: Fn(&str) -> Option<ClassHierarchyInfo> + Send + Sync,
{
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo> {
        (self.0)(class)
    }
}

pub struct OrElse<A, B> {
    first: A,
    second: B,
}

impl<A: ClassHierarchyResolver, B: ClassHierarchyResolver> ClassHierarchyResolver for OrElse<A, B> {
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo> {
        self.first.resolve(class).or_else(|| self.second.resolve(class))
    }
}

pub struct Cached<R> {
    inner: R,
    cache: Mutex<HashMap<String, Option<ClassHierarchyInfo>>>,
}

impl<R: ClassHierarchyResolver> ClassHierarchyResolver for Cached<R> {
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo> {
        if let Some(hit) = self.cache.lock().get(class) {
            return hit.clone();
        }
        // Not holding the lock across the lookup lets the inner resolver
        // call back into this one.
        let info = self.inner.resolve(class);
        self.cache.lock().insert(class.to_owned(), info.clone());
        info
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapResolver {
    classes: HashMap<Symbol, ClassHierarchyInfo>,
}

impl MapResolver {
    pub fn new() -> Self {
        MapResolver::default()
    }

    pub fn insert(&mut self, info: ClassHierarchyInfo) {
        self.classes.insert(info.this_class.clone(), info);
    }

    pub fn insert_model(&mut self, model: &ClassModel) {
        self.insert(ClassHierarchyInfo {
            this_class: model.this_class(),
            is_interface: model.flags().is(AccessFlags::INTERFACE),
            super_class: model.superclass(),
        });
    }

    pub fn from_models<'a, I: IntoIterator<Item = &'a ClassModel>>(models: I) -> Self {
        let mut map = MapResolver::new();
        for model in models {
            map.insert_model(model);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassHierarchyResolver for MapResolver {
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo> {
        self.classes.get(class).cloned()
    }
}

/// The handful of `java.lang` types that show up in almost every method.
pub fn default_resolver() -> MapResolver {
    let mut map = MapResolver::new();
    map.insert(ClassHierarchyInfo::class(OBJECT, None));
    for (class, super_class) in [
        ("java/lang/Throwable", OBJECT),
        ("java/lang/Exception", "java/lang/Throwable"),
        ("java/lang/Error", "java/lang/Throwable"),
        ("java/lang/RuntimeException", "java/lang/Exception"),
        ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
        ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
        ("java/lang/NullPointerException", "java/lang/RuntimeException"),
        ("java/lang/String", OBJECT),
        ("java/lang/Class", OBJECT),
        ("java/lang/Number", OBJECT),
        ("java/lang/Integer", "java/lang/Number"),
        ("java/lang/Long", "java/lang/Number"),
        ("java/lang/Float", "java/lang/Number"),
        ("java/lang/Double", "java/lang/Number"),
        ("java/lang/Short", "java/lang/Number"),
        ("java/lang/Byte", "java/lang/Number"),
        ("java/lang/Boolean", OBJECT),
        ("java/lang/Character", OBJECT),
        ("java/lang/Enum", OBJECT),
        ("java/lang/StringBuilder", OBJECT),
    ] {
        map.insert(ClassHierarchyInfo::class(class, Some(super_class)));
    }
    for interface in [
        "java/lang/Cloneable",
        "java/io/Serializable",
        "java/lang/Comparable",
        "java/lang/CharSequence",
        "java/lang/Runnable",
        "java/lang/Iterable",
        "java/lang/AutoCloseable",
    ] {
        map.insert(ClassHierarchyInfo::interface(interface));
    }
    map
}

/// The nearest common superclass of two internal class names. Interfaces and
/// types the resolver knows nothing about merge to `java/lang/Object`.
pub fn common_superclass(resolver: &dyn ClassHierarchyResolver, a: &str, b: &str) -> Symbol {
    if a == b {
        return a.into();
    }

    let chain = |start: &str| -> Option<Vec<Symbol>> {
        let mut chain = vec![];
        let mut seen = HashSet::new();
        let mut current: Symbol = start.into();
        loop {
            if !seen.insert(current.clone()) {
                log::warn!("superclass cycle through {}", current);
                return None;
            }
            let info = match resolver.resolve(&current) {
                Some(info) => info,
                None => {
                    log::warn!("no hierarchy information for {}", current);
                    return None;
                }
            };
            if info.is_interface {
                return None;
            }
            chain.push(current);
            match info.super_class {
                Some(next) => current = next,
                None => return Some(chain),
            }
        }
    };

    match (chain(a), chain(b)) {
        (Some(left), Some(right)) => {
            let right: HashSet<_> = right.into_iter().collect();
            left.into_iter()
                .find(|class| right.contains(class))
                .unwrap_or_else(|| OBJECT.into())
        }
        _ => OBJECT.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceptions_merge_to_nearest_ancestor() {
        let resolver = default_resolver();
        let merged = common_superclass(&resolver, "java/lang/RuntimeException", "java/lang/Error");
        assert_eq!(&*merged, "java/lang/Throwable");
        let merged = common_superclass(&resolver, "java/lang/Integer", "java/lang/Long");
        assert_eq!(&*merged, "java/lang/Number");
    }

    #[test]
    fn unknown_types_fall_back_to_object() {
        let resolver = default_resolver();
        assert_eq!(&*common_superclass(&resolver, "a/Unknown", "java/lang/String"), OBJECT);
        assert_eq!(&*common_superclass(&resolver, "java/lang/Runnable", "java/lang/String"), OBJECT);
    }

    #[test]
    fn chained_and_cached_resolvers() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let custom = FnResolver(move |class: &str| {
            *counter.lock() += 1;
            match class {
                "a/Child" => Some(ClassHierarchyInfo::class("a/Child", Some("a/Parent"))),
                "a/Parent" => Some(ClassHierarchyInfo::class("a/Parent", Some(OBJECT))),
                _ => None,
            }
        });
        let resolver = custom.or_else(default_resolver()).cached();

        assert_eq!(&*common_superclass(&resolver, "a/Child", "a/Parent"), "a/Parent");
        assert_eq!(&*common_superclass(&resolver, "a/Child", "a/Parent"), "a/Parent");
        // a/Child, a/Parent and java/lang/Object, each asked once.
        assert_eq!(*calls.lock(), 3);
    }
}
