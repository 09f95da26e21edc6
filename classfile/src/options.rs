use crate::{
    hierarchy::{default_resolver, ClassHierarchyResolver},
    mapper::AttributeMapper,
};
use std::{fmt, sync::Arc};

/// Resolves attribute names the standard registry does not know.
pub type AttributeMapperLookup = dyn Fn(&str) -> Option<Arc<dyn AttributeMapper>> + Send + Sync;

/// Processing options for one parse/build session.
#[derive(Clone)]
pub struct Options {
    /// Compute a `StackMapTable` for every emitted code body of a version 50+
    /// class. When off, frames of a source body are copied as they are.
    pub generate_stack_maps: bool,
    /// Surface local variable and character range entries as code elements.
    pub debug_elements: bool,
    /// Surface line number entries as code elements.
    pub line_numbers: bool,
    /// Keep attributes no mapper recognizes as opaque blobs. When off they
    /// are dropped while reading.
    pub unknown_attributes: bool,
    /// Seed a transformed class with the pool of its source.
    pub share_constant_pool: bool,
    /// Rewrite short branches whose target is out of range into wide forms.
    pub fix_short_jumps: bool,
    /// Replace unreachable code with `nop ... athrow` instead of failing.
    pub patch_dead_code: bool,
    /// Drop pseudo elements that refer to unbound labels instead of failing.
    pub filter_unbound_labels: bool,
    /// Reject attributes on a disallowed location, repeated where only one
    /// is permitted, or newer than the class version.
    pub strict_attributes: bool,
    pub hierarchy: Arc<dyn ClassHierarchyResolver>,
    pub attribute_mapper: Option<Arc<AttributeMapperLookup>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            generate_stack_maps: true,
            debug_elements: true,
            line_numbers: true,
            unknown_attributes: true,
            share_constant_pool: true,
            fix_short_jumps: true,
            patch_dead_code: true,
            filter_unbound_labels: false,
            strict_attributes: false,
            hierarchy: Arc::new(default_resolver()),
            attribute_mapper: None,
        }
    }
}

macro_rules! flag_setters {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, enabled: bool) -> Self {
                self.$name = enabled;
                self
            }
        )*
    };
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    flag_setters! {
        generate_stack_maps,
        debug_elements,
        line_numbers,
        unknown_attributes,
        share_constant_pool,
        fix_short_jumps,
        patch_dead_code,
        filter_unbound_labels,
        strict_attributes,
    }

    /// Consults `resolver` before the built-in `java.lang` hierarchy.
    pub fn hierarchy_resolver<R: ClassHierarchyResolver + 'static>(mut self, resolver: R) -> Self {
        self.hierarchy = Arc::new(resolver.or_else(default_resolver()));
        self
    }

    pub fn attribute_mapper<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<Arc<dyn AttributeMapper>> + Send + Sync + 'static,
    {
        self.attribute_mapper = Some(Arc::new(lookup));
        self
    }

    pub(crate) fn custom_mapper(&self, name: &str) -> Option<Arc<dyn AttributeMapper>> {
        self.attribute_mapper.as_ref().and_then(|lookup| lookup(name))
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("generate_stack_maps", &self.generate_stack_maps)
            .field("debug_elements", &self.debug_elements)
            .field("line_numbers", &self.line_numbers)
            .field("unknown_attributes", &self.unknown_attributes)
            .field("share_constant_pool", &self.share_constant_pool)
            .field("fix_short_jumps", &self.fix_short_jumps)
            .field("patch_dead_code", &self.patch_dead_code)
            .field("filter_unbound_labels", &self.filter_unbound_labels)
            .field("strict_attributes", &self.strict_attributes)
            .field("attribute_mapper", &self.attribute_mapper.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{ClassHierarchyInfo, MapResolver};

    #[test]
    fn setters_chain() {
        let options = Options::new().patch_dead_code(false).filter_unbound_labels(true);
        assert!(!options.patch_dead_code);
        assert!(options.filter_unbound_labels);
        assert!(options.generate_stack_maps);
    }

    #[test]
    fn custom_resolver_falls_back_to_defaults() {
        let mut map = MapResolver::new();
        map.insert(ClassHierarchyInfo::class("a/B", Some("java/lang/Exception")));
        let options = Options::new().hierarchy_resolver(map);
        assert!(options.hierarchy.resolve("a/B").is_some());
        assert!(options.hierarchy.resolve("java/lang/Exception").is_some());
        assert!(options.hierarchy.resolve("a/Missing").is_none());
    }
}
