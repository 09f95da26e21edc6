use classfile::{
    access::AccessFlags,
    hierarchy::{ClassHierarchyInfo, ClassHierarchyResolver},
    ClassFile,
};
use std::path::PathBuf;

/// Answers hierarchy queries by reading `<root>/<internal name>.class` from
/// each root in turn.
pub struct DirectoryResolver {
    roots: Vec<PathBuf>,
    reader: ClassFile,
}

impl DirectoryResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        DirectoryResolver {
            roots,
            reader: ClassFile::new(),
        }
    }
}

impl ClassHierarchyResolver for DirectoryResolver {
    fn resolve(&self, class: &str) -> Option<ClassHierarchyInfo> {
        let path = self
            .roots
            .iter()
            .map(|root| root.join(format!("{}.class", class)))
            .find(|path| path.is_file())?;

        match self.reader.read_file(&path) {
            Ok(model) => Some(ClassHierarchyInfo {
                this_class: model.this_class(),
                is_interface: model.flags().is(AccessFlags::INTERFACE),
                super_class: model.superclass(),
            }),
            Err(err) => {
                log::warn!("cannot read {}: {}", path.display(), err);
                None
            }
        }
    }
}
