//! Reading, building and rewriting JVM class files.
//!
//! The data flow is `bytes -> ClassModel -> elements -> [transforms] ->
//! ClassBuilder -> bytes`, or `ClassBuilder -> bytes` when generating a class
//! from scratch. A [`ClassFile`] carries the processing [`Options`] for one
//! session and is the usual entry point.
//!
//! ```no_run
//! use classfile::{access::AccessFlags, ClassFile};
//!
//! let cf = ClassFile::new();
//! let bytes = cf
//!     .build("demo/Answer", |class| {
//!         class.with_method_body("get", "()I", AccessFlags::PUBLIC | AccessFlags::STATIC, |code| {
//!             code.load_constant(42)?.ireturn()?;
//!             Ok(())
//!         })?;
//!         Ok(())
//!     })
//!     .unwrap();
//! let model = cf.parse(bytes).unwrap();
//! assert_eq!(&*model.this_class(), "demo/Answer");
//! ```

pub mod access;
pub mod attribute;
pub mod builder;
pub mod constant;
pub mod descriptor;
pub mod flow;
pub mod hierarchy;
pub mod instruction;
pub mod mapper;
pub mod model;
pub mod opcode;
pub mod options;
pub mod parse;
pub mod pool;
pub mod reader;
pub mod signature;
pub mod stackmap;
pub mod transform;
pub mod writer;

mod emit;
mod mutf8;

pub use crate::mutf8::*;
pub use crate::{
    builder::{BlockCodeBuilder, CatchBuilder, ClassBuilder, CodeBuilder, FieldBuilder, MethodBuilder},
    constant::Symbol,
    instruction::{CodeElement, Instruction, Label},
    mapper::AttributeLocation,
    model::{ClassElement, ClassModel, CodeModel, FieldElement, FieldModel, MethodElement, MethodModel},
    options::Options,
    parse::{ByteParser, ParseError},
    transform::{ElementBuilder, Transform},
};

use crate::pool::PoolBuilder;
use std::{path::Path, sync::Arc};

pub type ClassResult<T> = Result<T, ClassError>;

/// Broad classification of a [`ClassError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Malformed or truncated binary input.
    Format,
    /// An invalid request made through a builder.
    Usage,
    /// A label was referenced but never bound.
    UnboundReference,
    /// Reading or writing a file failed.
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    // Container format errors
    #[error("bad magic number 0x{0:08x}")]
    WrongMagic(u32),
    #[error("unknown constant pool tag {tag} at offset {offset}")]
    UnknownConstantTag { offset: usize, tag: u8 },
    #[error("constant pool count must be at least 1")]
    ConstantPoolTooSmall,
    #[error("invalid constant pool index {0}")]
    InvalidPoolIndex(u16),
    #[error("constant pool entry {index} is {found}, expected {expected}")]
    WrongPoolTag {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unknown method handle kind {0}")]
    UnknownMethodHandleKind(u8),
    #[error("invalid modified UTF-8 byte 0x{1:02x} at offset {0}")]
    InvalidModifiedUtf8Byte(usize, u8),
    #[error("unknown opcode 0x{opcode:02x} at bytecode offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("branch at bytecode offset {offset} targets {target}, outside the code")]
    BadBranchTarget { offset: usize, target: i64 },
    #[error("unknown verification type tag {0}")]
    UnknownVerificationType(u8),
    #[error("unknown stack map frame type {0}")]
    UnknownStackMapFrameType(u8),
    #[error("unknown type annotation target type 0x{0:02x}")]
    UnknownTypeAnnotationTarget(u8),
    #[error("malformed descriptor `{0}`")]
    BadDescriptor(String),
    #[error("malformed signature `{0}`")]
    BadSignature(String),
    #[error("malformed `{name}` attribute at offset {offset}: {reason}")]
    MalformedAttribute {
        name: String,
        offset: usize,
        reason: String,
    },
    #[error("attribute `{name}` is not allowed on {location}")]
    AttributeNotAllowed {
        name: String,
        location: AttributeLocation,
    },
    #[error("attribute `{name}` may appear at most once per {location}")]
    DuplicateAttribute {
        name: String,
        location: AttributeLocation,
    },
    #[error("attribute `{name}` requires class file version {required} or later")]
    AttributeVersion { name: String, required: u16 },

    // Builder usage errors
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("label {0} is already bound")]
    LabelAlreadyBound(Label),
    #[error("label {0} was not created by this builder")]
    ForeignLabel(Label),
    #[error("the body of the try block is empty")]
    EmptyTryBlock,
    #[error("exception type `{0}` is already caught by this try block")]
    DuplicateCatch(String),
    #[error("code length {0} exceeds 65535 bytes")]
    CodeTooLarge(usize),
    #[error("branch at bytecode offset {offset} needs displacement {displacement}, too far for a short jump")]
    BranchOutOfRange { offset: usize, displacement: i64 },
    #[error("the constant pool exceeds 65535 entries")]
    PoolOverflow,
    #[error("string constant encodes to {0} bytes, more than 65535")]
    Utf8TooLong(usize),
    #[error("attribute `{0}` has no mapper, so its body cannot be moved into a different constant pool")]
    UnmappedAttribute(String),
    #[error("unreachable code at bytecode offset {0}")]
    DeadCode(usize),
    #[error("cannot compute stack map at bytecode offset {offset}: {reason}")]
    StackMap { offset: usize, reason: String },

    #[error("label {0} is referenced but never bound")]
    UnboundLabel(Label),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClassError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassError::IllegalArgument(_)
            | ClassError::LabelAlreadyBound(_)
            | ClassError::ForeignLabel(_)
            | ClassError::EmptyTryBlock
            | ClassError::DuplicateCatch(_)
            | ClassError::CodeTooLarge(_)
            | ClassError::BranchOutOfRange { .. }
            | ClassError::PoolOverflow
            | ClassError::Utf8TooLong(_)
            | ClassError::UnmappedAttribute(_)
            | ClassError::DeadCode(_)
            | ClassError::StackMap { .. } => ErrorKind::Usage,
            ClassError::UnboundLabel(_) => ErrorKind::UnboundReference,
            ClassError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }

    pub(crate) fn illegal<S: Into<String>>(message: S) -> Self {
        ClassError::IllegalArgument(message.into())
    }
}

/// One processing session: a set of [`Options`] shared by every model parsed
/// and every builder created through it.
#[derive(Clone, Debug, Default)]
pub struct ClassFile {
    options: Arc<Options>,
}

impl ClassFile {
    pub fn new() -> Self {
        ClassFile::default()
    }

    pub fn with_options(options: Options) -> Self {
        ClassFile {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Parses the header, constant pool and member boundaries of a class.
    /// Member attributes and code bodies are inflated on first access.
    pub fn parse<B: Into<Arc<[u8]>>>(&self, bytes: B) -> ClassResult<ClassModel> {
        ClassModel::parse(bytes.into(), self.options.clone())
    }

    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> ClassResult<ClassModel> {
        let bytes = std::fs::read(path.as_ref())?;
        log::debug!("read {} bytes from {}", bytes.len(), path.as_ref().display());
        self.parse(bytes)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P, bytes: &[u8]) -> ClassResult<()> {
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Builds a class from scratch. The superclass defaults to
    /// `java/lang/Object`.
    pub fn build<F>(&self, this_class: &str, handler: F) -> ClassResult<Vec<u8>>
    where
        F: FnOnce(&mut ClassBuilder) -> ClassResult<()>,
    {
        let mut builder = ClassBuilder::new(this_class, self.options.clone(), PoolBuilder::new());
        builder.with_superclass("java/lang/Object")?;
        handler(&mut builder)?;
        builder.build()
    }

    /// Streams the elements of `model` through `transform` into a new class.
    ///
    /// When constant pool sharing is enabled, the new class starts from the
    /// original pool, and members that pass through untouched are copied as
    /// raw bytes.
    pub fn transform<T: Transform<ClassBuilder>>(
        &self,
        model: &ClassModel,
        transform: T,
    ) -> ClassResult<Vec<u8>> {
        let pool = if self.options.share_constant_pool {
            PoolBuilder::shared(model.pool().clone(), model.reader().raw_bootstrap_methods()?)
        } else {
            PoolBuilder::new()
        };

        let mut builder = ClassBuilder::new(&model.this_class(), self.options.clone(), pool);
        builder.pipeline().push(transform);
        crate::transform::run_start(&mut builder)?;
        for element in model.elements()? {
            builder.with(element)?;
        }
        crate::transform::run_end(&mut builder)?;
        builder.build()
    }
}
