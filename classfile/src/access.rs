use std::{fmt, ops::*};

/// Marked or implicitly public in source.
pub const ACC_PUBLIC: u16 = 0x0001;
/// Marked private in source.
pub const ACC_PRIVATE: u16 = 0x0002;
/// Marked protected in source.
pub const ACC_PROTECTED: u16 = 0x0004;
/// Declared static.
pub const ACC_STATIC: u16 = 0x0008;
/// Declared final; must not be overridden (§5.4.5).
pub const ACC_FINAL: u16 = 0x0010;
/// Treat superclass methods specially when invoked by the invokespecial
/// instruction.
pub const ACC_SUPER: u16 = 0x0020;
/// Declared synchronized; invocation is wrapped by a monitor use.
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
/// Declared volatile; cannot be cached.
pub const ACC_VOLATILE: u16 = 0x0040;
/// A bridge method, generated by the compiler.
pub const ACC_BRIDGE: u16 = 0x0040;
/// Declared transient; not written or read by a persistent object manager.
pub const ACC_TRANSIENT: u16 = 0x0080;
/// Declared with variable number of arguments.
pub const ACC_VARARGS: u16 = 0x0080;
/// Declared native; implemented in a language other than Java.
pub const ACC_NATIVE: u16 = 0x0100;
/// Is an interface, not a class.
pub const ACC_INTERFACE: u16 = 0x0200;
/// Declared abstract; no implementation is provided.
pub const ACC_ABSTRACT: u16 = 0x0400;
/// Declared strictfp; floating-point mode is FP-strict.
pub const ACC_STRICT: u16 = 0x0800;
/// Declared synthetic; not present in the source code.
pub const ACC_SYNTHETIC: u16 = 0x1000;
/// Declared as an annotation type.
pub const ACC_ANNOTATION: u16 = 0x2000;
/// Declared as an enum type.
pub const ACC_ENUM: u16 = 0x4000;
/// A module, not a class or interface.
pub const ACC_MODULE: u16 = 0x8000;
/// A formal parameter that was implicitly declared in source.
pub const ACC_MANDATED: u16 = 0x8000;

/// The `access_flags` of a class, field, method, inner class or parameter.
/// Several bits mean different things depending on where they appear, so
/// rendering takes a [`FlagLocation`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags(0);
    pub const PUBLIC: AccessFlags = AccessFlags(ACC_PUBLIC);
    pub const PRIVATE: AccessFlags = AccessFlags(ACC_PRIVATE);
    pub const PROTECTED: AccessFlags = AccessFlags(ACC_PROTECTED);
    pub const STATIC: AccessFlags = AccessFlags(ACC_STATIC);
    pub const FINAL: AccessFlags = AccessFlags(ACC_FINAL);
    pub const SUPER: AccessFlags = AccessFlags(ACC_SUPER);
    pub const SYNCHRONIZED: AccessFlags = AccessFlags(ACC_SYNCHRONIZED);
    pub const VOLATILE: AccessFlags = AccessFlags(ACC_VOLATILE);
    pub const BRIDGE: AccessFlags = AccessFlags(ACC_BRIDGE);
    pub const TRANSIENT: AccessFlags = AccessFlags(ACC_TRANSIENT);
    pub const VARARGS: AccessFlags = AccessFlags(ACC_VARARGS);
    pub const NATIVE: AccessFlags = AccessFlags(ACC_NATIVE);
    pub const INTERFACE: AccessFlags = AccessFlags(ACC_INTERFACE);
    pub const ABSTRACT: AccessFlags = AccessFlags(ACC_ABSTRACT);
    pub const STRICT: AccessFlags = AccessFlags(ACC_STRICT);
    pub const SYNTHETIC: AccessFlags = AccessFlags(ACC_SYNTHETIC);
    pub const ANNOTATION: AccessFlags = AccessFlags(ACC_ANNOTATION);
    pub const ENUM: AccessFlags = AccessFlags(ACC_ENUM);
    pub const MODULE: AccessFlags = AccessFlags(ACC_MODULE);

    pub fn is(self, flags: AccessFlags) -> bool {
        self.0 & flags.0 == flags.0 && flags.0 != 0
    }

    pub fn into_raw(self) -> u16 {
        self.0
    }

    pub fn access(self) -> Access {
        if self.is(AccessFlags::PUBLIC) {
            Access::Public
        } else if self.is(AccessFlags::PROTECTED) {
            Access::Protected
        } else if self.is(AccessFlags::PRIVATE) {
            Access::Private
        } else {
            Access::PackagePrivate
        }
    }

    /// Checks the flag combinations the JVM rejects outright.
    pub fn is_valid_for(self, location: FlagLocation) -> bool {
        let flags = self.0;
        if (flags & (ACC_PUBLIC | ACC_PROTECTED | ACC_PRIVATE)).count_ones() > 1 {
            return false;
        }

        match location {
            FlagLocation::Class | FlagLocation::InnerClass => {
                if flags & ACC_ANNOTATION != 0 && flags & ACC_INTERFACE == 0 {
                    return false;
                }
                if flags & ACC_INTERFACE != 0 && flags & (ACC_FINAL | ACC_ENUM) != 0 {
                    return false;
                }
                flags & ACC_FINAL == 0 || flags & ACC_ABSTRACT == 0
            }
            FlagLocation::Field => flags & ACC_FINAL == 0 || flags & ACC_VOLATILE == 0,
            FlagLocation::Method => {
                const ABSTRACT_CONFLICTS: u16 =
                    ACC_FINAL | ACC_NATIVE | ACC_PRIVATE | ACC_STATIC | ACC_STRICT | ACC_SYNCHRONIZED;
                flags & ACC_ABSTRACT == 0 || flags & ABSTRACT_CONFLICTS == 0
            }
            FlagLocation::Parameter => true,
        }
    }

    /// Renders the flags as source-level modifiers.
    pub fn display(self, location: FlagLocation) -> DisplayFlags {
        DisplayFlags { flags: self, location }
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, other: Self) -> Self {
        AccessFlags(self.0 | other.0)
    }
}

impl BitOrAssign for AccessFlags {
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitAnd for AccessFlags {
    type Output = AccessFlags;

    fn bitand(self, other: Self) -> Self {
        AccessFlags(self.0 & other.0)
    }
}

impl Not for AccessFlags {
    type Output = AccessFlags;

    fn not(self) -> Self {
        AccessFlags(!self.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Access {
    Public,
    Protected,
    PackagePrivate,
    Private,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FlagLocation {
    Class,
    InnerClass,
    Field,
    Method,
    Parameter,
}

pub struct DisplayFlags {
    flags: AccessFlags,
    location: FlagLocation,
}

impl fmt::Display for DisplayFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = self.flags;
        let mut was_written = false;
        let mut write = |s: &str| {
            if was_written {
                write!(f, " {}", s)
            } else {
                was_written = true;
                write!(f, "{}", s)
            }
        };

        match flags.access() {
            Access::Public => write("public")?,
            Access::Protected => write("protected")?,
            Access::Private => write("private")?,
            Access::PackagePrivate => {}
        }

        let modifiers: &[(u16, &str)] = match self.location {
            FlagLocation::Class | FlagLocation::InnerClass => &[
                (ACC_STATIC, "static"),
                (ACC_FINAL, "final"),
                (ACC_SYNTHETIC, "synthetic"),
            ],
            FlagLocation::Field => &[
                (ACC_STATIC, "static"),
                (ACC_FINAL, "final"),
                (ACC_VOLATILE, "volatile"),
                (ACC_TRANSIENT, "transient"),
                (ACC_SYNTHETIC, "synthetic"),
                (ACC_ENUM, "enum"),
            ],
            FlagLocation::Method => &[
                (ACC_STATIC, "static"),
                (ACC_FINAL, "final"),
                (ACC_ABSTRACT, "abstract"),
                (ACC_SYNCHRONIZED, "synchronized"),
                (ACC_NATIVE, "native"),
                (ACC_STRICT, "strictfp"),
                (ACC_BRIDGE, "bridge"),
                (ACC_VARARGS, "varargs"),
                (ACC_SYNTHETIC, "synthetic"),
            ],
            FlagLocation::Parameter => &[
                (ACC_FINAL, "final"),
                (ACC_SYNTHETIC, "synthetic"),
                (ACC_MANDATED, "mandated"),
            ],
        };

        for &(bit, name) in modifiers {
            if flags.0 & bit != 0 {
                write(name)?;
            }
        }

        if let FlagLocation::Class | FlagLocation::InnerClass = self.location {
            if flags.0 & ACC_ANNOTATION != 0 {
                write("@interface")?;
            } else if flags.0 & ACC_INTERFACE != 0 {
                write("interface")?;
            } else if flags.0 & ACC_ENUM != 0 {
                write("enum")?;
            } else if flags.0 & ACC_MODULE != 0 {
                write("module")?;
            } else {
                if flags.0 & ACC_ABSTRACT != 0 {
                    write("abstract")?;
                }
                write("class")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_modifiers() {
        let flags = AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::SYNCHRONIZED;
        assert_eq!(flags.display(FlagLocation::Method).to_string(), "public static synchronized");
        assert!(flags.is(AccessFlags::STATIC));
        assert!(!flags.is(AccessFlags::NONE));
    }

    #[test]
    fn shared_bits_depend_on_location() {
        let flags = AccessFlags(ACC_SUPER | ACC_PUBLIC);
        assert_eq!(flags.display(FlagLocation::Class).to_string(), "public class");
        assert_eq!(flags.display(FlagLocation::Method).to_string(), "public synchronized");
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        assert!(!(AccessFlags::PUBLIC | AccessFlags::PRIVATE).is_valid_for(FlagLocation::Field));
        assert!(!(AccessFlags::ABSTRACT | AccessFlags::STATIC).is_valid_for(FlagLocation::Method));
        assert!((AccessFlags::ABSTRACT | AccessFlags::INTERFACE).is_valid_for(FlagLocation::Class));
    }
}
