//! Camera access permissions as reported and requested through VmbC.

/// Bit mask of access modes.
///
/// The SDK reports the modes a camera permits as a mask and takes a single
/// mode when opening a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMode {
    code: u32,
}

use vmbc_sys::VmbAccessModeType::*;

pub const NONE: AccessMode = AccessMode {
    code: VmbAccessModeNone,
};
pub const FULL: AccessMode = AccessMode {
    code: VmbAccessModeFull,
};
pub const READ: AccessMode = AccessMode {
    code: VmbAccessModeRead,
};
pub const UNKNOWN: AccessMode = AccessMode {
    code: VmbAccessModeUnknown,
};
pub const EXCLUSIVE: AccessMode = AccessMode {
    code: VmbAccessModeExclusive,
};

const NAMED_MODES: [(AccessMode, &str); 4] = [
    (FULL, "Full access"),
    (READ, "Read access"),
    (UNKNOWN, "Unknown access"),
    (EXCLUSIVE, "Exclusive access"),
];

impl AccessMode {
    pub fn new(code: u32) -> Self {
        Self { code }
    }
    pub fn as_u32(&self) -> u32 {
        self.code
    }
    /// True if every bit of `other` is set in `self`.
    pub fn contains(&self, other: AccessMode) -> bool {
        other.code != 0 && self.code & other.code == other.code
    }
    pub fn is_none(&self) -> bool {
        self.code == 0
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = NAMED_MODES
            .iter()
            .filter(|(mode, _)| self.contains(*mode))
            .map(|(_, name)| *name)
            .peekable();
        if names.peek().is_none() {
            return write!(f, "No access");
        }
        for (i, name) in names.enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_modes() {
        assert_eq!(FULL.to_string(), "Full access");
        assert_eq!(READ.to_string(), "Read access");
        assert_eq!(EXCLUSIVE.to_string(), "Exclusive access");
        assert_eq!(NONE.to_string(), "No access");
    }

    #[test]
    fn combined_modes_keep_bit_order() {
        let mode = AccessMode::new(EXCLUSIVE.as_u32() | FULL.as_u32() | READ.as_u32());
        assert_eq!(mode.to_string(), "Full access, Read access, Exclusive access");
        assert!(mode.contains(READ));
        assert!(!mode.contains(UNKNOWN));
        assert!(!mode.contains(NONE));
    }

    #[test]
    fn codes_follow_vmbc() {
        // As `VmbCameraOpen` expects them.
        assert_eq!(NONE.as_u32(), 0);
        assert_eq!(FULL.as_u32(), 1);
        assert_eq!(READ.as_u32(), 2);
        assert_eq!(UNKNOWN.as_u32(), 4);
        assert_eq!(EXCLUSIVE.as_u32(), 8);
    }

    #[test]
    fn unnamed_bits_are_ignored() {
        assert_eq!(AccessMode::new(0x100).to_string(), "No access");
        assert_eq!(AccessMode::new(0x102).to_string(), "Read access");
    }
}
