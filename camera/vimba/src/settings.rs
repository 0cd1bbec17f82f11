use vmbc_sys::VmbFeaturePersistSettings_t;

/// Which features are written when camera settings are saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistType {
    /// Every feature, including look-up tables.
    All,
    /// Only features marked streamable.
    #[default]
    Streamable,
    /// Every feature except look-up tables.
    NoLut,
}

/// Options for `VmbSettingsSave` and `VmbSettingsLoad`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistSettings {
    pub persist_type: PersistType,
    /// Number of passes the SDK makes when loading, to resolve features
    /// that depend on each other.
    pub max_iterations: u32,
    pub logging_level: u32,
}

impl Default for PersistSettings {
    fn default() -> Self {
        // These match the Vimba X viewer.
        Self {
            persist_type: PersistType::Streamable,
            max_iterations: 10,
            logging_level: 4,
        }
    }
}

impl PersistSettings {
    pub(crate) fn to_raw(&self) -> VmbFeaturePersistSettings_t {
        use vmbc_sys::VmbFeaturePersistType::*;
        let persist_type = match self.persist_type {
            PersistType::All => VmbFeaturePersistAll,
            PersistType::Streamable => VmbFeaturePersistStreamable,
            PersistType::NoLut => VmbFeaturePersistNoLUT,
        };
        VmbFeaturePersistSettings_t {
            persistType: persist_type,
            modulePersistFlags: vmbc_sys::VmbModulePersistFlagsType::VmbModulePersistFlagsNone,
            maxIterations: self.max_iterations,
            loggingLevel: self.logging_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = PersistSettings::default();
        assert_eq!(settings.persist_type, PersistType::Streamable);
        let raw = settings.to_raw();
        assert_eq!(raw.maxIterations, 10);
        assert_eq!(raw.loggingLevel, 4);
    }

    #[test]
    fn persist_type_codes() {
        use vmbc_sys::VmbFeaturePersistType::*;
        let settings = PersistSettings {
            persist_type: PersistType::NoLut,
            ..Default::default()
        };
        assert_eq!(settings.to_raw().persistType, VmbFeaturePersistNoLUT);
    }
}
