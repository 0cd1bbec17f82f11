use std::ffi::CString;

use vmbc_sys::{VmbFeatureInfo_t, VmbHandle_t};

use crate::{Result, c_str_to_string, struct_size};

/// Data type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureDataType {
    Unknown,
    Int,
    Float,
    Enum,
    String,
    Bool,
    Command,
    Raw,
    None,
}

impl FeatureDataType {
    pub fn from_code(code: u32) -> Self {
        use FeatureDataType::*;
        match code {
            1 => Int,
            2 => Float,
            3 => Enum,
            4 => String,
            5 => Bool,
            6 => Command,
            7 => Raw,
            8 => None,
            _ => Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use FeatureDataType::*;
        match self {
            Unknown => "unknown",
            Int => "int",
            Float => "float",
            Enum => "enum",
            String => "string",
            Bool => "bool",
            Command => "command",
            Raw => "raw",
            None => "none",
        }
    }
}

impl std::fmt::Display for FeatureDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Access flags of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    flags: u32,
}

impl FeatureFlags {
    pub const READ: u32 = 1;
    pub const WRITE: u32 = 2;
    pub const VOLATILE: u32 = 8;
    pub const MODIFY_WRITE: u32 = 16;

    pub fn new(flags: u32) -> Self {
        Self { flags }
    }
    pub fn is_readable(&self) -> bool {
        self.flags & Self::READ != 0
    }
    pub fn is_writeable(&self) -> bool {
        self.flags & Self::WRITE != 0
    }
    pub fn is_volatile(&self) -> bool {
        self.flags & Self::VOLATILE != 0
    }
    pub fn modifies_on_write(&self) -> bool {
        self.flags & Self::MODIFY_WRITE != 0
    }
}

impl std::fmt::Display for FeatureFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            letter(self.is_readable(), 'R'),
            letter(self.is_writeable(), 'W'),
            letter(self.is_volatile(), 'V'),
            letter(self.modifies_on_write(), 'M'),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfo {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub unit: String,
    pub data_type: FeatureDataType,
    pub flags: FeatureFlags,
}

impl FeatureInfo {
    fn from_raw(orig: &VmbFeatureInfo_t) -> Result<Self> {
        Ok(Self {
            name: unsafe { c_str_to_string(orig.name) }?,
            display_name: unsafe { c_str_to_string(orig.displayName) }?,
            category: unsafe { c_str_to_string(orig.category) }?,
            unit: unsafe { c_str_to_string(orig.unit) }?,
            data_type: FeatureDataType::from_code(orig.featureDataType as u32),
            flags: FeatureFlags::new(orig.featureFlags as u32),
        })
    }
}

/// Feature access through any VmbC handle that carries features.
///
/// For a camera this is the camera handle. Inside
/// [crate::Camera::chunk_data_access] it is the chunk access handle, which is
/// only valid for the duration of the callback.
pub struct Features<'lib> {
    handle: VmbHandle_t,
    vimba_lib: &'lib vmbc_sys::VimbaC,
}

fn _test_enum_entry_outlives_handle() {
    // Compile-time test: values read through a chunk handle may be kept
    // after the callback returns.
    fn keep(features: &Features<'_>) -> Result<String> {
        let value = features.enum_entry("ChunkLineStatusAll")?;
        Ok(value)
    }
    let _ = keep;
}

impl<'lib> std::fmt::Debug for Features<'lib> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "Features {{ handle {:p} }}", self.handle)
    }
}

impl<'lib> Features<'lib> {
    pub(crate) fn new(handle: VmbHandle_t, vimba_lib: &'lib vmbc_sys::VimbaC) -> Self {
        Self { handle, vimba_lib }
    }

    pub fn handle(&self) -> VmbHandle_t {
        self.handle
    }

    pub fn list(&self) -> Result<Vec<FeatureInfo>> {
        let mut num_found = 0;
        vimba_call!(self.vimba_lib.VmbFeaturesList(
            self.handle,
            std::ptr::null_mut(),
            0,
            &mut num_found,
            struct_size::<VmbFeatureInfo_t>(),
        ))?;

        // Plain C struct of pointers and integers, so all-zero is valid.
        let mut raw: Vec<VmbFeatureInfo_t> = (0..num_found)
            .map(|_| unsafe { std::mem::zeroed() })
            .collect();
        let mut num_filled = 0;
        vimba_call!(self.vimba_lib.VmbFeaturesList(
            self.handle,
            raw.as_mut_ptr(),
            num_found,
            &mut num_filled,
            struct_size::<VmbFeatureInfo_t>(),
        ))?;
        raw.truncate(num_filled as usize);

        raw.iter().map(FeatureInfo::from_raw).collect()
    }

    /// Query the access permissions of feature with `name`.
    ///
    /// The return value is (is_readable, is_writeable).
    pub fn access(&self, name: &str) -> Result<(bool, bool)> {
        let mut is_readable = 0;
        let mut is_writeable = 0;
        let name = CString::new(name)?;
        vimba_call!(self.vimba_lib.VmbFeatureAccessQuery(
            self.handle,
            name.as_ptr(),
            &mut is_readable,
            &mut is_writeable,
        ))?;

        Ok((is_readable != 0, is_writeable != 0))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        let mut result = 0;
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureIntGet(self.handle, name.as_ptr(), &mut result))?;
        Ok(result)
    }

    pub fn set_int(&self, name: &str, value: i64) -> Result<()> {
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureIntSet(self.handle, name.as_ptr(), value))?;
        Ok(())
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        let mut result = 0.0;
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureFloatGet(self.handle, name.as_ptr(), &mut result))?;
        Ok(result)
    }

    pub fn set_float(&self, name: &str, value: f64) -> Result<()> {
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureFloatSet(self.handle, name.as_ptr(), value))?;
        Ok(())
    }

    pub fn float_range(&self, name: &str) -> Result<(f64, f64)> {
        let mut min = 0.0;
        let mut max = 0.0;
        let name = CString::new(name)?;
        vimba_call!(self.vimba_lib.VmbFeatureFloatRangeQuery(
            self.handle,
            name.as_ptr(),
            &mut min,
            &mut max
        ))?;
        Ok((min, max))
    }

    pub fn boolean(&self, name: &str) -> Result<bool> {
        let mut result = 0;
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureBoolGet(self.handle, name.as_ptr(), &mut result))?;
        Ok(result != 0)
    }

    pub fn set_boolean(&self, name: &str, value: bool) -> Result<()> {
        let value = if value { 1 } else { 0 };
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureBoolSet(self.handle, name.as_ptr(), value))?;
        Ok(())
    }

    /// Current entry of an enum feature. The name is copied, as chunk
    /// access handles are only valid inside their callback.
    pub fn enum_entry(&self, name: &str) -> Result<String> {
        let mut result: *const std::os::raw::c_char = std::ptr::null();
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureEnumGet(self.handle, name.as_ptr(), &mut result))?;
        unsafe { c_str_to_string(result) }
    }

    pub fn set_enum_entry(&self, name: &str, value: &str) -> Result<()> {
        let value = CString::new(value)?;
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureEnumSet(self.handle, name.as_ptr(), value.as_ptr()))?;
        Ok(())
    }

    pub fn enum_range(&self, name: &str) -> Result<Vec<String>> {
        let name = CString::new(name)?;
        let mut num_filled = 0;
        // initial query: get size of array
        vimba_call!(self.vimba_lib.VmbFeatureEnumRangeQuery(
            self.handle,
            name.as_ptr(),
            std::ptr::null_mut(),
            0,
            &mut num_filled,
        ))?;

        let mut p_name_array = vec![std::ptr::null(); num_filled as usize];

        let mut num_final = 0;
        vimba_call!(self.vimba_lib.VmbFeatureEnumRangeQuery(
            self.handle,
            name.as_ptr(),
            p_name_array.as_mut_ptr(),
            num_filled,
            &mut num_final,
        ))?;

        p_name_array
            .into_iter()
            .take(num_final as usize)
            .map(|ptr| unsafe { c_str_to_string(ptr) })
            .collect()
    }

    pub fn string(&self, name: &str) -> Result<String> {
        let name = CString::new(name)?;
        let mut size_needed = 0;
        vimba_call!(self.vimba_lib.VmbFeatureStringGet(
            self.handle,
            name.as_ptr(),
            std::ptr::null_mut(),
            0,
            &mut size_needed,
        ))?;
        if size_needed == 0 {
            return Ok(String::new());
        }

        let mut buf: Vec<std::os::raw::c_char> = vec![0; size_needed as usize];
        let mut size_filled = 0;
        vimba_call!(self.vimba_lib.VmbFeatureStringGet(
            self.handle,
            name.as_ptr(),
            buf.as_mut_ptr(),
            size_needed,
            &mut size_filled,
        ))?;
        // guarantee termination even if the SDK filled the whole buffer
        if let Some(last) = buf.last_mut() {
            *last = 0;
        }
        unsafe { c_str_to_string(buf.as_ptr()) }
    }

    pub fn set_string(&self, name: &str, value: &str) -> Result<()> {
        let value = CString::new(value)?;
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureStringSet(self.handle, name.as_ptr(), value.as_ptr()))?;
        Ok(())
    }

    pub fn command_run(&self, name: &str) -> Result<()> {
        tracing::debug!("{:?} command_run {}", self, name);
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureCommandRun(self.handle, name.as_ptr()))?;
        Ok(())
    }

    pub fn command_is_done(&self, name: &str) -> Result<bool> {
        let mut is_done = 0;
        let name = CString::new(name)?;
        vimba_call!(self
            .vimba_lib
            .VmbFeatureCommandIsDone(self.handle, name.as_ptr(), &mut is_done))?;
        Ok(is_done != 0)
    }

    /// Run a command and poll until the camera reports it finished.
    ///
    /// Returns `Ok(false)` if the command is still running after `max_polls`
    /// polls spaced by `poll_interval`.
    pub fn command_run_and_wait(
        &self,
        name: &str,
        poll_interval: std::time::Duration,
        max_polls: usize,
    ) -> Result<bool> {
        self.command_run(name)?;
        for _ in 0..max_polls {
            if self.command_is_done(name)? {
                return Ok(true);
            }
            std::thread::sleep(poll_interval);
        }
        Ok(false)
    }

    /// Read the current value of a feature and render it as text.
    pub fn value_string(&self, info: &FeatureInfo) -> Result<String> {
        if !info.flags.is_readable() {
            return Ok("<not readable>".into());
        }
        let name = info.name.as_str();
        Ok(match info.data_type {
            FeatureDataType::Int => self.int(name)?.to_string(),
            FeatureDataType::Float => self.float(name)?.to_string(),
            FeatureDataType::Bool => self.boolean(name)?.to_string(),
            FeatureDataType::Enum => self.enum_entry(name)?,
            FeatureDataType::String => self.string(name)?,
            other => format!("<{other}>"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_codes() {
        assert_eq!(FeatureDataType::from_code(1), FeatureDataType::Int);
        assert_eq!(FeatureDataType::from_code(6), FeatureDataType::Command);
        assert_eq!(FeatureDataType::from_code(8), FeatureDataType::None);
        assert_eq!(FeatureDataType::from_code(0), FeatureDataType::Unknown);
        assert_eq!(FeatureDataType::from_code(99), FeatureDataType::Unknown);
        assert_eq!(FeatureDataType::Enum.to_string(), "enum");
    }

    #[test]
    fn flags_display() {
        let rw = FeatureFlags::new(FeatureFlags::READ | FeatureFlags::WRITE);
        assert!(rw.is_readable());
        assert!(rw.is_writeable());
        assert!(!rw.is_volatile());
        assert_eq!(rw.to_string(), "RW--");
        assert_eq!(FeatureFlags::new(0).to_string(), "----");
        assert_eq!(
            FeatureFlags::new(FeatureFlags::READ | FeatureFlags::VOLATILE).to_string(),
            "R-V-"
        );
        assert_eq!(FeatureFlags::new(FeatureFlags::MODIFY_WRITE).to_string(), "---M");
    }
}
