//! Safe bindings to the Allied Vision VmbC (Vimba X) C API.
//!
//! The shared library is loaded at runtime. [VimbaLibrary] starts the API on
//! construction and shuts it down on drop. Cameras borrow the library, so
//! they can never outlive it.

use std::{ffi::CString, os::raw::c_char, pin::Pin};

use machine_vision_formats as formats;

use vmbc_sys::{
    VmbCameraInfo_t, VmbErrorType, VmbFrame_t, VmbFrameCallback, VmbHandle_t, VmbInterfaceInfo_t,
    VmbTransportLayerInfo_t, VmbVersionInfo_t,
};

fn err_str(err: i32) -> &'static str {
    use VmbErrorType::*;
    #[allow(non_upper_case_globals)]
    match err {
        VmbErrorSuccess => "VmbErrorSuccess",
        VmbErrorInternalFault => "VmbErrorInternalFault",
        VmbErrorApiNotStarted => "VmbErrorApiNotStarted",
        VmbErrorNotFound => "VmbErrorNotFound",
        VmbErrorBadHandle => "VmbErrorBadHandle",
        VmbErrorDeviceNotOpen => "VmbErrorDeviceNotOpen",
        VmbErrorInvalidAccess => "VmbErrorInvalidAccess",
        VmbErrorBadParameter => "VmbErrorBadParameter",
        VmbErrorStructSize => "VmbErrorStructSize",
        VmbErrorMoreData => "VmbErrorMoreData",
        VmbErrorWrongType => "VmbErrorWrongType",
        VmbErrorInvalidValue => "VmbErrorInvalidValue",
        VmbErrorTimeout => "VmbErrorTimeout",
        VmbErrorOther => "VmbErrorOther",
        VmbErrorResources => "VmbErrorResources",
        VmbErrorInvalidCall => "VmbErrorInvalidCall",
        VmbErrorNoTL => "VmbErrorNoTL",
        VmbErrorNotImplemented => "VmbErrorNotImplemented",
        VmbErrorNotSupported => "VmbErrorNotSupported",
        VmbErrorIncomplete => "VmbErrorIncomplete",
        VmbErrorIO => "VmbErrorIO",
        VmbErrorValidValueSetNotPresent => "VmbErrorValidValueSetNotPresent",
        VmbErrorGenTLUnspecified => "VmbErrorGenTLUnspecified",
        VmbErrorUnspecified => "VmbErrorUnspecified",
        VmbErrorBusy => "VmbErrorBusy",
        VmbErrorNoData => "VmbErrorNoData",
        VmbErrorParsingChunkData => "VmbErrorParsingChunkData",
        VmbErrorInUse => "VmbErrorInUse",
        VmbErrorUnknown => "VmbErrorUnknown",
        VmbErrorXml => "VmbErrorXml",
        VmbErrorNotAvailable => "VmbErrorNotAvailable",
        VmbErrorNotInitialized => "VmbErrorNotInitialized",
        VmbErrorInvalidAddress => "VmbErrorInvalidAddress",
        VmbErrorAlready => "VmbErrorAlready",
        VmbErrorNoChunkData => "VmbErrorNoChunkData",
        VmbErrorUserCallbackException => "VmbErrorUserCallbackException",
        VmbErrorFeaturesUnavailable => "VmbErrorFeaturesUnavailable",
        VmbErrorTLNotFound => "VmbErrorTLNotFound",
        VmbErrorAmbiguous => "VmbErrorAmbiguous",
        VmbErrorRetriesExceeded => "VmbErrorRetriesExceeded",
        VmbErrorInsufficientBufferCount => "VmbErrorInsufficientBufferCount",
        VmbErrorCustom => "VmbErrorCustom",
        _ => "unknown error",
    }
}

#[derive(thiserror::Error, Debug)]
#[error("Vimba X error {code}: {msg}")]
pub struct VimbaError {
    pub code: i32,
    pub msg: &'static str,
}

impl From<i32> for VimbaError {
    fn from(code: i32) -> VimbaError {
        VimbaError {
            code,
            msg: err_str(code),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Loading library at {vimbac_path}")]
    LibLoading {
        source: libloading::Error,
        vimbac_path: std::path::PathBuf,
    },
    #[cfg(target_os = "windows")]
    #[error("{source}")]
    Windows {
        #[from]
        source: windows::core::Error,
    },
    #[error("{source}")]
    Vimba {
        #[from]
        source: VimbaError,
    },
    #[error("{source}")]
    NulError {
        #[from]
        source: std::ffi::NulError,
    },
    #[error("{source}")]
    Utf8Error {
        #[from]
        source: std::str::Utf8Error,
    },
    #[error("invalid IPv4 address \"{addr}\"")]
    InvalidIpAddress {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("unknown pixel format {fmt}")]
    UnknownPixelFormat { fmt: String },
    #[error("unknown pixel format code 0x{code:X}")]
    UnknownPixelFormatCode { code: u32 },
    #[error("frame not complete (receive status: {status})")]
    FrameNotComplete { status: FrameStatus },
    #[error("frame has no chunk data")]
    NoChunkData {},
    #[error("camera has no stream {index} ({count} streams open)")]
    NoStream { index: usize, count: u32 },
    #[error("panic in chunk data callback")]
    CallbackPanic {},
    #[error("invalid call")]
    InvalidCall {},
}

pub type Result<T> = std::result::Result<T, Error>;

#[doc(hidden)]
pub fn vimba_err(err: i32) -> std::result::Result<(), VimbaError> {
    if err == VmbErrorType::VmbErrorSuccess {
        Ok(())
    } else {
        Err(VimbaError::from(err))
    }
}

macro_rules! vimba_call_no_err {
    ($expr: expr_2021) => {{
        tracing::debug!("calling: {} {}:{}", stringify!($expr), file!(), line!());
        unsafe { $expr }
    }};
}

macro_rules! vimba_call {
    ($expr: expr_2021) => {{
        let errcode = vimba_call_no_err!($expr);
        tracing::debug!("  errcode: {}", errcode);

        $crate::vimba_err(errcode)
    }};
}

pub mod access_mode;
mod feature;
pub mod ip;
mod settings;
mod transport_layer;

pub use access_mode::AccessMode;
pub use feature::{FeatureDataType, FeatureFlags, FeatureInfo, Features};
pub use ip::{host_u32_to_ip_address, ip_address_to_host_u32};
pub use settings::{PersistSettings, PersistType};
pub use transport_layer::TransportLayerType;

/// Size of an SDK struct, as the `sizeof...` arguments expect it.
pub(crate) fn struct_size<T>() -> u32 {
    std::mem::size_of::<T>() as u32
}

/// Copy a string owned by the SDK. A null pointer gives an empty string.
pub(crate) unsafe fn c_str_to_string(ptr: *const c_char) -> Result<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    Ok(unsafe { std::ffi::CStr::from_ptr(ptr) }.to_str()?.to_string())
}

#[cfg(target_os = "linux")]
const VMBC_LIB_NAME: &str = "libVmbC.so";
#[cfg(target_os = "macos")]
const VMBC_LIB_NAME: &str = "libVmbC.dylib";
#[cfg(target_os = "windows")]
const VMBC_LIB_NAME: &str = "VmbC.dll";

/// Location of the VmbC library inside a Vimba X installation.
pub fn vmbc_path_in_vimba_x_home<P: AsRef<std::path::Path>>(vimba_x_home: P) -> std::path::PathBuf {
    let home = vimba_x_home.as_ref();
    if cfg!(target_os = "windows") {
        home.join("bin").join(VMBC_LIB_NAME)
    } else {
        home.join("api").join("lib").join(VMBC_LIB_NAME)
    }
}

/// Opaque identity of an SDK handle, used to relate cameras to their
/// interface and transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleKey(usize);

impl HandleKey {
    fn from_raw(handle: VmbHandle_t) -> Self {
        Self(handle as usize)
    }
}

pub struct VimbaLibrary {
    pub vimba_lib: vmbc_sys::VimbaC,
    started: bool,
}

impl VimbaLibrary {
    /// Load VmbC from `$VIMBA_X_HOME` or the platform's default install
    /// location, then start the API.
    pub fn new() -> Result<Self> {
        let vimbac_path = match std::env::var_os("VIMBA_X_HOME") {
            Some(vimba_x_home) => vmbc_path_in_vimba_x_home(vimba_x_home),
            None => {
                #[cfg(target_os = "windows")]
                let vmbc_path = {
                    // Tell Windows to add this directory to DLL search path.
                    let dll_path =
                        windows::core::s!(r#"C:\Program Files\Allied Vision\Vimba X\bin"#);
                    unsafe { windows::Win32::System::LibraryLoader::SetDllDirectoryA(dll_path) }?;
                    // Now we directly open this DLL, which should now be on the search path.
                    VMBC_LIB_NAME
                };

                #[cfg(target_os = "linux")]
                let vmbc_path = "/opt/VimbaX_2024-1/api/lib/libVmbC.so";

                #[cfg(target_os = "macos")]
                let vmbc_path = "/Library/Frameworks/VmbC.framework/Versions/A/VmbC";
                std::path::PathBuf::from(vmbc_path)
            }
        };

        Self::from_dynamic_lib_path(vimbac_path)
    }

    pub fn from_dynamic_lib_path<P: AsRef<std::path::Path>>(vimbac_path: P) -> Result<Self> {
        tracing::debug!("loading VmbC from {}", vimbac_path.as_ref().display());
        let vimba_lib = match unsafe { vmbc_sys::VimbaC::new(vimbac_path.as_ref()) } {
            Ok(vimba_lib) => vimba_lib,
            Err(source) => {
                let vimbac_path = vimbac_path.as_ref().to_path_buf();
                return Err(Error::LibLoading {
                    source,
                    vimbac_path,
                });
            }
        };

        vimba_call!(vimba_lib.VmbStartup(std::ptr::null()))?;
        Ok(VimbaLibrary {
            vimba_lib,
            started: true,
        })
    }

    pub fn version(&self) -> Result<VersionInfo> {
        VersionInfo::new(&self.vimba_lib)
    }

    pub fn n_cameras(&self) -> Result<usize> {
        let mut n_count = 0;
        vimba_call!(self.vimba_lib.VmbCamerasList(
            std::ptr::null_mut(),
            0,
            &mut n_count,
            struct_size::<VmbCameraInfo_t>()
        ))?;
        Ok(n_count as usize)
    }

    pub fn camera_info(&self, n_count: usize) -> Result<Vec<CameraInfo>> {
        // Plain C struct of pointers and integers, so all-zero is valid.
        let mut cameras: Vec<VmbCameraInfo_t> =
            (0..n_count).map(|_| unsafe { std::mem::zeroed() }).collect();

        let mut n_found_count = 0;
        vimba_call!(self.vimba_lib.VmbCamerasList(
            cameras.as_mut_ptr(),
            n_count as u32,
            &mut n_found_count,
            struct_size::<VmbCameraInfo_t>()
        ))?;
        // Cameras may disappear between the two calls.
        cameras.truncate(n_found_count as usize);

        cameras.iter().map(CameraInfo::from_raw).collect()
    }

    /// All cameras currently known to the SDK.
    pub fn cameras(&self) -> Result<Vec<CameraInfo>> {
        let n_cams = self.n_cameras()?;
        if n_cams == 0 {
            return Ok(Vec::new());
        }
        self.camera_info(n_cams)
    }

    /// Look up one camera by ID. GigE cameras may also be given by IP address.
    pub fn camera_info_query(&self, camera_id: &str) -> Result<CameraInfo> {
        let id = CString::new(camera_id)?;
        let mut info: VmbCameraInfo_t = unsafe { std::mem::zeroed() };
        vimba_call!(self.vimba_lib.VmbCameraInfoQuery(
            id.as_ptr(),
            &mut info,
            struct_size::<VmbCameraInfo_t>()
        ))?;
        CameraInfo::from_raw(&info)
    }

    pub fn transport_layers(&self) -> Result<Vec<TransportLayerInfo>> {
        let mut n_found = 0;
        vimba_call!(self.vimba_lib.VmbTransportLayersList(
            std::ptr::null_mut(),
            0,
            &mut n_found,
            struct_size::<VmbTransportLayerInfo_t>()
        ))?;
        let mut raw: Vec<VmbTransportLayerInfo_t> =
            (0..n_found).map(|_| unsafe { std::mem::zeroed() }).collect();
        let mut n_filled = 0;
        vimba_call!(self.vimba_lib.VmbTransportLayersList(
            raw.as_mut_ptr(),
            n_found,
            &mut n_filled,
            struct_size::<VmbTransportLayerInfo_t>()
        ))?;
        raw.truncate(n_filled as usize);
        raw.iter().map(TransportLayerInfo::from_raw).collect()
    }

    pub fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        let mut n_found = 0;
        vimba_call!(self.vimba_lib.VmbInterfacesList(
            std::ptr::null_mut(),
            0,
            &mut n_found,
            struct_size::<VmbInterfaceInfo_t>()
        ))?;
        let mut raw: Vec<VmbInterfaceInfo_t> =
            (0..n_found).map(|_| unsafe { std::mem::zeroed() }).collect();
        let mut n_filled = 0;
        vimba_call!(self.vimba_lib.VmbInterfacesList(
            raw.as_mut_ptr(),
            n_found,
            &mut n_filled,
            struct_size::<VmbInterfaceInfo_t>()
        ))?;
        raw.truncate(n_filled as usize);
        raw.iter().map(InterfaceInfo::from_raw).collect()
    }
}

impl Drop for VimbaLibrary {
    fn drop(&mut self) {
        if self.started {
            vimba_call_no_err!(self.vimba_lib.VmbShutdown());
            self.started = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionInfo {
    pub fn new(vimba_c: &vmbc_sys::VimbaC) -> Result<Self> {
        let mut version_info = VmbVersionInfo_t {
            major: 0,
            minor: 0,
            patch: 0,
        };
        vimba_call!(vimba_c.VmbVersionQuery(
            &mut version_info,
            struct_size::<VmbVersionInfo_t>()
        ))?;
        Ok(Self {
            major: version_info.major,
            minor: version_info.minor,
            patch: version_info.patch,
        })
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone)]
pub struct TransportLayerInfo {
    pub id: String,
    pub name: String,
    pub model_name: String,
    pub vendor: String,
    pub version: String,
    pub path: String,
    pub transport_layer_type: TransportLayerType,
    pub key: HandleKey,
}

impl TransportLayerInfo {
    fn from_raw(tl: &VmbTransportLayerInfo_t) -> Result<Self> {
        Ok(Self {
            id: unsafe { c_str_to_string(tl.transportLayerIdString) }?,
            name: unsafe { c_str_to_string(tl.transportLayerName) }?,
            model_name: unsafe { c_str_to_string(tl.transportLayerModelName) }?,
            vendor: unsafe { c_str_to_string(tl.transportLayerVendor) }?,
            version: unsafe { c_str_to_string(tl.transportLayerVersion) }?,
            path: unsafe { c_str_to_string(tl.transportLayerPath) }?,
            transport_layer_type: TransportLayerType::from_code(tl.transportLayerType as u32),
            key: HandleKey::from_raw(tl.transportLayerHandle),
        })
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub id: String,
    pub name: String,
    pub interface_type: TransportLayerType,
    pub key: HandleKey,
    pub transport_layer_key: HandleKey,
}

impl InterfaceInfo {
    fn from_raw(iface: &VmbInterfaceInfo_t) -> Result<Self> {
        Ok(Self {
            id: unsafe { c_str_to_string(iface.interfaceIdString) }?,
            name: unsafe { c_str_to_string(iface.interfaceName) }?,
            interface_type: TransportLayerType::from_code(iface.interfaceType as u32),
            key: HandleKey::from_raw(iface.interfaceHandle),
            transport_layer_key: HandleKey::from_raw(iface.transportLayerHandle),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub camera_id_string: String,
    pub camera_id_extended: String,
    pub camera_name: String,
    pub model_name: String,
    pub serial_string: String,
    pub permitted_access: AccessMode,
    pub interface_key: HandleKey,
    pub transport_layer_key: HandleKey,
}

impl CameraInfo {
    fn from_raw(ci: &VmbCameraInfo_t) -> Result<Self> {
        Ok(Self {
            camera_id_string: unsafe { c_str_to_string(ci.cameraIdString) }?,
            camera_id_extended: unsafe { c_str_to_string(ci.cameraIdExtended) }?,
            camera_name: unsafe { c_str_to_string(ci.cameraName) }?,
            model_name: unsafe { c_str_to_string(ci.modelName) }?,
            serial_string: unsafe { c_str_to_string(ci.serialString) }?,
            permitted_access: AccessMode::new(ci.permittedAccess as u32),
            interface_key: HandleKey::from_raw(ci.interfaceHandle),
            transport_layer_key: HandleKey::from_raw(ci.transportLayerHandle),
        })
    }

    /// Find the interface this camera is connected through.
    pub fn interface<'a>(&self, interfaces: &'a [InterfaceInfo]) -> Option<&'a InterfaceInfo> {
        interfaces.iter().find(|i| i.key == self.interface_key)
    }

    /// Type of the transport layer serving this camera, or
    /// [TransportLayerType::Unknown] if it is not in `transport_layers`.
    pub fn transport_layer_type(&self, transport_layers: &[TransportLayerInfo]) -> TransportLayerType {
        transport_layers
            .iter()
            .find(|tl| tl.key == self.transport_layer_key)
            .map(|tl| tl.transport_layer_type)
            .unwrap_or(TransportLayerType::Unknown)
    }
}

pub struct Camera<'lib> {
    handle: VmbHandle_t,
    is_open: bool,
    vimba_lib: &'lib vmbc_sys::VimbaC,
}

unsafe impl<'lib> Send for Camera<'lib> {}

fn _test_camera_is_send() {
    // Compile-time test to ensure Camera implements Send trait.
    fn implements<T: Send>() {}
    implements::<Camera>();
}

impl<'lib> std::fmt::Debug for Camera<'lib> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(fmt, "Camera {{")?;
        write!(fmt, " self.handle {:p},", self.handle)?;
        write!(fmt, "}}")?;
        Ok(())
    }
}

impl<'lib> Camera<'lib> {
    /// Open a camera by ID. For GigE cameras `camera_id` may be an IP address.
    pub fn open(
        camera_id: &str,
        access_mode: AccessMode,
        vimba_lib: &'lib vmbc_sys::VimbaC,
    ) -> Result<Self> {
        let data = CString::new(camera_id)?;
        let mut handle = std::mem::MaybeUninit::<VmbHandle_t>::uninit();
        vimba_call!(vimba_lib.VmbCameraOpen(
            data.as_ptr(),
            access_mode.as_u32(),
            handle.as_mut_ptr()
        ))?;
        let handle = unsafe { handle.assume_init() };
        let result = Self {
            handle,
            is_open: true,
            vimba_lib,
        };
        tracing::debug!("opening {:?}", result);
        Ok(result)
    }

    pub fn close(mut self) -> Result<()> {
        if self.is_open {
            vimba_call!(self.vimba_lib.VmbCameraClose(self.handle))?;
        }
        self.is_open = false; // prevent closing again on drop
        Ok(())
    }

    pub fn handle(&self) -> VmbHandle_t {
        self.handle
    }

    fn raw_info(&self) -> Result<VmbCameraInfo_t> {
        let mut info: VmbCameraInfo_t = unsafe { std::mem::zeroed() };
        vimba_call!(self.vimba_lib.VmbCameraInfoQueryByHandle(
            self.handle,
            &mut info,
            struct_size::<VmbCameraInfo_t>()
        ))?;
        Ok(info)
    }

    pub fn info(&self) -> Result<CameraInfo> {
        CameraInfo::from_raw(&self.raw_info()?)
    }

    /// Features of the remote device (the camera itself).
    pub fn features(&self) -> Features<'lib> {
        Features::new(self.handle, self.vimba_lib)
    }

    /// Features of one of the camera's streams.
    ///
    /// Transport settings such as `GVSPAdjustPacketSize` on GigE cameras live
    /// on the stream, not on the remote device.
    pub fn stream_features(&self, index: usize) -> Result<Features<'lib>> {
        let info = self.raw_info()?;
        let handle = unsafe { stream_handle(info.streamHandles, info.streamCount, index) }?;
        Ok(Features::new(handle, self.vimba_lib))
    }

    pub fn allocate_buffer(&self) -> Result<Vec<u8>> {
        let payload_size = self.features().int("PayloadSize")?;
        let payload_size = usize::try_from(payload_size).map_err(|_| Error::InvalidCall {})?;
        Ok(vec![0u8; payload_size])
    }

    pub fn frame_announce(&self, frame: &mut Frame) -> Result<()> {
        if frame.already_announced {
            return Err(Error::InvalidCall {});
        }

        tracing::debug!("camera {:?} announcing frame {:?}", self, frame);

        vimba_call!(self.vimba_lib.VmbFrameAnnounce(
            self.handle,
            &*frame.frame,
            struct_size::<VmbFrame_t>()
        ))?;

        frame.already_announced = true;
        Ok(())
    }

    pub fn frame_revoke(&self, frame: &mut Frame) -> Result<()> {
        tracing::debug!("camera {:?} revoking frame {:?}", self, frame);
        vimba_call!(self.vimba_lib.VmbFrameRevoke(self.handle, &*frame.frame))?;
        frame.already_announced = false;
        Ok(())
    }

    pub fn capture_start(&self) -> Result<()> {
        tracing::debug!("camera {:?} capture start", self);
        vimba_call!(self.vimba_lib.VmbCaptureStart(self.handle))?;
        Ok(())
    }

    pub fn capture_end(&self) -> Result<()> {
        vimba_call!(self.vimba_lib.VmbCaptureEnd(self.handle))?;
        Ok(())
    }

    pub fn capture_frame_queue(&self, frame: &mut Frame) -> Result<()> {
        self.capture_frame_queue_with_callback(frame, None)
    }

    pub fn capture_frame_queue_with_callback(
        &self,
        frame: &mut Frame,
        callback: VmbFrameCallback,
    ) -> Result<()> {
        tracing::debug!("camera {:?} queueing frame {:?}", self, frame);
        vimba_call!(self
            .vimba_lib
            .VmbCaptureFrameQueue(self.handle, &*frame.frame, callback))?;
        Ok(())
    }

    pub fn capture_queue_flush(&self) -> Result<()> {
        vimba_call!(self.vimba_lib.VmbCaptureQueueFlush(self.handle))?;
        Ok(())
    }

    /// Block until `frame` is filled or `timeout` (milliseconds) passes.
    pub fn capture_frame_wait(&self, frame: &mut Frame, timeout: u32) -> Result<()> {
        tracing::debug!("camera {:?} waiting for frame {:?}", self, frame);
        vimba_call!(self
            .vimba_lib
            .VmbCaptureFrameWait(self.handle, &*frame.frame, timeout))?;
        Ok(())
    }

    pub fn camera_settings_save<P: AsRef<std::path::Path>>(
        &self,
        out_path: P,
        settings: &PersistSettings,
    ) -> Result<()> {
        let path = path_to_c_string(out_path)?;
        let raw = settings.to_raw();
        vimba_call!(self.vimba_lib.VmbSettingsSave(
            self.handle,
            path.as_ptr(),
            &raw,
            struct_size::<vmbc_sys::VmbFeaturePersistSettings_t>()
        ))?;
        Ok(())
    }

    pub fn camera_settings_load<P: AsRef<std::path::Path>>(
        &self,
        in_path: P,
        settings: &PersistSettings,
    ) -> Result<()> {
        let path = path_to_c_string(in_path)?;
        let raw = settings.to_raw();
        vimba_call!(self.vimba_lib.VmbSettingsLoad(
            self.handle,
            path.as_ptr(),
            &raw,
            struct_size::<vmbc_sys::VmbFeaturePersistSettings_t>()
        ))?;
        Ok(())
    }

    /// Visit the chunk (ancillary) data attached to a received frame.
    ///
    /// `visit` is called once, from inside the SDK, with access to the chunk
    /// features. Errors returned by `visit` are passed back to the caller.
    pub fn chunk_data_access<F>(&self, frame: &Frame, mut visit: F) -> Result<()>
    where
        F: FnMut(&Features<'lib>) -> Result<()>,
    {
        frame.ensure_chunk_data()?;
        let mut ctx = ChunkContext {
            vimba_lib: self.vimba_lib,
            visit: &mut visit,
            outcome: None,
        };
        let call_result = vimba_call!(self.vimba_lib.VmbChunkDataAccess(
            &*frame.frame,
            Some(chunk_access_callback),
            &mut ctx as *mut ChunkContext as *mut std::ffi::c_void,
        ));
        if let Some(err) = ctx.outcome.take() {
            return Err(err);
        }
        call_result?;
        Ok(())
    }
}

impl<'lib> Drop for Camera<'lib> {
    fn drop(&mut self) {
        if self.is_open {
            if let Err(e) = vimba_call!(self.vimba_lib.VmbCameraClose(self.handle)) {
                tracing::error!("closing camera {:?} on drop: {}", self, e);
            }
            self.is_open = false;
        }
    }
}

struct ChunkContext<'a, 'lib> {
    vimba_lib: &'lib vmbc_sys::VimbaC,
    visit: &'a mut dyn FnMut(&Features<'lib>) -> Result<()>,
    outcome: Option<Error>,
}

unsafe extern "C" fn chunk_access_callback(
    feature_access_handle: VmbHandle_t,
    user_context: *mut std::ffi::c_void,
) -> i32 {
    // `user_context` is the `ChunkContext` on the stack of `chunk_data_access`.
    let ctx = unsafe { &mut *(user_context as *mut ChunkContext) };
    let features = Features::new(feature_access_handle, ctx.vimba_lib);
    let result =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (ctx.visit)(&features)));
    let (status, outcome) = callback_outcome(result);
    ctx.outcome = outcome;
    status
}

/// Status code handed back to the SDK for a finished callback, and the error
/// to report to the caller afterwards.
fn callback_outcome(result: std::thread::Result<Result<()>>) -> (i32, Option<Error>) {
    match result {
        Ok(Ok(())) => (VmbErrorType::VmbErrorSuccess, None),
        Ok(Err(e)) => (VmbErrorType::VmbErrorOther, Some(e)),
        Err(_) => (VmbErrorType::VmbErrorOther, Some(Error::CallbackPanic {})),
    }
}

/// Pick stream `index` out of the `streamHandles` array of a camera info.
///
/// # Safety
///
/// `handles` must be null or point to at least `count` handles.
unsafe fn stream_handle(
    handles: *const VmbHandle_t,
    count: u32,
    index: usize,
) -> Result<VmbHandle_t> {
    if handles.is_null() || index >= count as usize {
        return Err(Error::NoStream { index, count });
    }
    Ok(unsafe { *handles.add(index) })
}

/// Receive status of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Complete,
    Incomplete,
    TooSmall,
    Invalid,
    Other(i32),
}

impl FrameStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Complete,
            -1 => Self::Incomplete,
            -2 => Self::TooSmall,
            -3 => Self::Invalid,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::TooSmall => write!(f, "buffer too small"),
            Self::Invalid => write!(f, "invalid"),
            Self::Other(code) => write!(f, "unknown status {code}"),
        }
    }
}

pub struct Frame {
    buffer: Vec<u8>,
    // the address of `frame` is used as a key by Vimba to remember locations, so it must remain fixed.
    // `frame` contains a pointer to `buffer`
    frame: Pin<Box<VmbFrame_t>>,
    already_announced: bool,
}

unsafe impl Send for Frame {}

fn _test_frame_is_send() {
    // Compile-time test to ensure Frame implements Send trait.
    fn implements<T: Send>() {}
    implements::<Frame>();
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(fmt, "Frame {{")?;
        write!(
            fmt,
            " frame as *const VmbFrame_t {:p},",
            &*self.frame as *const VmbFrame_t
        )?;
        write!(fmt, " buffer.as_ptr() {:p},", self.buffer.as_ptr())?;
        write!(fmt, " buffer.len() {},", self.buffer.len())?;
        write!(fmt, " frame.bufferSize {},", self.frame.bufferSize)?;
        write!(fmt, " already_announced {:?},", self.already_announced)?;
        write!(fmt, "}}")?;
        Ok(())
    }
}

impl Frame {
    pub fn new(mut buffer: Vec<u8>) -> Self {
        let frame = Box::pin(VmbFrame_t {
            buffer: buffer.as_mut_ptr() as _,
            bufferSize: buffer.len() as u32,
            context: [std::ptr::null_mut(); 4],
            receiveStatus: 0,
            frameID: 0,
            timestamp: 0,
            imageData: std::ptr::null_mut(),
            receiveFlags: 0,
            pixelFormat: 0,
            width: 0,
            height: 0,
            offsetX: 0,
            offsetY: 0,
            payloadType: vmbc_sys::VmbPayloadType::VmbPayloadTypeUnknown,
            chunkDataPresent: 0,
        });

        Self {
            buffer,
            frame,
            already_announced: false,
        }
    }
    #[inline]
    pub fn status(&self) -> FrameStatus {
        FrameStatus::from_code(self.frame.receiveStatus as i32)
    }
    /// Return an error naming the receive status unless the frame is complete.
    pub fn ensure_complete(&self) -> Result<()> {
        match self.status() {
            FrameStatus::Complete => Ok(()),
            status => Err(Error::FrameNotComplete { status }),
        }
    }
    #[inline]
    pub fn width(&self) -> u32 {
        self.frame.width
    }
    #[inline]
    pub fn height(&self) -> u32 {
        self.frame.height
    }
    #[inline]
    pub fn buffer_size(&self) -> usize {
        (self.frame.bufferSize as usize).min(self.buffer.len())
    }
    /// The whole payload, including any chunk data.
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..self.buffer_size()]
    }
    /// The image part of the payload, starting at `imageData`.
    pub fn image_data(&self) -> &[u8] {
        let offset = image_data_offset(
            self.buffer.as_ptr() as usize,
            self.buffer_size(),
            self.frame.imageData as usize,
        );
        &self.buffer()[offset..]
    }
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame.frameID
    }
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.frame.timestamp
    }
    #[inline]
    pub fn has_chunk_data(&self) -> bool {
        self.frame.chunkDataPresent != 0
    }
    pub fn ensure_chunk_data(&self) -> Result<()> {
        if self.has_chunk_data() {
            Ok(())
        } else {
            Err(Error::NoChunkData {})
        }
    }
    #[inline]
    pub fn pixel_format_code(&self) -> u32 {
        self.frame.pixelFormat as u32
    }
    /// GenICam name of the received pixel format.
    #[inline]
    pub fn pixel_format_name(&self) -> Result<&'static str> {
        pixel_format_name(self.pixel_format_code())
    }
    #[inline]
    pub fn pixel_format(&self) -> Result<formats::PixFmt> {
        pixel_format_code(self.pixel_format_code())
    }
}

/// Offset of `image_data` into a buffer of `len` bytes at `buffer_start`.
///
/// A null or out-of-range image pointer means the image starts the buffer.
fn image_data_offset(buffer_start: usize, len: usize, image_data: usize) -> usize {
    if image_data >= buffer_start && image_data < buffer_start + len {
        image_data - buffer_start
    } else {
        0
    }
}

/// GenICam name of a VmbC pixel format code.
pub fn pixel_format_name(code: u32) -> Result<&'static str> {
    use vmbc_sys::VmbPixelFormatType::*;
    #[allow(non_upper_case_globals)]
    let name = match code {
        VmbPixelFormatMono8 => "Mono8",
        VmbPixelFormatBayerGR8 => "BayerGR8",
        VmbPixelFormatBayerRG8 => "BayerRG8",
        VmbPixelFormatBayerGB8 => "BayerGB8",
        VmbPixelFormatBayerBG8 => "BayerBG8",
        VmbPixelFormatRgb8 => "RGB8",
        VmbPixelFormatBgr8 => "BGR8",
        _ => {
            return Err(Error::UnknownPixelFormatCode { code });
        }
    };
    Ok(name)
}

/// [formats::PixFmt] of a VmbC pixel format code.
///
/// `PixFmt` has no BGR8 variant, so BGR8 gives
/// [Error::UnknownPixelFormat]; use [pixel_format_name] for it.
pub fn pixel_format_code(code: u32) -> Result<formats::PixFmt> {
    str_to_pixel_format(pixel_format_name(code)?)
}

pub fn str_to_pixel_format(pixel_format: &str) -> Result<formats::pixel_format::PixFmt> {
    use formats::pixel_format::PixFmt::*;
    Ok(match pixel_format {
        "Mono8" => Mono8,
        "RGB8" => RGB8,
        "BayerRG8" => BayerRG8,
        "BayerGR8" => BayerGR8,
        "BayerGB8" => BayerGB8,
        "BayerBG8" => BayerBG8,
        fmt => {
            return Err(Error::UnknownPixelFormat {
                fmt: fmt.to_string(),
            });
        }
    })
}

fn path_to_c_string<P: AsRef<std::path::Path>>(path: P) -> Result<CString> {
    Ok(CString::new(path_to_bytes(path))?)
}

/// Convert path to bytes
///
/// From https://stackoverflow.com/a/57667836/1633026
#[cfg(unix)]
fn path_to_bytes<P: AsRef<std::path::Path>>(path: P) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_ref().as_os_str().as_bytes().to_vec()
}

/// Convert path to bytes
///
/// From https://stackoverflow.com/a/57667836/1633026
#[cfg(not(unix))]
fn path_to_bytes<P: AsRef<std::path::Path>>(path: P) -> Vec<u8> {
    // The Vimba docs don't specify what encoding is used for paths, so
    // non-ascii characters may be wrong here.
    path.as_ref().to_string_lossy().to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_have_names() {
        let err = VimbaError::from(VmbErrorType::VmbErrorTimeout);
        assert_eq!(err.msg, "VmbErrorTimeout");
        assert!(err.to_string().contains("VmbErrorTimeout"));
        assert_eq!(VimbaError::from(123_456).msg, "unknown error");
        assert!(vimba_err(VmbErrorType::VmbErrorSuccess).is_ok());
        assert!(vimba_err(VmbErrorType::VmbErrorNotFound).is_err());
    }

    #[test]
    fn null_c_string_is_empty() {
        assert_eq!(unsafe { c_str_to_string(std::ptr::null()) }.unwrap(), "");
        let owned = CString::new("DEV_1AB22C00041B").unwrap();
        assert_eq!(
            unsafe { c_str_to_string(owned.as_ptr()) }.unwrap(),
            "DEV_1AB22C00041B"
        );
    }

    #[test]
    fn frame_status_codes() {
        assert_eq!(FrameStatus::from_code(0), FrameStatus::Complete);
        assert_eq!(FrameStatus::from_code(-1), FrameStatus::Incomplete);
        assert_eq!(FrameStatus::from_code(-2), FrameStatus::TooSmall);
        assert_eq!(FrameStatus::from_code(-3), FrameStatus::Invalid);
        assert_eq!(FrameStatus::from_code(-7), FrameStatus::Other(-7));
        assert_eq!(FrameStatus::TooSmall.to_string(), "buffer too small");
    }

    #[test]
    fn new_frame_has_no_chunk_data() {
        let frame = Frame::new(vec![0u8; 16]);
        assert!(!frame.has_chunk_data());
        assert_eq!(frame.buffer().len(), 16);
        assert_eq!(frame.width(), 0);
        assert!(matches!(
            frame.ensure_chunk_data(),
            Err(Error::NoChunkData {})
        ));
    }

    #[test]
    fn chunk_callback_outcomes() {
        let (status, outcome) = callback_outcome(Ok(Ok(())));
        assert_eq!(status, VmbErrorType::VmbErrorSuccess);
        assert!(outcome.is_none());

        let (status, outcome) = callback_outcome(Ok(Err(Error::InvalidCall {})));
        assert_eq!(status, VmbErrorType::VmbErrorOther);
        assert!(matches!(outcome, Some(Error::InvalidCall {})));

        let caught = std::panic::catch_unwind(|| -> Result<()> { panic!("chunk visitor") });
        let (status, outcome) = callback_outcome(caught);
        assert_eq!(status, VmbErrorType::VmbErrorOther);
        assert!(matches!(outcome, Some(Error::CallbackPanic {})));
    }

    #[test]
    fn stream_handles_are_bounds_checked() {
        let streams = [0x10usize as VmbHandle_t, 0x20usize as VmbHandle_t];
        let second = unsafe { stream_handle(streams.as_ptr(), 2, 1) }.unwrap();
        assert_eq!(second as usize, 0x20);
        assert!(matches!(
            unsafe { stream_handle(streams.as_ptr(), 2, 2) },
            Err(Error::NoStream { index: 2, count: 2 })
        ));
        // A closed camera reports no stream array.
        assert!(matches!(
            unsafe { stream_handle(std::ptr::null(), 0, 0) },
            Err(Error::NoStream { index: 0, count: 0 })
        ));
    }

    #[test]
    fn image_data_starts_at_reported_offset() {
        let mut frame = Frame::new((0u8..32).collect());
        assert_eq!(frame.image_data().len(), 32);

        let start = frame.buffer.as_mut_ptr();
        frame.frame.imageData = unsafe { start.add(8) };
        assert_eq!(frame.image_data()[0], 8);
        assert_eq!(frame.image_data().len(), 24);

        // outside the buffer
        assert_eq!(image_data_offset(1000, 32, 1032), 0);
        assert_eq!(image_data_offset(1000, 32, 999), 0);
        assert_eq!(image_data_offset(1000, 32, 1031), 31);
    }

    #[test]
    fn pixel_format_names() {
        use formats::PixFmt;
        use vmbc_sys::VmbPixelFormatType::*;
        assert_eq!(str_to_pixel_format("Mono8").unwrap(), PixFmt::Mono8);
        assert_eq!(str_to_pixel_format("BayerBG8").unwrap(), PixFmt::BayerBG8);
        assert!(matches!(
            str_to_pixel_format("Mono12p"),
            Err(Error::UnknownPixelFormat { .. })
        ));
        assert_eq!(pixel_format_name(VmbPixelFormatBgr8).unwrap(), "BGR8");
        assert_eq!(pixel_format_name(VmbPixelFormatRgb8).unwrap(), "RGB8");
        assert_eq!(pixel_format_code(VmbPixelFormatRgb8).unwrap(), PixFmt::RGB8);
        assert!(matches!(
            pixel_format_code(VmbPixelFormatBgr8),
            Err(Error::UnknownPixelFormat { fmt }) if fmt == "BGR8"
        ));
        assert!(matches!(
            pixel_format_code(0xFFFF_FFFF),
            Err(Error::UnknownPixelFormatCode { code: 0xFFFF_FFFF })
        ));
    }

    #[test]
    fn vimba_x_home_layout() {
        let path = vmbc_path_in_vimba_x_home("/opt/VimbaX");
        assert!(path.ends_with(VMBC_LIB_NAME));
        assert!(path.starts_with("/opt/VimbaX"));
    }
}
