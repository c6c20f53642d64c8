//! FFI bindings to the NDI runtime (libndi), loaded at runtime.
//!
//! Only the sender half of the SDK is bound. The library is opened with
//! libloading so the binary runs on machines without NDI installed.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::PathBuf;
use std::ptr;

// =============================================================================
// Handles and Constants
// =============================================================================

/// Opaque handle to an NDI sender instance.
pub type NDIlib_send_instance_t = *mut c_void;

/// Timecode value that tells NDI to synthesize the timecode.
pub const NDILIB_SEND_TIMECODE_SYNTHESIZE: i64 = i64::MAX;

/// FourCC video format codes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NDIlib_FourCC_video_type_e {
    /// BGRA 8-bit.
    BGRA = 0x41524742, // 'BGRA'
    /// RGBA 8-bit.
    RGBA = 0x41424752, // 'RGBA'
}

/// Frame format types.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NDIlib_frame_format_type_e {
    /// Interlaced frame.
    Interlaced = 0,
    /// Progressive frame.
    Progressive = 1,
}

// =============================================================================
// Structures
// =============================================================================

/// Sender creation settings.
#[repr(C)]
#[derive(Debug)]
pub struct NDIlib_send_create_t {
    /// Name of the NDI source to create.
    pub p_ndi_name: *const c_char,
    /// Groups to join (NULL for default).
    pub p_groups: *const c_char,
    /// Clock video to frame rate.
    pub clock_video: bool,
    /// Clock audio to sample rate.
    pub clock_audio: bool,
}

impl Default for NDIlib_send_create_t {
    fn default() -> Self {
        Self {
            p_ndi_name: ptr::null(),
            p_groups: ptr::null(),
            clock_video: true,
            clock_audio: false,
        }
    }
}

/// Video frame structure (v2).
#[repr(C)]
#[derive(Debug)]
pub struct NDIlib_video_frame_v2_t {
    pub xres: c_int,
    pub yres: c_int,
    pub FourCC: NDIlib_FourCC_video_type_e,
    pub frame_rate_N: c_int,
    pub frame_rate_D: c_int,
    /// Picture aspect ratio (0 = square pixels).
    pub picture_aspect_ratio: f32,
    pub frame_format_type: NDIlib_frame_format_type_e,
    /// Timecode in 100ns intervals.
    pub timecode: i64,
    pub p_data: *mut u8,
    pub line_stride_in_bytes: c_int,
    /// Per-frame metadata (UTF-8 XML, may be NULL).
    pub p_metadata: *const c_char,
    pub timestamp: i64,
}

impl Default for NDIlib_video_frame_v2_t {
    fn default() -> Self {
        Self {
            xres: 0,
            yres: 0,
            FourCC: NDIlib_FourCC_video_type_e::BGRA,
            frame_rate_N: 60000,
            frame_rate_D: 1001,
            picture_aspect_ratio: 0.0,
            frame_format_type: NDIlib_frame_format_type_e::Progressive,
            timecode: NDILIB_SEND_TIMECODE_SYNTHESIZE,
            p_data: ptr::null_mut(),
            line_stride_in_bytes: 0,
            p_metadata: ptr::null(),
            timestamp: 0,
        }
    }
}

// =============================================================================
// Function Signatures
// =============================================================================

type InitializeFn = unsafe extern "C" fn() -> bool;
type VersionFn = unsafe extern "C" fn() -> *const c_char;
type IsSupportedCpuFn = unsafe extern "C" fn() -> bool;
type SendCreateFn = unsafe extern "C" fn(*const NDIlib_send_create_t) -> NDIlib_send_instance_t;
type SendDestroyFn = unsafe extern "C" fn(NDIlib_send_instance_t);
type SendVideoFn = unsafe extern "C" fn(NDIlib_send_instance_t, *const NDIlib_video_frame_v2_t);
type SendConnectionsFn = unsafe extern "C" fn(NDIlib_send_instance_t, u32) -> c_int;

/// Candidate locations of the NDI runtime, most specific first.
pub fn library_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for var in ["NDI_RUNTIME_DIR_V6", "NDI_RUNTIME_DIR_V5"] {
        if let Some(dir) = std::env::var_os(var) {
            paths.push(PathBuf::from(dir).join(platform_library_name()));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/Library/NDI SDK for Apple/lib/macOS/libndi.dylib"));
        paths.push(PathBuf::from("/usr/local/lib/libndi.dylib"));
    }
    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("libndi.so.6"));
        paths.push(PathBuf::from("libndi.so.5"));
    }

    paths.push(PathBuf::from(platform_library_name()));
    paths
}

#[cfg(target_os = "windows")]
fn platform_library_name() -> &'static str {
    "Processing.NDI.Lib.x64.dll"
}

#[cfg(target_os = "macos")]
fn platform_library_name() -> &'static str {
    "libndi.dylib"
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_library_name() -> &'static str {
    "libndi.so"
}

// =============================================================================
// Loaded Library
// =============================================================================

/// Entry points resolved from a loaded NDI runtime.
pub struct NdiLibrary {
    version: VersionFn,
    is_supported_cpu: IsSupportedCpuFn,
    send_create: SendCreateFn,
    send_destroy: SendDestroyFn,
    send_video: SendVideoFn,
    send_connections: SendConnectionsFn,
    path: PathBuf,
    /// Keeps the function pointers valid
    _library: libloading::Library,
}

// The NDI sender API is thread-safe
unsafe impl Send for NdiLibrary {}
unsafe impl Sync for NdiLibrary {}

impl NdiLibrary {
    /// Open the first NDI runtime found and initialize it.
    pub fn load() -> Result<Self, String> {
        let mut last_error = String::from("no candidate paths");

        for path in library_candidates() {
            // SAFETY: loading a shared library runs its initializers; the NDI
            // runtime has no initialization side effects beyond its own state.
            let library = match unsafe { libloading::Library::new(&path) } {
                Ok(library) => library,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            match unsafe { Self::resolve(library, path.clone()) } {
                Ok(ndi) => return Ok(ndi),
                Err(e) => last_error = format!("{}: {}", path.display(), e),
            }
        }

        Err(last_error)
    }

    unsafe fn resolve(library: libloading::Library, path: PathBuf) -> Result<Self, String> {
        let symbol_error = |name: &str, e: libloading::Error| format!("missing symbol {}: {}", name, e);

        let initialize = *library
            .get::<InitializeFn>(b"NDIlib_initialize\0")
            .map_err(|e| symbol_error("NDIlib_initialize", e))?;
        let version = *library
            .get::<VersionFn>(b"NDIlib_version\0")
            .map_err(|e| symbol_error("NDIlib_version", e))?;
        let is_supported_cpu = *library
            .get::<IsSupportedCpuFn>(b"NDIlib_is_supported_CPU\0")
            .map_err(|e| symbol_error("NDIlib_is_supported_CPU", e))?;
        let send_create = *library
            .get::<SendCreateFn>(b"NDIlib_send_create\0")
            .map_err(|e| symbol_error("NDIlib_send_create", e))?;
        let send_destroy = *library
            .get::<SendDestroyFn>(b"NDIlib_send_destroy\0")
            .map_err(|e| symbol_error("NDIlib_send_destroy", e))?;
        let send_video = *library
            .get::<SendVideoFn>(b"NDIlib_send_send_video_v2\0")
            .map_err(|e| symbol_error("NDIlib_send_send_video_v2", e))?;
        let send_connections = *library
            .get::<SendConnectionsFn>(b"NDIlib_send_get_no_connections\0")
            .map_err(|e| symbol_error("NDIlib_send_get_no_connections", e))?;

        if !initialize() {
            return Err("NDIlib_initialize failed".to_string());
        }

        Ok(Self {
            version,
            is_supported_cpu,
            send_create,
            send_destroy,
            send_video,
            send_connections,
            path,
            _library: library,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Get NDI library version string.
    pub fn version(&self) -> String {
        let version_ptr = unsafe { (self.version)() };
        if version_ptr.is_null() {
            return "unknown".to_string();
        }
        unsafe { CStr::from_ptr(version_ptr) }
            .to_str()
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn is_supported_cpu(&self) -> bool {
        unsafe { (self.is_supported_cpu)() }
    }

    /// # Safety
    /// `settings` must point to valid, NUL-terminated strings for the call.
    pub unsafe fn send_create(&self, settings: &NDIlib_send_create_t) -> NDIlib_send_instance_t {
        (self.send_create)(settings)
    }

    /// # Safety
    /// `sender` must come from [`NdiLibrary::send_create`] and not be used afterwards.
    pub unsafe fn send_destroy(&self, sender: NDIlib_send_instance_t) {
        (self.send_destroy)(sender)
    }

    /// # Safety
    /// `sender` must be live and `frame.p_data` must cover `yres` rows of
    /// `line_stride_in_bytes`.
    pub unsafe fn send_video(&self, sender: NDIlib_send_instance_t, frame: &NDIlib_video_frame_v2_t) {
        (self.send_video)(sender, frame)
    }

    /// # Safety
    /// `sender` must be live.
    pub unsafe fn connections(&self, sender: NDIlib_send_instance_t) -> i32 {
        (self.send_connections)(sender, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_values() {
        assert_eq!(NDIlib_FourCC_video_type_e::BGRA as u32, 0x41524742);
        assert_eq!(NDIlib_FourCC_video_type_e::RGBA as u32, 0x41424752);
        assert_eq!(NDIlib_frame_format_type_e::Progressive as i32, 1);
    }

    #[test]
    fn test_default_structs() {
        let video_frame = NDIlib_video_frame_v2_t::default();
        assert_eq!(video_frame.xres, 0);
        assert!(video_frame.p_data.is_null());
        assert_eq!(video_frame.timecode, NDILIB_SEND_TIMECODE_SYNTHESIZE);

        let create = NDIlib_send_create_t::default();
        assert!(create.p_ndi_name.is_null());
    }

    #[test]
    fn test_library_candidates_end_with_platform_name() {
        let candidates = library_candidates();
        assert_eq!(candidates.last(), Some(&PathBuf::from(platform_library_name())));
    }
}
