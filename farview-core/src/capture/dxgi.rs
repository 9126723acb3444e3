//! DXGI Desktop Duplication capture backend (Windows).
//!
//! Uses the Direct3D 11 Desktop Duplication API to obtain GPU-backed
//! frames with minimal latency:
//!
//! 1. Create a D3D11 device.
//! 2. Duplicate the primary output.
//! 3. Create a CPU-readable staging texture.
//! 4. Per frame: `AcquireNextFrame`, copy to staging, map, convert the
//!    strided BGRA bytes into a tightly packed RGBA [`Frame`], unmap,
//!    release.
//!
//! # Platform
//!
//! Windows-only. On other platforms the type is defined but
//! construction fails at runtime, which routes selection to the
//! portable backend.

use crate::error::FarviewError;
use crate::frame::Frame;

use super::Grabber;

/// How long `AcquireNextFrame` waits for a new desktop frame.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const ACQUIRE_TIMEOUT_MS: u32 = 100;

/// DXGI-based screen grabber.
///
/// All unsafe FFI calls are confined to this struct.
pub struct DxgiGrabber {
    /// Screen width in pixels.
    width: u32,
    /// Screen height in pixels.
    height: u32,
    /// Whether start() has been called.
    running: bool,

    // ── Platform handles (Windows only) ──────────────────────
    #[cfg(target_os = "windows")]
    context: windows::Win32::Graphics::Direct3D11::ID3D11DeviceContext,
    #[cfg(target_os = "windows")]
    duplication: windows::Win32::Graphics::Dxgi::IDXGIOutputDuplication,
    #[cfg(target_os = "windows")]
    staging_texture: windows::Win32::Graphics::Direct3D11::ID3D11Texture2D,
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use windows::{
        core::Interface,
        Win32::Graphics::{
            Direct3D::D3D_DRIVER_TYPE_HARDWARE,
            Direct3D11::*,
            Dxgi::{Common::*, *},
        },
    };

    impl DxgiGrabber {
        /// Initialize a grabber for the primary output.
        pub fn new() -> Result<Self, FarviewError> {
            unsafe { Self::init_dxgi() }
        }

        unsafe fn init_dxgi() -> Result<Self, FarviewError> {
            // 1. D3D11 device + immediate context.
            let mut device = None;
            let mut context = None;
            unsafe {
                D3D11CreateDevice(
                    None,
                    D3D_DRIVER_TYPE_HARDWARE,
                    None,
                    D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                    None,
                    D3D11_SDK_VERSION,
                    Some(&mut device),
                    None,
                    Some(&mut context),
                )
                .map_err(|e| {
                    FarviewError::CaptureUnavailable(format!("D3D11CreateDevice failed: {e}"))
                })?;
            }

            let device = device.ok_or_else(|| {
                FarviewError::CaptureUnavailable("D3D11 device is None".into())
            })?;
            let context = context.ok_or_else(|| {
                FarviewError::CaptureUnavailable("D3D11 context is None".into())
            })?;

            // 2. DXGI traversal: Device → Adapter → Output 0 (primary).
            let dxgi_device: IDXGIDevice = device.cast().map_err(|e| {
                FarviewError::CaptureUnavailable(format!("cast to IDXGIDevice failed: {e}"))
            })?;
            let adapter = unsafe {
                dxgi_device.GetAdapter().map_err(|e| {
                    FarviewError::CaptureUnavailable(format!("GetAdapter failed: {e}"))
                })?
            };
            let output: IDXGIOutput = unsafe {
                adapter.EnumOutputs(0).map_err(|e| {
                    FarviewError::CaptureUnavailable(format!("EnumOutputs(0) failed: {e}"))
                })?
            };

            // 3. Duplicate the output.
            let output1: IDXGIOutput1 = output.cast().map_err(|e| {
                FarviewError::CaptureUnavailable(format!("cast to IDXGIOutput1 failed: {e}"))
            })?;
            let duplication = unsafe {
                output1.DuplicateOutput(&device).map_err(|e| {
                    FarviewError::CaptureUnavailable(format!("DuplicateOutput failed: {e}"))
                })?
            };

            let dup_desc = unsafe { duplication.GetDesc() };
            let width = dup_desc.ModeDesc.Width;
            let height = dup_desc.ModeDesc.Height;

            // 4. CPU-readable staging texture.
            let staging_desc = D3D11_TEXTURE2D_DESC {
                Width: width,
                Height: height,
                MipLevels: 1,
                ArraySize: 1,
                Format: DXGI_FORMAT_B8G8R8A8_UNORM,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Usage: D3D11_USAGE_STAGING,
                BindFlags: 0,
                CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
                MiscFlags: 0,
            };

            let mut staging_texture = None;
            unsafe {
                device
                    .CreateTexture2D(&staging_desc, None, Some(&mut staging_texture))
                    .map_err(|e| {
                        FarviewError::CaptureUnavailable(format!(
                            "CreateTexture2D (staging) failed: {e}"
                        ))
                    })?;
            }
            let staging_texture = staging_texture.ok_or_else(|| {
                FarviewError::CaptureUnavailable("staging texture is None".into())
            })?;

            Ok(Self {
                width,
                height,
                running: false,
                context,
                duplication,
                staging_texture,
            })
        }

        pub(super) fn capture_frame(&mut self) -> Result<Frame, FarviewError> {
            unsafe { self.capture_inner() }
        }

        unsafe fn capture_inner(&mut self) -> Result<Frame, FarviewError> {
            use windows::Win32::Graphics::Dxgi::DXGI_ERROR_WAIT_TIMEOUT;

            let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
            let mut resource = None;

            match unsafe {
                self.duplication
                    .AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut frame_info, &mut resource)
            } {
                Ok(()) => {}
                Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => {
                    return Err(FarviewError::Capture(
                        "no new desktop frame within deadline".into(),
                    ));
                }
                Err(e) => {
                    return Err(FarviewError::Capture(format!("AcquireNextFrame failed: {e}")));
                }
            }

            let resource = resource
                .ok_or_else(|| FarviewError::Capture("acquired resource is None".into()))?;

            let texture: ID3D11Texture2D = resource.cast().map_err(|e| {
                let _ = unsafe { self.duplication.ReleaseFrame() };
                FarviewError::Capture(format!("cast to ID3D11Texture2D failed: {e}"))
            })?;

            // GPU texture → staging texture, then release the DXGI
            // frame as early as possible.
            unsafe {
                self.context.CopyResource(&self.staging_texture, &texture);
            }
            let _ = unsafe { self.duplication.ReleaseFrame() };

            // Map the staging texture for CPU read.
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            unsafe {
                self.context
                    .Map(&self.staging_texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                    .map_err(|e| FarviewError::Capture(format!("Map failed: {e}")))?;
            }

            let stride = mapped.RowPitch as usize;
            let total_bytes = stride * self.height as usize;
            let src = unsafe {
                std::slice::from_raw_parts(mapped.pData as *const u8, total_bytes)
            };
            let frame = crate::frame::bgra_to_rgba_frame(src, self.width, self.height, stride);

            unsafe { self.context.Unmap(&self.staging_texture, 0) };

            frame
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl DxgiGrabber {
    /// DXGI is only available on Windows.
    pub fn new() -> Result<Self, FarviewError> {
        Err(FarviewError::CaptureUnavailable(
            "DXGI Desktop Duplication is only available on Windows".into(),
        ))
    }

    pub(super) fn capture_frame(&mut self) -> Result<Frame, FarviewError> {
        Err(FarviewError::Capture("not supported on this platform".into()))
    }
}

// ── Grabber impl ─────────────────────────────────────────────────

impl Grabber for DxgiGrabber {
    fn start(&mut self) -> Result<(), FarviewError> {
        // Duplication is armed at construction; start just marks state.
        self.running = true;
        Ok(())
    }

    fn frame(&mut self) -> Result<Frame, FarviewError> {
        self.capture_frame()
    }

    fn stop(&mut self) -> Result<(), FarviewError> {
        self.running = false;
        Ok(())
    }

    fn bounds(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
