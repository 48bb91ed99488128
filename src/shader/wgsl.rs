//! SPIR-V -> WGSL lowering, delegated to naga.
//!
//! The backend consumes this through a stable three-function contract:
//! process-wide [`initialize_wgsl_converter`] / [`shutdown_wgsl_converter`]
//! and the pure [`convert_spirv_to_wgsl`]. naga keeps no global state, so
//! the lifecycle pair only tracks a flag for contract symmetry.

use std::sync::atomic::{AtomicBool, Ordering};

static CONVERTER_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn initialize_wgsl_converter() {
    CONVERTER_INITIALIZED.store(true, Ordering::Release);
}

pub fn shutdown_wgsl_converter() {
    CONVERTER_INITIALIZED.store(false, Ordering::Release);
}

#[derive(Debug)]
pub enum WgslConversionError {
    Parse(String),
    Validate(String),
    Emit(String),
}

impl std::fmt::Display for WgslConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "SPIR-V parse failed: {msg}"),
            Self::Validate(msg) => write!(f, "module validation failed: {msg}"),
            Self::Emit(msg) => write!(f, "WGSL emission failed: {msg}"),
        }
    }
}

impl std::error::Error for WgslConversionError {}

/// Lowers a SPIR-V word stream to WGSL text. Pure function; on error the
/// caller fails shader module creation.
pub fn convert_spirv_to_wgsl(words: &[u32]) -> Result<String, WgslConversionError> {
    let options = naga::front::spv::Options {
        adjust_coordinate_space: false,
        strict_capabilities: false,
        ..Default::default()
    };
    let module = naga::front::spv::Frontend::new(words.iter().cloned(), &options)
        .parse()
        .map_err(|e| WgslConversionError::Parse(e.to_string()))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| WgslConversionError::Validate(format!("{e:?}")))?;

    let wgsl = naga::back::wgsl::write_string(
        &module,
        &info,
        naga::back::wgsl::WriterFlags::empty(),
    )
    .map_err(|e| WgslConversionError::Emit(e.to_string()))?;

    log::trace!("converted SPIR-V ({} words) to WGSL ({} bytes)", words.len(), wgsl.len());
    Ok(wgsl)
}
