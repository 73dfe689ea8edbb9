//! Binding to the pdfium shared library.
//!
//! Resolution order:
//! 1. `PDFIUM_LIB_PATH` — a library file, or a directory containing the
//!    platform library (`libpdfium.so`, `libpdfium.dylib`, `pdfium.dll`)
//! 2. the current working directory
//! 3. the system loader search path
//!
//! Bindings are created per call. pdfium documents borrow their bindings, so
//! each blocking task binds, works and drops everything before returning.

use crate::error::PipelineError;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Bind to a pdfium library, following the resolution order above.
pub fn bind_pdfium() -> Result<Pdfium, PipelineError> {
    if let Ok(lib_path) = std::env::var("PDFIUM_LIB_PATH") {
        if !lib_path.is_empty() {
            let path = Path::new(&lib_path);
            let target = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.to_path_buf()
            };
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", target.display());
            let bindings = Pdfium::bind_to_library(&target).map_err(|e| {
                PipelineError::PdfiumBindingFailed(format!("{}: {}", target.display(), e))
            })?;
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PipelineError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load error to the closest [`PipelineError`].
pub(crate) fn load_error(err: PdfiumError, password: Option<&str>) -> PipelineError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            PipelineError::WrongPassword
        } else {
            PipelineError::PasswordRequired
        }
    } else {
        PipelineError::CorruptPdf { detail: err_str }
    }
}
