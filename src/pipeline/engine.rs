//! pdfium binding and in-memory document loading.
//!
//! Library lookup order:
//!
//! 1. `PDFIUM_LIB_PATH`: a library file, or a directory containing the
//!    platform library (`libpdfium.so`, `libpdfium.dylib`, `pdfium.dll`).
//! 2. The current working directory.
//! 3. The system library search path.
//!
//! All pdfium work goes through [`with_pdfium`], which holds a process-wide
//! lock so concurrent requests never initialise or tear down the library
//! underneath each other.

use crate::error::GraderError;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// Bind to a pdfium library.
fn bind_pdfium() -> Result<Pdfium, GraderError> {
    if let Ok(configured) = std::env::var("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(configured.trim());
        let library = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        debug!("Binding pdfium from {}", library.display());
        return Pdfium::bind_to_library(&library)
            .map(Pdfium::new)
            .map_err(|e| {
                GraderError::PdfiumBindingFailed(format!("{}: {:?}", library.display(), e))
            });
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| GraderError::PdfiumBindingFailed(format!("{:?}", e)))
}

/// Bind pdfium and run `f` while holding the process-wide pdfium lock.
/// Call from blocking code only.
pub fn with_pdfium<T>(
    f: impl FnOnce(&Pdfium) -> Result<T, GraderError>,
) -> Result<T, GraderError> {
    let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let pdfium = bind_pdfium()?;
    f(&pdfium)
}

/// Whether a pdfium library can be bound in this environment.
pub fn pdfium_available() -> bool {
    with_pdfium(|_| Ok(())).is_ok()
}

/// Open a PDF held in memory.
pub fn open_document<'a>(
    pdfium: &'a Pdfium,
    name: &str,
    bytes: &'a [u8],
) -> Result<PdfDocument<'a>, GraderError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| GraderError::CorruptPdf {
            name: name.to_string(),
            detail: format!("{:?}", e),
        })
}
