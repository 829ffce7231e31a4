//! Trap-and-emulate safety net for unsanctioned program-memory reads.
//!
//! [`install`] runs once during single-threaded process startup: it remaps
//! the program-memory region described by a
//! [`ProgramMemoryRegion`] (readable shadow copy at the fixed offset, the
//! original pages `PROT_NONE`) and registers a process-wide SIGSEGV handler.
//! From then on:
//!
//! - code using the `progmem-layout` accessor API reads the shadow directly
//!   and never faults;
//! - a stray raw dereference of the region faults, gets decoded and
//!   completed from the shadow inside the handler, and resumes past the
//!   faulting instruction with the correct value in the destination
//!   register — leaving one [`FaultRecord`] behind for offline audit.
//!
//! Faults outside the region are never serviced: the handler restores the
//! default SIGSEGV disposition so the process dies the way it would have
//! without this subsystem. An in-region fault whose instruction shape the
//! decoder does not support aborts the process; resuming without a correct
//! emulation would re-enter the same instruction forever.
//!
//! The unsafe surface (mmap/mprotect, sigaction, ucontext mutation) is
//! confined to the `shadow` and `handler` modules; decoding, validation and
//! logging are ordinary logic in `progmem-x86` and the log module.

mod emulate;
mod log;

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
mod handler;
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
mod shadow;
mod sigsafe;

pub use crate::log::{AccessLog, FaultRecord};
pub use emulate::EmulateError;

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
use std::fs::OpenOptions;
use std::io;
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
use std::os::fd::IntoRawFd;
use std::path::PathBuf;
use std::sync::OnceLock;

use progmem_layout::{LayoutError, ProgramMemoryRegion};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("trap-and-emulate layer is already installed")]
    AlreadyInstalled,

    #[error("shadow range at {shadow_base:#x} is already mapped")]
    ShadowRangeOccupied { shadow_base: usize },

    #[error("mmap of shadow mapping failed: {0}")]
    ShadowMap(#[source] io::Error),

    #[error("mprotect of shadow mapping failed: {0}")]
    ShadowProtect(#[source] io::Error),

    #[error("mprotect of original region failed: {0}")]
    RegionProtect(#[source] io::Error),

    #[error("sigaction(SIGSEGV) failed: {0}")]
    Sigaction(#[source] io::Error),

    #[error("opening access log sink failed: {0}")]
    LogSink(#[source] io::Error),
}

/// Install-time knobs. The shadow offset is deliberately *not* here: it is a
/// crate-level constant in `progmem-layout` shared with the accessor API.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Append-only textual sink for emulated-access records, one line per
    /// fault. `None` keeps the audit trail in memory only.
    pub log_path: Option<PathBuf>,
    /// Capacity of the pre-allocated in-memory record buffer. Records past
    /// capacity are counted but their bodies are dropped; the handler never
    /// allocates.
    pub record_capacity: usize,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            log_path: None,
            record_capacity: 1024,
        }
    }
}

/// The one-time-initialized process context: region bounds plus the access
/// log, reachable by the signal handler and by audit queries through
/// [`installed`]. Never constructed a second time.
pub struct TrapGuard {
    region: ProgramMemoryRegion,
    log: AccessLog,
}

impl TrapGuard {
    pub fn region(&self) -> &ProgramMemoryRegion {
        &self.region
    }

    pub fn log(&self) -> &AccessLog {
        &self.log
    }
}

static GUARD: OnceLock<TrapGuard> = OnceLock::new();

/// The installed context, if [`install`] has completed.
pub fn installed() -> Option<&'static TrapGuard> {
    GUARD.get()
}

/// Remaps the region and arms the SIGSEGV safety net.
///
/// Must run during single-threaded process initialization, before any code
/// (or thread) can touch program memory. All failure paths unwind cleanly:
/// on `Err` the address space is unchanged and the previous SIGSEGV
/// disposition is back in place, so the caller can treat any error as
/// fatal-at-startup without worrying about a half-protected region.
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub fn install(
    region: ProgramMemoryRegion,
    options: InstallOptions,
) -> Result<&'static TrapGuard, InstallError> {
    if GUARD.get().is_some() {
        return Err(InstallError::AlreadyInstalled);
    }

    // The sink stays an owned `File` until the guard is committed, so every
    // error path below closes it on drop.
    let sink = match &options.log_path {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(InstallError::LogSink)?,
        ),
        None => None,
    };

    // The remapping step is the one with irreversible pieces, so it runs
    // after sigaction: a failure there only has to put the previous
    // disposition back. Until the guard is published the handler treats any
    // fault as unrelated and hands it to the default disposition.
    let previous = handler::install_sigsegv()?;
    if let Err(err) = shadow::map_shadow(&region) {
        handler::restore_sigsegv(&previous);
        return Err(err);
    }

    let log = AccessLog::new(options.record_capacity, sink.map(IntoRawFd::into_raw_fd));

    tracing::info!(
        original_base = format_args!("{:#x}", region.original_base()),
        shadow_base = format_args!("{:#x}", region.shadow_base()),
        size = region.size(),
        "program-memory region remapped, SIGSEGV emulation armed"
    );

    GUARD
        .set(TrapGuard { region, log })
        .map_err(|_| InstallError::AlreadyInstalled)?;
    Ok(GUARD.get().expect("guard was just set"))
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
#[doc(hidden)]
pub use handler::force_handling_state_for_test;
