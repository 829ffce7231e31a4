//! Address layout for the emulated program-memory ("progmem") region.
//!
//! On the Harvard-style targets this project mimics, constants live in a
//! separate read-only program-memory space and must be read through a
//! dedicated accessor API. On the host build, those constants occupy a
//! dedicated linker section whose original pages are made inaccessible at
//! startup; the authoritative readable bytes live in a *shadow* mapping at a
//! fixed offset above the original.
//!
//! This crate owns the pieces both sides of that arrangement must agree on:
//!
//! - [`ProgramMemoryRegion`]: the immutable description of the protected
//!   range and its shadow.
//! - [`PROGMEM_SHADOW_OFFSET`]: the fixed original→shadow distance. The
//!   shadow mapper and the [`accessor`] functions both derive from this one
//!   constant, so they cannot disagree.
//! - [`accessor`]: the sanctioned, never-faulting typed reads.
//!
//! The trap-and-emulate machinery itself lives in `progmem-trap`; nothing in
//! this crate performs an OS call.

mod region;

pub mod accessor;

pub use region::{LayoutError, ProgramMemoryRegion, PAGE_SIZE, PROGMEM_SHADOW_OFFSET};

/// Page-aligned wrapper for data placed in the `progmem` linker section.
///
/// The placement contract requires the section to start on a page boundary;
/// putting the first (or only) static of the section in this wrapper forces
/// the section's alignment up to a page. Keeping the wrapped payload a
/// multiple of [`PAGE_SIZE`] bytes also keeps unrelated sections off the
/// region's final page, so they are not caught by the `PROT_NONE` protection.
#[repr(C, align(4096))]
pub struct PageAligned<T>(pub T);

/// Builds a [`ProgramMemoryRegion`] from the GNU-ld boundary symbols of the
/// `progmem` linker section (`__start_progmem` / `__stop_progmem`).
///
/// The linker only defines those symbols when at least one object actually
/// places data in the section, so the symbol references are generated here,
/// at the use site, rather than unconditionally inside the library (which
/// would break linking for programs that never use the section, including
/// this workspace's own tests).
///
/// Expands to a `Result<ProgramMemoryRegion, LayoutError>`.
#[macro_export]
macro_rules! progmem_section_region {
    () => {{
        extern "C" {
            static __start_progmem: u8;
            static __stop_progmem: u8;
        }
        let start = unsafe { ::core::ptr::addr_of!(__start_progmem) as usize };
        let stop = unsafe { ::core::ptr::addr_of!(__stop_progmem) as usize };
        $crate::ProgramMemoryRegion::new(start, stop - start)
    }};
}
