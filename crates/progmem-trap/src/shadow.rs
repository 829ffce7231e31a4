//! One-shot remapping of the program-memory region.
//!
//! After `map_shadow` succeeds, the shadow range holds a read-only copy of
//! the region's bytes and the original range is `PROT_NONE`, so every direct
//! access faults into the SIGSEGV handler. Every failure path unwinds the
//! partial work: the process never continues with a half-protected region.

use std::io;
use std::ptr;

use progmem_layout::{ProgramMemoryRegion, PAGE_SIZE};

use crate::InstallError;

pub(crate) fn map_shadow(region: &ProgramMemoryRegion) -> Result<(), InstallError> {
    let size = region.size();
    let shadow = region.shadow_base() as *mut libc::c_void;

    if size % PAGE_SIZE != 0 {
        // mprotect rounds to whole pages, so the tail of the last page would
        // trap for neighbouring sections too; those faults are out-of-region
        // and fatal. Keep the section padded to a page multiple.
        tracing::warn!(
            size,
            "region size is not a page multiple; the last page traps beyond the region"
        );
    }

    unsafe {
        // MAP_FIXED_NOREPLACE turns an occupied shadow range into an error
        // instead of silently clobbering whatever was mapped there.
        let mapped = libc::mmap(
            shadow,
            size,
            libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED_NOREPLACE,
            -1,
            0,
        );
        if mapped == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            return Err(if err.raw_os_error() == Some(libc::EEXIST) {
                InstallError::ShadowRangeOccupied {
                    shadow_base: region.shadow_base(),
                }
            } else {
                InstallError::ShadowMap(err)
            });
        }
        // Kernels predating MAP_FIXED_NOREPLACE ignore the flag and fall
        // back to hint placement.
        if mapped as usize != region.shadow_base() {
            libc::munmap(mapped, size);
            return Err(InstallError::ShadowRangeOccupied {
                shadow_base: region.shadow_base(),
            });
        }

        ptr::copy_nonoverlapping(region.original_base() as *const u8, mapped.cast::<u8>(), size);

        if libc::mprotect(mapped, size, libc::PROT_READ) != 0 {
            let err = io::Error::last_os_error();
            libc::munmap(mapped, size);
            return Err(InstallError::ShadowProtect(err));
        }

        if libc::mprotect(region.original_base() as *mut libc::c_void, size, libc::PROT_NONE) != 0 {
            let err = io::Error::last_os_error();
            libc::munmap(mapped, size);
            return Err(InstallError::RegionProtect(err));
        }
    }

    tracing::debug!(
        shadow_base = format_args!("{:#x}", region.shadow_base()),
        size,
        "shadow mapping populated, original region protected"
    );
    Ok(())
}
