//! Sanctioned typed reads of program-memory constants.
//!
//! Each function adds [`PROGMEM_SHADOW_OFFSET`](crate::PROGMEM_SHADOW_OFFSET)
//! to the logical address and performs a plain read from the shadow mapping.
//! This path never faults and has no side effects; it is the way all code is
//! *supposed* to read program memory. Raw dereferences of the logical address
//! instead take the full trap-and-emulate round trip in `progmem-trap` (and
//! land in its audit log), but observe the identical value.
//!
//! Reads are unaligned-tolerant: packed tables in the section are fine.
//!
//! # Safety
//!
//! All functions require that `addr` lies inside an installed program-memory
//! region, i.e. the shadow mapping for `addr` exists and covers the full
//! width of the read. Calling them before the shadow mapper has run, or with
//! an out-of-region address, reads unmapped memory.

use crate::PROGMEM_SHADOW_OFFSET;

macro_rules! progmem_reader {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Reads a `", stringify!($ty), "` program-memory constant at `addr`.")]
        ///
        /// # Safety
        ///
        /// `addr` must lie inside an installed program-memory region (see the
        /// module docs).
        pub unsafe fn $name(addr: usize) -> $ty {
            core::ptr::read_unaligned((addr + PROGMEM_SHADOW_OFFSET) as *const $ty)
        }
    };
}

progmem_reader!(read_u8, u8);
progmem_reader!(read_i8, i8);
progmem_reader!(read_u16, u16);
progmem_reader!(read_i16, i16);
progmem_reader!(read_u32, u32);
progmem_reader!(read_i32, i32);
progmem_reader!(read_u64, u64);
progmem_reader!(read_i64, i64);
