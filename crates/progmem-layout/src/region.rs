use thiserror::Error;

/// Host page size. The region base must be aligned to this.
pub const PAGE_SIZE: usize = 4096;

/// Fixed virtual-address distance between the protected program-memory
/// region and its readable shadow mapping.
///
/// 16 MiB clears the section's own extent while staying far below the mmap
/// area, so the shadow range is free in practice. The same constant feeds
/// both the shadow mapper (`progmem-trap`) and [`crate::accessor`]; keeping
/// it in one place is what guarantees the two stay consistent.
pub const PROGMEM_SHADOW_OFFSET: usize = 0x0100_0000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("region base {base:#x} is not aligned to the {PAGE_SIZE} byte page size")]
    MisalignedBase { base: usize },

    #[error("region size must be nonzero")]
    EmptyRegion,

    #[error("shadow range for base {base:#x} size {size:#x} wraps the address space")]
    ShadowRangeOverflow { base: usize, size: usize },
}

/// The protected program-memory range and its shadow.
///
/// Created once during process initialization and immutable afterwards.
/// Invariants (enforced by [`ProgramMemoryRegion::new`]):
///
/// - `original_base` is page-aligned;
/// - `size` is nonzero and identical for both mappings;
/// - `shadow_base == original_base + PROGMEM_SHADOW_OFFSET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramMemoryRegion {
    original_base: usize,
    size: usize,
    shadow_base: usize,
}

impl ProgramMemoryRegion {
    /// Describes the region starting at `original_base`, shadowed at the
    /// fixed [`PROGMEM_SHADOW_OFFSET`].
    pub fn new(original_base: usize, size: usize) -> Result<Self, LayoutError> {
        if original_base % PAGE_SIZE != 0 {
            return Err(LayoutError::MisalignedBase {
                base: original_base,
            });
        }
        if size == 0 {
            return Err(LayoutError::EmptyRegion);
        }
        let shadow_base = original_base
            .checked_add(PROGMEM_SHADOW_OFFSET)
            .filter(|shadow| shadow.checked_add(size).is_some())
            .ok_or(LayoutError::ShadowRangeOverflow {
                base: original_base,
                size,
            })?;
        Ok(Self {
            original_base,
            size,
            shadow_base,
        })
    }

    /// Constructs a region with an explicit shadow base, bypassing the fixed
    /// offset invariant. Exists so emulation logic can be unit-tested against
    /// an ordinary heap buffer standing in for the shadow mapping.
    #[doc(hidden)]
    pub fn from_raw_parts(original_base: usize, size: usize, shadow_base: usize) -> Self {
        Self {
            original_base,
            size,
            shadow_base,
        }
    }

    pub fn original_base(&self) -> usize {
        self.original_base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shadow_base(&self) -> usize {
        self.shadow_base
    }

    /// First address past the protected range.
    pub fn end(&self) -> usize {
        self.original_base + self.size
    }

    /// Whether `addr` falls inside the protected range `[base, base+size)`.
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.original_base && addr < self.end()
    }

    /// Maps a logical (protected) address to its shadow counterpart.
    ///
    /// The caller must have checked [`contains`](Self::contains) first.
    pub fn translate(&self, addr: usize) -> usize {
        debug_assert!(self.contains(addr));
        addr - self.original_base + self.shadow_base
    }
}
