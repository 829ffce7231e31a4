//! Completes one faulting load against the shadow mapping.
//!
//! This is the plain-data half of the handler: it takes the instruction
//! bytes, a register snapshot and the OS-reported faulting address, and
//! produces the register/pc updates to apply plus the audit record. The
//! ucontext mutation stays in the handler module.

use progmem_layout::ProgramMemoryRegion;
use progmem_x86::{decode_load, extend_value, merge_dest, DecodeError, Gpr, GprFile};
use thiserror::Error;

use crate::FaultRecord;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EmulateError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The decoded effective address disagrees with what the kernel reported
    /// faulting. Either an addressing-mode assumption broke or the shadow
    /// offset configuration is wrong; continuing would load from the wrong
    /// place, so the handler treats this as fatal.
    #[error("effective address {computed:#x} does not match faulting address {reported:#x}")]
    AddressMismatch { computed: u64, reported: u64 },
}

impl EmulateError {
    /// Static description, usable from async-signal-safe diagnostics.
    pub fn reason(&self) -> &'static str {
        match self {
            EmulateError::Decode(err) => err.reason(),
            EmulateError::AddressMismatch { .. } => {
                "computed effective address does not match the faulting address"
            }
        }
    }
}

/// Register/pc updates for one emulated load. Applying these (and nothing
/// else) to the interrupted context resumes execution past the instruction
/// with exactly the value the accessor API would have produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Emulated {
    pub dest: Gpr,
    pub dest_value: u64,
    pub next_pc: u64,
    pub record: FaultRecord,
}

pub(crate) fn emulate_fault(
    code: &[u8],
    regs: &GprFile,
    fault_addr: u64,
    region: &ProgramMemoryRegion,
) -> Result<Emulated, EmulateError> {
    let load = decode_load(code, regs.rip, regs)?;

    if load.effective_address != fault_addr {
        return Err(EmulateError::AddressMismatch {
            computed: load.effective_address,
            reported: fault_addr,
        });
    }

    let shadow = region.translate(fault_addr as usize);
    // The region stays mapped for the process lifetime and `translate`
    // checked containment; unaligned packed fields are fine on x86.
    let raw = unsafe { read_shadow(shadow, load.load_size) };

    let extended = extend_value(raw, &load);
    let dest_value = merge_dest(regs.get(load.dest), extended, load.dest_size);

    Ok(Emulated {
        dest: load.dest,
        dest_value,
        next_pc: regs.rip.wrapping_add(u64::from(load.inst_len)),
        record: FaultRecord {
            pc: regs.rip,
            addr: fault_addr,
            value: raw,
        },
    })
}

unsafe fn read_shadow(addr: usize, size: u8) -> u64 {
    match size {
        1 => u64::from(core::ptr::read_unaligned(addr as *const u8)),
        2 => u64::from(core::ptr::read_unaligned(addr as *const u16)),
        4 => u64::from(core::ptr::read_unaligned(addr as *const u32)),
        _ => core::ptr::read_unaligned(addr as *const u64),
    }
}
