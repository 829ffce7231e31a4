//! Decoding and register semantics for the one instruction family the
//! program-memory fault handler is allowed to emulate: a plain x86-64 load
//! (`mov` / `movzx` / `movsx` / `movsxd`) from `[base + disp]` into a
//! general-purpose register.
//!
//! Everything here is ordinary logic on plain data: instruction bytes go in,
//! a [`DecodedLoad`] comes out, and the extension/merge helpers compute the
//! new register value. No signal-context or OS types appear at this layer,
//! which keeps it unit-testable and keeps the unsafe surface confined to
//! `progmem-trap`.
//!
//! Anything outside the supported shape is a [`DecodeError`], which the
//! handler treats as fatal: an unexpected instruction shape means the code
//! generator broke an assumption this layer does not cover, and guessing
//! would corrupt the interrupted program.

mod load;
mod regs;

pub use load::{decode_load, extend_value, merge_dest, DecodeError, DecodedLoad, MAX_INST_LEN};
pub use regs::{Gpr, GprFile};
