use iced_x86::{Decoder, DecoderOptions, Mnemonic, OpKind, Register};
use thiserror::Error;

use crate::regs::{Gpr, GprFile};

/// Maximum x86 instruction length (architectural limit). The fault handler
/// reads this many bytes at the faulting program counter before decoding.
pub const MAX_INST_LEN: usize = 15;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("undecodable instruction bytes at pc {pc:#x}")]
    Undecodable { pc: u64 },

    #[error("unsupported instruction shape at pc {pc:#x}: {reason}")]
    Unsupported { pc: u64, reason: &'static str },
}

impl DecodeError {
    /// Static description, usable from async-signal-safe diagnostics.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::Undecodable { .. } => "undecodable instruction bytes",
            DecodeError::Unsupported { reason, .. } => reason,
        }
    }
}

/// One decoded memory-to-register load, derived fresh per fault and never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedLoad {
    /// Address the load resolves to: base register + displacement, with the
    /// instruction length already folded in for a pc-relative base.
    pub effective_address: u64,
    /// Destination register (always named by its full 64-bit alias).
    pub dest: Gpr,
    /// Width of the destination operand in bytes (1, 2, 4 or 8).
    pub dest_size: u8,
    /// Width of the memory read in bytes (1, 2, 4 or 8).
    pub load_size: u8,
    /// Whether the value sign-extends into the destination (`movsx` /
    /// `movsxd`); `movzx` and plain `mov` zero-extend.
    pub sign_extend: bool,
    /// Encoded length of the instruction in bytes.
    pub inst_len: u8,
}

/// Decodes exactly one instruction at `pc` and validates that it is a plain
/// `[base + disp]` load into a general-purpose register.
///
/// `code` holds the instruction bytes starting at `pc` (up to
/// [`MAX_INST_LEN`]); `regs` supplies base-register values for the
/// effective-address computation. The supported shape is deliberately
/// narrow:
///
/// - mnemonic `mov`, `movzx`, `movsx` or `movsxd`;
/// - destination a general-purpose register (high-byte `ah`/`bh`/`ch`/`dh`
///   excluded);
/// - source a memory operand with a 64-bit base register (or `rip`) plus a
///   constant displacement: no index register, no segment override, no
///   base-less absolute forms.
pub fn decode_load(code: &[u8], pc: u64, regs: &GprFile) -> Result<DecodedLoad, DecodeError> {
    let unsupported = |reason: &'static str| DecodeError::Unsupported { pc, reason };

    let mut decoder = Decoder::with_ip(64, code, pc, DecoderOptions::NONE);
    let inst = decoder.decode();
    if inst.is_invalid() {
        return Err(DecodeError::Undecodable { pc });
    }

    let mnemonic = inst.mnemonic();
    if !matches!(
        mnemonic,
        Mnemonic::Mov | Mnemonic::Movzx | Mnemonic::Movsx | Mnemonic::Movsxd
    ) {
        return Err(unsupported("mnemonic is not a plain load"));
    }
    if inst.op_count() != 2 {
        return Err(unsupported("not a two-operand form"));
    }
    if inst.op0_kind() != OpKind::Register {
        // Covers stores (`mov [mem], reg`): those write program memory and
        // are never emulated.
        return Err(unsupported("destination is not a register"));
    }
    if inst.op1_kind() != OpKind::Memory {
        return Err(unsupported("source is not a memory operand"));
    }

    let dst = inst.op0_register();
    if matches!(
        dst,
        Register::AH | Register::BH | Register::CH | Register::DH
    ) {
        return Err(unsupported("high-byte destination register"));
    }
    if !dst.is_gpr() {
        return Err(unsupported("destination is not a general-purpose register"));
    }

    if inst.segment_prefix() != Register::None {
        return Err(unsupported("segment override prefix"));
    }
    if inst.memory_index() != Register::None {
        return Err(unsupported("indexed addressing"));
    }

    // With the decoder seeded with `pc`, iced folds `pc + inst_len + disp32`
    // into the displacement for a rip-relative operand, which is exactly the
    // correction a pc-relative base needs (the reported pc still points at
    // the faulting instruction).
    let effective_address = match inst.memory_base() {
        Register::RIP => inst.memory_displacement64(),
        Register::None => return Err(unsupported("memory operand has no base register")),
        base => {
            let base = gpr_from_iced(base).ok_or_else(|| unsupported("non-64-bit base register"))?;
            regs.get(base).wrapping_add(inst.memory_displacement64())
        }
    };

    let load_size = inst.memory_size().size();
    if !matches!(load_size, 1 | 2 | 4 | 8) {
        return Err(unsupported("unsupported memory operand width"));
    }
    let dest_size = dst.size();
    let sign_extend = matches!(mnemonic, Mnemonic::Movsx | Mnemonic::Movsxd);
    if mnemonic == Mnemonic::Mov && load_size != dest_size {
        return Err(unsupported("mov operand width mismatch"));
    }

    let dest = gpr_from_iced(dst.full_register())
        .ok_or_else(|| unsupported("destination is not a general-purpose register"))?;

    Ok(DecodedLoad {
        effective_address,
        dest,
        dest_size: dest_size as u8,
        load_size: load_size as u8,
        sign_extend,
        inst_len: inst.len() as u8,
    })
}

fn gpr_from_iced(reg: Register) -> Option<Gpr> {
    Some(match reg {
        Register::RAX => Gpr::Rax,
        Register::RCX => Gpr::Rcx,
        Register::RDX => Gpr::Rdx,
        Register::RBX => Gpr::Rbx,
        Register::RSP => Gpr::Rsp,
        Register::RBP => Gpr::Rbp,
        Register::RSI => Gpr::Rsi,
        Register::RDI => Gpr::Rdi,
        Register::R8 => Gpr::R8,
        Register::R9 => Gpr::R9,
        Register::R10 => Gpr::R10,
        Register::R11 => Gpr::R11,
        Register::R12 => Gpr::R12,
        Register::R13 => Gpr::R13,
        Register::R14 => Gpr::R14,
        Register::R15 => Gpr::R15,
        _ => return None,
    })
}

/// Extends the raw loaded bits to the destination operand width, per the
/// load's sign/zero-extension rule. `raw` carries the memory bits in its low
/// `load_size` bytes.
pub fn extend_value(raw: u64, load: &DecodedLoad) -> u64 {
    let value = match load.load_size {
        1 => raw as u8 as u64,
        2 => raw as u16 as u64,
        4 => raw as u32 as u64,
        _ => raw,
    };
    if load.sign_extend {
        let signed = match load.load_size {
            1 => value as u8 as i8 as i64,
            2 => value as u16 as i16 as i64,
            4 => value as u32 as i32 as i64,
            _ => value as i64,
        };
        (signed as u64) & width_mask(load.dest_size)
    } else {
        value & width_mask(load.dest_size)
    }
}

/// Computes the new full 64-bit register value after writing `value` (already
/// extended to `dest_size`) into a register holding `old`, with architectural
/// merge semantics: 64-bit writes replace, 32-bit writes zero the upper half,
/// 16- and 8-bit writes preserve the remaining bits.
pub fn merge_dest(old: u64, value: u64, dest_size: u8) -> u64 {
    match dest_size {
        8 => value,
        4 => value & 0xffff_ffff,
        2 => (old & !0xffff) | (value & 0xffff),
        _ => (old & !0xff) | (value & 0xff),
    }
}

fn width_mask(size: u8) -> u64 {
    match size {
        1 => 0xff,
        2 => 0xffff,
        4 => 0xffff_ffff,
        _ => u64::MAX,
    }
}
