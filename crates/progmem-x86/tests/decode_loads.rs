//! Golden decode tests over hand-encoded instruction bytes, so failures are
//! reproducible and independent of any assembler.

use progmem_x86::{decode_load, DecodeError, Gpr, GprFile};

const PC: u64 = 0x40_1000;

fn regs_with(reg: Gpr, value: u64) -> GprFile {
    let mut regs = GprFile::default();
    regs.rip = PC;
    regs.set(reg, value);
    regs
}

#[test]
fn mov_rax_from_rdi() {
    // mov rax, qword ptr [rdi]
    let regs = regs_with(Gpr::Rdi, 0x5000_0040);
    let load = decode_load(&[0x48, 0x8b, 0x07], PC, &regs).unwrap();
    assert_eq!(load.effective_address, 0x5000_0040);
    assert_eq!(load.dest, Gpr::Rax);
    assert_eq!((load.load_size, load.dest_size), (8, 8));
    assert!(!load.sign_extend);
    assert_eq!(load.inst_len, 3);
}

#[test]
fn mov_narrow_widths() {
    let regs = regs_with(Gpr::Rdi, 0x5000_0040);

    // mov eax, dword ptr [rdi]
    let load = decode_load(&[0x8b, 0x07], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size, load.inst_len), (4, 4, 2));

    // mov ax, word ptr [rdi]
    let load = decode_load(&[0x66, 0x8b, 0x07], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size, load.inst_len), (2, 2, 3));

    // mov al, byte ptr [rdi]
    let load = decode_load(&[0x8a, 0x07], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size, load.inst_len), (1, 1, 2));
    assert_eq!(load.dest, Gpr::Rax);
}

#[test]
fn movzx_zero_extends_and_movsx_sign_extends() {
    let regs = regs_with(Gpr::Rsi, 0x5000_0100);

    // movzx eax, byte ptr [rsi]
    let load = decode_load(&[0x0f, 0xb6, 0x06], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size), (1, 4));
    assert!(!load.sign_extend);

    // movzx eax, word ptr [rsi]
    let load = decode_load(&[0x0f, 0xb7, 0x06], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size), (2, 4));
    assert!(!load.sign_extend);

    // movsx rax, byte ptr [rsi]
    let load = decode_load(&[0x48, 0x0f, 0xbe, 0x06], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size), (1, 8));
    assert!(load.sign_extend);

    // movsx rax, word ptr [rsi]
    let load = decode_load(&[0x48, 0x0f, 0xbf, 0x06], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size), (2, 8));
    assert!(load.sign_extend);

    // movsxd rax, dword ptr [rsi]
    let load = decode_load(&[0x48, 0x63, 0x06], PC, &regs).unwrap();
    assert_eq!((load.load_size, load.dest_size), (4, 8));
    assert!(load.sign_extend);
}

#[test]
fn displacement_is_added_to_the_base() {
    let regs = regs_with(Gpr::Rdi, 0x5000_0000);

    // mov eax, dword ptr [rdi + 0x10] (disp8)
    let load = decode_load(&[0x8b, 0x47, 0x10], PC, &regs).unwrap();
    assert_eq!(load.effective_address, 0x5000_0010);

    // mov rax, qword ptr [rdi - 0x10] (disp32, sign-extended)
    let load = decode_load(&[0x48, 0x8b, 0x87, 0xf0, 0xff, 0xff, 0xff], PC, &regs).unwrap();
    assert_eq!(load.effective_address, 0x4fff_fff0);
    assert_eq!(load.inst_len, 7);
}

#[test]
fn rip_relative_base_accounts_for_the_instruction_length() {
    // mov rax, qword ptr [rip + 0xd0]; the operand resolves relative to the
    // *next* instruction, while the fault handler still sees pc at the start
    // of this one.
    let regs = regs_with(Gpr::Rax, 0);
    let load =
        decode_load(&[0x48, 0x8b, 0x05, 0xd0, 0x00, 0x00, 0x00], PC, &regs).unwrap();
    assert_eq!(load.inst_len, 7);
    assert_eq!(load.effective_address, PC + 7 + 0xd0);
}

#[test]
fn extended_registers_resolve_through_rex() {
    // mov r9d, dword ptr [r8 + 8]
    let regs = regs_with(Gpr::R8, 0x5000_0000);
    let load = decode_load(&[0x45, 0x8b, 0x48, 0x08], PC, &regs).unwrap();
    assert_eq!(load.dest, Gpr::R9);
    assert_eq!(load.effective_address, 0x5000_0008);
    assert_eq!((load.load_size, load.dest_size), (4, 4));
}

#[test]
fn rejects_indexed_addressing() {
    // mov rax, qword ptr [rdi + rbx]
    let regs = GprFile::default();
    let err = decode_load(&[0x48, 0x8b, 0x04, 0x1f], PC, &regs).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Unsupported {
            pc: PC,
            reason: "indexed addressing",
        }
    );
}

#[test]
fn rejects_stores_into_program_memory() {
    // mov qword ptr [rdi], rax
    let regs = GprFile::default();
    let err = decode_load(&[0x48, 0x89, 0x07], PC, &regs).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Unsupported {
            pc: PC,
            reason: "destination is not a register",
        }
    );
}

#[test]
fn rejects_arithmetic_with_memory_operand() {
    // add rax, qword ptr [rdi]
    let regs = GprFile::default();
    let err = decode_load(&[0x48, 0x03, 0x07], PC, &regs).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Unsupported {
            pc: PC,
            reason: "mnemonic is not a plain load",
        }
    );
}

#[test]
fn rejects_string_ops() {
    // rep movsb
    let regs = GprFile::default();
    let err = decode_load(&[0xf3, 0xa4], PC, &regs).unwrap_err();
    assert!(matches!(err, DecodeError::Unsupported { .. }));
}

#[test]
fn rejects_segment_overrides() {
    // mov rax, qword ptr fs:[rdi]
    let regs = GprFile::default();
    let err = decode_load(&[0x64, 0x48, 0x8b, 0x07], PC, &regs).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Unsupported {
            pc: PC,
            reason: "segment override prefix",
        }
    );
}

#[test]
fn rejects_high_byte_destinations() {
    // mov ah, byte ptr [rdi]: writing ah cannot be expressed as a plain
    // merge at a register boundary we support.
    let regs = GprFile::default();
    let err = decode_load(&[0x8a, 0x27], PC, &regs).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Unsupported {
            pc: PC,
            reason: "high-byte destination register",
        }
    );
}

#[test]
fn rejects_baseless_absolute_forms() {
    // mov rax, qword ptr [moffs64]
    let regs = GprFile::default();
    let err = decode_load(
        &[0x48, 0xa1, 0x40, 0x00, 0x00, 0x50, 0x00, 0x00, 0x00, 0x00],
        PC,
        &regs,
    )
    .unwrap_err();
    assert_eq!(
        err,
        DecodeError::Unsupported {
            pc: PC,
            reason: "memory operand has no base register",
        }
    );
}

#[test]
fn rejects_register_to_register_moves() {
    // mov rax, rdi
    let regs = GprFile::default();
    let err = decode_load(&[0x48, 0x89, 0xf8], PC, &regs).unwrap_err();
    assert!(matches!(err, DecodeError::Unsupported { .. }));
}

#[test]
fn rejects_garbage_bytes() {
    let regs = GprFile::default();
    let err = decode_load(&[0x06], PC, &regs).unwrap_err();
    assert_eq!(err, DecodeError::Undecodable { pc: PC });
}
