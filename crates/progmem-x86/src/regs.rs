/// The sixteen x86-64 general-purpose registers, in encoding order.
///
/// Only full 64-bit names appear here; a narrower destination operand (`eax`,
/// `ax`, `al`) is represented as the full register plus the operand width in
/// [`DecodedLoad`](crate::DecodedLoad).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gpr {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Gpr {
    pub const COUNT: usize = 16;

    pub const ALL: [Gpr; Self::COUNT] = [
        Gpr::Rax,
        Gpr::Rcx,
        Gpr::Rdx,
        Gpr::Rbx,
        Gpr::Rsp,
        Gpr::Rbp,
        Gpr::Rsi,
        Gpr::Rdi,
        Gpr::R8,
        Gpr::R9,
        Gpr::R10,
        Gpr::R11,
        Gpr::R12,
        Gpr::R13,
        Gpr::R14,
        Gpr::R15,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Plain snapshot of the general-purpose registers plus the program counter.
///
/// The fault handler lifts these out of the interrupted thread's
/// `ucontext_t` so that decoding and emulation operate on an ordinary value
/// instead of a signal context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GprFile {
    pub gpr: [u64; Gpr::COUNT],
    pub rip: u64,
}

impl GprFile {
    pub fn get(&self, reg: Gpr) -> u64 {
        self.gpr[reg.index()]
    }

    pub fn set(&mut self, reg: Gpr, value: u64) {
        self.gpr[reg.index()] = value;
    }
}
