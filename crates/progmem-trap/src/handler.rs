//! Process-wide SIGSEGV interception and resume.
//!
//! The handler is the narrow unsafe boundary the rest of the subsystem is
//! organized around: it lifts the register state out of the interrupted
//! thread's `ucontext_t`, hands plain data to `emulate_fault`, and writes
//! back exactly the destination register and program counter before
//! returning (an implicit jump back into the interrupted code).
//!
//! Per-thread state machine: `Armed → Handling → Armed`. Fault delivery is
//! per-thread, so the `Handling` flag is a thread-local; `SA_NODEFER` keeps
//! SIGSEGV deliverable during handling so a nested fault reaches us (and
//! aborts with a diagnostic) instead of being force-killed silently.
//!
//! Everything on the fault path is async-signal-safe: no allocation, no
//! locks, no `std::fmt`. Fatal diagnostics go through the same fixed-buffer
//! writer as the audit log.

use std::cell::Cell;
use std::io;
use std::mem;
use std::ptr;
use std::slice;

use progmem_x86::{Gpr, GprFile, MAX_INST_LEN};

use crate::emulate::emulate_fault;
use crate::sigsafe::LineBuf;
use crate::{installed, InstallError};

thread_local! {
    static HANDLING: Cell<bool> = const { Cell::new(false) };
}

type SigsegvFn = unsafe extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

/// Arms the handler, returning the displaced disposition so a failed install
/// can put it back with [`restore_sigsegv`].
pub(crate) fn install_sigsegv() -> Result<libc::sigaction, InstallError> {
    let mut previous: libc::sigaction = unsafe { mem::zeroed() };
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = on_sigsegv as SigsegvFn as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGSEGV, &action, &mut previous) != 0 {
            return Err(InstallError::Sigaction(io::Error::last_os_error()));
        }
    }
    tracing::debug!("SIGSEGV handler installed");
    Ok(previous)
}

pub(crate) fn restore_sigsegv(previous: &libc::sigaction) {
    if unsafe { libc::sigaction(libc::SIGSEGV, previous, ptr::null_mut()) } != 0 {
        tracing::warn!(
            error = %io::Error::last_os_error(),
            "failed to restore previous SIGSEGV disposition"
        );
    }
}

unsafe extern "C" fn on_sigsegv(
    _sig: libc::c_int,
    info: *mut libc::siginfo_t,
    ctx: *mut libc::c_void,
) {
    let fault_addr = (*info).si_addr() as usize;
    let ucontext = &mut *ctx.cast::<libc::ucontext_t>();
    let pc = ucontext.uc_mcontext.gregs[libc::REG_RIP as usize] as u64;

    let Some(guard) = installed() else {
        // Handler fired before the context was published; nothing we can
        // legitimately service.
        fatal_unrelated(fault_addr, pc);
        return;
    };

    if !guard.region().contains(fault_addr) {
        // A real bug elsewhere in the process. Swallowing it is forbidden:
        // hand the fault back to the default disposition.
        fatal_unrelated(fault_addr, pc);
        return;
    }

    if HANDLING.with(|flag| flag.replace(true)) {
        fatal_reentrant(fault_addr, pc);
    }

    let regs = gpr_file_from_ucontext(ucontext);
    let code = slice::from_raw_parts(pc as *const u8, MAX_INST_LEN);

    match emulate_fault(code, &regs, fault_addr as u64, guard.region()) {
        Ok(out) => {
            ucontext.uc_mcontext.gregs[greg_index(out.dest)] = out.dest_value as libc::greg_t;
            ucontext.uc_mcontext.gregs[libc::REG_RIP as usize] = out.next_pc as libc::greg_t;
            guard.log().append(out.record);
            HANDLING.with(|flag| flag.set(false));
        }
        Err(err) => fatal_unsupported(fault_addr, pc, err.reason()),
    }
}

fn gpr_file_from_ucontext(ucontext: &libc::ucontext_t) -> GprFile {
    let mut regs = GprFile::default();
    for gpr in Gpr::ALL {
        regs.set(gpr, ucontext.uc_mcontext.gregs[greg_index(gpr)] as u64);
    }
    regs.rip = ucontext.uc_mcontext.gregs[libc::REG_RIP as usize] as u64;
    regs
}

fn greg_index(gpr: Gpr) -> usize {
    (match gpr {
        Gpr::Rax => libc::REG_RAX,
        Gpr::Rcx => libc::REG_RCX,
        Gpr::Rdx => libc::REG_RDX,
        Gpr::Rbx => libc::REG_RBX,
        Gpr::Rsp => libc::REG_RSP,
        Gpr::Rbp => libc::REG_RBP,
        Gpr::Rsi => libc::REG_RSI,
        Gpr::Rdi => libc::REG_RDI,
        Gpr::R8 => libc::REG_R8,
        Gpr::R9 => libc::REG_R9,
        Gpr::R10 => libc::REG_R10,
        Gpr::R11 => libc::REG_R11,
        Gpr::R12 => libc::REG_R12,
        Gpr::R13 => libc::REG_R13,
        Gpr::R14 => libc::REG_R14,
        Gpr::R15 => libc::REG_R15,
    }) as usize
}

/// Out-of-region fault: emit a diagnostic, restore the default disposition
/// and return, so the re-executed instruction dies the way it would have
/// without this subsystem.
fn fatal_unrelated(fault_addr: usize, pc: u64) {
    let mut line = LineBuf::new();
    line.push_str("progmem: unrelated SIGSEGV at ");
    line.push_hex(fault_addr as u64);
    line.push_str(" (pc ");
    line.push_hex(pc);
    line.push_str("), restoring default disposition\n");
    line.write_to(libc::STDERR_FILENO);
    unsafe {
        libc::signal(libc::SIGSEGV, libc::SIG_DFL);
    }
}

fn fatal_reentrant(fault_addr: usize, pc: u64) -> ! {
    let mut line = LineBuf::new();
    line.push_str("progmem: nested fault at ");
    line.push_hex(fault_addr as u64);
    line.push_str(" (pc ");
    line.push_hex(pc);
    line.push_str(") while already handling, aborting\n");
    line.write_to(libc::STDERR_FILENO);
    unsafe { libc::abort() }
}

fn fatal_unsupported(fault_addr: usize, pc: u64, reason: &str) -> ! {
    let mut line = LineBuf::new();
    line.push_str("progmem: cannot emulate access at ");
    line.push_hex(fault_addr as u64);
    line.push_str(" (pc ");
    line.push_hex(pc);
    line.push_str("): ");
    line.push_str(reason);
    line.push_str("\n");
    line.write_to(libc::STDERR_FILENO);
    unsafe { libc::abort() }
}

/// Marks the current thread as already handling a fault, so tests can drive
/// the nested-fault abort path from outside a signal context.
#[doc(hidden)]
pub fn force_handling_state_for_test(active: bool) {
    HANDLING.with(|flag| flag.set(active));
}
