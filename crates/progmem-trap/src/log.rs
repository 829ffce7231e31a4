//! Append-only audit log of emulated program-memory accesses.
//!
//! The handler appends from signal context, so everything here is
//! pre-allocated and lock-free: slots are claimed with an atomic counter,
//! and the optional file sink is written with a single `write(2)` per record
//! (atomic for `O_APPEND` descriptors), serializing concurrent faulting
//! threads without a lock.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::sigsafe::LineBuf;

/// One emulated access. Append-only; never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRecord {
    /// Program counter of the faulting load.
    pub pc: u64,
    /// Logical program-memory address it dereferenced.
    pub addr: u64,
    /// Raw bits read from the shadow, zero-extended to 64 bits (before any
    /// sign extension into the destination register).
    pub value: u64,
}

struct Slot {
    pc: AtomicU64,
    addr: AtomicU64,
    value: AtomicU64,
    /// Set (release) only after the three fields above have been stored, so
    /// a snapshot never observes a claimed-but-half-written slot.
    published: AtomicBool,
}

pub struct AccessLog {
    slots: Box<[Slot]>,
    /// Total records ever appended; slots hold the first `capacity` of them.
    appended: AtomicUsize,
    sink: Option<RawFd>,
}

impl AccessLog {
    pub(crate) fn new(capacity: usize, sink: Option<RawFd>) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                pc: AtomicU64::new(0),
                addr: AtomicU64::new(0),
                value: AtomicU64::new(0),
                published: AtomicBool::new(false),
            })
            .collect();
        Self {
            slots,
            appended: AtomicUsize::new(0),
            sink,
        }
    }

    /// Appends one record. Async-signal-safe: no locks, no allocation.
    pub(crate) fn append(&self, record: FaultRecord) {
        let index = self.appended.fetch_add(1, Ordering::AcqRel);
        if let Some(slot) = self.slots.get(index) {
            slot.pc.store(record.pc, Ordering::Relaxed);
            slot.addr.store(record.addr, Ordering::Relaxed);
            slot.value.store(record.value, Ordering::Relaxed);
            slot.published.store(true, Ordering::Release);
        }
        if let Some(fd) = self.sink {
            let mut line = LineBuf::new();
            line.push_str("progmem access: pc=");
            line.push_hex(record.pc);
            line.push_str(" addr=");
            line.push_hex(record.addr);
            line.push_str(" value=");
            line.push_hex(record.value);
            line.push_str("\n");
            line.write_to(fd);
        }
    }

    /// Total number of emulated accesses so far, including any whose record
    /// bodies were dropped for capacity.
    pub fn total(&self) -> usize {
        self.appended.load(Ordering::Acquire)
    }

    /// Records dropped because the pre-allocated buffer was full.
    pub fn dropped(&self) -> usize {
        self.total().saturating_sub(self.slots.len())
    }

    /// Snapshot of the retained records, oldest first. A slot claimed by an
    /// append still in flight on another thread is skipped; once all
    /// appenders are quiescent the snapshot holds every retained record.
    pub fn records(&self) -> Vec<FaultRecord> {
        let retained = self.total().min(self.slots.len());
        self.slots[..retained]
            .iter()
            .filter(|slot| slot.published.load(Ordering::Acquire))
            .map(|slot| FaultRecord {
                pc: slot.pc.load(Ordering::Relaxed),
                addr: slot.addr.load(Ordering::Relaxed),
                value: slot.value.load(Ordering::Relaxed),
            })
            .collect()
    }
}
