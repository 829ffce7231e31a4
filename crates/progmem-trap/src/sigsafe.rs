//! Minimal async-signal-safe line formatting.
//!
//! `std::fmt` and anything that allocates are off-limits inside the SIGSEGV
//! handler, so log records and fatal diagnostics are assembled into a fixed
//! stack buffer and pushed out with a single `write(2)`.

use std::os::fd::RawFd;

const CAPACITY: usize = 192;

pub(crate) struct LineBuf {
    buf: [u8; CAPACITY],
    len: usize,
}

impl LineBuf {
    pub(crate) fn new() -> Self {
        Self {
            buf: [0; CAPACITY],
            len: 0,
        }
    }

    pub(crate) fn push_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            if self.len == CAPACITY {
                return; // truncate, never overflow
            }
            self.buf[self.len] = b;
            self.len += 1;
        }
    }

    /// Appends `0x` followed by the minimal hex digits of `value`.
    pub(crate) fn push_hex(&mut self, value: u64) {
        self.push_str("0x");
        let mut started = false;
        for shift in (0..16).rev() {
            let nibble = ((value >> (shift * 4)) & 0xf) as usize;
            if nibble != 0 || started || shift == 0 {
                started = true;
                self.push_byte(b"0123456789abcdef"[nibble]);
            }
        }
    }

    fn push_byte(&mut self, b: u8) {
        if self.len < CAPACITY {
            self.buf[self.len] = b;
            self.len += 1;
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Writes the buffered line with one `write(2)`. A short or failed write
    /// is not recoverable from a signal context and is ignored.
    pub(crate) fn write_to(&self, fd: RawFd) {
        unsafe {
            let _ = libc::write(fd, self.buf.as_ptr().cast(), self.len);
        }
    }
}
