// Shared test helpers (integration tests compile as separate crates, so put
// common code in a submodule to avoid it becoming its own test target).

use progmem_layout::PAGE_SIZE;

/// Maps `pages` anonymous read-write pages at a quiet fixed address, so the
/// shadow range 16 MiB above is predictably free as well. Candidates sit in
/// the gap between a PIE binary's segments and the heap.
pub fn map_rw_pages(pages: usize) -> usize {
    const CANDIDATES: [usize; 3] = [0x5000_0000, 0x6000_0000, 0x7000_0000];
    for base in CANDIDATES {
        let mapped = unsafe {
            libc::mmap(
                base as *mut libc::c_void,
                pages * PAGE_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED_NOREPLACE,
                -1,
                0,
            )
        };
        if mapped != libc::MAP_FAILED && mapped as usize == base {
            return base;
        }
        if mapped != libc::MAP_FAILED {
            unsafe { libc::munmap(mapped, pages * PAGE_SIZE) };
        }
    }
    panic!("no candidate address range was free");
}

pub fn write_bytes(addr: usize, bytes: &[u8]) {
    unsafe {
        core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
    }
}
