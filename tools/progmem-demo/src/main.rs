//! End-to-end demonstration of the program-memory trap-and-emulate layer,
//! using the real linker-section placement contract: a constant table lives
//! in the `progmem` section, the region is discovered through the GNU-ld
//! boundary symbols, and the same constant is then read both ways — through
//! the sanctioned accessor and through a stray raw dereference that takes
//! the full fault-and-emulate round trip.

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
mod demo {
    use std::hint::black_box;
    use std::path::PathBuf;
    use std::ptr::read_volatile;

    use anyhow::{ensure, Context, Result};
    use clap::Parser;
    use progmem_layout::{accessor, progmem_section_region, PageAligned};
    use progmem_trap::InstallOptions;

    const WORDS: usize = 1024;

    /// One page of constants, the demo's stand-in for a firmware lookup
    /// table. Page-aligned and page-sized, per the placement contract.
    #[link_section = "progmem"]
    #[used]
    static TABLE: PageAligned<[u32; WORDS]> = PageAligned(build_table());

    const fn build_table() -> [u32; WORDS] {
        let mut table = [0u32; WORDS];
        let mut i = 0;
        while i < WORDS {
            table[i] = (i as u32).wrapping_mul(0x9e37_79b9);
            i += 1;
        }
        table[0x10] = 0xdead_beef;
        table
    }

    #[derive(Parser)]
    #[command(about = "demonstrates trap-and-emulate of stray program-memory reads")]
    struct Args {
        /// Append emulated-access records to this file.
        #[arg(long)]
        log: Option<PathBuf>,
    }

    pub fn run() -> Result<()> {
        let args = Args::parse();
        tracing_subscriber::fmt().init();

        let region = progmem_section_region!().context("bad progmem section layout")?;
        let table_base = std::ptr::addr_of!(TABLE.0) as usize;
        ensure!(
            region.contains(table_base),
            "table is not inside the discovered region"
        );

        let guard = progmem_trap::install(
            region,
            InstallOptions {
                log_path: args.log,
                ..InstallOptions::default()
            },
        )
        .context("installing the trap-and-emulate layer")?;

        // Entry 0x10 sits at byte offset 0x40.
        let addr = table_base + 0x40;
        let sanctioned = unsafe { accessor::read_u32(addr) };
        tracing::info!(value = format_args!("{sanctioned:#x}"), "accessor read (no fault)");

        let stray = unsafe { read_volatile(black_box(addr as *const u32)) };
        tracing::info!(value = format_args!("{stray:#x}"), "stray raw read (emulated)");

        ensure!(
            sanctioned == stray,
            "emulation disagreed with the accessor: {sanctioned:#x} != {stray:#x}"
        );

        println!("emulated accesses: {}", guard.log().total());
        for record in guard.log().records() {
            println!(
                "  pc={:#x} addr={:#x} value={:#x}",
                record.pc, record.addr, record.value
            );
        }
        Ok(())
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
fn main() -> anyhow::Result<()> {
    demo::run()
}

#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
fn main() {
    eprintln!("progmem-demo requires an x86_64 Linux host");
    std::process::exit(1);
}
