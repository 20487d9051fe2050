//! Kernel logging backend.
//!
//! Routes `log` records to the COM1 serial port so boot and subsystem
//! diagnostics survive terminal switches and screen clears. User-visible
//! output goes through `print!`/`println!` instead; the two streams never
//! mix.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

/// Serial sink; on hosted targets records go to stderr so unit tests can
/// still run code paths that log.
struct Sink;

impl fmt::Write for Sink {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        crate::arch::x86::serial::write_str(s);
        Ok(())
    }

    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        std::eprint!("{}", s);
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::arch::without_interrupts(|| {
            let _ = writeln!(
                Sink,
                "[{:>5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        });
    }

    fn flush(&self) {}
}

/// Install the logger. Safe to call more than once; later calls are no-ops.
pub fn init() {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    crate::arch::x86::serial::init();

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
