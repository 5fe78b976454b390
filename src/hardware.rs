//! Reports how many hardware threads the parallel engine may use.

use std::thread::available_parallelism;

use log::warn;

pub trait HardwareProbe {
    /// The number of hardware execution threads available to this process.
    fn available_threads(&self) -> usize;

    fn supports_multithreading(&self) -> bool {
        self.available_threads() > 1
    }
}

/// Queries the operating system.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemHardwareProbe;

impl HardwareProbe for SystemHardwareProbe {
    fn available_threads(&self) -> usize {
        match available_parallelism() {
            Ok(threads) => threads.get(),
            Err(error) => {
                warn!("could not query available hardware threads, assuming 1: {error}");
                1
            }
        }
    }
}

/// Reports a fixed thread count.
#[derive(Copy, Clone, Debug)]
pub struct FixedHardwareProbe(pub usize);

impl HardwareProbe for FixedHardwareProbe {
    fn available_threads(&self) -> usize {
        self.0
    }
}
