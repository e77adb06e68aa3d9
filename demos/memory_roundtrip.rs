use borg_rs::winsys::{Device, DeviceConfig};
use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger {
    max_level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger {
    max_level: LevelFilter::Debug,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Debug);

    println!("============================================================");
    println!("             Borg Memory Manager - Round Trip Test          ");
    println!("============================================================");

    let config = DeviceConfig::from_env();
    println!("[+] Opening {}...", config.render_node.display());
    let device = Device::open(config)?;

    let (heap_start, heap_end) = device.heap().bounds();
    println!("    VA window: 0x{heap_start:x}..0x{heap_end:x}");

    let reqs = device.memory_requirements(1000)?;
    println!(
        "[+] Allocating {} bytes (alignment {})...",
        reqs.size, reqs.alignment
    );
    let mut mem = device.allocate_memory(reqs.size)?;
    println!(
        "    GPU VA: 0x{:x}, BO handle: {}",
        mem.va().addr(),
        mem.bo().handle()
    );

    println!("[+] Mapping to CPU...");
    let ptr = mem.map()?;
    let len = usize::try_from(mem.size())?;
    let data = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) };
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    let ok = data.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8);
    println!("    Pattern readback: {}", if ok { "OK" } else { "MISMATCH" });

    println!("[+] Freeing...");
    mem.unmap()?;
    mem.free()?;
    println!("    Leaked VA bytes: {}", device.leaked_va_bytes());

    Ok(())
}
