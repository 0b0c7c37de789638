use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub struct ParisLogger;
impl log::Log for ParisLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        let max = match VERBOSE.load(Ordering::Relaxed) {
            true => log::Level::Debug,
            false => log::Level::Info,
        };
        metadata.level() <= max
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            match record.level() {
                log::Level::Error => paris::error!("{}", record.args()),
                log::Level::Warn => paris::warn!("{}", record.args()),
                log::Level::Info => paris::info!("{}", record.args()),
                log::Level::Debug | log::Level::Trace => {
                    paris::info!("<bright-black>{}</>", record.args())
                }
            }
        }
    }

    fn flush(&self) {}
}

pub fn install(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
    let _ = log::set_logger(&ParisLogger);
    log::set_max_level(match verbose {
        true => log::LevelFilter::Debug,
        false => log::LevelFilter::Info,
    });
}
