//! 内核日志
//!
//! `log` 门面的后端，对应 Linux 的 printk：每条记录带级别和所在 CPU，
//! 形如 `[INFO ][cpu1] sched: ...`。不在 CPU 上运行的线程标记为 `[boot]`。
//!
//! 级别来自 Kernel.toml 的 `[log] level`（build.rs 导出为 RUX_LOG_LEVEL），
//! 启用 `debug_log` 特性时固定为 Trace。

use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record};

use crate::arch;

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            log::Level::Error => "ERROR",
            log::Level::Warn => "WARN ",
            log::Level::Info => "INFO ",
            log::Level::Debug => "DEBUG",
            log::Level::Trace => "TRACE",
        };
        // 整行一次写出，多个 CPU 的输出不会交错
        let line = match arch::cpu_id() {
            Some(cpu) => format!("[{}][cpu{}] {}\n", level, cpu, record.args()),
            None => format!("[{}][boot] {}\n", level, record.args()),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// 解析级别名，无法识别时为 Info
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// 编译期配置的日志级别
pub fn configured_level() -> LevelFilter {
    if cfg!(feature = "debug_log") {
        LevelFilter::Trace
    } else {
        parse_level(env!("RUX_LOG_LEVEL"))
    }
}

/// 安装日志后端，重复调用无副作用
pub fn init() {
    init_with_level(configured_level());
}

/// 以指定级别安装日志后端
pub fn init_with_level(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
