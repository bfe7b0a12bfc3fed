//! Rux nest 构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成 src/config.rs 配置常量
//! 3. 导出日志级别等编译期环境变量

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

/// Kernel.toml 顶层结构
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KernelToml {
    general: General,
    cpu: Cpu,
    process: Process,
    container: Container,
    memory: Memory,
    fs: Fs,
    sched: Sched,
    log: Log,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct General {
    name: String,
    version: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            name: "Rux nest".to_string(),
            version: "0.1.0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Cpu {
    max_cpus: usize,
}

impl Default for Cpu {
    fn default() -> Self {
        Self { max_cpus: 4 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Process {
    nproc: usize,
    npid: usize,
    nofile: usize,
}

impl Default for Process {
    fn default() -> Self {
        Self { nproc: 64, npid: 128, nofile: 16 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Container {
    max_containers: usize,
}

impl Default for Container {
    fn default() -> Self {
        Self { max_containers: 16 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Memory {
    page_size: usize,
    phys_pages: usize,
    kernel_stack_size: usize,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            page_size: 4096,
            phys_pages: 1024,
            kernel_stack_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Fs {
    nfile: usize,
    ninode: usize,
}

impl Default for Fs {
    fn default() -> Self {
        Self { nfile: 100, ninode: 50 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Sched {
    time_slice_ticks: u32,
}

impl Default for Sched {
    fn default() -> Self {
        Self { time_slice_ticks: 4 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Log {
    level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=build.rs");

    let config: KernelToml = match fs::read_to_string("../Kernel.toml") {
        Ok(content) => toml::from_str(&content).expect("Kernel.toml 解析失败"),
        Err(_) => {
            println!("cargo:warning=Kernel.toml not found, using built-in defaults");
            KernelToml::default()
        }
    };

    assert!(config.cpu.max_cpus > 0, "cpu.max_cpus 必须大于 0");
    assert!(config.process.nproc > 0, "process.nproc 必须大于 0");
    assert!(config.sched.time_slice_ticks > 0, "sched.time_slice_ticks 必须大于 0");
    assert!(
        config.memory.page_size.is_power_of_two(),
        "memory.page_size 必须是 2 的幂"
    );

    println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", config.general.name);
    println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", config.general.version);
    println!("cargo:rustc-env=RUX_LOG_LEVEL={}", config.log.level);

    generate_config_code(&config);
}

fn generate_config_code(config: &KernelToml) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR 未设置"));

    let config_code = format!(
        r#"//! Rux nest 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{name}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{version}";

// ============================================================
// CPU 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {max_cpus};

// ============================================================
// 进程配置
// ============================================================

/// 每个容器进程表的槽位数
pub const NPROC: usize = {nproc};

/// 每个容器 PID 命名空间的容量
pub const NPID: usize = {npid};

/// 每个进程的文件描述符数量
pub const NOFILE: usize = {nofile};

/// 容器注册表容量（包含根容器）
pub const MAX_CONTAINERS: usize = {max_containers};

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = {page_size};

/// 页大小位移
pub const PAGE_SHIFT: usize = {page_shift};

/// 模拟物理内存页数
pub const PHYS_PAGES: usize = {phys_pages};

/// 执行上下文宿主线程的栈大小（字节）
pub const KERNEL_STACK_SIZE: usize = {kernel_stack_size};

// ============================================================
// 文件系统配置
// ============================================================

/// 系统打开文件表大小
pub const NFILE: usize = {nfile};

/// 内存 inode 缓存大小
pub const NINODE: usize = {ninode};

// ============================================================
// 调度器配置
// ============================================================

/// 时间片滴答数
pub const TIME_SLICE_TICKS: u32 = {time_slice_ticks};
"#,
        name = config.general.name,
        version = config.general.version,
        max_cpus = config.cpu.max_cpus,
        nproc = config.process.nproc,
        npid = config.process.npid,
        nofile = config.process.nofile,
        max_containers = config.container.max_containers,
        page_size = config.memory.page_size,
        page_shift = config.memory.page_size.trailing_zeros(),
        phys_pages = config.memory.phys_pages,
        kernel_stack_size = config.memory.kernel_stack_size,
        nfile = config.fs.nfile,
        ninode = config.fs.ninode,
        time_slice_ticks = config.sched.time_slice_ticks,
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_code {
        fs::write(&config_file, &config_code).expect("写入配置文件失败");
    }
}
