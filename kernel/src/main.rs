//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux nest 演示入口
//!
//! 引导一台模拟机器，根容器的 init：
//! 1. fork 两个子进程并等待它们
//! 2. 创建一个子容器，在其中运行一个 fork 两次的 init
//! 3. 终止并销毁子容器
//! 4. 关机

use std::process::ExitCode;
use std::time::Duration;

use rux_nest::arch::Shutdown;
use rux_nest::config::{KERNEL_NAME, KERNEL_VERSION};
use rux_nest::process::{program, UserContext};
use rux_nest::sched::RoundRobin;
use rux_nest::{logger, Kernel, KernelConfig};

/// fork 之后子进程的续点
const CHILD: u64 = 1;

fn worker(user: &mut UserContext) {
    if user.resume_point() == CHILD {
        let pid = user.getpid();
        println!("main: child pid {} (parent {}) running", pid, user.getppid());
        user.yield_now();
        user.exit(pid as i32);
    }
    for _ in 0..2 {
        if let Err(e) = user.fork(CHILD) {
            println!("main: fork failed: {}", e.name());
        }
    }
    while let Ok((pid, status)) = user.wait_status() {
        println!("main: reaped pid {} with status {}", pid, status);
    }
}

fn init(user: &mut UserContext) {
    if user.resume_point() != CHILD {
        println!("main: init running as pid {}", user.getpid());
    }
    worker(user);

    let kernel = user.kernel().clone();
    match kernel.spawn_container(user.handle().container, Box::new(RoundRobin)) {
        Ok(id) => {
            println!("main: spawned container {}", id);
            let inner = program(|user: &mut UserContext| {
                worker(user);
                // 容器的 init 只能在容器被终止后退出
                loop {
                    user.yield_now();
                }
            });
            if let Err(e) = kernel.spawn_process(id, "inner-init", inner) {
                println!("main: spawn in {} failed: {}", id, e.name());
            }
            for _ in 0..50 {
                user.yield_now();
            }
            kernel.procdump();
            if let Err(e) = kernel.kill_container(id) {
                println!("main: kill {} failed: {}", id, e.name());
            }
            match kernel.destroy_container(id) {
                Ok(()) => println!("main: container {} destroyed", id),
                Err(e) => println!("main: destroy {} failed: {}", id, e.name()),
            }
        }
        Err(e) => println!("main: spawn_container failed: {}", e.name()),
    }

    println!("main: shutting down");
    user.shutdown()
}

fn main() -> ExitCode {
    logger::init();
    println!("{} v{} - process/container scheduling core", KERNEL_NAME, KERNEL_VERSION);

    let config = KernelConfig {
        watchdog: Some(Duration::from_secs(30)),
        ..KernelConfig::default()
    };
    let kernel = match Kernel::boot(config) {
        Ok(kernel) => kernel,
        Err(e) => {
            eprintln!("main: boot failed: {}", e.name());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = kernel.spawn_init("init", program(init)) {
        eprintln!("main: failed to start init: {}", e.name());
        return ExitCode::FAILURE;
    }

    match kernel.run() {
        Ok(()) => {
            println!("main: system halted");
            ExitCode::SUCCESS
        }
        Err(Shutdown::Panic(msg)) => {
            eprintln!("main: kernel panic: {}", msg);
            ExitCode::FAILURE
        }
        Err(why) => {
            eprintln!("main: stopped: {:?}", why);
            ExitCode::FAILURE
        }
    }
}
