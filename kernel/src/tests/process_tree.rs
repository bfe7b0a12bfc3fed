//! 进程树测试
//!
//! - 父进程先退出时子进程过继给 init
//! - 过继来的僵尸立即唤醒 init
//! - init 退出是内核缺陷，整机以 panic 停机
//! - kill 不能终止 init

use std::sync::Arc;

use super::*;
use crate::errno::Errno;

/// 进程 A 的续点（A 再 fork 出 B）
const A: u64 = 1;
const B: u64 = 2;

#[test]
fn test_orphan_reparented_to_init() {
    println!("test: Testing orphan reparenting...");
    let kernel = boot(config(2));
    let out: Record<String> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        match user.resume_point() {
            B => {
                // 等到 A 退出、自己被过继给 init
                while user.getppid() != 1 {
                    user.yield_now();
                }
                user.exit(7);
            }
            A => {
                user.fork(B).unwrap();
                user.exit(0);
            }
            _ => {}
        }
        let a = user.fork(A).unwrap();
        let first = user.wait_status();
        let second = user.wait_status();
        let third = user.wait();
        saved.lock().push(format!("{} {:?} {:?} {:?}", a, first, second, third));
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(*out.lock(), vec!["2 Ok((2, 0)) Ok((3, 7)) Err(NoChild)".to_string()]);
    println!("test:    SUCCESS - init reaped its grandchild");
}

#[test]
fn test_orphan_zombie_wakes_init() {
    println!("test: Testing an orphaned zombie...");
    let kernel = boot(config(1));
    let out: Record<Vec<(Pid, i32)>> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        match user.resume_point() {
            B => user.exit(5),
            A => {
                let b = user.fork(B).unwrap();
                // B 先变成僵尸，A 不回收它就退出
                let kernel = Arc::clone(user.kernel());
                yield_until(user, |_| state_of(&kernel, ContainerId::ROOT, b) == Some(ProcState::Zombie));
                user.exit(0);
            }
            _ => {}
        }
        user.fork(A).unwrap();
        let mut reaped = vec![user.wait_status().unwrap(), user.wait_status().unwrap()];
        reaped.sort();
        assert_eq!(user.wait(), Err(Errno::NoChild));
        saved.lock().push(reaped);
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(*out.lock(), vec![vec![(2, 0), (3, 5)]]);
    println!("test:    SUCCESS - orphaned zombie reaped by init");
}

#[test]
fn test_init_exit_halts_machine() {
    println!("test: Testing init exit...");
    let kernel = boot(config(1));

    // init 的程序直接返回，视为 exit(0)
    let result = run_init(&kernel, |_user| {});

    match result {
        Err(Shutdown::Panic(msg)) => assert!(msg.contains("init"), "unexpected panic: {}", msg),
        other => panic!("expected a kernel panic, got {:?}", other),
    }
    assert!(kernel.power().is_halted());
    println!("test:    SUCCESS - init exit is fatal");
}

#[test]
fn test_init_cannot_be_killed() {
    println!("test: Testing kill(1) from a child...");
    let kernel = boot(config(2));
    let out: Record<Result<(), Errno>> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        if user.resume_point() == A {
            saved.lock().push(user.kill(1));
            user.exit(0);
        }
        user.fork(A).unwrap();
        user.wait().unwrap();
        // init 自己也不能自杀
        saved.lock().push(user.kill(1));
        user.yield_now();
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(
        *out.lock(),
        vec![Err(Errno::OperationNotPermitted), Err(Errno::OperationNotPermitted)]
    );
    println!("test:    SUCCESS - init survived kill(1)");
}
