//! fork 测试
//!
//! 测试进程创建：
//! - fork 两次后 wait 收回 {2, 3}，再 wait 返回 ECHILD
//! - 子进程 x0 = 0，地址空间独立，打开文件引用 +1
//! - 进程表或物理内存耗尽时完整回滚
//! - 多个 CPU 上并发 fork 不会产生重复 pid

use std::collections::BTreeSet;
use std::sync::Arc;

use super::*;
use crate::errno::Errno;
use crate::fs::{FileFlags, InodeMode};
use crate::mm::FrameAllocator;
use crate::syscall::SyscallNo;

#[test]
fn test_fork_wait_reaps_children() {
    println!("test: Testing fork + wait...");
    let kernel = boot(config(2));
    let out: Record<(Pid, Pid, Vec<Pid>, Result<Pid, Errno>)> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        if user.resume_point() == CHILD {
            user.exit(0);
        }
        let b = user.fork(CHILD).unwrap();
        let c = user.fork(CHILD).unwrap();
        let mut reaped = vec![user.wait().unwrap(), user.wait().unwrap()];
        reaped.sort();
        let again = user.wait();
        saved.lock().push((b, c, reaped, again));
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(*out.lock(), vec![(2, 3, vec![2, 3], Err(Errno::NoChild))]);
    assert_eq!(kernel.snapshot().len(), 1);
    println!("test:    SUCCESS - both children reaped once, then ECHILD");
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ChildView {
    ret: u64,
    sysno: u64,
    ppid: Pid,
    inherited: u8,
    written: u8,
    file_refs: i64,
}

#[test]
fn test_fork_copies_memory_and_shares_files() {
    println!("test: Testing fork independence and file refcounts...");
    const ADDR: usize = 256;
    let kernel = boot(config(1));
    kernel.fs().mknod("/data", InodeMode::new(InodeMode::S_IFREG | 0o644)).unwrap();
    let child_view: Record<ChildView> = record();
    let parent_view: Record<(i64, u8, i64, i64, i64, Result<(), Errno>)> = record();
    let (cv, pv) = (Arc::clone(&child_view), Arc::clone(&parent_view));

    let result = run_init(&kernel, move |user| {
        if user.resume_point() == CHILD {
            let mut byte = [0u8; 1];
            user.load(ADDR, &mut byte).unwrap();
            let inherited = byte[0];
            user.store(ADDR, &[2]).unwrap();
            user.load(ADDR, &mut byte).unwrap();
            let kernel = Arc::clone(user.kernel());
            cv.lock().push(ChildView {
                ret: user.trapframe().ret(),
                sysno: user.trapframe().syscall_no(),
                ppid: user.getppid(),
                inherited,
                written: byte[0],
                file_refs: kernel.file_refs(0).unwrap(),
            });
            user.exit(0);
        }

        let kernel = Arc::clone(user.kernel());
        user.store(ADDR, &[1]).unwrap();
        let fd = user.open("/data", FileFlags::new(FileFlags::O_RDWR)).unwrap();
        assert_eq!(fd, 0);
        let before = kernel.file_refs(fd).unwrap();

        user.fork(CHILD).unwrap();
        user.wait().unwrap();

        let mut byte = [0u8; 1];
        user.load(ADDR, &mut byte).unwrap();
        let after_child = kernel.file_refs(fd).unwrap();
        let copy = user.dup(fd).unwrap();
        let with_dup = kernel.file_refs(fd).unwrap();
        user.close(copy).unwrap();
        let closed_twice = user.close(copy);
        pv.lock().push((before, byte[0], after_child, with_dup, kernel.file_refs(fd).unwrap(), closed_twice));
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(
        *child_view.lock(),
        vec![ChildView {
            ret: 0,
            sysno: SyscallNo::Clone as u64,
            ppid: 1,
            inherited: 1,
            written: 2,
            file_refs: 2,
        }]
    );
    assert_eq!(*parent_view.lock(), vec![(1, 1, 1, 2, 1, Err(Errno::BadFileNumber))]);
    println!("test:    SUCCESS - child got a private copy and shared file objects");
}

#[test]
fn test_fork_table_full_rolls_back() {
    println!("test: Testing fork with a full process table...");
    let kernel = boot(KernelConfig {
        nproc: 4,
        ..config(1)
    });
    let out: Record<(Result<Pid, Errno>, usize, usize, usize)> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        if user.resume_point() == CHILD {
            user.exit(0);
        }
        let kernel = Arc::clone(user.kernel());
        for _ in 0..3 {
            user.fork(CHILD).unwrap();
        }
        let free = kernel.memory().free_pages();
        let full = user.fork(CHILD);
        saved.lock().push((full, free, kernel.memory().free_pages(), kernel.snapshot().len()));
        for _ in 0..3 {
            user.wait().unwrap();
        }
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    let out = out.lock();
    let (full, free_before, free_after, procs) = out[0];
    assert_eq!(full, Err(Errno::TryAgain));
    assert_eq!(free_before, free_after);
    assert_eq!(procs, 4);
    println!("test:    SUCCESS - EAGAIN with nothing leaked");
}

#[test]
fn test_fork_out_of_memory_rolls_back() {
    println!("test: Testing fork with exhausted physical memory...");
    // 每个进程三页：内核栈、页表根、一页用户内存
    let kernel = boot(KernelConfig {
        phys_pages: 7,
        ..config(1)
    });
    let out: Record<Vec<String>> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        if user.resume_point() == CHILD {
            user.exit(3);
        }
        let kernel = Arc::clone(user.kernel());
        let mut steps = Vec::new();
        steps.push(format!("free {}", kernel.memory().free_pages()));
        steps.push(format!("fork {:?}", user.fork(CHILD)));
        steps.push(format!("free {}", kernel.memory().free_pages()));
        steps.push(format!("fork {:?}", user.fork(CHILD)));
        steps.push(format!("free {}", kernel.memory().free_pages()));
        steps.push(format!("procs {}", kernel.snapshot().len()));
        steps.push(format!("wait {:?}", user.wait_status()));
        // 失败的 fork 消耗过的 pid 不会被重用
        steps.push(format!("fork {:?}", user.fork(CHILD)));
        steps.push(format!("wait {:?}", user.wait_status()));
        saved.lock().push(steps);
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(
        out.lock()[0],
        vec![
            "free 4",
            "fork Ok(2)",
            "free 1",
            "fork Err(OutOfMemory)",
            "free 1",
            "procs 2",
            "wait Ok((2, 3))",
            "fork Ok(4)",
            "wait Ok((4, 3))",
        ]
    );
    println!("test:    SUCCESS - ENOMEM rolled back the embryo");
}

#[test]
fn test_concurrent_forks_unique_pids() {
    println!("test: Testing concurrent forks on 4 cpus...");
    let kernel = boot(config(4));
    let pids: Record<Pid> = record();
    let saved = Arc::clone(&pids);

    let result = run_init(&kernel, move |user| {
        match user.resume_point() {
            GRANDCHILD => user.exit(0),
            CHILD => {
                for _ in 0..3 {
                    let pid = user.fork(GRANDCHILD).unwrap();
                    saved.lock().push(pid);
                }
                for _ in 0..3 {
                    user.wait().unwrap();
                }
                user.exit(0);
            }
            _ => {}
        }
        for _ in 0..4 {
            let pid = user.fork(CHILD).unwrap();
            saved.lock().push(pid);
        }
        for _ in 0..4 {
            user.wait().unwrap();
        }
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    let pids = pids.lock();
    let unique: BTreeSet<Pid> = pids.iter().copied().collect();
    assert_eq!(pids.len(), 16);
    assert_eq!(unique, (2..=17).collect::<BTreeSet<Pid>>());
    println!("test:    SUCCESS - 16 distinct pids");
}
