//! 系统调用入口测试
//!
//! 测试 `syscall::dispatch` 的参数检查与错误码：
//! - 未知调用号返回 ENOSYS
//! - 不支持的 flags / 信号 / dirfd 被拒绝
//! - 描述符表与系统打开文件表耗尽
//! - 只有根容器能关机

use std::sync::Arc;

use super::*;
use crate::arch::Trapframe;
use crate::config::NOFILE;
use crate::errno::Errno;
use crate::fs::FileFlags;
use crate::sched::RoundRobin;
use crate::syscall::{self, SyscallNo, AT_FDCWD, SIGKILL};

#[test]
fn test_unknown_syscall() {
    println!("test: Testing unknown syscall number...");
    let kernel = boot(config(1));
    let mut tf = Trapframe::default();
    tf.set_syscall(999, &[]);
    assert_eq!(syscall::dispatch(&kernel, &mut tf), -38);
    println!("test:    SUCCESS - ENOSYS");
}

#[test]
fn test_rejected_arguments() {
    println!("test: Testing argument checks...");
    let kernel = boot(config(1));
    let out: Record<Vec<i64>> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        let rets = vec![
            // fork 只接受 SIGCHLD
            user.syscall(SyscallNo::Clone, &[0]),
            // 只支持 pid = -1 且 options = 0
            user.syscall(SyscallNo::Wait4, &[5, 0, 0]),
            user.syscall(SyscallNo::Wait4, &[-1i64 as u64, 0, 1]),
            user.syscall(SyscallNo::Wait4, &[-1i64 as u64, 0, 0]),
            user.syscall(SyscallNo::Kill, &[1, 15]),
            user.syscall(SyscallNo::Kill, &[42, SIGKILL]),
            user.syscall(SyscallNo::Openat, &[3, 0, 0]),
            user.syscall(SyscallNo::Openat, &[AT_FDCWD as u64, 1 << 20, 0]),
            user.syscall(SyscallNo::Reboot, &[0]),
            user.syscall(SyscallNo::Getppid, &[]),
        ];
        saved.lock().push(rets);
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(*out.lock(), vec![vec![-22, -22, -22, -10, -22, -3, -9, -14, -22, 0]]);
    println!("test:    SUCCESS - bad arguments rejected");
}

#[test]
fn test_file_descriptor_errors() {
    println!("test: Testing open/dup/close errors...");
    let kernel = boot(config(1));
    let out: Record<String> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        let rdonly = FileFlags::new(FileFlags::O_RDONLY);
        let mut steps = Vec::new();
        steps.push(format!("missing {:?}", user.open("/nope", rdonly)));
        steps.push(format!("accmode {:?}", user.open("/", FileFlags::new(FileFlags::O_ACCMODE))));
        steps.push(format!("close {:?}", user.close(9)));
        steps.push(format!("dup {:?}", user.dup(15)));
        steps.push(format!("dup range {:?}", user.dup(NOFILE + 1)));

        let opened: Vec<_> = (0..NOFILE).map(|_| user.open("/", rdonly)).collect();
        steps.push(format!("opened {}", opened.iter().filter(|fd| fd.is_ok()).count()));
        steps.push(format!("last {:?}", opened.last()));
        steps.push(format!("full {:?}", user.open("/", rdonly)));
        steps.push(format!("dup full {:?}", user.dup(0)));
        steps.push(format!("close {:?}", user.close(3)));
        steps.push(format!("reuse {:?}", user.dup(0)));
        saved.lock().extend(steps);
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(
        *out.lock(),
        vec![
            "missing Err(NoSuchFileOrDirectory)",
            "accmode Err(InvalidArgument)",
            "close Err(BadFileNumber)",
            "dup Err(BadFileNumber)",
            "dup range Err(BadFileNumber)",
            "opened 16",
            "last Some(Ok(15))",
            "full Err(TooManyOpenFiles)",
            "dup full Err(TooManyOpenFiles)",
            "close Ok(())",
            "reuse Ok(3)",
        ]
    );
    println!("test:    SUCCESS - EBADF / EMFILE as expected");
}

#[test]
fn test_file_table_overflow() {
    println!("test: Testing the system-wide file table limit...");
    let kernel = boot(KernelConfig {
        nfile: 3,
        ..config(1)
    });
    let out: Record<Vec<Result<usize, Errno>>> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        let rdonly = FileFlags::new(FileFlags::O_RDONLY);
        let opens = (0..4).map(|_| user.open("/", rdonly)).collect();
        saved.lock().push(opens);
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(
        *out.lock(),
        vec![vec![Ok(0), Ok(1), Ok(2), Err(Errno::FileTableOverflow)]]
    );
    println!("test:    SUCCESS - ENFILE");
}

#[test]
fn test_power_off_only_from_root() {
    println!("test: Testing reboot permission...");
    let kernel = boot(config(1));
    let out: Record<Errno> = record();
    let saved = Arc::clone(&out);

    let result = run_init(&kernel, move |user| {
        let kernel = Arc::clone(user.kernel());
        let id = kernel.spawn_container(ContainerId::ROOT, Box::new(RoundRobin)).unwrap();
        let refused = Arc::clone(&saved);
        let inner = program(move |user| {
            refused.lock().push(user.power_off());
            loop {
                user.yield_now();
            }
        });
        kernel.spawn_process(id, "inner", inner).unwrap();
        while saved.lock().is_empty() {
            user.yield_now();
        }
        user.shutdown();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(*out.lock(), vec![Errno::OperationNotPermitted]);
    println!("test:    SUCCESS - container process cannot power off");
}
