//! 程序替换与堆增长
//!
//! - exec: 对应 Linux 的 execve()，新建一页大小的镜像后替换旧地址空间
//! - grow: 对应 sbrk()，返回旧的大小

use super::usermod::Program;
use crate::arch::{self, Trapframe};
use crate::config::PAGE_SIZE;
use crate::errno::Errno;
use crate::kernel::Kernel;

impl Kernel {
    /// 用 `program` 替换当前进程的用户程序
    ///
    /// 失败时调用者保持原样
    pub fn exec(&self, name: &str, program: Program) -> Result<(), Errno> {
        let me = self.myproc();
        let container = self.live(me.container);
        let space = self.user_image()?;
        let asid = space.id();

        let old = {
            let mut data = container.scheduler.data(me.index);
            data.name = name.into();
            data.tf = Trapframe::user_entry(0, PAGE_SIZE as u64);
            data.entry = Some(program);
            data.aspace.replace(space)
        };
        self.cpu(arch::current_cpu()).activate(asid);
        if let Some(old) = old {
            old.destroy(self.memory());
        }
        log::debug!("exec: {} -> '{}'", me, name);
        Ok(())
    }

    /// 调整当前进程的用户内存，返回调整前的大小
    pub fn grow(&self, n: isize) -> Result<usize, Errno> {
        let me = self.myproc();
        let container = self.live(me.container);
        let mut data = container.scheduler.data(me.index);
        let space = data.aspace.as_mut().ok_or(Errno::BadAddress)?;
        let old = space.size();
        if n > 0 {
            space.grow(self.memory(), n.unsigned_abs())?;
        } else if n < 0 {
            space.shrink(self.memory(), n.unsigned_abs())?;
        }
        Ok(old)
    }
}
