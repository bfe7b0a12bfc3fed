//! 文件描述符表
//!
//! 对应 Linux 的 fs/file.c (alloc_fd/fd_install/close_fd)。每个进程 `NOFILE`
//! 个描述符，指向系统打开文件表中的共享对象。

use super::task::Fd;
use crate::errno::Errno;
use crate::fs::FileFlags;
use crate::kernel::Kernel;

impl Kernel {
    /// 打开文件，返回最小的空闲描述符
    pub fn open(&self, path: &str, flags: FileFlags) -> Result<Fd, Errno> {
        let file = self.fs().open(path, flags)?;
        let me = self.myproc();
        let container = self.live(me.container);
        let mut data = container.scheduler.data(me.index);
        match data.ofile.iter().position(Option::is_none) {
            Some(fd) => {
                data.ofile[fd] = Some(file);
                Ok(fd)
            }
            None => {
                drop(data);
                self.fs().fclose(file);
                Err(Errno::TooManyOpenFiles)
            }
        }
    }

    /// 复制描述符
    pub fn dup(&self, fd: Fd) -> Result<Fd, Errno> {
        let me = self.myproc();
        let container = self.live(me.container);
        let mut data = container.scheduler.data(me.index);
        let file = data.ofile.get(fd).and_then(Option::as_ref).ok_or(Errno::BadFileNumber)?;
        let copy = self.fs().fdup(file);
        match data.ofile.iter().position(Option::is_none) {
            Some(new_fd) => {
                data.ofile[new_fd] = Some(copy);
                Ok(new_fd)
            }
            None => {
                drop(data);
                self.fs().fclose(copy);
                Err(Errno::TooManyOpenFiles)
            }
        }
    }

    /// 关闭描述符
    pub fn close(&self, fd: Fd) -> Result<(), Errno> {
        let me = self.myproc();
        let container = self.live(me.container);
        let file = {
            let mut data = container.scheduler.data(me.index);
            data.ofile.get_mut(fd).and_then(Option::take).ok_or(Errno::BadFileNumber)?
        };
        self.fs().fclose(file);
        Ok(())
    }

    /// 描述符对应文件对象的引用数
    pub fn file_refs(&self, fd: Fd) -> Result<i64, Errno> {
        let me = self.myproc();
        let container = self.live(me.container);
        let data = container.scheduler.data(me.index);
        let file = data.ofile.get(fd).and_then(Option::as_ref).ok_or(Errno::BadFileNumber)?;
        Ok(self.fs().file_refs(file))
    }
}
