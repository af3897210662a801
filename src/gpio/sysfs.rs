// Copyright (c) 2017-2021 Rene van der Meer
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Edge detection through the kernel's sysfs GPIO interface.
//!
//! [`Gpio::arm`] exports a single GPIO line, and configures it as an input
//! with the requested edge. The returned [`Pin`] registers the line's `value`
//! file with an edge-triggered epoll instance. The kernel flags the file with
//! `POLLPRI` whenever a matching transition occurs.
//!
//! [`Gpio::arm`]: struct.Gpio.html#method.arm
//! [`Pin`]: struct.Pin.html

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::mem::MaybeUninit;
use std::os::linux::fs::MetadataExt;
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use libc;

use super::epoll::{epoll_event, Epoll, EPOLLERR, EPOLLET, EPOLLPRI};
use super::{Edge, Error, Level, Result};

const PATH_SYSFS_GPIO: &str = "/sys/class/gpio";

const GROUP_GPIO: &str = "gpio";
const GROUP_WAIT_ATTEMPTS: u32 = 20;
const GROUP_WAIT_DELAY: Duration = Duration::from_millis(50);

// Find group ID for specified group name
fn group_name_to_gid(name: &str) -> Option<u32> {
    let name_cstr = CString::new(name).ok()?;

    let buf_len = match unsafe { libc::sysconf(libc::_SC_GETGR_R_SIZE_MAX) } {
        len if len > 0 => len as usize,
        _ => 1024,
    };

    let mut buffer = vec![0 as libc::c_char; buf_len];
    let mut group = MaybeUninit::<libc::group>::uninit();
    let mut result: *mut libc::group = ptr::null_mut();

    let retval = unsafe {
        libc::getgrnam_r(
            name_cstr.as_ptr(),
            group.as_mut_ptr(),
            buffer.as_mut_ptr(),
            buffer.len(),
            &mut result,
        )
    };

    if retval != 0 || result.is_null() {
        return None;
    }

    Some(unsafe { (*result).gr_gid })
}

/// Entry point to a sysfs GPIO tree.
#[derive(Debug, Clone)]
pub struct Gpio {
    root: PathBuf,
}

impl Gpio {
    /// Uses the tree at `/sys/class/gpio`.
    pub fn new() -> Gpio {
        Gpio::with_root(PATH_SYSFS_GPIO)
    }

    /// Uses the tree at `root`.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Gpio {
        Gpio { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn line_path(&self, number: u32) -> PathBuf {
        self.root.join(format!("gpio{}", number))
    }

    /// Exports line `number`, configures it as an input, and arms edge
    /// detection for `edge`.
    ///
    /// Returns `Error::NotExported` if the line can't be exported or opened.
    pub fn arm(&self, number: u32, edge: Edge) -> Result<Pin> {
        self.try_arm(number, edge).map_err(|e| {
            log::debug!("Can't arm GPIO line {} through {}: {}", number, self.root.display(), e);

            Error::NotExported(number)
        })
    }

    fn try_arm(&self, number: u32, edge: Edge) -> io::Result<Pin> {
        let line = self.line_path(number);

        // Only export if the line isn't already exported
        if line.exists() {
            return self.open(number, false, edge);
        }

        File::create(self.root.join("export"))?.write_fmt(format_args!("{}", number))?;

        // Undo our export if the line can't be used after all
        self.wait_for_group(&line)
            .and_then(|_| self.open(number, true, edge))
            .map_err(|e| {
                unexport(&self.root, number);
                e
            })
    }

    // The exported directory starts off owned by root:root. On distributions
    // with a gpio group, udev changes the group shortly after, which we need
    // before we can access the line as a regular user.
    fn wait_for_group(&self, line: &Path) -> io::Result<()> {
        let gid = match group_name_to_gid(GROUP_GPIO) {
            Some(gid) => gid,
            None => return Ok(()),
        };

        for _ in 0..GROUP_WAIT_ATTEMPTS {
            if fs::metadata(line)?.st_gid() == gid {
                break;
            }

            thread::sleep(GROUP_WAIT_DELAY);
        }

        Ok(())
    }

    fn open(&self, number: u32, exported: bool, edge: Edge) -> io::Result<Pin> {
        let line = self.line_path(number);

        File::create(line.join("direction"))?.write_all(b"in")?;
        File::create(line.join("edge"))?.write_all(edge.as_sysfs().as_bytes())?;

        let value = OpenOptions::new()
            .read(true)
            .write(true)
            .open(line.join("value"))?;

        Pin::watch(number, value, Some(self.root.clone()), exported)
    }
}

impl Default for Gpio {
    fn default() -> Gpio {
        Gpio::new()
    }
}

fn unexport(root: &Path, number: u32) {
    if let Err(e) =
        File::create(root.join("unexport")).and_then(|mut f| f.write_fmt(format_args!("{}", number)))
    {
        log::debug!("Can't unexport GPIO line {}: {}", number, e);
    }
}

/// An armed edge watch on a single exported GPIO line.
#[derive(Debug)]
pub struct Pin {
    number: u32,
    value: File,
    epoll: Epoll,
    armed: AtomicBool,
    // Set when the line belongs to a sysfs tree, rather than a bare file
    root: Option<PathBuf>,
    exported: bool,
}

impl Pin {
    // Registers `value` with a new epoll instance and drains the initial
    // readiness event sysfs reports for every newly opened value file.
    pub(crate) fn watch(
        number: u32,
        value: File,
        root: Option<PathBuf>,
        exported: bool,
    ) -> io::Result<Pin> {
        let pin = Pin {
            number,
            value,
            epoll: Epoll::new()?,
            armed: AtomicBool::new(false),
            root,
            exported,
        };

        pin.register()?;
        pin.drain()?;

        log::trace!("Armed edge detection for GPIO line {}", number);

        Ok(pin)
    }

    fn register(&self) -> io::Result<()> {
        self.epoll.add(
            self.value.as_raw_fd(),
            u64::from(self.number),
            EPOLLET | EPOLLPRI | EPOLLERR,
        )?;
        self.armed.store(true, Ordering::SeqCst);

        Ok(())
    }

    fn drain(&self) -> io::Result<()> {
        let mut events = [epoll_event { events: 0, u64: 0 }; 1];
        self.epoll.wait(&mut events, Some(Duration::ZERO))?;
        self.clear();

        Ok(())
    }

    // sysfs keeps POLLPRI asserted until the value file is read again
    fn clear(&self) {
        let mut buffer = [0u8; 4];
        let _ = self.value.read_at(&mut buffer, 0);
    }

    fn edge_path(&self) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("gpio{}", self.number)).join("edge"))
    }

    fn set_edge(&self, edge: Edge) -> io::Result<()> {
        if let Some(path) = self.edge_path() {
            File::create(path)?.write_all(edge.as_sysfs().as_bytes())?;
        }

        Ok(())
    }

    /// Returns the line's number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Returns `true` if edge detection is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Blocks until an edge is detected, or the timeout elapses.
    ///
    /// Returns `false` immediately if the watch is disarmed. A `timeout` of
    /// `None` blocks until an edge is detected or the watch is disarmed
    /// from another thread and the line transitions.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        if !self.is_armed() {
            return Ok(false);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut events = [epoll_event { events: 0, u64: 0 }; 1];

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));

            match self.epoll.wait(&mut events, remaining) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    self.clear();
                    return Ok(self.is_armed());
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                    if let Some(d) = deadline {
                        if Instant::now() >= d {
                            return Ok(false);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stops reporting edges.
    ///
    /// Subsequent calls to [`wait`] return `false` until the watch is re-armed.
    ///
    /// [`wait`]: #method.wait
    pub fn disarm(&self) -> io::Result<()> {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.epoll.delete(self.value.as_raw_fd())?;
        self.set_edge(Edge::None)?;

        log::trace!("Disarmed edge detection for GPIO line {}", self.number);

        Ok(())
    }

    /// Changes the edge condition, re-arming the watch if needed.
    pub fn rearm(&self, edge: Edge) -> io::Result<()> {
        self.set_edge(edge)?;

        if !self.is_armed() {
            self.register()?;
        }

        self.drain()?;

        log::trace!("Re-armed edge detection for GPIO line {} ({})", self.number, edge);

        Ok(())
    }

    /// Reads the line's current level from its `value` file.
    pub fn read(&self) -> io::Result<Level> {
        let mut buffer = [0u8; 1];
        self.value.read_at(&mut buffer, 0)?;

        match &buffer {
            b"0" => Ok(Level::Low),
            _ => Ok(Level::High),
        }
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        if !self.exported {
            return;
        }

        if let Some(root) = self.root.as_ref() {
            unexport(root, self.number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::env;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::FromRawFd;
    use std::sync::atomic::AtomicUsize;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    // Lays out a fake sysfs tree with an already exported line, using a FIFO
    // as its value file so it never reports an edge.
    fn fake_tree(number: u32) -> PathBuf {
        let root = env::temp_dir().join(format!(
            "sbcio-sysfs-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let line = root.join(format!("gpio{}", number));
        fs::create_dir_all(&line).unwrap();

        let value = CString::new(line.join("value").as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(value.as_ptr(), 0o600) }, 0);

        root
    }

    fn pipe() -> (File, File) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);

        unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
    }

    #[test]
    fn arm_configures_line() {
        let root = fake_tree(17);
        let pin = Gpio::with_root(&root).arm(17, Edge::Rising).unwrap();

        assert!(pin.is_armed());
        assert_eq!(fs::read_to_string(root.join("gpio17/direction")).unwrap(), "in");
        assert_eq!(fs::read_to_string(root.join("gpio17/edge")).unwrap(), "rising");

        drop(pin);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn wait_times_out_without_edges() {
        let root = fake_tree(4);
        let pin = Gpio::with_root(&root).arm(4, Edge::Both).unwrap();

        let start = Instant::now();
        assert!(!pin.wait(Some(Duration::from_millis(50))).unwrap());
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(45));
        assert!(elapsed < Duration::from_secs(1));

        drop(pin);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn disarmed_wait_returns_immediately() {
        let root = fake_tree(5);
        let pin = Gpio::with_root(&root).arm(5, Edge::Falling).unwrap();

        pin.disarm().unwrap();
        assert!(!pin.is_armed());
        assert_eq!(fs::read_to_string(root.join("gpio5/edge")).unwrap(), "none");

        let start = Instant::now();
        assert!(!pin.wait(None).unwrap());
        assert!(start.elapsed() < Duration::from_millis(100));

        pin.rearm(Edge::Both).unwrap();
        assert!(pin.is_armed());
        assert_eq!(fs::read_to_string(root.join("gpio5/edge")).unwrap(), "both");

        drop(pin);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn missing_tree_is_not_exported() {
        let root = env::temp_dir().join(format!("sbcio-sysfs-missing-{}", std::process::id()));

        match Gpio::with_root(&root).arm(9, Edge::Rising) {
            Err(Error::NotExported(9)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn failed_export_is_undone() {
        let root = env::temp_dir().join(format!(
            "sbcio-sysfs-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&root).unwrap();

        // The export is accepted, but gpio12 never shows up
        match Gpio::with_root(&root).arm(12, Edge::Rising) {
            Err(Error::NotExported(12)) => (),
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(fs::read_to_string(root.join("export")).unwrap(), "12");
        assert_eq!(fs::read_to_string(root.join("unexport")).unwrap(), "12");

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn hangup_is_reported_as_event() {
        let (reader, writer) = pipe();
        let pin = Pin::watch(3, reader, None, false).unwrap();

        drop(writer);

        assert!(pin.wait(Some(Duration::from_secs(1))).unwrap());
    }
}
