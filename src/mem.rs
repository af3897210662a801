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

//! Memory-mapped views of physical hardware registers.
//!
//! A [`RegisterOverlay`] maps a window of physical memory through `/dev/mem`
//! (or a pre-offset device node such as `/dev/gpiomem`) into the process's
//! address space, and exposes it as an array of 32-bit registers. All access
//! goes through bounds-checked, volatile accessors.
//!
//! An overlay is owned by the driver that created it. It can't be cloned, and
//! the mapping is released either explicitly with [`close`] or when the
//! overlay goes out of scope. CPU drivers share their overlay with the pins
//! they create through an `Arc`, so the window stays mapped for as long as any
//! pin can still reach it.
//!
//! Mapping `/dev/mem` requires superuser privileges on most distributions.
//!
//! [`RegisterOverlay`]: struct.RegisterOverlay.html
//! [`close`]: struct.RegisterOverlay.html#method.close

use std::error;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;
use std::result;

use libc::{self, c_void, off_t, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, MAP_SHARED, O_SYNC};
use libc::{PROT_READ, PROT_WRITE};

const PATH_DEV_MEM: &str = "/dev/mem";

const WORD_SIZE: usize = std::mem::size_of::<u32>();

/// Errors that can occur when mapping physical memory.
#[derive(Debug)]
pub enum Error {
    /// Permission denied when opening the device node for read/write access.
    ///
    /// `/dev/mem` is normally only accessible to the superuser. Run the
    /// application with elevated privileges, or use a device node that maps
    /// only the relevant peripheral (like `/dev/gpiomem`) if the kernel
    /// provides one.
    PermissionDenied(String),
    /// Physical memory access isn't available on this platform.
    ///
    /// Either the crate was built for an OS other than Linux, or the device
    /// node doesn't exist on this host.
    UnsupportedPlatform,
    /// I/O error.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::PermissionDenied(ref path) => write!(
                f,
                "Permission denied: {} (try running with elevated privileges)",
                path
            ),
            Error::UnsupportedPlatform => write!(f, "Physical memory access is not supported"),
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result type returned from methods that can have `sbcio::mem::Error`s.
pub type Result<T> = result::Result<T, Error>;

fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as usize,
        _ => 4096,
    }
}

/// A live, word-addressable view of a physical register window.
pub struct RegisterOverlay {
    // Start of the page-aligned mapping, as returned by mmap
    map_ptr: *mut c_void,
    map_len: usize,
    // First register of the requested window
    regs: *mut u32,
    words: usize,
    physical_base: u64,
    mapped: bool,
}

impl fmt::Debug for RegisterOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterOverlay")
            .field("physical_base", &format_args!("{:#010x}", self.physical_base))
            .field("words", &self.words)
            .field("map_len", &self.map_len)
            .finish()
    }
}

impl RegisterOverlay {
    /// Maps `len` bytes of physical memory starting at `physical_base` through `/dev/mem`.
    ///
    /// The mapping itself starts at the page containing `physical_base` and is
    /// rounded up to whole pages, but only the requested window is accessible
    /// through the overlay, as `len` rounded up to whole 32-bit registers.
    pub fn map(physical_base: u64, len: usize) -> Result<RegisterOverlay> {
        Self::map_path(PATH_DEV_MEM, physical_base, len)
    }

    /// Maps `len` bytes of a device node that exposes a single peripheral
    /// starting at offset 0, like `/dev/gpiomem`.
    pub fn map_device<P: AsRef<Path>>(path: P, len: usize) -> Result<RegisterOverlay> {
        Self::map_path(path, 0, len)
    }

    /// Maps `words` zero-initialized registers of anonymous memory.
    ///
    /// Anonymous overlays behave like plain memory, which makes them useful to
    /// simulate a register block that doesn't have side effects.
    pub fn anonymous(words: usize) -> Result<RegisterOverlay> {
        let map_len = round_up(words.max(1) * WORD_SIZE, page_size());

        let map_ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if map_ptr == MAP_FAILED {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        Ok(RegisterOverlay {
            map_ptr,
            map_len,
            regs: map_ptr as *mut u32,
            words,
            physical_base: 0,
            mapped: true,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn map_path<P: AsRef<Path>>(_path: P, _physical_base: u64, _len: usize) -> Result<RegisterOverlay> {
        Err(Error::UnsupportedPlatform)
    }

    #[cfg(target_os = "linux")]
    fn map_path<P: AsRef<Path>>(path: P, physical_base: u64, len: usize) -> Result<RegisterOverlay> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(O_SYNC)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => {
                    Error::PermissionDenied(path.display().to_string())
                }
                io::ErrorKind::NotFound => Error::UnsupportedPlatform,
                _ => Error::Io(e),
            })?;

        let page_size = page_size() as u64;
        let page_base = physical_base & !(page_size - 1);
        let lead = (physical_base - page_base) as usize;
        let words = (len + WORD_SIZE - 1) / WORD_SIZE;
        let map_len = round_up(lead + words.max(1) * WORD_SIZE, page_size as usize);

        let map_ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                file.as_raw_fd(),
                page_base as off_t,
            )
        };

        if map_ptr == MAP_FAILED {
            let err = io::Error::last_os_error();
            return Err(match err.kind() {
                io::ErrorKind::PermissionDenied => {
                    Error::PermissionDenied(path.display().to_string())
                }
                _ => Error::Io(err),
            });
        }

        log::trace!(
            "mapped {} bytes of {} at {:#010x}",
            map_len,
            path.display(),
            page_base
        );

        Ok(RegisterOverlay {
            map_ptr,
            map_len,
            regs: unsafe { (map_ptr as *mut u8).add(lead) as *mut u32 },
            words,
            physical_base,
            mapped: true,
        })
    }

    /// Returns the number of 32-bit registers in the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.words
    }

    /// Returns `true` if the window doesn't contain any registers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Returns the physical address of the first register.
    ///
    /// Anonymous overlays and device nodes mapped at offset 0 return `0`.
    pub fn physical_base(&self) -> u64 {
        self.physical_base
    }

    /// Reads the register at index `word`.
    ///
    /// # Panics
    ///
    /// Panics if `word` is outside the mapped window.
    #[inline(always)]
    pub fn read(&self, word: usize) -> u32 {
        assert!(word < self.words, "register {} out of range", word);

        unsafe { ptr::read_volatile(self.regs.add(word)) }
    }

    /// Writes `value` to the register at index `word`.
    ///
    /// # Panics
    ///
    /// Panics if `word` is outside the mapped window.
    #[inline(always)]
    pub fn write(&self, word: usize, value: u32) {
        assert!(word < self.words, "register {} out of range", word);

        unsafe {
            ptr::write_volatile(self.regs.add(word), value);
        }
    }

    /// Reads the register at index `word`, and writes back the value returned by `f`.
    ///
    /// The read and the write are separate bus accesses. Callers that share a
    /// register with other threads have to serialize access themselves.
    #[inline]
    pub fn modify<F>(&self, word: usize, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(word);
        self.write(word, f(value));
    }

    /// Releases the mapping.
    ///
    /// Dropping the overlay releases the mapping as well, but ignores any errors.
    pub fn close(mut self) -> Result<()> {
        self.unmap()
    }

    fn unmap(&mut self) -> Result<()> {
        if !self.mapped {
            return Ok(());
        }

        self.mapped = false;

        parse_retval!(unsafe { libc::munmap(self.map_ptr, self.map_len) })?;

        Ok(())
    }
}

impl Drop for RegisterOverlay {
    fn drop(&mut self) {
        let _ = self.unmap();
    }
}

// Required because of the raw pointers to our memory-mapped window
unsafe impl Send for RegisterOverlay {}
unsafe impl Sync for RegisterOverlay {}

fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) / multiple * multiple
}
