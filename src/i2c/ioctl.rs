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

use libc::{c_int, c_ulong, ioctl};
use std::io;
use std::result;

pub type Result<T> = result::Result<T, io::Error>;

// Based on i2c.h, i2c-dev.h and the documentation at https://www.kernel.org/doc/Documentation/i2c

// Capabilities returned by REQ_FUNCS
const FUNC_I2C: c_ulong = 0x01;
const FUNC_10BIT_ADDR: c_ulong = 0x02;
const FUNC_NOSTART: c_ulong = 0x10;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Capabilities {
    funcs: c_ulong,
}

impl Capabilities {
    fn new(funcs: c_ulong) -> Capabilities {
        Capabilities { funcs }
    }

    /// Plain I2C transfers through `REQ_RDWR`.
    pub fn i2c(&self) -> bool {
        (self.funcs & FUNC_I2C) > 0
    }

    pub fn addr_10bit(&self) -> bool {
        (self.funcs & FUNC_10BIT_ADDR) > 0
    }

    pub fn nostart(&self) -> bool {
        (self.funcs & FUNC_NOSTART) > 0
    }
}

// ioctl() requests supported by i2cdev
const REQ_RETRIES: c_ulong = 0x0701; // How many retries when waiting for an ACK
const REQ_TIMEOUT: c_ulong = 0x0702; // Timeout in 10ms units
const REQ_FUNCS: c_ulong = 0x0705; // Read I2C bus capabilities
const REQ_RDWR: c_ulong = 0x0707; // Combined read/write transfer with a single STOP

// Message flags
const MSG_RD: u16 = 0x0001;
const MSG_TEN: u16 = 0x0010;

#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

#[repr(C)]
struct RdwrRequest {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

pub unsafe fn set_retries(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(ioctl(fd, REQ_RETRIES, value))
}

pub unsafe fn set_timeout(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(ioctl(fd, REQ_TIMEOUT, value))
}

pub unsafe fn funcs(fd: c_int) -> Result<Capabilities> {
    let mut funcs: c_ulong = 0;

    parse_retval!(ioctl(fd, REQ_FUNCS, &mut funcs))?;

    Ok(Capabilities::new(funcs))
}

/// Writes `write_buffer`, then reads into `read_buffer`, with a repeated
/// START in between. Empty buffers are left out of the transfer.
pub unsafe fn i2c_write_read(
    fd: c_int,
    address: u16,
    addr_10bit: bool,
    write_buffer: &[u8],
    read_buffer: &mut [u8],
) -> Result<()> {
    if write_buffer.len() > u16::MAX as usize || read_buffer.len() > u16::MAX as usize {
        return Err(io::Error::from(io::ErrorKind::InvalidInput));
    }

    let flags = if addr_10bit { MSG_TEN } else { 0 };

    let mut msgs: Vec<I2cMsg> = Vec::with_capacity(2);

    if !write_buffer.is_empty() {
        msgs.push(I2cMsg {
            addr: address,
            flags,
            len: write_buffer.len() as u16,
            // The kernel doesn't write to buffers without MSG_RD
            buf: write_buffer.as_ptr() as *mut u8,
        });
    }

    if !read_buffer.is_empty() {
        msgs.push(I2cMsg {
            addr: address,
            flags: flags | MSG_RD,
            len: read_buffer.len() as u16,
            buf: read_buffer.as_mut_ptr(),
        });
    }

    if msgs.is_empty() {
        return Ok(());
    }

    let mut request = RdwrRequest {
        msgs: msgs.as_mut_ptr(),
        nmsgs: msgs.len() as u32,
    };

    parse_retval!(ioctl(fd, REQ_RDWR, &mut request))?;

    Ok(())
}
