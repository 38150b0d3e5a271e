//! ## Linux fdrawcmd transport
//!
//! Implements the `RawFdc` capability over the kernel's raw floppy command
//! interface on `/dev/fdN`.  The ioctl structures mirror `<linux/fd.h>`.

use std::ffi::CString;
use std::io;
use log::{debug,info};
use super::{CmdReply,CmdRequest,RawFdc};
use crate::DYNERR;

// Raw command flags from <linux/fd.h>.
const FD_RAW_READ: libc::c_uint = 1;
const FD_RAW_INTR: libc::c_uint = 8;
const FD_RAW_NEED_SEEK: libc::c_uint = 0x80;

const FD_RESET_ALWAYS: libc::c_ulong = 2;

// _IO(2, 0x54) and _IO(2, 0x58).
const FDRESET: libc::c_ulong = 0x0254;
const FDRAWCMD: libc::c_ulong = 0x0258;

#[repr(C)]
struct FloppyRawCmd {
    flags: libc::c_uint,
    data: *mut libc::c_void,
    kernel_data: *mut libc::c_char,
    next: *mut FloppyRawCmd,
    length: libc::c_long,
    phys_length: libc::c_long,
    buffer_length: libc::c_int,
    rate: u8,
    cmd_count: u8,
    cmd: [u8; 16],
    reply_count: u8,
    reply: [u8; 16],
    track: libc::c_int,
    resultcode: libc::c_int,
    reserved1: libc::c_int,
    reserved2: libc::c_int
}

#[repr(C)]
struct FloppyMaxErrors {
    abort: libc::c_uint,
    read_track: libc::c_uint,
    reset: libc::c_uint,
    recal: libc::c_uint,
    reporting: libc::c_uint
}

#[repr(C)]
struct FloppyDriveParams {
    cmos: libc::c_schar,
    max_dtr: libc::c_ulong,
    hlt: libc::c_ulong,
    hut: libc::c_ulong,
    srt: libc::c_ulong,
    spinup: libc::c_ulong,
    spindown: libc::c_ulong,
    spindown_offset: libc::c_uchar,
    select_delay: libc::c_uchar,
    rps: libc::c_uchar,
    tracks: libc::c_uchar,
    timeout: libc::c_ulong,
    interleave_sect: libc::c_uchar,
    max_errors: FloppyMaxErrors,
    flags: libc::c_char,
    read_track: libc::c_char,
    autodetect: [libc::c_short; 8],
    checkfreq: libc::c_int,
    native_format: libc::c_int
}

// _IOR(2, 0x11, struct floppy_drive_params); the size field depends on the
// struct layout, so compute it rather than hardcoding.
fn fdgetdrvprm() -> libc::c_ulong {
    let size = std::mem::size_of::<FloppyDriveParams>() as libc::c_ulong;
    (2 << 30) | (size << 16) | (2 << 8) | 0x11
}

/// A `/dev/fdN` device node opened for raw commands.
pub struct LinuxFdc {
    fd: libc::c_int,
    path: String
}

impl LinuxFdc {
    /// Open the device node for the given drive number.
    pub fn open(drive: usize) -> Result<Self,DYNERR> {
        let path = format!("/dev/fd{}",drive);
        info!("opening {}",path);
        let cpath = CString::new(path.clone())?;
        let fd = unsafe { libc::open(cpath.as_ptr(),libc::O_ACCMODE | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(Box::new(io::Error::last_os_error()));
        }
        Ok(Self { fd, path })
    }
}

impl RawFdc for LinuxFdc {
    fn submit(&mut self,req: &CmdRequest) -> Result<CmdReply,DYNERR> {
        assert!(req.cmd.len() <= 16);
        let mut buf = vec![0u8; req.read_len];
        let mut raw = FloppyRawCmd {
            flags: 0,
            data: std::ptr::null_mut(),
            kernel_data: std::ptr::null_mut(),
            next: std::ptr::null_mut(),
            length: 0,
            phys_length: 0,
            buffer_length: 0,
            rate: req.rate,
            cmd_count: req.cmd.len() as u8,
            cmd: [0; 16],
            reply_count: 0,
            reply: [0; 16],
            track: req.phys_track as libc::c_int,
            resultcode: 0,
            reserved1: 0,
            reserved2: 0
        };
        raw.cmd[..req.cmd.len()].copy_from_slice(&req.cmd);
        if req.flags.intr {
            raw.flags |= FD_RAW_INTR;
        }
        if req.flags.seek {
            raw.flags |= FD_RAW_NEED_SEEK;
        }
        if req.flags.read {
            raw.flags |= FD_RAW_READ;
            raw.data = buf.as_mut_ptr() as *mut libc::c_void;
            raw.length = buf.len() as libc::c_long;
        }
        debug!("raw cmd {:02x?} rate {} track {}",req.cmd,req.rate,req.phys_track);
        if unsafe { libc::ioctl(self.fd,FDRAWCMD,&mut raw as *mut FloppyRawCmd) } < 0 {
            return Err(Box::new(io::Error::last_os_error()));
        }
        let reply = raw.reply[..raw.reply_count as usize].to_vec();
        Ok(CmdReply { reply, data: buf })
    }
    fn reset(&mut self) -> Result<(),DYNERR> {
        if unsafe { libc::ioctl(self.fd,FDRESET,FD_RESET_ALWAYS) } < 0 {
            return Err(Box::new(io::Error::last_os_error()));
        }
        Ok(())
    }
    fn drive_tracks(&mut self) -> Result<u8,DYNERR> {
        let mut params: FloppyDriveParams = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(self.fd,fdgetdrvprm(),&mut params as *mut FloppyDriveParams) } < 0 {
            return Err(Box::new(io::Error::last_os_error()));
        }
        debug!("{}: BIOS reports {} tracks",self.path,params.tracks);
        Ok(params.tracks)
    }
}

impl Drop for LinuxFdc {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
