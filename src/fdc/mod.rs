//! # FDC Primitive Layer
//!
//! Builds raw NEC uPD765 commands and submits them through the `RawFdc`
//! capability, which is whatever operating-system facility can push a
//! command byte string at the controller and hand back the status
//! registers.  Transport problems (the facility itself failing, or a
//! truncated reply) are fatal; a command that merely failed on the medium
//! is a normal outcome and is reported through the status registers.
//!
//! The Linux fdrawcmd implementation of the capability lives in `linux`.

#[cfg(target_os = "linux")]
pub mod linux;

use log::trace;
use crate::disk::{sector_bytes,DataMode};
use crate::DYNERR;

pub const CMD_RECALIBRATE: u8 = 0x07;
pub const CMD_READ_ID: u8 = 0x0A;
pub const CMD_READ_DATA: u8 = 0x06;
/// Set for MFM, clear for FM, in the first command byte.
pub const CMD_MFM_BIT: u8 = 0x40;

/// ST0 bits 6-7 are the interrupt code; 00 means normal termination.
pub const ST0_IC_MASK: u8 = 0xC0;
/// ST1 0x20: CRC error in the address or data field.
pub const ST1_CRC: u8 = 0x20;
/// ST2 0x20: CRC error in the data field.
pub const ST2_CRC: u8 = 0x20;
/// ST2 0x40: control mark, i.e. a deleted-data sector was read.
pub const ST2_CM: u8 = 0x40;

/// End-of-track sector number for READ DATA.
const READ_EOT: u8 = 0xFF;
/// Intersector gap length.  There's a complex table of these for various
/// formats in the M1543C datasheet; the fdutils manual says it doesn't make
/// any difference for read.
const READ_GAP: u8 = 0x1B;

/// How a raw command should be carried out.
#[derive(Clone,Copy,Default)]
pub struct CmdFlags {
    /// Wait for the completion interrupt.
    pub intr: bool,
    /// Seek to `phys_track` before issuing the command.
    pub seek: bool,
    /// The command transfers data from the drive.
    pub read: bool
}

/// One raw command for the controller.
pub struct CmdRequest {
    pub cmd: Vec<u8>,
    pub flags: CmdFlags,
    /// Data rate select, 0 to 3.
    pub rate: u8,
    /// Physical track for the implied seek.
    pub phys_track: u8,
    /// Number of data bytes the command is expected to transfer in.
    pub read_len: usize
}

/// Status registers and data returned by a raw command.
pub struct CmdReply {
    pub reply: Vec<u8>,
    pub data: Vec<u8>
}

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("controller returned short reply ({0} bytes)")]
    ShortReply(usize)
}

/// The operating-system facility that submits raw commands to the floppy
/// controller.  `submit` returning Err means the facility itself failed,
/// which is always fatal to the run.
pub trait RawFdc {
    fn submit(&mut self,req: &CmdRequest) -> Result<CmdReply,DYNERR>;
    /// Reset the controller.
    fn reset(&mut self) -> Result<(),DYNERR>;
    /// BIOS idea of the drive's track count.  Not necessarily accurate
    /// (there's no BIOS type for an 80-track 5.25" DD drive), used only as
    /// a default.
    fn drive_tracks(&mut self) -> Result<u8,DYNERR>;
}

/// Result of a READ ID: the status registers and the logical address of
/// whatever sector ID passed under the head.
#[derive(Clone,Copy,Debug)]
pub struct SectorId {
    pub st0: u8,
    pub st1: u8,
    pub st2: u8,
    pub log_cyl: u8,
    pub log_head: u8,
    pub log_sector: u8,
    pub size_code: u8
}

/// Status registers from a READ DATA, whether it succeeded or not.
#[derive(Clone,Copy,Debug)]
pub struct ReadStatus {
    pub ok: bool,
    pub st0: u8,
    pub st1: u8,
    pub st2: u8
}

/// One floppy drive reached through a controller capability.  Commands
/// carry the drive number in their selector byte; `cyl_scale` doubles seek
/// distances when a 40-track disk sits in an 80-track drive.
pub struct Drive {
    fdc: Box<dyn RawFdc>,
    drive: usize,
    pub cyl_scale: usize
}

impl Drive {
    pub fn new(fdc: Box<dyn RawFdc>,drive: usize) -> Self {
        Self { fdc, drive, cyl_scale: 1 }
    }
    /// Head and drive number as the controller wants them in byte 1.
    fn selector(&self,head: usize) -> u8 {
        ((head << 2) | self.drive) as u8
    }
    pub fn reset(&mut self) -> Result<(),DYNERR> {
        self.fdc.reset()
    }
    pub fn drive_tracks(&mut self) -> Result<u8,DYNERR> {
        self.fdc.drive_tracks()
    }
    /// Seek the head back to track 0.  The controller gives up if it has
    /// stepped 80 times without finding track 0, so callers wanting to
    /// cover a head parked beyond track 80 should call this twice.
    pub fn recalibrate(&mut self) -> Result<(),DYNERR> {
        let req = CmdRequest {
            cmd: vec![CMD_RECALIBRATE,self.selector(0)],
            flags: CmdFlags { intr: true, ..Default::default() },
            rate: 0,
            phys_track: 0,
            read_len: 0
        };
        self.fdc.submit(&req)?;
        Ok(())
    }
    /// Read the ID field of whatever sector reaches the head next, waiting
    /// at most two index holes.  Ok(None) is the normal timeout outcome;
    /// Err is a transport failure.
    pub fn readid(&mut self,phys_cyl: usize,phys_head: usize,mode: &DataMode) -> Result<Option<SectorId>,DYNERR> {
        let mut cmd0 = CMD_READ_ID;
        if !mode.is_fm {
            cmd0 |= CMD_MFM_BIT;
        }
        let req = CmdRequest {
            cmd: vec![cmd0,self.selector(phys_head)],
            flags: CmdFlags { intr: true, seek: true, ..Default::default() },
            rate: mode.rate,
            phys_track: (phys_cyl * self.cyl_scale) as u8,
            read_len: 0
        };
        let reply = self.fdc.submit(&req)?;
        if reply.reply.len() < 7 {
            return Err(Box::new(Error::ShortReply(reply.reply.len())));
        }
        let r = &reply.reply;
        if r[0] & ST0_IC_MASK != 0 {
            trace!("readid {}.{} failed: st0 {:02x} st1 {:02x} st2 {:02x}",phys_cyl,phys_head,r[0],r[1],r[2]);
            return Ok(None);
        }
        Ok(Some(SectorId {
            st0: r[0], st1: r[1], st2: r[2],
            log_cyl: r[3], log_head: r[4], log_sector: r[5], size_code: r[6]
        }))
    }
    /// Read data starting at the given logical address, continuing through
    /// consecutive logical sector IDs until `buf` is full.  Reads spanning
    /// more than one sector fail when a deleted-data mark turns up, since
    /// the controller stops there.
    pub fn read(&mut self,phys_cyl: usize,phys_head: usize,mode: &DataMode,
                log_cyl: u8,log_head: u8,log_sector: u8,size_code: u8,
                buf: &mut [u8]) -> Result<ReadStatus,DYNERR> {
        let mut cmd0 = CMD_READ_DATA;
        if !mode.is_fm {
            cmd0 |= CMD_MFM_BIT;
        }
        // Byte 8 is the in-sector byte count, meaningful only for 128-byte
        // sectors; otherwise it must be 0xFF.
        let dtl = match size_code {
            0 => sector_bytes(0) as u8,
            _ => 0xFF
        };
        let req = CmdRequest {
            cmd: vec![
                cmd0,self.selector(phys_head),
                log_cyl,log_head,log_sector,size_code,
                READ_EOT,READ_GAP,dtl
            ],
            flags: CmdFlags { intr: true, seek: true, read: true },
            rate: mode.rate,
            phys_track: (phys_cyl * self.cyl_scale) as u8,
            read_len: buf.len()
        };
        let reply = self.fdc.submit(&req)?;
        if reply.reply.len() < 7 {
            return Err(Box::new(Error::ShortReply(reply.reply.len())));
        }
        let r = &reply.reply;
        let n = reply.data.len().min(buf.len());
        buf[..n].copy_from_slice(&reply.data[..n]);
        let mut ok = r[0] & ST0_IC_MASK == 0;
        // A multi-sector read that hit a deleted sector stopped there, so
        // the buffer is not completely filled in.
        if buf.len() > sector_bytes(size_code) && r[2] & ST2_CM != 0 {
            ok = false;
        }
        Ok(ReadStatus { ok, st0: r[0], st1: r[1], st2: r[2] })
    }
}
