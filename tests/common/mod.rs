//! Scripted floppy-controller capability, standing in for real hardware.
//!
//! A `MockFdc` holds per-track descriptions keyed by raw drive track and
//! head.  It models the one property the prober depends on: a failed
//! READ ID leaves the head just past the index hole, so the next success
//! starts at physical position 0, while successes advance round the track.

#![allow(dead_code)]

use std::collections::{HashMap,HashSet,VecDeque};
use dumpfloppy::disk::{sector_bytes,DataMode,DATA_MODES};
use dumpfloppy::fdc::{
    CmdReply,CmdRequest,RawFdc,
    CMD_MFM_BIT,CMD_READ_DATA,CMD_READ_ID,CMD_RECALIBRATE,
    ST1_CRC,ST2_CM,ST2_CRC
};
use dumpfloppy::DYNERR;

/// One formatted track as the drive would present it.
pub struct SimTrack {
    pub mode_index: usize,
    pub size_code: u8,
    /// Logical IDs in physical order, starting at the index hole.
    pub ids: Vec<(u8,u8,u8)>,
    /// Payload for each logical sector number.
    pub datas: HashMap<u8,Vec<u8>>,
    /// Scripted outcomes, popped one per read: (payload, CRC error).
    /// Once a sector's queue drains, reads fall back to `datas`.
    pub bad: HashMap<u8,VecDeque<(Vec<u8>,bool)>>,
    /// Sectors recorded with the deleted-data mark.
    pub deleted: HashSet<u8>
}

impl SimTrack {
    /// A clean track whose sector payloads are the sector number repeated.
    pub fn formatted(mode_index: usize,size_code: u8,log_cyl: u8,log_head: u8,sector_ids: &[u8]) -> Self {
        let mut datas = HashMap::new();
        for &id in sector_ids {
            datas.insert(id,vec![id; sector_bytes(size_code)]);
        }
        Self {
            mode_index,
            size_code,
            ids: sector_ids.iter().map(|&id| (log_cyl,log_head,id)).collect(),
            datas,
            bad: HashMap::new(),
            deleted: HashSet::new()
        }
    }
    fn mode(&self) -> &'static DataMode {
        &DATA_MODES[self.mode_index]
    }
}

pub struct MockFdc {
    /// Keyed by (raw drive track, head).
    pub tracks: HashMap<(u8,u8),SimTrack>,
    pub bios_tracks: u8,
    /// Rotational position, as an index into the current track's IDs.
    /// Deliberately nonzero at start so an unaligned probe shows up.
    pos: usize
}

impl MockFdc {
    pub fn new(bios_tracks: u8) -> Self {
        Self { tracks: HashMap::new(), bios_tracks, pos: 4 }
    }
    pub fn with_track(mut self,track_num: u8,head: u8,track: SimTrack) -> Self {
        self.tracks.insert((track_num,head),track);
        self
    }
    fn head_of(selector: u8) -> u8 {
        (selector >> 2) & 1
    }
    fn fail(st1: u8,st2: u8,data: Vec<u8>) -> CmdReply {
        CmdReply { reply: vec![0x40,st1,st2,0,0,0,0], data }
    }
}

impl RawFdc for MockFdc {
    fn submit(&mut self,req: &CmdRequest) -> Result<CmdReply,DYNERR> {
        match req.cmd[0] & 0x1F {
            CMD_RECALIBRATE => Ok(CmdReply { reply: Vec::new(), data: Vec::new() }),
            CMD_READ_ID => {
                let head = Self::head_of(req.cmd[1]);
                let track = match self.tracks.get(&(req.phys_track,head)) {
                    Some(track) => track,
                    None => {
                        // Gave up after two index holes: aligned again.
                        self.pos = 0;
                        return Ok(Self::fail(0x01,0,Vec::new()));
                    }
                };
                let mfm = req.cmd[0] & CMD_MFM_BIT != 0;
                if mfm == track.mode().is_fm || req.rate != track.mode().rate {
                    self.pos = 0;
                    return Ok(Self::fail(0x01,0,Vec::new()));
                }
                let id = track.ids[self.pos % track.ids.len()];
                self.pos = (self.pos + 1) % track.ids.len();
                Ok(CmdReply {
                    reply: vec![0,0,0,id.0,id.1,id.2,track.size_code],
                    data: Vec::new()
                })
            },
            CMD_READ_DATA => {
                let head = Self::head_of(req.cmd[1]);
                let track = match self.tracks.get_mut(&(req.phys_track,head)) {
                    Some(track) => track,
                    None => return Ok(Self::fail(0x04,0,vec![0; req.read_len]))
                };
                let mfm = req.cmd[0] & CMD_MFM_BIT != 0;
                if mfm == track.mode().is_fm || req.rate != track.mode().rate {
                    return Ok(Self::fail(0x04,0,vec![0; req.read_len]));
                }
                let size = sector_bytes(req.cmd[5]);
                assert_eq!(req.cmd[5],track.size_code,"size code mismatch in read");
                let first = req.cmd[4];
                let count = req.read_len / size;
                let mut data = vec![0u8; req.read_len];
                let mut st2 = 0u8;
                for k in 0..count {
                    let id = first.wrapping_add(k as u8);
                    if let Some(queue) = track.bad.get_mut(&id) {
                        if let Some((payload,crc)) = queue.pop_front() {
                            data[k * size..(k + 1) * size].copy_from_slice(&payload);
                            if crc {
                                return Ok(CmdReply {
                                    reply: vec![0x40,ST1_CRC,ST2_CRC,0,0,0,0],
                                    data
                                });
                            }
                            continue;
                        }
                    }
                    match track.datas.get(&id) {
                        Some(payload) => data[k * size..(k + 1) * size].copy_from_slice(payload),
                        None => return Ok(Self::fail(0x04,0,data))
                    }
                    if track.deleted.contains(&id) {
                        st2 |= ST2_CM;
                    }
                }
                Ok(CmdReply { reply: vec![0,0,st2,0,0,0,0], data })
            },
            opcode => panic!("mock controller got unexpected opcode {:02x}",opcode)
        }
    }
    fn reset(&mut self) -> Result<(),DYNERR> {
        Ok(())
    }
    fn drive_tracks(&mut self) -> Result<u8,DYNERR> {
        Ok(self.bios_tracks)
    }
}
