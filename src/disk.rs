//! # Disk Model
//!
//! In-memory representation of an FM/MFM floppy disk as seen through a
//! PC-style controller: a disk owns tracks, a track owns sectors, and a
//! sector owns the evidence gathered for it.  Sectors are indexed by
//! *physical* position (the order their ID fields pass the head); the
//! logical address lives in the sector itself and may disagree with the
//! physical one (doublestepping, split-side layouts).
//!
//! A sector that could not be read cleanly keeps every distinct payload the
//! controller returned, with a count of how many reads produced it.  That
//! evidence table is ordered by first appearance and the order is part of
//! the container contract, so it must survive serialization.

use std::fmt;

/// Hard bound of the IMD container: one byte of sector count per track.
pub const MAX_SECS: usize = 256;
/// Hard bound of the IMD container: one byte of cylinder number.
pub const MAX_CYLS: usize = 256;
/// PC controllers address at most two heads.
pub const MAX_HEADS: usize = 2;

/// Marker for "no sector size seen yet"; also the IMD variable-size code.
pub const SIZE_CODE_UNSET: u8 = 0xFF;

/// Convert an FDC sector size code (0 to 7) to a size in bytes.
pub fn sector_bytes(code: u8) -> usize {
    128 << code
}

/// One combination of encoding and bit rate the controller can be told to use.
#[derive(PartialEq,Eq,Debug)]
pub struct DataMode {
    /// Mode byte used in the IMD track header.
    pub imd_mode: u8,
    pub name: &'static str,
    /// Controller rate select, 0 to 3.
    pub rate: u8,
    pub is_fm: bool
}

/// Possible data modes, in the order in which they are tried when probing.
/// Following what the IMD spec says, the rates here are the data transfer
/// rate to the drive -- FM-500k transfers half as much data as MFM-500k
/// owing to the less efficient encoding.
pub static DATA_MODES: [DataMode; 7] = [
    // 5.25" DD/QD and 3.5" DD drives
    DataMode { imd_mode: 5, name: "MFM-250k", rate: 2, is_fm: false },
    DataMode { imd_mode: 2, name: "FM-250k", rate: 2, is_fm: true },
    // DD media in 5.25" HD drives
    DataMode { imd_mode: 4, name: "MFM-300k", rate: 1, is_fm: false },
    DataMode { imd_mode: 1, name: "FM-300k", rate: 1, is_fm: true },
    // 3.5" HD, 5.25" HD and 8" drives
    DataMode { imd_mode: 3, name: "MFM-500k", rate: 0, is_fm: false },
    DataMode { imd_mode: 0, name: "FM-500k", rate: 0, is_fm: true },
    // 3.5" ED drives.  Mode 6 is an extension; IMD 1.18 stops at 5.
    // Rate 3 for FM isn't allowed by the controller.
    DataMode { imd_mode: 6, name: "MFM-1000k", rate: 3, is_fm: false },
];

/// Look up a data mode by its IMD header byte.
pub fn mode_from_imd(imd_mode: u8) -> Option<&'static DataMode> {
    DATA_MODES.iter().find(|m| m.imd_mode == imd_mode)
}

impl fmt::Display for DataMode {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{}",self.name)
    }
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum SectorStatus {
    Missing,
    Bad,
    Good
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum TrackStatus {
    Unknown,
    Guessed,
    Probed
}

/// Evidence table for one sector: every distinct payload that a read
/// produced, with the number of reads that produced it.  Order is first
/// appearance and is preserved through the container, because the flattener
/// addresses entries by position when asking the operator to choose.
#[derive(PartialEq,Eq,Clone,Debug,Default)]
pub struct DataMap {
    entries: Vec<(Vec<u8>,u32)>
}

impl DataMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }
    /// Insert a payload with the given count, unless the same payload is
    /// already present, in which case the existing count stands.
    pub fn insert_if_absent(&mut self,data: Vec<u8>,count: u32) {
        if !self.entries.iter().any(|(d,_)| *d == data) {
            self.entries.push((data,count));
        }
    }
    /// Record one more read that produced `data`.  Returns true if this
    /// payload had not been seen before.
    pub fn saw_again(&mut self,data: Vec<u8>) -> bool {
        for (d,count) in &mut self.entries {
            if *d == data {
                *count = count.saturating_add(1);
                return false;
            }
        }
        self.entries.push((data,1));
        true
    }
    /// Insert a payload that must not already be present (container path).
    pub fn insert_unique(&mut self,data: Vec<u8>,count: u32) -> Result<(),()> {
        if self.entries.iter().any(|(d,_)| *d == data) {
            return Err(());
        }
        self.entries.push((data,count));
        Ok(())
    }
    pub fn get(&self,idx: usize) -> Option<(&[u8],u32)> {
        self.entries.get(idx).map(|(d,c)| (d.as_slice(),*c))
    }
    pub fn iter(&self) -> impl Iterator<Item = (&[u8],u32)> + '_ {
        self.entries.iter().map(|(d,c)| (d.as_slice(),*c))
    }
    /// Position and count of the entry with the highest read count.
    /// Ties go to the earliest entry.
    pub fn dominant(&self) -> Option<(usize,u32)> {
        let mut best: Option<(usize,u32)> = None;
        for (i,(_,count)) in self.entries.iter().enumerate() {
            match best {
                Some((_,c)) if *count <= c => {},
                _ => best = Some((i,*count))
            }
        }
        best
    }
}

#[derive(Clone,Debug,PartialEq)]
pub struct Sector {
    pub status: SectorStatus,
    pub log_cyl: u8,
    pub log_head: u8,
    pub log_sector: u8,
    pub deleted: bool,
    pub datas: DataMap
}

impl Sector {
    pub fn new() -> Self {
        Self {
            status: SectorStatus::Missing,
            log_cyl: 0xFF,
            log_head: 0xFF,
            log_sector: 0xFF,
            deleted: false,
            datas: DataMap::new()
        }
    }
    /// A sector slot that has never held data.
    pub fn assert_free(&self) {
        assert!(self.status == SectorStatus::Missing);
        assert!(self.datas.is_empty());
    }
}

/// Return whether two sectors have the same logical address.
pub fn same_sector_addr(a: &Sector,b: &Sector) -> bool {
    a.log_cyl == b.log_cyl && a.log_head == b.log_head && a.log_sector == b.log_sector
}

/// Mode, size and logical addressing of a track, detached from its sectors
/// so it can be carried to a neighbouring track as a guess.
pub struct TrackLayout {
    phys_cyl: u8,
    data_mode: Option<&'static DataMode>,
    sector_size_code: u8,
    ids: Vec<(u8,u8,u8)>
}

#[derive(Clone,Debug,PartialEq)]
pub struct Track {
    pub status: TrackStatus,
    pub data_mode: Option<&'static DataMode>,
    pub phys_cyl: u8,
    pub phys_head: u8,
    pub sector_size_code: u8,
    /// Indexed by physical position on the spinning medium.
    pub sectors: Vec<Sector>
}

impl Track {
    pub fn new(phys_cyl: usize,phys_head: usize) -> Self {
        Self {
            status: TrackStatus::Unknown,
            data_mode: None,
            phys_cyl: phys_cyl as u8,
            phys_head: phys_head as u8,
            sector_size_code: SIZE_CODE_UNSET,
            sectors: Vec::new()
        }
    }
    /// Forget everything probed or read and return to the unknown state.
    pub fn reset(&mut self) {
        self.status = TrackStatus::Unknown;
        self.data_mode = None;
        self.sector_size_code = SIZE_CODE_UNSET;
        self.sectors.clear();
    }
    pub fn num_sectors(&self) -> usize {
        self.sectors.len()
    }
    /// Snapshot the layout for guessing a neighbour, or None if this track
    /// was never probed.
    pub fn layout(&self) -> Option<TrackLayout> {
        if self.status == TrackStatus::Unknown {
            return None;
        }
        Some(TrackLayout {
            phys_cyl: self.phys_cyl,
            data_mode: self.data_mode,
            sector_size_code: self.sector_size_code,
            ids: self.sectors.iter().map(|s| (s.log_cyl,s.log_head,s.log_sector)).collect()
        })
    }
    /// Adopt a neighbouring track's layout as a guess.  Logical cylinder
    /// numbers are shifted by the physical cylinder difference; head and
    /// sector numbers carry over unchanged.
    pub fn adopt_layout(&mut self,layout: &TrackLayout) {
        let cyl_diff = self.phys_cyl.wrapping_sub(layout.phys_cyl);
        self.status = TrackStatus::Guessed;
        self.data_mode = layout.data_mode;
        self.sector_size_code = layout.sector_size_code;
        self.sectors.clear();
        for (log_cyl,log_head,log_sector) in &layout.ids {
            let mut sector = Sector::new();
            sector.log_cyl = log_cyl.wrapping_add(cyl_diff);
            sector.log_head = *log_head;
            sector.log_sector = *log_sector;
            self.sectors.push(sector);
        }
    }
    /// Find the physical index of the sector with the lowest logical ID,
    /// and whether the logical IDs form a contiguous run.  Seeing the same
    /// logical ID twice within one track is a model violation.
    pub fn scan_sectors(&self) -> (Option<usize>,bool) {
        let mut seen = [false; MAX_SECS];
        let mut lowest: Option<usize> = None;
        let mut lowest_id = MAX_SECS;
        let mut highest_id = 0;
        for (i,sector) in self.sectors.iter().enumerate() {
            let id = sector.log_sector as usize;
            assert!(!seen[id],"duplicate logical sector {} in track",id);
            seen[id] = true;
            if id < lowest_id {
                lowest_id = id;
                lowest = Some(i);
            }
            if id > highest_id {
                highest_id = id;
            }
        }
        for id in lowest_id..highest_id {
            if !seen[id] {
                return (lowest,false);
            }
        }
        (lowest,true)
    }
}

#[derive(PartialEq)]
pub struct Disk {
    /// Raw comment bytes; the 0x1A terminator is not part of the comment.
    pub comment: Vec<u8>,
    pub num_phys_cyls: usize,
    pub num_phys_heads: usize,
    tracks: Vec<[Track; MAX_HEADS]>
}

impl Disk {
    pub fn new() -> Self {
        let mut tracks = Vec::with_capacity(MAX_CYLS);
        for cyl in 0..MAX_CYLS {
            tracks.push([Track::new(cyl,0),Track::new(cyl,1)]);
        }
        Self {
            comment: Vec::new(),
            num_phys_cyls: 0,
            num_phys_heads: 0,
            tracks
        }
    }
    pub fn track(&self,cyl: usize,head: usize) -> &Track {
        &self.tracks[cyl][head]
    }
    pub fn track_mut(&mut self,cyl: usize,head: usize) -> &mut Track {
        &mut self.tracks[cyl][head]
    }
    /// Stamp the comment the way ImageDisk does.
    pub fn timestamp_comment(&mut self,program: &str,version: &str) {
        let now = chrono::Local::now();
        self.comment = format!(
            "{} {}: {}\r\n",program,version,now.format("%d/%m/%Y %H:%M:%S")
        ).into_bytes();
    }
    /// Copy the layout of the previous cylinder's track on the same head,
    /// as a guess to be verified by reading.
    pub fn inherit_track_layout(&mut self,cyl: usize,head: usize) {
        if cyl == 0 {
            return;
        }
        if let Some(layout) = self.tracks[cyl - 1][head].layout() {
            self.tracks[cyl][head].adopt_layout(&layout);
        }
    }
    /// Totals of (good, bad, missing) sectors across the disk.
    pub fn sector_status_counts(&self) -> (u64,u64,u64) {
        let mut good = 0;
        let mut bad = 0;
        let mut missing = 0;
        for cyl in 0..self.num_phys_cyls {
            for head in 0..self.num_phys_heads {
                for sector in &self.tracks[cyl][head].sectors {
                    match sector.status {
                        SectorStatus::Good => good += 1,
                        SectorStatus::Bad => bad += 1,
                        SectorStatus::Missing => missing += 1
                    }
                }
            }
        }
        (good,bad,missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_map_preserves_first_appearance_order() {
        let mut map = DataMap::new();
        assert!(map.saw_again(vec![3;128]));
        assert!(map.saw_again(vec![1;128]));
        assert!(!map.saw_again(vec![3;128]));
        assert!(map.saw_again(vec![2;128]));
        let order: Vec<u8> = map.iter().map(|(d,_)| d[0]).collect();
        assert_eq!(order,vec![3,1,2]);
        assert_eq!(map.get(0).unwrap().1,2);
        assert_eq!(map.dominant(),Some((0,2)));
    }

    #[test]
    fn data_map_good_read_dominates() {
        let mut map = DataMap::new();
        map.saw_again(vec![0xAA;128]);
        map.saw_again(vec![0xBB;128]);
        map.insert_if_absent(vec![0xCC;128],u32::MAX);
        assert_eq!(map.len(),3);
        assert_eq!(map.dominant(),Some((2,u32::MAX)));
        // A payload already on file keeps its count.
        map.insert_if_absent(vec![0xAA;128],u32::MAX);
        assert_eq!(map.get(0).unwrap().1,1);
    }

    #[test]
    fn count_saturates() {
        let mut map = DataMap::new();
        map.insert_if_absent(vec![0;128],u32::MAX);
        assert!(!map.saw_again(vec![0;128]));
        assert_eq!(map.get(0).unwrap().1,u32::MAX);
    }

    #[test]
    fn layout_guess_shifts_logical_cylinder() {
        let mut src = Track::new(4,1);
        src.status = TrackStatus::Probed;
        src.data_mode = Some(&DATA_MODES[0]);
        src.sector_size_code = 2;
        for id in 1..=9u8 {
            let mut sector = Sector::new();
            sector.log_cyl = 4;
            sector.log_head = 1;
            sector.log_sector = id;
            src.sectors.push(sector);
        }
        let mut dest = Track::new(5,1);
        dest.adopt_layout(&src.layout().unwrap());
        assert_eq!(dest.status,TrackStatus::Guessed);
        assert_eq!(dest.sector_size_code,2);
        assert_eq!(dest.num_sectors(),9);
        assert_eq!(dest.sectors[0].log_cyl,5);
        assert_eq!(dest.sectors[0].log_head,1);
        assert_eq!(dest.sectors[8].log_sector,9);
    }

    #[test]
    fn unknown_track_has_no_layout() {
        let track = Track::new(3,0);
        assert!(track.layout().is_none());
    }

    #[test]
    fn scan_reports_contiguity_and_lowest() {
        let mut track = Track::new(0,0);
        for id in [5u8,1,3,2,4] {
            let mut sector = Sector::new();
            sector.log_sector = id;
            track.sectors.push(sector);
        }
        let (lowest,contiguous) = track.scan_sectors();
        assert_eq!(lowest,Some(1));
        assert!(contiguous);
        track.sectors[2].log_sector = 9;
        let (_,contiguous) = track.scan_sectors();
        assert!(!contiguous);
    }
}
