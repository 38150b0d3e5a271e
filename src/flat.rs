//! # Flattener
//!
//! Reduces the (cylinder, head, sector) model to a linear byte stream: the
//! image slot for a sector is its *physical* cylinder and head paired with
//! its *logical* sector number, slots are emitted in lexicographic order,
//! and slots with no sector get a dummy fill.  A sector with more than one
//! recorded reading cannot be resolved mechanically, so the operator is
//! asked to pick one; the reading seen most often is offered as the
//! default.

use std::collections::BTreeMap;
use std::io::{BufRead,Write};
use std::str::FromStr;
use log::{info,warn};
use crate::disk::{sector_bytes,Disk,SectorStatus,MAX_CYLS,MAX_HEADS};
use crate::STDRESULT;

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("Two sectors found for cylinder {0} head {1} sector {2}")]
    DuplicateSector(usize,usize,usize),
    #[error("Error reading stdin")]
    PromptClosed,
    #[error("bad range: {0}")]
    BadRange(String)
}

/// A half-open index range where either bound may be left to its default
/// (all input, or autodetected output).
#[derive(Clone,Copy,Debug,PartialEq,Eq,Default)]
pub struct Range {
    pub start: Option<usize>,
    pub end: Option<usize>
}

impl Range {
    pub const fn all() -> Self {
        Self { start: None, end: None }
    }
    pub fn start_or(&self,default: usize) -> usize {
        self.start.unwrap_or(default)
    }
    pub fn end_or(&self,default: usize) -> usize {
        self.end.unwrap_or(default)
    }
    pub fn contains(&self,value: usize) -> bool {
        value >= self.start_or(0) && value < self.end_or(usize::MAX)
    }
}

/// Ranges are written `FIRST:LAST` (inclusive), `FIRST:`, `:LAST` or `ONLY`.
impl FromStr for Range {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        let parse = |part: &str| -> Result<Option<usize>,Error> {
            match part {
                "" => Ok(None),
                _ => match part.parse::<usize>() {
                    Ok(v) => Ok(Some(v)),
                    Err(_) => Err(Error::BadRange(s.to_string()))
                }
            }
        };
        match s.split_once(':') {
            Some((first,last)) => {
                let start = parse(first)?;
                let end = parse(last)?.map(|v| v + 1);
                if start.is_none() && end.is_none() {
                    return Err(Error::BadRange(s.to_string()));
                }
                Ok(Self { start, end })
            },
            None => match parse(s)? {
                Some(only) => Ok(Self { start: Some(only), end: Some(only + 1) }),
                None => Err(Error::BadRange(s.to_string()))
            }
        }
    }
}

/// Low/high water marks for one output dimension.
struct AutoRange {
    lo: usize,
    hi: usize
}

impl AutoRange {
    fn new() -> Self {
        Self { lo: usize::MAX, hi: 0 }
    }
    fn update(&mut self,value: usize) {
        if value < self.lo {
            self.lo = value;
        }
        if value >= self.hi {
            self.hi = value + 1;
        }
    }
    /// Final bounds, with any user override applied on top.
    fn resolve(&self,user: &Range) -> (usize,usize) {
        let lo = match self.lo == usize::MAX {
            true => 0,
            false => self.lo
        };
        (user.start_or(lo),user.end_or(self.hi))
    }
}

pub struct FlattenOptions {
    pub in_cyls: Range,
    pub in_heads: Range,
    pub in_sectors: Range,
    pub out_cyls: Range,
    pub out_heads: Range,
    pub out_sectors: Range,
    /// Tolerate two sectors claiming the same output slot.
    pub permissive: bool
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            in_cyls: Range::all(),
            in_heads: Range::all(),
            in_sectors: Range::all(),
            out_cyls: Range::all(),
            out_heads: Range::all(),
            out_sectors: Range::all(),
            permissive: false
        }
    }
}

/// Ask the operator which of a bad sector's readings to use.  Lines come
/// from `choices` (stdin in production); an empty line takes the default.
fn pick_data_id<R: BufRead>(sector: &crate::disk::Sector,choices: &mut R) -> Result<usize,crate::DYNERR> {
    let (default_id,default_count) = sector.datas.dominant().expect("sector has readings");
    eprint!("Enter the 'IMD data id' to use for Logical C {} H {} S {}: [default: {}, count: {}]: ",
        sector.log_cyl,sector.log_head,sector.log_sector,default_id,default_count);
    loop {
        let mut line = String::new();
        if choices.read_line(&mut line).map_err(|_| Error::PromptClosed)? == 0 {
            return Err(Box::new(Error::PromptClosed));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            eprintln!("Using default ID of {}",default_id);
            return Ok(default_id);
        }
        match trimmed.parse::<usize>() {
            Ok(id) if id < sector.datas.len() => return Ok(id),
            Ok(id) => eprintln!("Parsed invalid 'IMD data id': {}. Must be less than {}.",id,sector.datas.len()),
            Err(e) => eprintln!("Error parsing 'IMD data id': {}",e)
        }
    }
}

/// Write the flat rendition of the disk.
pub fn write_flat<R: BufRead,W: Write>(disk: &Disk,opts: &FlattenOptions,choices: &mut R,flat: &mut W) -> STDRESULT {
    let mut image: BTreeMap<(usize,usize,usize),Vec<u8>> = BTreeMap::new();

    // The range of C/H/S in the output image, based on what we load.
    let mut out_cyls = AutoRange::new();
    let mut out_heads = AutoRange::new();
    let mut out_sectors = AutoRange::new();
    let mut size_code: Option<u8> = None;

    for phys_cyl in opts.in_cyls.start_or(0)..opts.in_cyls.end_or(MAX_CYLS).min(MAX_CYLS) {
        for phys_head in opts.in_heads.start_or(0)..opts.in_heads.end_or(MAX_HEADS).min(MAX_HEADS) {
            let track = disk.track(phys_cyl,phys_head);

            for sector in &track.sectors {
                // The slot is physical cyl and head, but logical sector.
                let sec = sector.log_sector as usize;
                if !opts.in_sectors.contains(sec) {
                    continue;
                }
                out_cyls.update(phys_cyl);
                out_heads.update(phys_head);
                out_sectors.update(sec);

                if sector.status == SectorStatus::Missing {
                    continue;
                }
                let key = (phys_cyl,phys_head,sec);
                if image.contains_key(&key) && !opts.permissive {
                    return Err(Box::new(Error::DuplicateSector(phys_cyl,phys_head,sec)));
                }

                let data_id = match sector.datas.len() {
                    1 => 0,
                    _ => pick_data_id(sector,choices)?
                };
                let (data,_) = sector.datas.get(data_id).expect("data id was validated");
                assert!(data.len() == sector_bytes(track.sector_size_code));
                image.insert(key,data.to_vec());

                match size_code {
                    None => size_code = Some(track.sector_size_code),
                    Some(code) if code != track.sector_size_code => {
                        println!("Tracks have inconsistent sector sizes: {} != {} for {},{},{},{}",
                            track.sector_size_code,code,phys_cyl,phys_head,sec,track.num_sectors());
                        info!("inconsistent sector size at {}.{}.{}",phys_cyl,phys_head,sec);
                    },
                    _ => {}
                }
            }
        }
    }

    let size_code = match size_code {
        Some(code) => code,
        None => {
            warn!("no sectors selected, nothing to write");
            return Ok(());
        }
    };

    let (cyl_lo,cyl_hi) = out_cyls.resolve(&opts.out_cyls);
    let (head_lo,head_hi) = out_heads.resolve(&opts.out_heads);
    let (sec_lo,sec_hi) = out_sectors.resolve(&opts.out_sectors);

    // Data to write where we don't have a real sector.
    let dummy = vec![0xFF; sector_bytes(size_code)];

    for cyl in cyl_lo..cyl_hi {
        for head in head_lo..head_hi {
            for sec in sec_lo..sec_hi {
                match image.get(&(cyl,head,sec)) {
                    Some(data) => flat.write_all(data)?,
                    None => flat.write_all(&dummy)?
                }
            }
        }
    }
    Ok(())
}
