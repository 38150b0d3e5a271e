//! # Probing and Acquisition Engine
//!
//! Works out what is on a physical track and then reads it, against a
//! `fdc::Drive`.  The controller offers no "wait for index" primitive, so
//! the prober leans on a quirk: a failed READ ID makes the controller wait
//! through two index holes before giving up, which leaves the *next*
//! successful READ ID aligned to the start of the track.  Every probe
//! therefore begins with a deliberately mismatched READ ID.  Skipping that
//! step yields sector orderings rotated away from the true index position.
//!
//! Reading prefers one whole-track READ DATA (much faster than going
//! sector by sector) and falls back to single sectors, folding repeated
//! bad reads into the sector's evidence table.

use std::io::{self,Write};
use log::{debug,info,warn};
use crate::disk::{
    sector_bytes,same_sector_addr,Disk,Sector,SectorStatus,Track,TrackStatus,
    DATA_MODES,MAX_SECS,SIZE_CODE_UNSET
};
use crate::fdc::{Drive,ST1_CRC,ST2_CM,ST2_CRC};
use crate::DYNERR;

/// Stop collecting IDs once every observed sector has come round this often.
const MIN_SEEN: u32 = 3;
/// Give up probing a track after this many raw IDs.
const MAX_IDS: usize = 100;

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("Cylinder 2 unreadable on either side")]
    Cylinder2Unreadable,
    #[error("Can't read this disk (80T disk in 40T drive)")]
    EightyInForty,
    #[error("read too many sector IDs without repeating")]
    TooManyIds,
    #[error("mixed sector formats within track {0} != {1}")]
    MixedSectorSizes(u8,u8)
}

/// Read one sector ID and append it to the track, in physical order.
/// Ok(true) if an ID was appended; Ok(false) is the controller timing out.
fn track_readid(drive: &mut Drive,track: &mut Track,ignore_sector: Option<u8>) -> Result<bool,DYNERR> {
    if track.num_sectors() == MAX_SECS - 1 {
        return Err(Box::new(Error::TooManyIds));
    }
    let mode = track.data_mode.expect("readid without a data mode");
    let id = loop {
        match drive.readid(track.phys_cyl as usize,track.phys_head as usize,mode)? {
            None => return Ok(false),
            Some(id) if ignore_sector == Some(id.log_sector) => continue,
            Some(id) => break id
        }
    };
    assert!(id.size_code <= 7,"controller reported nonsense size code {}",id.size_code);
    if track.sector_size_code == SIZE_CODE_UNSET {
        track.sector_size_code = id.size_code;
    } else if track.sector_size_code != id.size_code {
        return Err(Box::new(Error::MixedSectorSizes(track.sector_size_code,id.size_code)));
    }
    let mut sector = Sector::new();
    sector.log_cyl = id.log_cyl;
    sector.log_head = id.log_head;
    sector.log_sector = id.log_sector;
    track.sectors.push(sector);
    Ok(true)
}

/// Identify the data mode and sector layout of a track.  Ok(false) leaves
/// the track unknown; Err is reserved for transport failures and model
/// violations.
pub fn probe_track(drive: &mut Drive,track: &mut Track,ignore_sector: Option<u8>) -> Result<bool,DYNERR> {
    assert!(track.status == TrackStatus::Unknown);

    print!("Probe {:2}.{}:",track.phys_cyl,track.phys_head);
    io::stdout().flush()?;

    // Ensure at least one READ ID fails before one succeeds, so that the
    // first success lands at the index hole.  The mode loop below starts
    // with DATA_MODES[0], so probe with a different one here; whichever of
    // the two is wrong for this track supplies the failure.
    track.data_mode = Some(&DATA_MODES[1]);
    track_readid(drive,track,ignore_sector)?;

    // Try all the possible data modes until we can read a sector ID.
    track.sectors.clear();
    track.sector_size_code = SIZE_CODE_UNSET;
    let mut found = false;
    for mode in &DATA_MODES {
        track.data_mode = Some(mode);
        if track_readid(drive,track,ignore_sector)? {
            // This succeeded, so we're at the start of the track.
            found = true;
            break;
        }
    }
    if !found {
        println!(" unknown data mode");
        return Ok(false);
    }

    // Read sector IDs until we've seen the complete sequence several times
    // over.  The count makes it likely that a full revolution was captured
    // even with the odd ID misread.
    let mut seen_secs = [0u32; MAX_SECS];
    loop {
        if track.num_sectors() > MAX_IDS {
            println!(" spent too long looking for sector IDs");
            return Ok(false);
        }
        if !track_readid(drive,track,ignore_sector)? {
            println!(" readid failed");
            return Ok(false);
        }
        let last = track.sectors.last().expect("sector was just appended");
        seen_secs[last.log_sector as usize] += 1;
        let seen_all = seen_secs.iter().all(|&n| n == 0 || n >= MIN_SEEN);
        if seen_all {
            break;
        }
    }

    // Find where the first sector repeats; that is the track length.
    let mut end_pos = 1;
    while !same_sector_addr(&track.sectors[0],&track.sectors[end_pos]) {
        end_pos += 1;
        if end_pos == track.num_sectors() {
            println!(" couldn't find repeat of first sector");
            return Ok(false);
        }
    }

    // Check that the sequence repeated itself consistently after that.
    // If sector IDs went missing, this has a reasonable chance of spotting it.
    for pos in end_pos..track.num_sectors() {
        if !same_sector_addr(&track.sectors[pos % end_pos],&track.sectors[pos]) {
            println!("  sector sequence did not repeat consistently");
            return Ok(false);
        }
    }

    // Cut the sequence to length.
    track.sectors.truncate(end_pos);

    let mode = track.data_mode.expect("mode was found above");
    print!(" {} {}x{}:",mode,track.num_sectors(),sector_bytes(track.sector_size_code));
    for sector in &track.sectors {
        print!(" {}",sector.log_sector);
    }
    println!();

    track.status = TrackStatus::Probed;
    debug!("probed {}.{}: {} sectors of {} bytes",
        track.phys_cyl,track.phys_head,track.num_sectors(),sector_bytes(track.sector_size_code));
    Ok(true)
}

/// Try to read any sectors in a track that haven't already been read.
/// Ok(true) once every sector is good.
pub fn read_track(drive: &mut Drive,track: &mut Track,retrying: bool,ignore_sector: Option<u8>) -> Result<bool,DYNERR> {
    if track.status == TrackStatus::Unknown {
        if !probe_track(drive,track,ignore_sector)? {
            return Ok(false);
        }
    }

    if retrying && track.sectors.iter().all(|s| s.status == SectorStatus::Good) {
        // Nothing left to do for this track; don't even print the Read line.
        return Ok(true);
    }

    print!("Read  {:2}.{}:",track.phys_cyl,track.phys_head);
    io::stdout().flush()?;

    let (lowest,contiguous) = match retrying {
        false => track.scan_sectors(),
        true => (None,false)
    };

    let mode = track.data_mode.expect("cannot read a track without a data mode");
    let phys_cyl = track.phys_cyl as usize;
    let phys_head = track.phys_head as usize;
    let size_code = track.sector_size_code;
    let sector_size = sector_bytes(size_code);
    let track_size = sector_size * track.num_sectors();

    // Try reading the whole track to start with; if it works it's a lot
    // faster than sector-by-sector.  The data comes back ordered by
    // *logical* ID.
    let mut track_buf = vec![0u8; track_size];
    let mut lowest_log = 0u8;
    let mut read_whole_track = false;
    if let (Some(lowest),true,false) = (lowest,contiguous,retrying) {
        let low = &track.sectors[lowest];
        lowest_log = low.log_sector;
        let status = drive.read(
            phys_cyl,phys_head,mode,
            low.log_cyl,low.log_head,low.log_sector,size_code,
            &mut track_buf
        )?;
        read_whole_track = status.ok;
        if !status.ok {
            info!("whole-track read of {}.{} failed: st1 {:02x} st2 {:02x}; going sector by sector",
                phys_cyl,phys_head,status.st1,status.st2);
        }
    } else if !contiguous && !retrying {
        info!("track {}.{} has non-contiguous sector numbering",phys_cyl,phys_head);
    }

    let mut all_ok = true;
    for i in 0..track.num_sectors() {
        let sector = &mut track.sectors[i];

        if sector.status == SectorStatus::Good {
            // Already got this one.
            print!("    ");
            continue;
        }

        print!("{:3}",sector.log_sector);
        io::stdout().flush()?;

        if read_whole_track {
            // This sector arrived as part of the whole track.  Any evidence
            // from earlier failed passes is superseded by a clean read.
            let rel = (sector.log_sector - lowest_log) as usize;
            sector.status = SectorStatus::Good;
            sector.datas.clear();
            sector.datas.insert_if_absent(track_buf[rel * sector_size..(rel + 1) * sector_size].to_vec(),1);
            sector.deleted = false;
            print!("*");
            continue;
        }

        // Read a single sector.
        let mut data_buf = vec![0u8; sector_size];
        let status = drive.read(
            phys_cyl,phys_head,mode,
            sector.log_cyl,sector.log_head,sector.log_sector,size_code,
            &mut data_buf
        )?;

        let mut have_data = true;
        let mut new_payload = true;
        if status.ok {
            sector.status = SectorStatus::Good;
            // A first clean read counts once; a clean read arriving after
            // bad evidence gets the highest possible count so it dominates
            // whatever was collected before.
            let count = match sector.datas.is_empty() {
                true => 1,
                false => u32::MAX
            };
            sector.datas.insert_if_absent(data_buf,count);
        } else {
            all_ok = false;
            if status.st1 == ST1_CRC && status.st2 == ST2_CRC {
                // A data-field CRC error still hands over the bytes; keep
                // them as evidence and tally repeats.
                sector.status = SectorStatus::Bad;
                new_payload = sector.datas.saw_again(data_buf);
            } else {
                have_data = false;
                debug!("sector {}.{}.{} read failed: st0 {:02x} st1 {:02x} st2 {:02x}",
                    phys_cyl,phys_head,sector.log_sector,status.st0,status.st1,status.st2);
            }
        }

        if have_data {
            sector.deleted = status.st2 & ST2_CM != 0;
            if sector.status == SectorStatus::Bad {
                print!("{}",match new_payload { true => "?", false => "@" });
            } else if sector.deleted {
                print!("x");
            } else {
                print!("+");
            }
        } else {
            print!("-");
        }
        io::stdout().flush()?;
    }

    println!();
    Ok(all_ok)
}

/// Probe both sides of cylinder 2 to figure out the disk geometry.
/// Cylinder 2 because a physical cylinder greater than 0 is needed to spot
/// doublestepping, and because cylinder 0 may reasonably be unformatted on
/// disks where it's a bootblock.
pub fn probe_disk(drive: &mut Drive,disk: &mut Disk,ignore_sector: Option<u8>) -> Result<(),DYNERR> {
    let cyl = 2;
    for head in 0..disk.num_phys_heads {
        probe_track(drive,disk.track_mut(cyl,head),ignore_sector)?;
    }

    let side0_status = disk.track(cyl,0).status;
    let side1_status = disk.track(cyl,1).status;
    let sec0 = disk.track(cyl,0).sectors.first().map(|s| (s.log_cyl,s.log_head));
    let sec1_head = disk.track(cyl,1).sectors.first().map(|s| s.log_head);

    if side0_status == TrackStatus::Unknown && side1_status == TrackStatus::Unknown {
        return Err(Box::new(Error::Cylinder2Unreadable));
    } else if side1_status == TrackStatus::Unknown {
        println!("Single-sided disk");
        disk.num_phys_heads = 1;
    } else if matches!((sec0,sec1_head),(Some((_,0)),Some(0))) {
        println!("Double-sided disk with separate sides");
    } else {
        println!("Double-sided disk");
    }

    if let Some((log_cyl,_)) = sec0 {
        if log_cyl as usize * 2 == cyl {
            println!("Doublestepping required (40T disk in 80T drive)");
            drive.cyl_scale = 2;
        } else if log_cyl as usize == cyl * 2 {
            return Err(Box::new(Error::EightyInForty));
        } else if log_cyl as usize != cyl {
            warn!("mismatch between physical and logical cylinders");
            println!("Mismatch between physical and logical cylinders");
        }
    }
    Ok(())
}
