//! ## dumpfloppy driver
//!
//! Orchestrates a whole acquisition: geometry detection, per-track probe
//! and read with retries, and incremental IMD output.  The image is
//! flushed after every track so an aborted run still leaves a valid IMD
//! prefix, which a later run can resume from with the retry option.

use std::fs::File;
use std::io::{self,BufReader,BufWriter,Read,Write};
use std::path::Path;
use log::{debug,info};
use crate::capture::{probe_disk,read_track};
use crate::disk::{Disk,TrackStatus};
use crate::fdc::{Drive,RawFdc};
use crate::imd::{read_imd,write_imd_header,write_imd_track};
use crate::STDRESULT;
use super::CommandError;

pub struct DumpConfig {
    pub drive: usize,
    /// Forced physical track count; None means ask the BIOS.
    pub tracks: Option<usize>,
    /// Probe every track instead of guessing from its neighbour.
    pub always_probe: bool,
    /// Append comment text from stdin.
    pub read_comment: bool,
    /// Discard sector IDs with this logical number while probing.
    pub ignore_sector: Option<u8>,
    /// Attempts per track before moving on.
    pub max_tries: usize,
    /// Resume from an existing image, retrying its failed reads.
    pub retry: bool,
    pub image_filename: String
}

/// Run one acquisition.  The transport is opened through `open_fdc` only
/// once the image path and options have been validated, so impossible
/// requests are refused without touching the drive.
pub fn dump<F>(open_fdc: F,cfg: &DumpConfig) -> STDRESULT
where F: FnOnce() -> Result<Box<dyn RawFdc>,crate::DYNERR> {
    let exists = Path::new(&cfg.image_filename).exists();
    if exists && !cfg.retry {
        return Err(Box::new(CommandError::ImageExists(cfg.image_filename.clone())));
    }
    if !exists && cfg.retry {
        return Err(Box::new(CommandError::ImageMissing(cfg.image_filename.clone())));
    }
    let resuming = cfg.retry;

    // On a resume the prior image supplies the whole model, layouts included.
    let mut disk = match resuming {
        true => {
            let file = File::open(&cfg.image_filename)?;
            let disk = read_imd(&mut BufReader::new(file))?;
            println!("Loaded prior image. Retrying failed reads...");
            disk
        },
        false => {
            let mut disk = Disk::new();
            disk.timestamp_comment(env!("CARGO_PKG_NAME"),env!("CARGO_PKG_VERSION"));
            disk
        }
    };

    if cfg.read_comment {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("Enter comment, terminated by EOF");
        }
        io::stdin().read_to_end(&mut disk.comment)?;
    }

    let mut drive = Drive::new(open_fdc()?,cfg.drive);

    // The BIOS count is only a default (there's no BIOS type for an
    // 80-track 5.25" DD drive, for one), but failing to fetch it means the
    // device is not answering at all.
    let bios_tracks = drive.drive_tracks()?;
    drive.reset()?;
    // Twice, in case the head was parked beyond track 80.
    for _ in 0..2 {
        drive.recalibrate()?;
    }

    if resuming {
        println!("Using previously probed disk cyls/heads from {}",cfg.image_filename);
    } else {
        disk.num_phys_cyls = match cfg.tracks {
            Some(tracks) => tracks,
            None => bios_tracks as usize
        };
        disk.num_phys_heads = 2;
        probe_disk(&mut drive,&mut disk,cfg.ignore_sector)?;
        disk.num_phys_cyls /= drive.cyl_scale;
    }
    debug!("dumping {} cylinders, {} heads",disk.num_phys_cyls,disk.num_phys_heads);

    let mut image = BufWriter::new(File::create(&cfg.image_filename)?);
    write_imd_header(&disk,&mut image)?;

    for cyl in 0..disk.num_phys_cyls {
        for head in 0..disk.num_phys_heads {
            if cfg.always_probe || resuming {
                // Don't assume a layout.
            } else if cyl > 0 {
                // Guess the layout of the previous cylinder on this head.
                disk.inherit_track_layout(cyl,head);
            }

            let track = disk.track_mut(cyl,head);
            for _try_num in 0..cfg.max_tries {
                if read_track(&mut drive,track,resuming,cfg.ignore_sector)? {
                    break;
                }
                if track.status == TrackStatus::Guessed {
                    // Maybe the guess was wrong.  Probe and try again.
                    track.reset();
                }
            }

            write_imd_track(disk.track(cyl,head),&mut image)?;
            image.flush()?;
        }
    }
    drop(image);
    info!("image written to {}",cfg.image_filename);

    let (good,bad,missing) = disk.sector_status_counts();
    println!("\nSector statuses:\nGood:    {}\nBad:     {}\nMissing: {}",good,bad,missing);
    Ok(())
}
