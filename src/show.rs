//! # Disk Listings
//!
//! Prints summaries of a disk model: one line per track with a cell per
//! sector, and optionally the sector payloads as a `hexdump -C` style
//! listing.

use std::io::Write;
use crate::disk::{sector_bytes,Disk,Sector,SectorStatus,Track,SIZE_CODE_UNSET};
use crate::STDRESULT;

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("Unexpected multidata on a non-bad sector")]
    UnexpectedMultidata
}

fn show_mode(track: &Track,out: &mut impl Write) -> STDRESULT {
    match track.data_mode {
        Some(mode) => write!(out,"{}",mode)?,
        None => write!(out,"-")?
    }
    Ok(())
}

fn show_sector(sector: &Sector,out: &mut impl Write) -> STDRESULT {
    let label = match sector.status {
        SectorStatus::Missing => {
            write!(out,"  . ")?;
            return Ok(());
        },
        SectorStatus::Bad => '?',
        SectorStatus::Good if sector.deleted => 'x',
        SectorStatus::Good => '+'
    };
    write!(out,"{:3}{}",sector.log_sector,label)?;
    Ok(())
}

pub fn show_track(track: &Track,out: &mut impl Write) -> STDRESULT {
    show_mode(track,out)?;
    // An unreadable track has no sector size of its own.
    let size = match track.sector_size_code {
        SIZE_CODE_UNSET => 0,
        code => sector_bytes(code)
    };
    write!(out," {}x{}",track.num_sectors(),size)?;
    for sector in &track.sectors {
        show_sector(sector,out)?;
    }
    Ok(())
}

/// Hex and ASCII columns for every reading of every sector in the track.
pub fn show_track_data(track: &Track,out: &mut impl Write) -> STDRESULT {
    for (phys_sec,sector) in track.sectors.iter().enumerate() {
        if sector.status == SectorStatus::Missing {
            continue;
        }
        let data_len = sector_bytes(track.sector_size_code);
        write!(out,"Physical C {} H {} S {}, logical C {} H {} S {}",
            track.phys_cyl,track.phys_head,phys_sec,
            sector.log_cyl,sector.log_head,sector.log_sector)?;
        if sector.status == SectorStatus::Bad {
            write!(out," (unique bad datas: {})",sector.datas.len())?;
        } else if sector.datas.len() != 1 {
            return Err(Box::new(Error::UnexpectedMultidata));
        }
        writeln!(out,":")?;

        for (data,count) in sector.datas.iter() {
            if count > 1 {
                writeln!(out,"Data count: {}",count)?;
            }
            let line_len = 16;
            for i in (0..data_len).step_by(line_len) {
                write!(out,"{:04x} ",i)?;
                for j in 0..line_len {
                    match data.get(i + j) {
                        Some(byte) => write!(out," {:02x}",byte)?,
                        None => write!(out,"   ")?
                    }
                }
                write!(out,"  |")?;
                for j in 0..line_len {
                    match data.get(i + j) {
                        Some(&c) if c >= 32 && c < 127 => write!(out,"{}",c as char)?,
                        Some(_) => write!(out,".")?,
                        None => write!(out," ")?
                    }
                }
                writeln!(out,"|")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn show_comment(disk: &Disk,out: &mut impl Write) -> STDRESULT {
    out.write_all(&disk.comment)?;
    Ok(())
}

pub fn show_disk(disk: &Disk,with_data: bool,out: &mut impl Write) -> STDRESULT {
    show_comment(disk,out)?;
    writeln!(out)?;
    for phys_cyl in 0..disk.num_phys_cyls {
        for phys_head in 0..disk.num_phys_heads {
            write!(out,"{:2}.{}:",phys_cyl,phys_head)?;
            show_track(disk.track(phys_cyl,phys_head),out)?;
            writeln!(out)?;
            if with_data {
                writeln!(out)?;
                show_track_data(disk.track(phys_cyl,phys_head),out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{Sector,TrackStatus,DATA_MODES};

    fn listing(track: &Track) -> String {
        let mut out = Vec::new();
        show_track(track,&mut out).expect("listing failed");
        String::from_utf8(out).expect("listing was not UTF-8")
    }

    #[test]
    fn track_line_cells() {
        let mut track = Track::new(0,0);
        track.status = TrackStatus::Probed;
        track.data_mode = Some(&DATA_MODES[0]);
        track.sector_size_code = 2;
        let mut good = Sector::new();
        good.status = SectorStatus::Good;
        good.log_sector = 1;
        good.datas.insert_if_absent(vec![0; 512],1);
        let mut bad = good.clone();
        bad.status = SectorStatus::Bad;
        bad.log_sector = 2;
        let mut deleted = good.clone();
        deleted.deleted = true;
        deleted.log_sector = 3;
        let missing = Sector::new();
        track.sectors = vec![good,bad,deleted,missing];
        assert_eq!(listing(&track),"MFM-250k 4x512  1+  2?  3x  . ");
    }

    #[test]
    fn unknown_track_shows_a_dash() {
        let track = Track::new(0,0);
        assert_eq!(listing(&track),"- 0x0");
    }

    #[test]
    fn hexdump_shape() {
        let mut track = Track::new(1,0);
        track.status = TrackStatus::Probed;
        track.data_mode = Some(&DATA_MODES[0]);
        track.sector_size_code = 0;
        let mut sector = Sector::new();
        sector.status = SectorStatus::Good;
        sector.log_cyl = 1;
        sector.log_head = 0;
        sector.log_sector = 5;
        let mut payload = vec![0x00u8; 128];
        payload[..2].copy_from_slice(b"Hi");
        sector.datas.insert_if_absent(payload,1);
        track.sectors = vec![sector];
        let mut out = Vec::new();
        show_track_data(&track,&mut out).expect("hexdump failed");
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Physical C 1 H 0 S 0, logical C 1 H 0 S 5:\n"));
        assert!(text.contains("0000  48 69 00"));
        assert!(text.contains("|Hi.............."));
    }

    #[test]
    fn multidata_on_a_good_sector_is_an_error() {
        let mut track = Track::new(0,0);
        track.status = TrackStatus::Probed;
        track.data_mode = Some(&DATA_MODES[0]);
        track.sector_size_code = 0;
        let mut sector = Sector::new();
        sector.status = SectorStatus::Good;
        sector.log_sector = 1;
        sector.datas.insert_if_absent(vec![0; 128],1);
        sector.datas.insert_if_absent(vec![1; 128],1);
        track.sectors = vec![sector];
        let mut out = Vec::new();
        assert!(show_track_data(&track,&mut out).is_err());
    }
}
