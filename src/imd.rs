//! # IMD Container Codec
//!
//! Reads and writes ImageDisk .IMD files: a free-form comment terminated by
//! 0x1A, then track records to end of file.  Each track record is a 5-byte
//! header, a sector-ID map, optional logical-cylinder and logical-head maps,
//! and one Sector Data Record chain per sector.
//!
//! Two local extensions to IMD 1.18 are carried: data mode 6 (MFM-1000k)
//! and multi-read evidence for bad sectors, where additional readings
//! follow the first (ANOTHER-DATA-FOLLOWS) with an optional big-endian read
//! count (HAS-DATA-COUNT).  The SDR type byte combines its flags by
//! addition, not OR, so decoding is a fixed subtraction sequence in
//! descending flag order; testing bits instead goes subtly wrong when
//! HAS-DATA-COUNT and IS-ERROR coexist.

use std::io::{self,Read,Write};
use log::{debug,trace,warn};
use crate::disk::{
    mode_from_imd,sector_bytes,Disk,SectorStatus,Track,TrackStatus,
    MAX_HEADS,SIZE_CODE_UNSET
};
use crate::{DYNERR,STDRESULT};

pub const END_OF_COMMENT: u8 = 0x1A;

pub const HEAD_MASK: u8 = 0x03;
pub const NEED_CYL_MAP: u8 = 0x80;
pub const NEED_HEAD_MAP: u8 = 0x40;
const ALL_FLAGS: u8 = HEAD_MASK | NEED_CYL_MAP | NEED_HEAD_MAP;

// Sector Data Record flags, combined by + rather than |.
const SDR_DATA: u8 = 0x01;
const SDR_IS_COMPRESSED: u8 = 0x01;
const SDR_IS_DELETED: u8 = 0x02;
const SDR_IS_ERROR: u8 = 0x04;
/// Extension to the original .IMD format.
const SDR_ANOTHER_DATA_FOLLOWS: u8 = 0x08;
/// Extension to the original .IMD format.
const SDR_HAS_DATA_COUNT: u8 = 0x10;

#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("Couldn't find IMD comment delimiter")]
    UnterminatedComment,
    #[error("Couldn't read IMD track header")]
    TruncatedTrackHeader,
    #[error("IMD track has unsupported flags: {0:02x}")]
    UnsupportedFlags(u8),
    #[error("IMD track head value too large: {0}")]
    HeadTooLarge(u8),
    #[error("IMD track mode unknown: {0}")]
    UnknownMode(u8),
    #[error("IMD variable sector size extension not supported")]
    VariableSectorSize,
    #[error("IMD sector size code out of range: {0}")]
    BadSizeCode(u8),
    #[error("IMD file describes cylinder {0} head {1} twice")]
    DuplicateTrack(u8,u8),
    #[error("Couldn't read IMD sector map")]
    TruncatedMap,
    #[error("Couldn't read IMD sector data")]
    TruncatedData,
    #[error("IMD sector has unsupported flags: {0:02x}")]
    UnsupportedSdrFlags(u8),
    #[error("IMD multi-read data count must exceed 1")]
    BadDataCount,
    #[error("unexpected duplicate data in sector")]
    DuplicateData
}

fn read_u8<R: Read>(image: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    image.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_bytes<R: Read>(image: &mut R,len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    image.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn is_slice_uniform(slice: &[u8]) -> bool {
    match slice.first() {
        Some(first) => slice.iter().all(|b| b == first),
        None => true
    }
}

/// Read one track record into the disk.  Ok(false) is a clean end of file.
fn read_track<R: Read>(image: &mut R,disk: &mut Disk) -> Result<bool,DYNERR> {
    let mut header = [0u8; 5];
    match image.read(&mut header[..1]) {
        Ok(0) => return Ok(false),
        Ok(_) => {},
        Err(e) => return Err(Box::new(e))
    }
    image.read_exact(&mut header[1..]).map_err(|_| Error::TruncatedTrackHeader)?;

    let phys_cyl = header[1];
    if phys_cyl as usize >= disk.num_phys_cyls {
        disk.num_phys_cyls = phys_cyl as usize + 1;
    }

    if header[2] & !ALL_FLAGS != 0 {
        return Err(Box::new(Error::UnsupportedFlags(header[2])));
    }
    let phys_head = header[2] & HEAD_MASK;
    if phys_head as usize >= MAX_HEADS {
        return Err(Box::new(Error::HeadTooLarge(phys_head)));
    }
    if phys_head as usize >= disk.num_phys_heads {
        disk.num_phys_heads = phys_head as usize + 1;
    }

    let data_mode = match mode_from_imd(header[0]) {
        Some(mode) => mode,
        None => return Err(Box::new(Error::UnknownMode(header[0])))
    };

    let track = disk.track_mut(phys_cyl as usize,phys_head as usize);
    if track.status != TrackStatus::Unknown {
        return Err(Box::new(Error::DuplicateTrack(phys_cyl,phys_head)));
    }
    track.status = TrackStatus::Probed;
    track.data_mode = Some(data_mode);
    let num_sectors = header[3] as usize;
    track.sector_size_code = header[4];
    debug!("cylinder {} head {}: {} sectors, size code {}",phys_cyl,phys_head,num_sectors,header[4]);
    if num_sectors == 0 {
        // A completely unreadable track has no sectors (and usually size
        // code 0xFF); there is nothing further in its record.
        return Ok(true);
    }
    if track.sector_size_code == SIZE_CODE_UNSET {
        return Err(Box::new(Error::VariableSectorSize));
    }
    if track.sector_size_code > 7 {
        return Err(Box::new(Error::BadSizeCode(track.sector_size_code)));
    }
    let sector_size = sector_bytes(track.sector_size_code);

    let sec_map = read_bytes(image,num_sectors).map_err(|_| Error::TruncatedMap)?;
    let cyl_map = match header[2] & NEED_CYL_MAP {
        0 => vec![phys_cyl; num_sectors],
        _ => {
            trace!("cylinder map present");
            read_bytes(image,num_sectors).map_err(|_| Error::TruncatedMap)?
        }
    };
    let head_map = match header[2] & NEED_HEAD_MAP {
        0 => vec![phys_head; num_sectors],
        _ => {
            trace!("head map present");
            read_bytes(image,num_sectors).map_err(|_| Error::TruncatedMap)?
        }
    };

    for phys_sec in 0..num_sectors {
        let mut sector = crate::disk::Sector::new();
        sector.log_cyl = cyl_map[phys_sec];
        sector.log_head = head_map[phys_sec];
        sector.log_sector = sec_map[phys_sec];

        let mut first_read = true;
        let mut have_data_to_read = true;
        while have_data_to_read {
            have_data_to_read = false;
            let orig_type = read_u8(image).map_err(|_| Error::TruncatedData)?;
            if orig_type > 0 {
                // The flags were added in, so peel them off largest first.
                let mut typ = orig_type - SDR_DATA;
                let mut count = 1u32;
                if typ >= SDR_HAS_DATA_COUNT {
                    typ -= SDR_HAS_DATA_COUNT;
                    let buf = read_bytes(image,4).map_err(|_| Error::TruncatedData)?;
                    count = u32::from_be_bytes([buf[0],buf[1],buf[2],buf[3]]);
                    if count <= 1 {
                        return Err(Box::new(Error::BadDataCount));
                    }
                }
                if typ >= SDR_ANOTHER_DATA_FOLLOWS {
                    typ -= SDR_ANOTHER_DATA_FOLLOWS;
                    have_data_to_read = true;
                }
                if typ >= SDR_IS_ERROR {
                    if !first_read {
                        return Err(Box::new(Error::UnsupportedSdrFlags(orig_type)));
                    }
                    typ -= SDR_IS_ERROR;
                    sector.status = SectorStatus::Bad;
                } else if first_read {
                    sector.status = SectorStatus::Good;
                }
                if typ >= SDR_IS_DELETED {
                    if !first_read {
                        return Err(Box::new(Error::UnsupportedSdrFlags(orig_type)));
                    }
                    typ -= SDR_IS_DELETED;
                    sector.deleted = true;
                }
                let this_data = match typ >= SDR_IS_COMPRESSED {
                    true => {
                        typ -= SDR_IS_COMPRESSED;
                        let fill = read_u8(image).map_err(|_| Error::TruncatedData)?;
                        vec![fill; sector_size]
                    },
                    false => read_bytes(image,sector_size).map_err(|_| Error::TruncatedData)?
                };
                if typ != 0 {
                    return Err(Box::new(Error::UnsupportedSdrFlags(orig_type)));
                }
                if sector.datas.insert_unique(this_data,count).is_err() {
                    return Err(Box::new(Error::DuplicateData));
                }
            }
            first_read = false;
        }
        track.sectors.push(sector);
    }

    Ok(true)
}

/// Parse a whole IMD stream into a fresh disk model.
pub fn read_imd<R: Read>(image: &mut R) -> Result<Disk,DYNERR> {
    let mut disk = Disk::new();

    // The comment runs up to the delimiter, which is consumed but not kept.
    loop {
        match read_u8(image) {
            Ok(END_OF_COMMENT) => break,
            Ok(byte) => disk.comment.push(byte),
            Err(_) => return Err(Box::new(Error::UnterminatedComment))
        }
    }

    while read_track(image,&mut disk)? {
        // Nothing.
    }
    Ok(disk)
}

/// Write the comment and its delimiter.
pub fn write_imd_header<W: Write>(disk: &Disk,image: &mut W) -> STDRESULT {
    image.write_all(&disk.comment)?;
    image.write_all(&[END_OF_COMMENT])?;
    Ok(())
}

/// Write one track record.
pub fn write_imd_track<W: Write>(track: &Track,image: &mut W) -> STDRESULT {
    let mut flags = 0u8;
    let mut sec_map = Vec::new();
    let mut cyl_map = Vec::new();
    let mut head_map = Vec::new();
    for sector in &track.sectors {
        sec_map.push(sector.log_sector);
        cyl_map.push(sector.log_cyl);
        head_map.push(sector.log_head);
        if sector.log_cyl != track.phys_cyl {
            flags |= NEED_CYL_MAP;
        }
        if sector.log_head != track.phys_head {
            flags |= NEED_HEAD_MAP;
        }
    }
    if flags & NEED_CYL_MAP != 0 {
        warn!("cylinder {} head {} has a non-trivial cylinder map",track.phys_cyl,track.phys_head);
    }

    let mode_byte = match track.data_mode {
        Some(mode) => mode.imd_mode,
        // A track that never probed has no mode of its own; it is recorded
        // with no sectors, so the byte carries no information.
        None => 0
    };
    image.write_all(&[
        mode_byte,
        track.phys_cyl,
        flags | track.phys_head,
        track.num_sectors() as u8,
        track.sector_size_code
    ])?;

    image.write_all(&sec_map)?;
    if flags & NEED_CYL_MAP != 0 {
        image.write_all(&cyl_map)?;
    }
    if flags & NEED_HEAD_MAP != 0 {
        image.write_all(&head_map)?;
    }

    for sector in &track.sectors {
        assert!(sector.datas.is_empty() == (sector.status == SectorStatus::Missing));
        let mut typ = match sector.status {
            SectorStatus::Missing => 0,
            SectorStatus::Bad => SDR_DATA + SDR_IS_ERROR,
            SectorStatus::Good => SDR_DATA
        };
        if sector.deleted {
            assert!(!sector.datas.is_empty());
            typ += SDR_IS_DELETED;
        }

        if sector.datas.is_empty() {
            image.write_all(&[typ])?;
            continue;
        }
        let last = sector.datas.len() - 1;
        for (i,(data,count)) in sector.datas.iter().enumerate() {
            assert!(data.len() == sector_bytes(track.sector_size_code));
            let mut this_typ = typ;
            if count > 1 {
                this_typ += SDR_HAS_DATA_COUNT;
            }
            if i != last {
                this_typ += SDR_ANOTHER_DATA_FOLLOWS;
            }
            // A sector whose bytes are all identical is stored once with a
            // compression flag.
            let compress = is_slice_uniform(data);
            if compress {
                this_typ += SDR_IS_COMPRESSED;
            }
            image.write_all(&[this_typ])?;
            if count > 1 {
                image.write_all(&count.to_be_bytes())?;
            }
            if compress {
                image.write_all(&data[..1])?;
            } else {
                image.write_all(data)?;
            }
            // Only the first record of a chain carries error/deleted flags.
            typ = SDR_DATA;
        }
    }
    Ok(())
}

/// Write the whole model as one IMD stream, tracks in row-major order.
pub fn write_imd<W: Write>(disk: &Disk,image: &mut W) -> STDRESULT {
    write_imd_header(disk,image)?;
    for cyl in 0..disk.num_phys_cyls {
        for head in 0..disk.num_phys_heads {
            write_imd_track(disk.track(cyl,head),image)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_slices() {
        assert!(is_slice_uniform(&[]));
        assert!(is_slice_uniform(&[7;512]));
        assert!(!is_slice_uniform(&[1,1,2]));
    }

    #[test]
    fn comment_round_trip() {
        let text = b"dumpfloppy 1.0: 02/09/2013 14:30:00\r\n";
        let mut image = text.to_vec();
        image.push(END_OF_COMMENT);
        let disk = read_imd(&mut image.as_slice()).expect("parse failed");
        assert_eq!(disk.comment,text);
        let mut out = Vec::new();
        write_imd(&disk,&mut out).expect("write failed");
        assert_eq!(out,image);
    }

    #[test]
    fn unterminated_comment_is_fatal() {
        let image = b"no delimiter here".to_vec();
        assert!(read_imd(&mut image.as_slice()).is_err());
    }

    #[test]
    fn truncated_header_is_fatal() {
        let image = vec![END_OF_COMMENT,5,0];
        assert!(read_imd(&mut image.as_slice()).is_err());
    }

    #[test]
    fn bad_head_flags_are_fatal() {
        // flag 0x20 is outside the defined set
        let image = vec![END_OF_COMMENT,5,0,0x20,0,2];
        assert!(read_imd(&mut image.as_slice()).is_err());
    }
}
