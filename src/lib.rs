//! # `dumpfloppy` main library
//!
//! This library reads FM/MFM floppy disks through a PC-style controller
//! into ImageDisk (IMD) images, and converts such images into flat sector
//! dumps.  Unlike a block-level copy it has to *discover* what is on the
//! disk: encoding and bit rate, sector size, sector numbering, sidedness,
//! and 40- versus 80-track stepping, while tolerating the read errors that
//! come with aged media.
//!
//! ## Architecture
//!
//! * `fdc` submits single raw controller commands through the `RawFdc`
//!   capability (the Linux fdrawcmd interface in production, a scripted
//!   fake in tests)
//! * `capture` turns raw READ ID / READ DATA outcomes into a probed and
//!   populated track model, with multi-read evidence for bad sectors
//! * `disk` is the in-memory model: disk owns tracks, track owns sectors,
//!   sector owns its readings
//! * `imd` is the byte-exact container codec, including the multi-read
//!   extensions
//! * `flat` linearizes the model into a plain sector stream
//! * `show` prints human-readable listings
//! * `commands` holds the two tool drivers, configured by plain records
//!
//! The techniques used for probing are based on the "How to identify an
//! unknown disk" document from the fdutils project:
//! <http://www.fdutils.linux.lu/disk-id.html>
//!
//! Set the RUST_LOG environment variable to control logging level.

pub mod disk;
pub mod fdc;
pub mod capture;
pub mod imd;
pub mod flat;
pub mod show;
pub mod commands;

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(),Box<dyn std::error::Error>>;
