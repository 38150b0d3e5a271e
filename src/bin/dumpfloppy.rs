//! # dumpfloppy CLI
//!
//! Argument parsing only; the work happens in `commands::dump`.

use clap::{arg,ArgAction,Command,ErrorKind};
use std::str::FromStr;
use dumpfloppy::commands::{dump,CommandError};
use dumpfloppy::DYNERR;

const RCH: &str = "unreachable was reached";

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{}",e);
        std::process::exit(1);
    }
}

fn run() -> Result<(),DYNERR> {
    let cmd = Command::new("dumpfloppy")
        .about("Read a floppy disk using the PC controller into an IMD image.")
        .after_help(
"The drive geometry and the format of each track are probed, so nothing
needs to be known about the disk in advance.  Set the RUST_LOG environment
variable to control logging level.
  levels: trace,debug,info,warn,error")
        .arg(arg!(-a --probe "probe each track before reading").action(ArgAction::SetTrue))
        .arg(arg!(-d --drive <NUM> "drive number to read from").required(false).default_value("0"))
        .arg(arg!(-t --tracks <TRACKS> "drive has TRACKS tracks (default autodetect)").required(false))
        .arg(arg!(-C --comment "read comment from stdin").action(ArgAction::SetTrue))
        .arg(arg!(-S --ignore <SEC> "ignore sectors with logical ID SEC").required(false))
        .arg(arg!(-m --tries <NUM> "max reads of a failed track").required(false).default_value("10"))
        .arg(arg!(-r --retry "perform retry on existing IMD file").action(ArgAction::SetTrue))
        .arg(arg!(<IMAGE> "image file to write"));

    let matches = match cmd.try_get_matches() {
        Ok(matches) => matches,
        Err(e) if e.kind() == ErrorKind::DisplayHelp || e.kind() == ErrorKind::DisplayVersion => {
            e.print().expect(RCH);
            return Ok(());
        },
        Err(e) => {
            e.print().expect(RCH);
            std::process::exit(1);
        }
    };

    let parse_num = |name: &str| -> Result<usize,DYNERR> {
        match usize::from_str(matches.value_of(name).expect(RCH)) {
            Ok(v) => Ok(v),
            Err(_) => {
                eprintln!("{} must be a number",name);
                Err(Box::new(CommandError::OutOfRange))
            }
        }
    };

    let drive = parse_num("drive")?;
    if drive > 3 {
        eprintln!("drive number must be 0 to 3");
        return Err(Box::new(CommandError::OutOfRange));
    }
    let tracks = match matches.value_of("tracks") {
        Some(_) => Some(parse_num("tracks")?),
        None => None
    };
    let ignore_sector = match matches.value_of("ignore") {
        Some(s) => match u8::from_str(s) {
            Ok(v) => Some(v),
            Err(_) => {
                eprintln!("ignored sector ID must be 0 to 255");
                return Err(Box::new(CommandError::OutOfRange));
            }
        },
        None => None
    };

    let cfg = dump::DumpConfig {
        drive,
        tracks,
        always_probe: matches.get_flag("probe"),
        read_comment: matches.get_flag("comment"),
        ignore_sector,
        max_tries: parse_num("tries")?,
        retry: matches.get_flag("retry"),
        image_filename: matches.value_of("IMAGE").expect(RCH).to_string()
    };

    dump::dump(|| open_fdc(drive),&cfg)
}

#[cfg(target_os = "linux")]
fn open_fdc(drive: usize) -> Result<Box<dyn dumpfloppy::fdc::RawFdc>,DYNERR> {
    use dumpfloppy::fdc::linux::LinuxFdc;
    Ok(Box::new(LinuxFdc::open(drive)?))
}

#[cfg(not(target_os = "linux"))]
fn open_fdc(_drive: usize) -> Result<Box<dyn dumpfloppy::fdc::RawFdc>,DYNERR> {
    eprintln!("dumpfloppy needs the Linux raw floppy driver");
    Err(Box::new(CommandError::Unsupported))
}
