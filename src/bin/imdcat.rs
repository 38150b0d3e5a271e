//! # imdcat CLI
//!
//! Argument parsing only; the work happens in `commands::cat`.
//! The auto short help flag is disabled because `-h` selects input heads.

use clap::{arg,Arg,ArgAction,Command,ErrorKind};
use std::str::FromStr;
use dumpfloppy::commands::cat::{cat,CatConfig};
use dumpfloppy::flat::{FlattenOptions,Range};
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
    let cmd = Command::new("imdcat")
        .about("Process ImageDisk .IMD files.")
        .disable_help_flag(true)
        .arg(arg!(--help "print help information").action(ArgAction::Help))
        .arg(arg!(-n --comment "write comment to stdout").action(ArgAction::SetTrue))
        .arg(arg!(-o --output <FILE> "write sector data to flat file").required(false))
        .arg(arg!(-v --verbose "describe loaded image (default action)").action(ArgAction::SetTrue))
        .arg(arg!(-x --hexdump "show hexdump of data in image").action(ArgAction::SetTrue))
        .arg(arg!(-p --permissive "ignore duplicated input sectors").action(ArgAction::SetTrue))
        .arg(Arg::new("in-cyls").short('c').long("in-cyls").value_name("RANGE")
            .help("limit input cylinders (default all)").takes_value(true))
        .arg(Arg::new("in-heads").short('h').long("in-heads").value_name("RANGE")
            .help("limit input heads (default all)").takes_value(true))
        .arg(Arg::new("in-sectors").short('s').long("in-sectors").value_name("RANGE")
            .help("limit input sectors (default all)").takes_value(true))
        .arg(Arg::new("out-cyls").short('C').long("out-cyls").value_name("RANGE")
            .help("output cylinders (default autodetect)").takes_value(true))
        .arg(Arg::new("out-heads").short('H').long("out-heads").value_name("RANGE")
            .help("output heads (default autodetect)").takes_value(true))
        .arg(Arg::new("out-sectors").short('S').long("out-sectors").value_name("RANGE")
            .help("output sectors (default autodetect)").takes_value(true))
        .arg(arg!(<IMAGE> "IMD image to read"))
        .after_help(
"Ranges are in the form FIRST:LAST, FIRST:, :LAST or ONLY, inclusive.");

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

    let parse_range = |name: &str| -> Result<Range,DYNERR> {
        match matches.value_of(name) {
            Some(s) => match Range::from_str(s) {
                Ok(range) => Ok(range),
                Err(e) => {
                    eprintln!("{}",e);
                    std::process::exit(1);
                }
            },
            None => Ok(Range::all())
        }
    };

    let show_comment = matches.get_flag("comment");
    let flat_filename = matches.value_of("output").map(|s| s.to_string());
    let show_data = matches.get_flag("hexdump");
    let mut verbose = matches.get_flag("verbose");
    if !show_comment && flat_filename.is_none() {
        verbose = true;
    }
    if show_data {
        verbose = true;
    }

    let cfg = CatConfig {
        image_filename: matches.value_of("IMAGE").expect(RCH).to_string(),
        show_comment,
        flat_filename,
        verbose,
        show_data,
        flatten: FlattenOptions {
            in_cyls: parse_range("in-cyls")?,
            in_heads: parse_range("in-heads")?,
            in_sectors: parse_range("in-sectors")?,
            out_cyls: parse_range("out-cyls")?,
            out_heads: parse_range("out-heads")?,
            out_sectors: parse_range("out-sectors")?,
            permissive: matches.get_flag("permissive")
        }
    };

    cat(&cfg)
}
