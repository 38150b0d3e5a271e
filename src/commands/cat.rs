//! ## imdcat driver
//!
//! Loads an IMD image and then does some combination of: print the
//! comment, describe the contents, and flatten to a raw sector file.

use std::fs::File;
use std::io::{self,BufReader,BufWriter,Write};
use log::info;
use crate::flat::{write_flat,FlattenOptions};
use crate::imd::read_imd;
use crate::show::{show_comment,show_disk};
use crate::STDRESULT;

pub struct CatConfig {
    pub image_filename: String,
    pub show_comment: bool,
    pub flat_filename: Option<String>,
    pub verbose: bool,
    pub show_data: bool,
    pub flatten: FlattenOptions
}

pub fn cat(cfg: &CatConfig) -> STDRESULT {
    let file = File::open(&cfg.image_filename)?;
    let disk = read_imd(&mut BufReader::new(file))?;
    info!("loaded {} ({} cylinders, {} heads)",cfg.image_filename,disk.num_phys_cyls,disk.num_phys_heads);

    let mut stdout = io::stdout();
    if cfg.show_comment && !cfg.verbose {
        show_comment(&disk,&mut stdout)?;
    }
    if cfg.verbose {
        show_disk(&disk,cfg.show_data,&mut stdout)?;
    }
    stdout.flush()?;

    if let Some(flat_filename) = &cfg.flat_filename {
        let mut flat = BufWriter::new(File::create(flat_filename)?);
        let stdin = io::stdin();
        write_flat(&disk,&cfg.flatten,&mut stdin.lock(),&mut flat)?;
        flat.flush()?;
        info!("wrote flat image to {}",flat_filename);
    }
    Ok(())
}
