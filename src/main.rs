//! Disk-image assembler for this kernel (SPEC_FULL §6 "Boot").
//!
//! Burns the real-mode MBR and stage-2 bootloader (`fzboot::mbr`, `fzboot::real`, unrelated
//! workspace members) into `boot.img`, then writes this kernel's own `-live`/`-silent`/
//! `-root=XXXX` boot command line (parsed by [`boot::args::args_parse`] at runtime from the
//! multiboot command-line field) as a NUL-terminated ASCII string right after stage 2, where
//! it reads it back to forward into the multiboot info structure.

use std::error::Error;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const CMDLINE_OFFSET: u64 = 0x4000;
const CMDLINE_MAX_LEN: usize = 256;

struct Args {
    live: bool,
    silent: bool,
    root: Option<String>,
}

fn parse_args() -> Args {
    let mut args = Args { live: false, silent: false, root: None };
    for arg in std::env::args().skip(1) {
        if arg == "-live" {
            args.live = true;
        } else if arg == "-silent" {
            args.silent = true;
        } else if let Some(vol) = arg.strip_prefix("-root=") {
            args.root = Some(vol.to_string());
        }
    }
    args
}

fn cmdline_of(args: &Args) -> String {
    let mut tokens = Vec::new();
    if args.live {
        tokens.push("-live".to_string());
    }
    if args.silent {
        tokens.push("-silent".to_string());
    }
    if let Some(root) = &args.root {
        tokens.push(format!("-root={root}"));
    }
    tokens.join(" ")
}

fn burn_stage(writer: &mut BufWriter<&fs::File>, path: &str) -> Result<(), Box<dyn Error>> {
    let file = fs::File::open(path)?;
    let bytes = BufReader::new(file).bytes().collect::<io::Result<Vec<u8>>>()?;
    writer.write_all(&bytes)?;
    Ok(())
}

fn write_to_disk(path: &Path, args: &Args) -> Result<(), Box<dyn Error>> {
    let disk_img = fs::OpenOptions::new().write(true).truncate(false).create(true).open(path)?;
    let mut writer = BufWriter::new(&disk_img);

    println!("Burn MBR to disk image");
    writer.seek(SeekFrom::Start(0))?;
    burn_stage(&mut writer, "target/f-initmbr/x86_64-fbios/release/f-initmbr.bin")?;
    println!("MBR done!");

    println!("Burn bootloader stage 2 to disk image");
    burn_stage(&mut writer, "target/f-init/x86_64-fbios/release/f-init.bin")?;
    println!("Bootloader done!");

    let cmdline = cmdline_of(args);
    if cmdline.len() >= CMDLINE_MAX_LEN {
        return Err("boot command line too long".into());
    }
    println!("Writing boot command line: \"{cmdline}\"");
    writer.seek(SeekFrom::Start(CMDLINE_OFFSET))?;
    writer.write_all(cmdline.as_bytes())?;
    writer.write_all(&[0u8])?;

    Ok(())
}

fn main() {
    let args = parse_args();
    let disk_path: &Path = Path::new("./boot.img");
    write_to_disk(disk_path, &args).unwrap();
}
