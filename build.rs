//! Build script for voxrec
//!
//! Renders section-1 man pages from the clap definitions in `src/cli.rs`:
//! `voxrec.1` for the top-level options (config path, verbosity) and one
//! `voxrec-<command>.1` page each for `record`, `play`, `devices`, `check`
//! and `config`, listing that command's device, format and duration flags.

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs::{self, File};
use std::io::Error;
use std::path::PathBuf;

// Include the CLI module
include!("src/cli.rs");

fn main() -> Result<(), Error> {
    // Tell cargo to rerun if CLI definitions change
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=VOXREC_GEN_MANPAGES");

    // Only generate man pages for release builds or when explicitly requested
    let profile = env::var("PROFILE").unwrap_or_default();
    let generate = env::var("VOXREC_GEN_MANPAGES").is_ok() || profile == "release";

    if !generate {
        return Ok(());
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| "target".to_string()));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = Cli::command();

    // Generate main man page (voxrec.1)
    let man = Man::new(cmd.clone());
    let mut file = File::create(man_dir.join("voxrec.1"))?;
    man.render(&mut file)?;

    // One page per subcommand (voxrec-record.1, voxrec-play.1, ...)
    for subcommand in cmd.get_subcommands() {
        let name = subcommand.get_name();
        if name == "help" {
            continue;
        }

        // Title the page after the file so `man voxrec-record` shows VOXREC-RECORD
        let page = subcommand.clone().name(format!("voxrec-{}", name));
        let man = Man::new(page);
        let mut file = File::create(man_dir.join(format!("voxrec-{}.1", name)))?;
        man.render(&mut file)?;
    }

    println!(
        "cargo:warning=Man pages generated in: {}",
        man_dir.display()
    );

    Ok(())
}
