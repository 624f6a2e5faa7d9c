//! Inspect MPO files.
//!
//! Usage: `readmpo <FILE> [--root /mpo] [--julia] [--dump DIR] [-v]`

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use readmpo::stock::write_stock_file;
use readmpo::{LoadOptions, MpoChain, MpoFile, SchemaDescriptor, SiteNaming, DEFAULT_ROOT};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "readmpo", about = "Describe an MPO stored in an HDF5 file")]
#[command(version)]
struct Cli {
    /// HDF5 file to read
    path: PathBuf,

    /// Group holding the MPO
    #[arg(long, default_value = DEFAULT_ROOT)]
    root: String,

    /// Site groups are named `MPO[1]`, `MPO[2]`, ... instead of `site_0`, `site_1`, ...
    #[arg(long)]
    julia: bool,

    /// Write every core as a stock file into this directory
    #[arg(long, value_name = "DIR")]
    dump: Option<PathBuf>,

    /// Log validation and decoding steps
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> LoadOptions {
        let naming = if self.julia {
            SiteNaming::julia()
        } else {
            SiteNaming::default()
        };
        LoadOptions::new()
            .with_root_group(self.root.clone())
            .with_naming(naming)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = cli.options();
    let mut file = MpoFile::open_with(&cli.path, &options)
        .with_context(|| format!("Failed to open {}", cli.path.display()))?;
    let descriptor = file
        .validate()
        .with_context(|| format!("{} is not a valid MPO", cli.path.display()))?
        .clone();
    let chain = file
        .assemble()
        .with_context(|| format!("Failed to decode {}", cli.path.display()))?;
    file.close();

    print!(
        "{}",
        Summary {
            descriptor: &descriptor,
            chain: &chain,
        }
    );

    if let Some(dir) = &cli.dump {
        dump(&chain, dir)?;
    }
    Ok(())
}

/// Human-readable summary of a validated file and its decoded cores.
struct Summary<'a> {
    descriptor: &'a SchemaDescriptor,
    chain: &'a MpoChain,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.descriptor;
        writeln!(f, "root:     {}", d.root)?;
        writeln!(f, "sites:    {}", d.n_sites)?;
        writeln!(f, "element:  {}", d.element)?;
        writeln!(f, "bonds:    {:?}", d.bond_dims())?;
        if !d.attributes.is_empty() {
            writeln!(f, "attrs:    {}", d.attributes.join(", "))?;
        }
        for (site, core) in d.sites.iter().zip(self.chain) {
            let labels: Vec<String> = core.labels().iter().map(|l| l.to_string()).collect();
            writeln!(
                f,
                "  [{}] {:<16} shape {:?} ({}) {}",
                site.index,
                site.path,
                core.shape(),
                labels.join(", "),
                site.layout.tag(),
            )?;
        }
        Ok(())
    }
}

fn dump(chain: &MpoChain, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (site, core) in chain.iter().enumerate() {
        let path = dir.join(format!("core_{site}.bin"));
        write_stock_file(&path, core)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(site, path = %path.display(), "dumped core");
    }
    println!("dumped {} cores to {}", chain.len(), dir.display());
    Ok(())
}
