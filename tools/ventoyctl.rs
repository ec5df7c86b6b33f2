use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use ventoy_vbd::chain::codec;

#[derive(Parser)]
#[command(name = "ventoyctl")]
#[command(about = "Inspect and validate Ventoy-style chain descriptor blobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a chain blob and print a summary of its structure.
    Inspect {
        #[arg(value_name = "CHAIN_FILE")]
        chain_file: PathBuf,
    },
    /// Parse a chain blob and run its invariant checks, printing nothing
    /// but exiting non-zero if any invariant fails.
    Validate {
        #[arg(value_name = "CHAIN_FILE")]
        chain_file: PathBuf,
    },
}

fn inspect(chain_file: &PathBuf) -> Result<()> {
    let bytes = fs::read(chain_file)
        .with_context(|| format!("reading chain blob at {}", chain_file.display()))?;
    let chain = codec::load(&bytes).context("parsing chain blob")?;

    println!("disk_drive: 0x{:02X}", chain.disk_drive);
    println!("disk_sector_size: {}", chain.disk_sector_size.bytes());
    println!("real_img_size: {} bytes ({} sectors)", chain.real_img_size, chain.real_img_sectors());
    println!("virt_img_size: {} bytes ({} sectors)", chain.virt_img_size, chain.virt_img_sectors());
    println!("memdisk: {}", chain.memdisk);
    println!("img_chunks: {}", chain.img_chunks.len());
    for (i, c) in chain.img_chunks.iter().enumerate() {
        println!(
            "  [{i}] img {}..={} -> disk {}..={}",
            c.img_start_sector, c.img_end_sector, c.disk_start_sector, c.disk_end_sector
        );
    }
    println!("override_chunks: {}", chain.override_chunks.len());
    for (i, o) in chain.override_chunks.iter().enumerate() {
        println!("  [{i}] img_offset={} size={}", o.img_offset, o.override_size());
    }
    println!("virt_chunks: {}", chain.virt_chunks.len());
    for (i, v) in chain.virt_chunks.iter().enumerate() {
        println!(
            "  [{i}] mem {}..{} remap {}..{} org_start={}",
            v.mem_sector_start, v.mem_sector_end, v.remap_sector_start, v.remap_sector_end, v.org_sector_start
        );
    }
    println!("file_replace: {}", chain.file_replace.is_some());
    println!("image_path: {}", chain.os_param.image_path);

    Ok(())
}

fn validate(chain_file: &PathBuf) -> Result<()> {
    let bytes = fs::read(chain_file)
        .with_context(|| format!("reading chain blob at {}", chain_file.display()))?;
    codec::load(&bytes).context("chain blob failed validation")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Inspect { chain_file } => inspect(chain_file),
        Commands::Validate { chain_file } => validate(chain_file),
    }
}
