use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Cross-compile the kernel-side tracepoint program.
    BuildEbpf {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target } => build_ebpf(&target)?,
    }

    Ok(())
}

fn build_ebpf(target: &str) -> Result<()> {
    // Always build in release mode: debug builds with recent Rust nightlies
    // pull in formatting code that's incompatible with the BPF linker, and
    // release LTO eliminates dead code.
    let mut cmd = Command::new("cargo");
    cmd.arg("+nightly")
        .arg("build")
        .arg("--package")
        .arg("exectrace-ebpf")
        .arg("--target")
        .arg(target)
        .arg("-Z")
        .arg("build-std=core")
        .arg("--release");
    let status = cmd.status().context("Failed to build eBPF program")?;

    if !status.success() {
        anyhow::bail!("Failed to build eBPF program");
    }

    // The agent loads this object at start; EXECTRACE_BPF_OBJECT overrides.
    let object: PathBuf = ["target", target, "release", "exectrace"].iter().collect();

    println!("✓ eBPF program built successfully");
    println!("  Object: {}", object.display());
    println!("  Run the agent from the workspace root, or set EXECTRACE_BPF_OBJECT");

    Ok(())
}
