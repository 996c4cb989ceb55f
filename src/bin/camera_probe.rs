//! camera_probe - list usable local camera devices
//!
//! Tries `/dev/video0..N` and reports the devices that open, so a
//! deployment can pick a concrete device (or trust `auto`) before running
//! sentryd.

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "camera_probe", about = "Probe local camera devices")]
struct Args {
    /// Highest device index to try.
    #[arg(long, default_value_t = 5)]
    max_index: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    probe(args)
}

#[cfg(feature = "ingest-v4l2")]
fn probe(args: Args) -> Result<()> {
    let found = sentrycam::ingest::probe_cameras(args.max_index);
    if found.is_empty() {
        println!(
            "no usable camera found on /dev/video0..{}; if you have a USB \
             camera, connect it and rerun",
            args.max_index
        );
        return Ok(());
    }
    for camera in found {
        println!("{}: {}", camera.device, camera.card);
    }
    Ok(())
}

#[cfg(not(feature = "ingest-v4l2"))]
fn probe(_args: Args) -> Result<()> {
    anyhow::bail!("camera probing requires building with the ingest-v4l2 feature")
}
