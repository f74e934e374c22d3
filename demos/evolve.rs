//! Evolves a picture through a series of random mutations, writing each generation to disk as a
//! binary PPM image.
//!
//! Usage: `cargo run --release --example evolve -- [OUTPUT_DIR] [SEED]`
//!
//! Set `RUST_LOG=debug` to follow each mutation.

use anyhow::{Context, Result};
use evopic::{Picture, Rasterizer};
use log::info;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

// Constants.

const WIDTH: usize = 512;
const HEIGHT: usize = 512;
const MUTATIONS: usize = 16;
const OUTPUT_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/target/evolve");

/// Write the RGB components of the RGBA `pixels` as a binary PPM.
fn write_ppm(path: &Path, pixels: &[u8], width: usize, height: usize) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write!(writer, "P6\n{} {}\n255\n", width, height)?;
    for pixel in pixels.chunks(4) {
        writer.write_all(&pixel[..3])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(OUTPUT_DIR));

    // A random number generator with a unique seed unless one was given.
    let seed = match args.next() {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("invalid seed {:?}", arg))?,
        None => rand::random(),
    };
    info!("RNG seed: {}", seed);
    let mut rng = XorShiftRng::seed_from_u64(seed);

    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut picture = Picture::generate(&mut rng);
    let mut rasterizer = Rasterizer::new();
    for generation in 0..=MUTATIONS {
        if generation > 0 {
            picture.mutate(&mut rng);
        }
        info!("Generation {}:\n{}", generation, picture);
        let pixels = rasterizer.rasterize(&picture, WIDTH, HEIGHT);
        let path = dir.join(format!("generation_{:03}.ppm", generation));
        write_ppm(&path, &pixels, WIDTH, HEIGHT)?;
    }

    info!("Wrote {} generations to {}", MUTATIONS + 1, dir.display());
    Ok(())
}
