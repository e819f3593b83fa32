#![allow(dead_code)]
//! Helpers to write small test inputs.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const MAGIC: i32 = 1995;

/// A rectangular box of 2.5 nm, written row by row.
pub const BOXVEC: [f32; 9] = [2.5, 0.0, 0.0, 0.0, 2.5, 0.0, 0.0, 0.0, 2.5];

/// Writes one xtc frame of at most 9 atoms, which the format stores uncompressed.
pub fn write_small_frame(
    out: &mut impl Write,
    step: i32,
    time: f32,
    positions: &[[f32; 3]],
) -> io::Result<()> {
    assert!(positions.len() <= 9, "frames of more than 9 atoms are compressed");
    let natoms = positions.len() as i32;
    out.write_all(&MAGIC.to_be_bytes())?;
    out.write_all(&natoms.to_be_bytes())?;
    out.write_all(&step.to_be_bytes())?;
    out.write_all(&time.to_be_bytes())?;
    for v in BOXVEC {
        out.write_all(&v.to_be_bytes())?;
    }
    out.write_all(&natoms.to_be_bytes())?;
    for v in positions.iter().flatten() {
        out.write_all(&v.to_be_bytes())?;
    }
    Ok(())
}

/// Writes a trajectory of `nframes` frames in which atom `i` of frame `f` sits at
/// `(f, i, 0.25 * i)`, with frame `f` at time `0.5 * f` ps.
pub fn write_small_trajectory(path: &Path, natoms: usize, nframes: usize) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for f in 0..nframes {
        let positions: Vec<_> = (0..natoms)
            .map(|i| [f as f32, i as f32, 0.25 * i as f32])
            .collect();
        write_small_frame(&mut out, f as i32 * 100, 0.5 * f as f32, &positions)?;
    }
    out.flush()
}

/// Formats one gro atom record.
pub fn gro_record(idx: usize, name: &str) -> String {
    format!(
        "{:>5}{:<5}{:>5}{:>5}{:>8.3}{:>8.3}{:>8.3}",
        1 + idx / 3,
        "SOL",
        name,
        idx + 1,
        0.0,
        0.0,
        0.0
    )
}

/// Writes a gro file with the given atom names, closed by a box line.
pub fn write_gro(path: &Path, names: &[&str]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "Generated structure")?;
    writeln!(out, "{:>5}", names.len())?;
    for (idx, name) in names.iter().enumerate() {
        writeln!(out, "{}", gro_record(idx, name))?;
    }
    writeln!(out, "   2.50000   2.50000   2.50000")?;
    out.flush()
}

/// Counts the frame blocks in converter output.
pub fn count_blocks(text: &str) -> usize {
    text.lines()
        .filter(|line| line.starts_with("=============Frame="))
        .count()
}
