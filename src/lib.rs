//! Convert xtc trajectories into plain-text xyz frames.
//!
//! Atom names are taken from a fixed-column gro structure file ([`read_atom_names`]), frames are
//! decoded by an [`XTCReader`], and a [`TrajectoryConverter`] writes one text block per frame.
use std::io::Read;
use std::path::Path;

use glam::{Mat3, Vec3};

use crate::reader::{
    read_boxvec, read_compressed_positions, read_f32, read_f32s, read_i32, read_magic,
};

pub mod convert;
pub mod error;
pub mod reader;
pub mod source;
pub mod structure;

pub use crate::convert::{ConversionReport, TrajectoryConverter, DEFAULT_CREDIT, DEFAULT_OUTPUT};
pub use crate::error::{ConvertError, StructureError, TrajectoryError};
pub use crate::source::{FrameRead, FrameSource};
pub use crate::structure::{read_atom_names, AtomName};

pub type BoxVec = Mat3;

#[derive(Debug, Default, Clone)]
pub struct Frame {
    pub step: u32,
    /// Time in picoseconds.
    pub time: f32,
    pub boxvec: BoxVec,
    /// Zero for frames with 9 or fewer atoms, which are stored uncompressed.
    pub precision: f32,
    /// Flat `x, y, z` positions in nanometers.
    pub positions: Vec<f32>,
}

impl Frame {
    pub fn natoms(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn coords(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions.chunks_exact(3).map(Vec3::from_slice)
    }
}

/// The fixed-size header that opens every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub natoms: usize,
    pub step: u32,
    /// Time in picoseconds.
    pub time: f32,
    pub boxvec: BoxVec,
}

#[derive(Debug, Clone)]
pub struct XTCReader<R> {
    pub file: R,
    frames_read: usize,
    /// The number of atoms established by the first frame.
    natoms: Option<usize>,
    /// Reused between frames to hold the compressed bytes.
    scratch: Vec<u8>,
}

impl XTCReader<std::fs::File> {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> XTCReader<R> {
    pub const MAGIC: i32 = 1995;

    pub fn new(reader: R) -> Self {
        Self {
            file: reader,
            frames_read: 0,
            natoms: None,
            scratch: Vec::new(),
        }
    }

    /// The number of frames that have been decoded so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Reads the header of the next frame, or `None` if the trajectory has no frames left.
    pub fn read_header(&mut self) -> Result<Option<Header>, TrajectoryError> {
        let file = &mut self.file;

        let Some(magic) = read_magic(file)? else {
            return Ok(None);
        };
        if magic != Self::MAGIC {
            return Err(TrajectoryError::BadMagic(magic));
        }
        let natoms = count("natoms", read_i32(file)?)?;
        let step = read_i32(file)?;
        let step = u32::try_from(step).map_err(|_| TrajectoryError::Negative {
            field: "step",
            value: step,
        })?;
        let time = read_f32(file)?;
        let boxvec = read_boxvec(file)?;
        let repeated = count("natoms", read_i32(file)?)?;
        if repeated != natoms {
            return Err(TrajectoryError::AtomCountRepeated { natoms, repeated });
        }

        Ok(Some(Header {
            natoms,
            step,
            time,
            boxvec,
        }))
    }

    /// Reads the next frame into `frame`, reusing its allocation.
    ///
    /// Returns [`FrameRead::EndOfStream`] when the trajectory ends cleanly at a frame boundary. A
    /// frame that is cut off halfway is an error.
    pub fn read_frame(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError> {
        let Some(header) = self.read_header()? else {
            return Ok(FrameRead::EndOfStream);
        };
        let natoms = header.natoms;
        if let Some(expected) = self.natoms {
            if expected != natoms {
                return Err(TrajectoryError::AtomCountChanged {
                    expected,
                    found: natoms,
                });
            }
        }

        if natoms <= 9 {
            // In case the number of atoms is very small, the positions are stored uncompressed.
            frame.positions.resize(natoms * 3, 0.0);
            read_f32s(&mut self.file, &mut frame.positions)?;
            frame.precision = 0.0;
        } else {
            frame.precision = read_f32(&mut self.file)?;
            read_compressed_positions(
                &mut self.file,
                natoms,
                &mut frame.positions,
                frame.precision,
                &mut self.scratch,
            )?;
        }

        self.natoms = Some(natoms);
        self.frames_read += 1;

        frame.step = header.step;
        frame.time = header.time;
        frame.boxvec = header.boxvec;

        Ok(FrameRead::Frame)
    }
}

fn count(field: &'static str, value: i32) -> Result<usize, TrajectoryError> {
    usize::try_from(value).map_err(|_| TrajectoryError::Negative { field, value })
}
