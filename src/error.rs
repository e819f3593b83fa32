use std::path::PathBuf;

use thiserror::Error;

/// Failures while extracting atom names from a structure file.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("failed to open structure file '{path}': {source}", path = path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read structure file: {0}")]
    Read(#[from] std::io::Error),

    #[error("line {line} of the structure file is too short ({len} characters) to hold an atom name")]
    Format { line: usize, len: usize },
}

/// Failures while decoding an xtc trajectory.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("found invalid magic number '{0}' ({0:#0x})")]
    BadMagic(i32),

    #[error("{field} must be a positive integer, found {value}")]
    Negative { field: &'static str, value: i32 },

    #[error("frame header announces {natoms} atoms, but the coordinate block holds {repeated}")]
    AtomCountRepeated { natoms: usize, repeated: usize },

    #[error("number of atoms changed from {expected} to {found} within one trajectory")]
    AtomCountChanged { expected: usize, found: usize },

    #[error("corrupt compressed coordinates: {0}")]
    Corrupt(&'static str),
}

/// Failures of a conversion run.
///
/// Everything in here ends the run. Running out of frames halfway is not an error, see
/// [`ConversionReport`](crate::convert::ConversionReport).
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("failed to open trajectory '{path}': {source}", path = path.display())]
    TrajectorySource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open output file '{path}': {source}", path = path.display())]
    OutputSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read the first frame: {0}")]
    FirstFrame(#[source] TrajectoryError),

    #[error("trajectory does not contain any frames")]
    EmptyTrajectory,

    #[error(
        "number of atoms in the structure file ({names}) does not match the number of atoms in the trajectory ({natoms})"
    )]
    AtomCountMismatch { names: usize, natoms: usize },

    #[error("failed to write output: {0}")]
    Write(#[source] std::io::Error),
}
