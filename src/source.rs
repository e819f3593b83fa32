//! The seam between the conversion loop and whatever decodes the frames.
use std::io::Read;

use crate::{Frame, TrajectoryError, XTCReader};

/// Outcome of a successful read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRead {
    /// The frame buffer now holds a newly decoded frame.
    Frame,
    /// No frames are left.
    EndOfStream,
}

/// Something that produces trajectory frames one at a time into a caller-owned buffer.
pub trait FrameSource {
    /// Reads the first frame, which establishes the number of atoms.
    fn read_first(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError>;

    /// Reads the frame following the previous one, overwriting `frame`.
    fn read_next(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError>;
}

impl<R: Read> FrameSource for XTCReader<R> {
    fn read_first(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError> {
        self.read_frame(frame)
    }

    fn read_next(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError> {
        self.read_frame(frame)
    }
}
