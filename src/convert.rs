//! Writing trajectory frames as plain-text xyz blocks.
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::error::ConvertError;
use crate::source::{FrameRead, FrameSource};
use crate::structure::{read_atom_names, AtomName};
use crate::{Frame, XTCReader};

/// Output path used when none is given.
pub const DEFAULT_OUTPUT: &str = "compareWithAnalysis.xyz";

/// Credit line appended to every frame header when none is given.
pub const DEFAULT_CREDIT: &str = "Amogha|Abhishek";

/// Nanometers to angstrom.
pub const SCALE: f32 = 10.0;

/// What a finished conversion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionReport {
    pub natoms: usize,
    /// The number of frames that were asked for.
    pub requested: usize,
    /// The number of frame blocks that were written.
    pub written: usize,
}

impl ConversionReport {
    /// Whether every requested frame was written, as opposed to the trajectory running out early.
    pub fn is_complete(&self) -> bool {
        self.written == self.requested
    }
}

/// Drives a [`FrameSource`] and writes each frame as a text block to `sink`.
///
/// A converter only exists once its first frame has been read and the number of atoms in that
/// frame has been checked against the atom names. [`TrajectoryConverter::write_frames`] consumes
/// it, so the source and sink are released however the conversion ends.
#[derive(Debug)]
pub struct TrajectoryConverter<S, W> {
    source: S,
    sink: W,
    names: Vec<AtomName>,
    /// Holds the current frame. Overwritten by every read.
    frame: Frame,
}

impl TrajectoryConverter<XTCReader<File>, BufWriter<File>> {
    /// Reads the atom names from `structure`, opens `trajectory`, and creates (or truncates)
    /// `output`, before reading the first frame.
    pub fn open(
        structure: impl AsRef<Path>,
        trajectory: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<Self, ConvertError> {
        let names = read_atom_names(structure)?;

        let trajectory = trajectory.as_ref();
        let source = XTCReader::open(trajectory).map_err(|source| {
            ConvertError::TrajectorySource {
                path: trajectory.to_path_buf(),
                source,
            }
        })?;
        debug!("opened trajectory {}", trajectory.display());

        let output = output.as_ref();
        let sink = File::create(output).map_err(|source| ConvertError::OutputSink {
            path: output.to_path_buf(),
            source,
        })?;
        debug!("writing to {}", output.display());

        Self::new(source, BufWriter::new(sink), names)
    }
}

impl<S: FrameSource, W: Write> TrajectoryConverter<S, W> {
    /// Reads the first frame from `source` and checks that it has one atom per name.
    ///
    /// Nothing is written to `sink` if this fails.
    pub fn new(mut source: S, sink: W, names: Vec<AtomName>) -> Result<Self, ConvertError> {
        let mut frame = Frame::default();
        match source
            .read_first(&mut frame)
            .map_err(ConvertError::FirstFrame)?
        {
            FrameRead::Frame => {}
            FrameRead::EndOfStream => return Err(ConvertError::EmptyTrajectory),
        }

        let natoms = frame.natoms();
        if names.len() != natoms {
            return Err(ConvertError::AtomCountMismatch {
                names: names.len(),
                natoms,
            });
        }
        debug!("first frame has {natoms} atoms at {} ps", frame.time);

        Ok(Self {
            source,
            sink,
            names,
            frame,
        })
    }

    pub fn natoms(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[AtomName] {
        &self.names
    }

    /// The frame that will be written next.
    pub fn current_frame(&self) -> &Frame {
        &self.frame
    }

    /// Writes up to `nframes` frames, starting with the first one.
    ///
    /// See [`TrajectoryConverter::write_frames_with_progress`].
    pub fn write_frames(
        self,
        nframes: usize,
        credit: &str,
    ) -> Result<ConversionReport, ConvertError> {
        self.write_frames_with_progress(nframes, credit, |_, _| {})
    }

    /// Writes up to `nframes` frames, calling `on_frame(index, nframes)` after each block.
    ///
    /// When the source runs out of frames or fails to decode one, writing stops and the report
    /// tells how many blocks made it into the output. Only failing to write is an error.
    pub fn write_frames_with_progress(
        mut self,
        nframes: usize,
        credit: &str,
        mut on_frame: impl FnMut(usize, usize),
    ) -> Result<ConversionReport, ConvertError> {
        let natoms = self.natoms();
        let mut written = 0;
        for idx in 0..nframes {
            write_frame_block(&mut self.sink, &self.names, &self.frame, idx + 1, credit)
                .map_err(ConvertError::Write)?;
            written += 1;
            on_frame(idx, nframes);

            if written == nframes {
                break;
            }
            match self.source.read_next(&mut self.frame) {
                Ok(FrameRead::Frame) if self.frame.natoms() == natoms => {}
                Ok(FrameRead::Frame) => {
                    warn!(
                        "stopped after {written} frames: next frame has {} atoms instead of {natoms}",
                        self.frame.natoms()
                    );
                    break;
                }
                Ok(FrameRead::EndOfStream) => {
                    info!("trajectory ended after {written} of {nframes} requested frames");
                    break;
                }
                Err(err) => {
                    warn!("stopped after {written} frames: {err}");
                    break;
                }
            }
        }

        self.sink.flush().map_err(ConvertError::Write)?;

        let report = ConversionReport {
            natoms,
            requested: nframes,
            written,
        };
        info!("wrote {written} frames of {natoms} atoms");
        Ok(report)
    }
}

/// Writes a single frame block.
///
/// ```text
/// <natoms>
/// =============Frame=<number>=========time=<time>ps================         By <credit>
/// <name> <x> <y> <z>
/// ```
///
/// Names are right-aligned to 5 characters. Coordinates are scaled by [`SCALE`] and written with
/// 6 decimals, right-aligned to 15 characters. The time keeps 6 significant digits, see
/// [`Significant`].
pub fn write_frame_block<W: Write + ?Sized>(
    out: &mut W,
    names: &[AtomName],
    frame: &Frame,
    number: usize,
    credit: &str,
) -> io::Result<()> {
    writeln!(out, "{}", frame.natoms())?;
    writeln!(
        out,
        "=============Frame={number}=========time={time}ps================         By {credit}",
        time = Significant(frame.time)
    )?;
    for (name, position) in names.iter().zip(frame.coords()) {
        let [x, y, z] = (position * SCALE).to_array();
        writeln!(out, "{name:>5} {x:>15.6} {y:>15.6} {z:>15.6}")?;
    }
    Ok(())
}

/// Number of significant digits of a [`Significant`].
const SIGNIFICANT_DIGITS: usize = 6;

/// Displays a value with 6 significant digits, the way `%g` does.
///
/// Trailing zeros are removed. Exponents below -4 or of at least 6 switch to scientific notation
/// with a signed exponent of at least two digits, as in `1.23457e+06`.
#[derive(Debug, Clone, Copy)]
pub struct Significant(pub f32);

impl fmt::Display for Significant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = f64::from(self.0);
        if value.is_nan() {
            return f.write_str("nan");
        }
        if value.is_infinite() {
            return f.write_str(if value < 0.0 { "-inf" } else { "inf" });
        }

        // The exponent is taken after rounding to the significant digits.
        let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, value);
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);

        if exponent < -4 || exponent >= SIGNIFICANT_DIGITS as i32 {
            let sign = if exponent < 0 { '-' } else { '+' };
            write!(f, "{}e{sign}{:02}", trim_zeros(mantissa), exponent.abs())
        } else {
            let decimals = (SIGNIFICANT_DIGITS as i32 - 1 - exponent) as usize;
            f.write_str(trim_zeros(&format!("{value:.decimals$}")))
        }
    }
}

fn trim_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrajectoryError;

    /// Hands out prepared frames, then either ends or fails.
    struct Prepared {
        frames: Vec<Frame>,
        next: usize,
        fail_at_end: bool,
    }

    impl Prepared {
        fn new(frames: Vec<Frame>) -> Self {
            Self {
                frames,
                next: 0,
                fail_at_end: false,
            }
        }

        fn failing(frames: Vec<Frame>) -> Self {
            Self {
                fail_at_end: true,
                ..Self::new(frames)
            }
        }

        fn advance(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError> {
            match self.frames.get(self.next) {
                Some(next) => {
                    frame.clone_from(next);
                    self.next += 1;
                    Ok(FrameRead::Frame)
                }
                None if self.fail_at_end => Err(TrajectoryError::Corrupt("test failure")),
                None => Ok(FrameRead::EndOfStream),
            }
        }
    }

    impl FrameSource for Prepared {
        fn read_first(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError> {
            assert_eq!(self.next, 0, "read_first must come first");
            self.advance(frame)
        }

        fn read_next(&mut self, frame: &mut Frame) -> Result<FrameRead, TrajectoryError> {
            assert!(self.next > 0, "read_next before read_first");
            self.advance(frame)
        }
    }

    fn frame(time: f32, positions: &[f32]) -> Frame {
        Frame {
            time,
            positions: positions.to_vec(),
            ..Frame::default()
        }
    }

    fn names(names: &[&str]) -> Vec<AtomName> {
        names.iter().map(|&name| AtomName::from(name)).collect()
    }

    fn count_blocks(output: &[u8]) -> usize {
        String::from_utf8_lossy(output)
            .lines()
            .filter(|line| line.starts_with("=============Frame="))
            .count()
    }

    #[test]
    fn block_is_formatted() -> io::Result<()> {
        let mut out = Vec::new();
        let frame = frame(2.5, &[1.0, -2.5, 0.333333, 0.0, 0.1, 0.2]);
        write_frame_block(&mut out, &names(&["CA", "OW1"]), &frame, 3, "someone")?;
        let text = String::from_utf8(out).expect("output is utf-8");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "2",
                "=============Frame=3=========time=2.5ps================         By someone",
                "   CA       10.000000      -25.000000        3.333330",
                "  OW1        0.000000        1.000000        2.000000",
            ]
        );
        Ok(())
    }

    #[test]
    fn time_has_six_significant_digits() {
        let cases = [
            (0.0, "0"),
            (0.5, "0.5"),
            (0.1, "0.1"),
            (2002.5, "2002.5"),
            (12345.678, "12345.7"),
            (100000.0, "100000"),
            (1234567.0, "1.23457e+06"),
            (2.0e7, "2e+07"),
            (0.0001, "0.0001"),
            (0.00001234, "1.234e-05"),
            (-3.25, "-3.25"),
        ];
        for (time, expected) in cases {
            assert_eq!(Significant(time).to_string(), expected, "formatting {time}");
        }
    }

    #[test]
    fn long_runs_use_scientific_time() -> io::Result<()> {
        let mut out = Vec::new();
        write_frame_block(&mut out, &names(&["C"]), &frame(1234567.0, &[0.0; 3]), 7, "x")?;
        let text = String::from_utf8(out).expect("output is utf-8");
        assert!(text.contains("=============Frame=7=========time=1.23457e+06ps"));
        Ok(())
    }

    #[test]
    fn writes_every_requested_frame() -> Result<(), ConvertError> {
        let frames = (0..3).map(|i| frame(i as f32, &[i as f32, 0.0, 0.0])).collect();
        let mut out = Vec::new();
        let converter = TrajectoryConverter::new(Prepared::new(frames), &mut out, names(&["C"]))?;
        let report = converter.write_frames(3, DEFAULT_CREDIT)?;

        assert_eq!(
            report,
            ConversionReport {
                natoms: 1,
                requested: 3,
                written: 3
            }
        );
        assert!(report.is_complete());
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("=Frame=1=========time=0ps"));
        assert!(text.contains("=Frame=3=========time=2ps"));
        assert!(text.contains("    C       20.000000"));
        Ok(())
    }

    #[test]
    fn stops_when_frames_run_out() -> Result<(), ConvertError> {
        let frames = vec![frame(0.0, &[0.0; 3]), frame(1.0, &[0.0; 3])];
        let mut out = Vec::new();
        let report = TrajectoryConverter::new(Prepared::new(frames), &mut out, names(&["H"]))?
            .write_frames(10, DEFAULT_CREDIT)?;

        assert_eq!(report.written, 2);
        assert!(!report.is_complete());
        assert_eq!(count_blocks(&out), 2);
        assert!(out.ends_with(b"\n"));
        Ok(())
    }

    #[test]
    fn decoder_failure_ends_the_loop() -> Result<(), ConvertError> {
        let frames = vec![frame(0.0, &[0.0; 3])];
        let mut out = Vec::new();
        let report =
            TrajectoryConverter::new(Prepared::failing(frames), &mut out, names(&["H"]))?
                .write_frames(5, DEFAULT_CREDIT)?;

        assert_eq!(report.written, 1);
        assert_eq!(count_blocks(&out), 1);
        Ok(())
    }

    #[test]
    fn changing_atom_count_ends_the_loop() -> Result<(), ConvertError> {
        let frames = vec![frame(0.0, &[0.0; 3]), frame(1.0, &[0.0; 6])];
        let mut out = Vec::new();
        let report = TrajectoryConverter::new(Prepared::new(frames), &mut out, names(&["H"]))?
            .write_frames(2, DEFAULT_CREDIT)?;
        assert_eq!(report.written, 1);
        Ok(())
    }

    #[test]
    fn zero_frames_writes_nothing() -> Result<(), ConvertError> {
        let frames = vec![frame(0.0, &[0.0; 3])];
        let mut out = Vec::new();
        let report = TrajectoryConverter::new(Prepared::new(frames), &mut out, names(&["H"]))?
            .write_frames(0, DEFAULT_CREDIT)?;
        assert_eq!(report.written, 0);
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn progress_is_reported_per_frame() -> Result<(), ConvertError> {
        let frames = vec![frame(0.0, &[0.0; 3]), frame(1.0, &[0.0; 3])];
        let mut seen = Vec::new();
        TrajectoryConverter::new(Prepared::new(frames), io::sink(), names(&["H"]))?
            .write_frames_with_progress(2, DEFAULT_CREDIT, |idx, total| seen.push((idx, total)))?;
        assert_eq!(seen, [(0, 2), (1, 2)]);
        Ok(())
    }

    #[test]
    fn atom_count_mismatch_writes_nothing() {
        let frames = vec![frame(0.0, &[0.0; 6])];
        let mut out = Vec::new();
        let result = TrajectoryConverter::new(Prepared::new(frames), &mut out, names(&["H"]))
            .map(|_| ());
        assert!(matches!(
            result,
            Err(ConvertError::AtomCountMismatch {
                names: 1,
                natoms: 2
            })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn empty_trajectory_is_an_error() {
        let result = TrajectoryConverter::new(Prepared::new(Vec::new()), io::sink(), names(&[]));
        assert!(matches!(result, Err(ConvertError::EmptyTrajectory)));
    }

    #[test]
    fn first_frame_failure_is_an_error() {
        let result =
            TrajectoryConverter::new(Prepared::failing(Vec::new()), io::sink(), names(&[]));
        assert!(matches!(result, Err(ConvertError::FirstFrame(_))));
    }
}
