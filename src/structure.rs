//! Atom names from fixed-column gro structure files.
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

use log::debug;

use crate::error::StructureError;

/// Marks the end of the atom records.
pub const SENTINEL: &str = "  0.00000  0.00000  0.00000";

/// Byte range of the atom name within an atom record (columns 13 to 15).
pub const NAME_COLUMNS: Range<usize> = 12..15;

/// The number of header lines (title and atom count) before the atom records.
const HEADER_LINES: usize = 2;

/// A trimmed atom name, such as `CA` or `OW`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtomName(String);

impl AtomName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AtomName {
    fn from(name: &str) -> Self {
        Self(name.trim().to_string())
    }
}

impl fmt::Display for AtomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Respect width and alignment, since names are written right-aligned.
        f.pad(&self.0)
    }
}

/// Reads the ordered atom names from the structure file at `path`.
pub fn read_atom_names<P: AsRef<Path>>(path: P) -> Result<Vec<AtomName>, StructureError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| StructureError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let names = parse_atom_names(BufReader::new(file))?;
    debug!("read {} atom names from {}", names.len(), path.display());
    Ok(names)
}

/// Parses the ordered atom names from a structure file.
///
/// The first two lines are skipped. Every following line contributes the trimmed contents of
/// [`NAME_COLUMNS`] until a line containing [`SENTINEL`] is found. The last collected name is
/// dropped afterwards, since it belongs to the trailing box record of the format.
///
/// # Errors
///
/// A line too short to reach the name columns is a [`StructureError::Format`].
pub fn parse_atom_names<R: BufRead>(reader: R) -> Result<Vec<AtomName>, StructureError> {
    let mut names = Vec::new();
    let mut found_sentinel = false;
    for (idx, line) in reader.lines().enumerate().skip(HEADER_LINES) {
        let line = line?;
        if line.contains(SENTINEL) {
            found_sentinel = true;
            break;
        }
        let name = line.get(NAME_COLUMNS).ok_or(StructureError::Format {
            line: idx + 1,
            len: line.len(),
        })?;
        names.push(AtomName::from(name));
    }

    if let Some(dropped) = names.pop() {
        debug!(
            "dropped trailing record '{dropped}' (ended at {})",
            if found_sentinel { "sentinel" } else { "end of file" }
        );
    }

    Ok(names)
}
