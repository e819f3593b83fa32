use std::io::{self, Read};

use crate::error::TrajectoryError;
use crate::BoxVec;

/// Bit-level cursor into a compressed coordinate block.
struct DecodeState<'b> {
    buf: &'b [u8],
    count: usize,
    lastbits: u32,
    lastbyte: u32,
}

#[rustfmt::skip]
pub const MAGICINTS: [i32; 73] = [
    0,        0,        0,       0,       0,       0,       0,       0,       0,       8,
    10,       12,       16,      20,      25,      32,      40,      50,      64,      80,
    101,      128,      161,     203,     256,     322,     406,     512,     645,     812,
    1024,     1290,     1625,    2048,    2580,    3250,    4096,    5060,    6501,    8192,
    10321,    13003,    16384,   20642,   26007,   32768,   41285,   52015,   65536,   82570,
    104031,   131072,   165140,  208063,  262144,  330280,  416127,  524287,  660561,  832255,
    1048576,  1321122,  1664510, 2097152, 2642245, 3329021, 4194304, 5284491, 6658042, 8388607,
    10568983, 13316085, 16777216
];
pub const FIRSTIDX: usize = 9; // Note that MAGICINTS[FIRSTIDX-1] == 0.

/// Decode the compressed positions block of a frame with more than 9 atoms.
///
/// `positions` is resized to `natoms * 3` once the encoded bytes are read into `scratch`, which
/// can be reused between frames.
pub(crate) fn read_compressed_positions<R: Read>(
    file: &mut R,
    natoms: usize,
    positions: &mut Vec<f32>,
    precision: f32,
    scratch: &mut Vec<u8>,
) -> Result<(), TrajectoryError> {
    let invprecision = precision.recip();

    let minint = [read_i32(file)?, read_i32(file)?, read_i32(file)?];
    let maxint = [read_i32(file)?, read_i32(file)?, read_i32(file)?];
    let mut smallidx = usize::try_from(read_i32(file)?)
        .ok()
        .filter(|idx| (FIRSTIDX..MAGICINTS.len()).contains(idx))
        .ok_or(TrajectoryError::Corrupt("small index out of range"))?;

    let (bitsize, sizeint, bitsizeint) = calc_sizeint(minint, maxint)?;

    let mut smaller = MAGICINTS[usize::max(FIRSTIDX, smallidx - 1)] / 2;
    let mut smallnum = MAGICINTS[smallidx] / 2;
    let mut sizesmall = [MAGICINTS[smallidx] as u32; 3];

    read_opaque(file, scratch)?;
    // Every atom takes at least its run flag bit.
    if natoms > scratch.len().saturating_mul(8) {
        return Err(TrajectoryError::Corrupt(
            "more atoms announced than the coordinate block can hold",
        ));
    }
    positions.clear();
    positions
        .try_reserve_exact(natoms * 3)
        .map_err(|_| TrajectoryError::Corrupt("cannot allocate the announced positions"))?;
    positions.resize(natoms * 3, 0.0);

    let mut state = DecodeState {
        buf: scratch,
        count: 0,
        lastbits: 0,
        lastbyte: 0,
    };

    let mut run: i32 = 0;
    let mut read_idx = 0;
    let mut write_idx = 0;
    while read_idx < natoms {
        let mut coord = if bitsize == 0 {
            [
                state.decodebits(bitsizeint[0])? as i32,
                state.decodebits(bitsizeint[1])? as i32,
                state.decodebits(bitsizeint[2])? as i32,
            ]
        } else {
            state.decodeints(bitsize, sizeint)?
        };
        read_idx += 1;

        for (c, min) in coord.iter_mut().zip(minint) {
            *c = c.wrapping_add(min);
        }
        let mut prevcoord = coord;

        let mut is_smaller = 0;
        if state.decodebits(1)? == 1 {
            run = state.decodebits(5)? as i32;
            is_smaller = run % 3;
            run -= is_smaller;
            is_smaller -= 1;
        }

        if run > 0 {
            for k in (0..run).step_by(3) {
                let mut next = state.decodeints(smallidx as u32, sizesmall)?;
                read_idx += 1;
                for (n, prev) in next.iter_mut().zip(prevcoord) {
                    *n = n.wrapping_add(prev.wrapping_sub(smallnum));
                }
                if k == 0 {
                    // Waters are stored as OHH. Swapping the first two atoms of a run gives us
                    // back the original order.
                    std::mem::swap(&mut next, &mut prevcoord);
                    store(positions, &mut write_idx, prevcoord, invprecision)?;
                } else {
                    prevcoord = next;
                }
                store(positions, &mut write_idx, next, invprecision)?;
            }
        } else {
            store(positions, &mut write_idx, coord, invprecision)?;
        }

        match is_smaller.cmp(&0) {
            std::cmp::Ordering::Less => {
                smallidx = smallidx
                    .checked_sub(1)
                    .filter(|&idx| idx >= FIRSTIDX)
                    .ok_or(TrajectoryError::Corrupt("small index dropped below its minimum"))?;
                smallnum = smaller;
                smaller = if smallidx > FIRSTIDX {
                    MAGICINTS[smallidx - 1] / 2
                } else {
                    0
                };
            }
            std::cmp::Ordering::Greater => {
                smallidx += 1;
                if smallidx >= MAGICINTS.len() {
                    return Err(TrajectoryError::Corrupt("small index exceeded its maximum"));
                }
                smaller = smallnum;
                smallnum = MAGICINTS[smallidx] / 2;
            }
            std::cmp::Ordering::Equal => {}
        }
        sizesmall.fill(MAGICINTS[smallidx] as u32);
    }

    if write_idx != natoms {
        return Err(TrajectoryError::Corrupt("decoded fewer atoms than announced"));
    }

    Ok(())
}

fn store(
    positions: &mut [f32],
    write_idx: &mut usize,
    coord: [i32; 3],
    invprecision: f32,
) -> Result<(), TrajectoryError> {
    let start = *write_idx * 3;
    let position = positions
        .get_mut(start..start + 3)
        .ok_or(TrajectoryError::Corrupt("run extends beyond the last atom"))?;
    for (p, c) in position.iter_mut().zip(coord) {
        *p = c as f32 * invprecision;
    }
    *write_idx += 1;
    Ok(())
}

pub(crate) fn read_boxvec<R: Read>(file: &mut R) -> io::Result<BoxVec> {
    let mut boxvec = [0.0; 9];
    read_f32s(file, &mut boxvec)?;
    let cols = [
        [boxvec[0], boxvec[1], boxvec[2]],
        [boxvec[3], boxvec[4], boxvec[5]],
        [boxvec[6], boxvec[7], boxvec[8]],
    ];
    Ok(BoxVec::from_cols_array_2d(&cols))
}

/// Reads the magic number that opens a frame.
///
/// Returns `None` if the stream ends cleanly right where a frame would start. Running out of
/// bytes after the first one is an [`io::ErrorKind::UnexpectedEof`].
pub(crate) fn read_magic<R: Read>(file: &mut R) -> io::Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(Some(i32::from_be_bytes(buf)))
}

/// Reads an xdr opaque block: a byte count followed by the bytes, padded to 32-bit blocks.
///
/// The buffer only grows with the bytes actually present, so a corrupt count cannot trigger a
/// huge allocation.
fn read_opaque<R: Read>(file: &mut R, data: &mut Vec<u8>) -> io::Result<()> {
    let count = read_u32(file)? as usize;
    let len = count + padding(count);
    data.clear();
    (&mut *file).take(len as u64).read_to_end(data)?;
    if data.len() != len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

/// Number of bytes needed to round `count` up to a multiple of four.
pub const fn padding(count: usize) -> usize {
    (4 - (count % 4)) % 4
}

pub(crate) fn read_f32s<R: Read>(file: &mut R, buf: &mut [f32]) -> io::Result<()> {
    for value in buf {
        *value = read_f32(file)?
    }
    Ok(())
}

pub(crate) fn read_f32<R: Read>(file: &mut R) -> io::Result<f32> {
    let mut buf: [u8; 4] = Default::default();
    file.read_exact(&mut buf)?;
    Ok(f32::from_be_bytes(buf))
}

pub(crate) fn read_i32<R: Read>(file: &mut R) -> io::Result<i32> {
    let mut buf: [u8; 4] = Default::default();
    file.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_u32<R: Read>(file: &mut R) -> io::Result<u32> {
    let mut buf: [u8; 4] = Default::default();
    file.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Returns `(bitsize, sizeint, bitsizeint)` for the coordinate range.
///
/// A `bitsize` of 0 flags that one of the sizes is too large to be packed together, in which case
/// each component is stored with its own `bitsizeint`.
fn calc_sizeint(
    minint: [i32; 3],
    maxint: [i32; 3],
) -> Result<(u32, [u32; 3], [u32; 3]), TrajectoryError> {
    let mut sizeint = [0u32; 3];
    for ((size, min), max) in sizeint.iter_mut().zip(minint).zip(maxint) {
        let span = max as i64 - min as i64 + 1;
        *size = u32::try_from(span)
            .ok()
            .filter(|&s| s > 0)
            .ok_or(TrajectoryError::Corrupt("invalid coordinate range"))?;
    }

    if (sizeint[0] | sizeint[1] | sizeint[2]) > 0xffffff {
        let bitsizeint = sizeint.map(sizeofint);
        return Ok((0, sizeint, bitsizeint));
    }

    Ok((sizeofints(sizeint), sizeint, [0; 3]))
}

const fn sizeofint(size: u32) -> u32 {
    let mut n: u32 = 1;
    let mut nbits = 0;

    while size >= n && nbits < 32 {
        nbits += 1;
        n = n.wrapping_shl(1);
    }

    nbits
}

/// Number of bits needed to store the product of `sizes`.
fn sizeofints(sizes: [u32; 3]) -> u32 {
    let mut nbytes = 1;
    let mut bytes = [0u32; 32];
    bytes[0] = 1;

    for size in sizes {
        let mut tmp: u32 = 0;
        let mut bytecount = 0;
        while bytecount < nbytes {
            // Unsigned 32-bit arithmetic, wrapping on overflow.
            tmp = tmp.wrapping_add(bytes[bytecount].wrapping_mul(size));
            bytes[bytecount] = tmp & 0xff;
            tmp >>= 8;
            bytecount += 1;
        }
        while tmp != 0 {
            bytes[bytecount] = tmp & 0xff;
            bytecount += 1;
            tmp >>= 8;
        }
        nbytes = bytecount;
    }

    nbytes -= 1;
    let mut nbits = 0;
    let mut num: u32 = 1;
    while bytes[nbytes] >= num {
        nbits += 1;
        num *= 2;
    }

    nbytes as u32 * 8 + nbits
}

impl DecodeState<'_> {
    fn next_byte(&mut self) -> Result<u32, TrajectoryError> {
        let byte = self
            .buf
            .get(self.count)
            .ok_or(TrajectoryError::Corrupt("compressed block ended early"))?;
        self.count += 1;
        Ok(*byte as u32)
    }

    fn decodebits(&mut self, mut nbits: u32) -> Result<u32, TrajectoryError> {
        // A string of ones that is nbits long.
        let mask = if nbits >= 32 {
            u32::MAX
        } else {
            (1 << nbits) - 1
        };

        let mut num = 0;
        while nbits >= 8 {
            self.lastbyte = (self.lastbyte << 8) | self.next_byte()?;
            num |= (self.lastbyte >> self.lastbits) << (nbits - 8);
            nbits -= 8;
        }

        if nbits > 0 {
            if self.lastbits < nbits {
                self.lastbits += 8;
                self.lastbyte = (self.lastbyte << 8) | self.next_byte()?;
            }
            self.lastbits -= nbits;
            num |= (self.lastbyte >> self.lastbits) & ((1 << nbits) - 1);
        }

        Ok(num & mask)
    }

    /// Unpack three integers that were packed together as one large number of `nbits` bits.
    fn decodeints(&mut self, mut nbits: u32, sizes: [u32; 3]) -> Result<[i32; 3], TrajectoryError> {
        let mut bytes = [0u32; 32];
        let mut nbytes = 0;
        while nbits > 8 {
            bytes[nbytes] = self.decodebits(8)?;
            nbytes += 1;
            nbits -= 8;
        }
        if nbits > 0 {
            bytes[nbytes] = self.decodebits(nbits)?;
            nbytes += 1;
        }

        let mut nums = [0i32; 3];
        for i in (1..3).rev() {
            let mut num: u32 = 0;
            for byte in bytes[..nbytes].iter_mut().rev() {
                num = (num << 8) | *byte;
                let p = num / sizes[i];
                *byte = p;
                num -= p * sizes[i];
            }
            nums[i] = num as i32;
        }
        nums[0] = (bytes[0] | (bytes[1] << 8) | (bytes[2] << 16) | (bytes[3] << 24)) as i32;

        Ok(nums)
    }
}
