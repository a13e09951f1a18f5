//! Printing and file I/O for distributed matrices
//!
//! Everything funnels through a `[CIRC,CIRC]` copy on VC rank 0: that rank
//! formats or writes the whole matrix, the others only take part in the
//! gather. The outcome of the file operation is broadcast, so every process
//! returns the same result.

use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::grid::{CommKind, Grid};
use crate::matrix::Matrix;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// On-disk representation used by [`write`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileFormat {
    /// One row per line, entries separated by spaces
    Ascii,
    /// A MATLAB/Octave assignment named after the file stem
    AsciiMatlab,
    /// Little-endian header followed by the raw column-major entries
    Binary,
}

impl FileFormat {
    /// Conventional file extension
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Ascii => "txt",
            Self::AsciiMatlab => "m",
            Self::Binary => "bin",
        }
    }
}

/// Header: height and width as `u64`, then the [`DType`] tag
const HEADER_LEN: usize = 8 + 8 + 1;

/// Gather `A` onto VC rank 0; other processes get `None`
fn gather_root<T: Element, A: DistRead<T> + ?Sized>(a: &A) -> Result<Option<Matrix<T>>> {
    let mut circ = DistMatrix::new(a.grid(), Dist::Circ, Dist::Circ);
    circ.assign(a)?;
    Ok(circ.meta().participating().then(|| circ.local().to_owned()))
}

/// Make the root's outcome everyone's outcome
fn share_status(grid: &Grid, outcome: Result<()>) -> Result<()> {
    if !grid.in_grid() {
        return outcome;
    }
    let mut ok = [u8::from(outcome.is_ok())];
    grid.comm(CommKind::Vc).broadcast(&mut ok, 0)?;
    match outcome {
        Err(err) => Err(err),
        Ok(()) if ok[0] == 0 => Err(Error::Io("matrix output failed on the root process".into())),
        Ok(()) => Ok(()),
    }
}

fn write_rows<T: Element + Display, W: Write + ?Sized>(m: &Matrix<T>, out: &mut W) -> std::io::Result<()> {
    for i in 0..m.height() {
        for j in 0..m.width() {
            if j > 0 {
                write!(out, " ")?;
            }
            write!(out, "{}", m.get(i, j))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write `title` and then `A` row by row to `out` on VC rank 0
///
/// Collective over the grid; `out` is only touched on VC rank 0.
pub fn print<T, A, W>(a: &A, title: &str, out: &mut W) -> Result<()>
where
    T: Element + Display,
    A: DistRead<T> + ?Sized,
    W: Write + ?Sized,
{
    let outcome = match gather_root(a)? {
        Some(m) => {
            let written = (|| -> std::io::Result<()> {
                if !title.is_empty() {
                    writeln!(out, "{title}")?;
                }
                write_rows(&m, out)?;
                writeln!(out)
            })();
            written.map_err(Error::from)
        }
        None => Ok(()),
    };
    share_status(a.grid(), outcome)
}

fn write_file<T: Element + Display>(m: &Matrix<T>, path: &Path, format: FileFormat) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    match format {
        FileFormat::Ascii => write_rows(m, &mut out)?,
        FileFormat::AsciiMatlab => {
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("matrix");
            writeln!(out, "{name} = [")?;
            write_rows(m, &mut out)?;
            writeln!(out, "];")?;
        }
        FileFormat::Binary => {
            out.write_all(&(m.height() as u64).to_le_bytes())?;
            out.write_all(&(m.width() as u64).to_le_bytes())?;
            out.write_all(&[T::DTYPE as u8])?;
            for j in 0..m.width() {
                out.write_all(bytemuck::cast_slice(m.as_ref().col(j)))?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Write `A` to `path` from VC rank 0
///
/// Collective over the grid. A failure to create or write the file is
/// reported as [`Error::Io`] on every process.
pub fn write<T, A>(a: &A, path: impl AsRef<Path>, format: FileFormat) -> Result<()>
where
    T: Element + Display,
    A: DistRead<T> + ?Sized,
{
    let path = path.as_ref();
    let outcome = match gather_root(a)? {
        Some(m) => {
            tracing::debug!(path = %path.display(), ?format, height = m.height(), width = m.width(), "writing matrix");
            write_file(&m, path, format)
        }
        None => Ok(()),
    };
    share_status(a.grid(), outcome)
}

fn read_file<T: Element>(path: &Path) -> Result<Matrix<T>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() < HEADER_LEN {
        return Err(Error::invalid_argument("path", format!("{} is too short for a header", path.display())));
    }
    let word = |k: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[8 * k..8 * k + 8]);
        u64::from_le_bytes(raw) as usize
    };
    let (height, width) = (word(0), word(1));
    let tag = bytes[16];
    if DType::from_u8(tag) != Some(T::DTYPE) {
        return Err(Error::invalid_argument(
            "path",
            format!("{} holds dtype tag {tag}, expected {}", path.display(), T::DTYPE),
        ));
    }
    let payload = &bytes[HEADER_LEN..];
    let expected = height
        .checked_mul(width)
        .and_then(|count| count.checked_mul(T::DTYPE.size_in_bytes()));
    if expected != Some(payload.len()) {
        return Err(Error::invalid_argument(
            "path",
            format!("{} does not hold a {height}x{width} {} matrix", path.display(), T::DTYPE),
        ));
    }
    let mut data = vec![T::zero(); height * width];
    bytemuck::cast_slice_mut::<T, u8>(&mut data).copy_from_slice(payload);
    Ok(Matrix::from_col_major(height, width, data))
}

/// Read a matrix written by [`write`] with [`FileFormat::Binary`] into an
/// `[MC,MR]` matrix on `grid`
///
/// VC rank 0 reads the file and scatters it. A missing file, a wrong element
/// type or a truncated payload fails on every process.
pub fn read_binary<T: Element>(grid: &Arc<Grid>, path: impl AsRef<Path>) -> Result<DistMatrix<T>> {
    let mut out = DistMatrix::new(grid, Dist::Mc, Dist::Mr);
    if !grid.in_grid() {
        return Ok(out);
    }
    let vc = grid.comm(CommKind::Vc);
    let loaded = if vc.rank() == 0 {
        Some(read_file::<T>(path.as_ref()))
    } else {
        None
    };
    let mut status = match &loaded {
        Some(Ok(m)) => [1u64, m.height() as u64, m.width() as u64],
        _ => [0u64; 3],
    };
    vc.broadcast(&mut status, 0)?;
    if status[0] == 0 {
        return Err(match loaded {
            Some(Err(err)) => err,
            _ => Error::Io(format!("reading {} failed on the root process", path.as_ref().display())),
        });
    }

    let mut circ = DistMatrix::with_shape(grid, Dist::Circ, Dist::Circ, status[1] as usize, status[2] as usize);
    if let Some(Ok(m)) = loaded {
        let mut packed = Vec::with_capacity(m.height() * m.width());
        m.as_ref().pack_into(&mut packed);
        circ.local_mut().unpack_from(&packed);
    }
    out.assign(&circ)?;
    Ok(out)
}
