//! Detector image loading.
//!
//! TIFF frames are decoded with the `tiff` crate. NumPy `.npy` arrays are
//! parsed straight from a memory map. Every sample type is widened to
//! `f64`.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::ColorType;
use xpdview_core::Image;

use crate::{Error, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Path the mapping was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Image container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Single-channel TIFF.
    Tiff,
    /// NumPy array file.
    Npy,
}

impl ImageFormat {
    /// Format implied by the file extension.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("tif" | "tiff") => Ok(Self::Tiff),
            Some("npy") => Ok(Self::Npy),
            _ => Err(Error::UnsupportedFormat(format!(
                "no image reader for {}",
                path.display()
            ))),
        }
    }
}

/// Loads a detector image, dispatching on the file extension.
///
/// # Errors
/// Returns [`Error::UnsupportedFormat`] for unknown extensions, or a
/// decoding error from the format reader.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)?;
    let reader = MappedFileReader::open(path)?;
    let image = match format {
        ImageFormat::Tiff => decode_tiff(reader.as_bytes()),
        ImageFormat::Npy => decode_npy(reader.as_bytes()),
    }
    .map_err(|e| match e {
        Error::InvalidFormat(msg) => {
            Error::InvalidFormat(format!("{}: {msg}", reader.path().display()))
        }
        other => other,
    })?;
    log::debug!(
        "loaded {} ({}x{})",
        path.display(),
        image.nrows(),
        image.ncols()
    );
    Ok(image)
}

fn widen<T: Copy + Into<f64>>(data: &[T]) -> Vec<f64> {
    data.iter().map(|&v| v.into()).collect()
}

/// Decodes the first page of a single-channel TIFF.
///
/// # Errors
/// Returns [`Error::Tiff`] if decoding fails, [`Error::UnsupportedFormat`]
/// for multi-channel images or unknown sample types.
pub fn decode_tiff(bytes: &[u8]) -> Result<Image> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "TIFF color type {other:?}; expected single-channel gray"
            )))
        }
    }

    let samples = match decoder.read_image()? {
        DecodingResult::U8(data) => widen(&data),
        DecodingResult::U16(data) => widen(&data),
        DecodingResult::U32(data) => widen(&data),
        DecodingResult::I8(data) => widen(&data),
        DecodingResult::I16(data) => widen(&data),
        DecodingResult::I32(data) => widen(&data),
        DecodingResult::F32(data) => widen(&data),
        DecodingResult::F64(data) => data,
        #[allow(clippy::cast_precision_loss)]
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        #[allow(clippy::cast_precision_loss)]
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(Error::UnsupportedFormat(
                "TIFF sample type not supported".to_string(),
            ))
        }
    };

    let shape = (height as usize, width as usize);
    Array2::from_shape_vec(shape, samples).map_err(|e| {
        Error::InvalidFormat(format!("TIFF data does not match {height}x{width}: {e}"))
    })
}

/// Element types accepted in `.npy` files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NpyDtype {
    F8,
    F4,
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
}

impl NpyDtype {
    fn parse(descr: &str) -> Result<Self> {
        let mut chars = descr.chars();
        let order = chars.next();
        let kind = chars.as_str();
        let dtype = match kind {
            "f8" => Self::F8,
            "f4" => Self::F4,
            "i1" => Self::I1,
            "i2" => Self::I2,
            "i4" => Self::I4,
            "i8" => Self::I8,
            "u1" => Self::U1,
            "u2" => Self::U2,
            "u4" => Self::U4,
            "u8" => Self::U8,
            _ => return Err(Error::UnsupportedFormat(format!("npy dtype '{descr}'"))),
        };
        let single_byte = matches!(dtype, Self::I1 | Self::U1);
        match order {
            Some('<') => Ok(dtype),
            Some('|') if single_byte => Ok(dtype),
            _ => Err(Error::UnsupportedFormat(format!(
                "npy dtype '{descr}'; only little-endian data is read"
            ))),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::I1 | Self::U1 => 1,
            Self::I2 | Self::U2 => 2,
            Self::F4 | Self::I4 | Self::U4 => 4,
            Self::F8 | Self::I8 | Self::U8 => 8,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn decode(self, chunk: &[u8]) -> f64 {
        macro_rules! le {
            ($t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(chunk);
                <$t>::from_le_bytes(buf)
            }};
        }
        match self {
            Self::F8 => le!(f64, 8),
            Self::F4 => f64::from(le!(f32, 4)),
            Self::I1 => f64::from(le!(i8, 1)),
            Self::I2 => f64::from(le!(i16, 2)),
            Self::I4 => f64::from(le!(i32, 4)),
            Self::I8 => le!(i64, 8) as f64,
            Self::U1 => f64::from(chunk[0]),
            Self::U2 => f64::from(le!(u16, 2)),
            Self::U4 => f64::from(le!(u32, 4)),
            Self::U8 => le!(u64, 8) as f64,
        }
    }
}

/// Text value following `'key':` in an npy header dictionary.
fn header_field<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let needle = format!("'{key}':");
    let start = header
        .find(&needle)
        .ok_or_else(|| Error::InvalidFormat(format!("npy header has no '{key}' field")))?;
    Ok(header[start + needle.len()..].trim_start())
}

fn parse_npy_header(header: &str) -> Result<(NpyDtype, bool, Vec<usize>)> {
    let descr = header_field(header, "descr")?;
    let descr = descr
        .strip_prefix('\'')
        .and_then(|rest| rest.split('\'').next())
        .ok_or_else(|| Error::InvalidFormat("npy 'descr' is not a string".to_string()))?;
    let dtype = NpyDtype::parse(descr)?;

    let fortran = header_field(header, "fortran_order")?.starts_with("True");

    let shape = header_field(header, "shape")?;
    let inner = shape
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .ok_or_else(|| Error::InvalidFormat("npy 'shape' is not a tuple".to_string()))?;
    let dims = inner
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| Error::InvalidFormat(format!("npy shape entry '{d}'")))
        })
        .collect::<Result<Vec<usize>>>()?;

    Ok((dtype, fortran, dims))
}

/// Parses an in-memory `.npy` file holding a 2D array.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] for a malformed file and
/// [`Error::UnsupportedFormat`] for big-endian data, Fortran order,
/// unsupported element types or a shape that is not 2D.
pub fn decode_npy(bytes: &[u8]) -> Result<Image> {
    if bytes.len() < 10 || !bytes.starts_with(NPY_MAGIC) {
        return Err(Error::InvalidFormat("missing npy magic".to_string()));
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(Error::InvalidFormat("truncated npy header".to_string()));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            let len = usize::try_from(len)
                .map_err(|_| Error::InvalidFormat("npy header too large".to_string()))?;
            (len, 12)
        }
        v => return Err(Error::UnsupportedFormat(format!("npy format version {v}"))),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| Error::InvalidFormat("truncated npy header".to_string()))?;
    let header = std::str::from_utf8(header)
        .map_err(|_| Error::InvalidFormat("npy header is not text".to_string()))?;

    let (dtype, fortran, dims) = parse_npy_header(header)?;
    if fortran {
        return Err(Error::UnsupportedFormat(
            "Fortran-ordered npy arrays".to_string(),
        ));
    }
    let &[rows, cols] = dims.as_slice() else {
        return Err(Error::UnsupportedFormat(format!(
            "npy array with shape {dims:?}; expected 2D"
        )));
    };

    let (count, needed) = rows
        .checked_mul(cols)
        .and_then(|count| Some((count, count.checked_mul(dtype.size())?)))
        .ok_or_else(|| Error::InvalidFormat(format!("npy shape {rows}x{cols} overflows")))?;
    let data = &bytes[data_start..];
    if data.len() < needed {
        return Err(Error::InvalidFormat(format!(
            "npy data holds {} bytes, {rows}x{cols} {dtype:?} needs {needed}",
            data.len()
        )));
    }
    let samples: Vec<f64> = data
        .chunks_exact(dtype.size())
        .take(count)
        .map(|chunk| dtype.decode(chunk))
        .collect();

    Array2::from_shape_vec((rows, cols), samples)
        .map_err(|e| Error::InvalidFormat(format!("npy shape {rows}x{cols}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npy_bytes(descr: &str, shape: &str, payload: &[u8]) -> Vec<u8> {
        let dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
        let unpadded = 10 + dict.len() + 1;
        let pad = (64 - unpadded % 64) % 64;
        let header = format!("{dict}{}\n", " ".repeat(pad));
        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&u16::try_from(header.len()).unwrap().to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_decode_npy_f8() {
        let payload: Vec<u8> = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let image = decode_npy(&npy_bytes("<f8", "(2, 3)", &payload)).unwrap();
        assert_eq!(image.dim(), (2, 3));
        assert_eq!(image[[1, 0]], 4.0);
    }

    #[test]
    fn test_decode_npy_u1_and_i2() {
        let image = decode_npy(&npy_bytes("|u1", "(2, 2)", &[0, 1, 2, 255])).unwrap();
        assert_eq!(image[[1, 1]], 255.0);

        let payload: Vec<u8> = [-3i16, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        let image = decode_npy(&npy_bytes("<i2", "(1, 2)", &payload)).unwrap();
        assert_eq!(image[[0, 0]], -3.0);
    }

    #[test]
    fn test_decode_npy_rejects() {
        assert!(matches!(
            decode_npy(&npy_bytes(">f8", "(1, 1)", &[0; 8])),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            decode_npy(&npy_bytes("<f8", "(4,)", &[0; 32])),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            decode_npy(&npy_bytes("<f8", "(2, 2)", &[0; 8])),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(decode_npy(b"not an npy file"), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_decode_npy_huge_shape() {
        let shape = format!("({}, 2)", usize::MAX);
        assert!(matches!(
            decode_npy(&npy_bytes("<f8", &shape, &[0; 16])),
            Err(Error::InvalidFormat(_))
        ));
        let shape = format!("({}, 1)", usize::MAX / 4);
        assert!(matches!(
            decode_npy(&npy_bytes("<f8", &shape, &[0; 16])),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_path(Path::new("a.TIF")).unwrap(), ImageFormat::Tiff);
        assert_eq!(ImageFormat::from_path(Path::new("a.npy")).unwrap(), ImageFormat::Npy);
        assert!(matches!(
            ImageFormat::from_path(Path::new("a.chi")),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
