// ============================================================
// Layer 4 — MNIST IDX Loader
// ============================================================
// Reads the MNIST distribution files so they can be
// converted into record files for the channels.
//
// IDX layout (all integers big endian):
//
//   images: magic 2051 | count | rows | cols | count*rows*cols u8
//   labels: magic 2049 | count | count u8
//
// Only uncompressed files are handled; gunzip them first.
//
// Reference: LeCun et al., "THE MNIST DATABASE" (file format)

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// Decoded contents of an IDX image file.
#[derive(Debug, Clone)]
pub struct IdxImages {
    pub rows:   usize,
    pub cols:   usize,
    pub images: Vec<Vec<u8>>,
}

pub fn load_images(path: &Path) -> Result<IdxImages> {
    let bytes = fs::read(path).with_context(|| format!("Cannot read '{}'", path.display()))?;
    parse_images(&bytes).with_context(|| format!("Bad IDX image file '{}'", path.display()))
}

pub fn load_labels(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).with_context(|| format!("Cannot read '{}'", path.display()))?;
    parse_labels(&bytes).with_context(|| format!("Bad IDX label file '{}'", path.display()))
}

pub fn parse_images(bytes: &[u8]) -> Result<IdxImages> {
    let magic = be_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        bail!("magic {magic}, expected {IMAGES_MAGIC}");
    }
    let count = be_u32(bytes, 4)? as usize;
    let rows  = be_u32(bytes, 8)? as usize;
    let cols  = be_u32(bytes, 12)? as usize;

    let body = &bytes[16..];
    let size = rows * cols;
    if size == 0 || body.len() != count * size {
        bail!("{} pixel bytes for {count} images of {rows}x{cols}", body.len());
    }

    let images = body.chunks_exact(size).map(<[u8]>::to_vec).collect();
    Ok(IdxImages { rows, cols, images })
}

pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let magic = be_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        bail!("magic {magic}, expected {LABELS_MAGIC}");
    }
    let count = be_u32(bytes, 4)? as usize;
    let body  = &bytes[8..];
    if body.len() != count {
        bail!("{} label bytes for {count} labels", body.len());
    }
    Ok(body.to_vec())
}

fn be_u32(bytes: &[u8], at: usize) -> Result<u32> {
    let slice = bytes
        .get(at..at + 4)
        .with_context(|| format!("file ends before header offset {at}"))?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn header(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn test_parse_images() {
        let mut bytes = header(&[2051, 2, 2, 3]);
        bytes.extend(0u8..12);
        let idx = parse_images(&bytes).unwrap();
        assert_eq!((idx.rows, idx.cols), (2, 3));
        assert_eq!(idx.images, vec![vec![0, 1, 2, 3, 4, 5], vec![6, 7, 8, 9, 10, 11]]);
    }

    #[test]
    fn test_parse_labels() {
        let mut bytes = header(&[2049, 3]);
        bytes.extend([7u8, 0, 9]);
        assert_eq!(parse_labels(&bytes).unwrap(), vec![7, 0, 9]);
    }

    #[test]
    fn test_wrong_magic() {
        let mut bytes = header(&[2049, 1, 1, 1]);
        bytes.push(0);
        assert!(parse_images(&bytes).is_err());
    }

    #[test]
    fn test_short_body() {
        let mut bytes = header(&[2051, 2, 28, 28]);
        bytes.extend(vec![0u8; 784]);
        assert!(parse_images(&bytes).is_err());
    }

    #[test]
    fn test_short_header() {
        assert!(parse_labels(&[0, 0, 8]).is_err());
    }
}
