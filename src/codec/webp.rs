//! WebP extended container builder
//!
//! Encoders emit either a simple `VP8 ` file or a VP8X file with an `ALPH`
//! chunk. Both are rebuilt as VP8X with metadata chunks in the order the
//! container format requires: VP8X, ICCP, image data, EXIF, XMP.

use thiserror::Error;

const ICC_FLAG: u8 = 0x20;
const ALPHA_FLAG: u8 = 0x10;
const EXIF_FLAG: u8 = 0x08;
const XMP_FLAG: u8 = 0x04;

const MAX_CANVAS: u32 = 1 << 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Not a RIFF/WEBP file")]
    NotRiff,

    #[error("Chunk at offset {0} runs past end of file")]
    Truncated(usize),

    #[error("No image chunk in bitstream")]
    MissingImage,

    #[error("Canvas {0}x{1} outside 1..=16777216")]
    CanvasSize(u32, u32),
}

/// Metadata blocks to embed. `None` leaves the block out.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPMetadata<'a> {
    pub icc: Option<&'a [u8]>,
    pub exif: Option<&'a [u8]>,
    pub xmp: Option<&'a [u8]>,
}

impl WebPMetadata<'_> {
    pub fn is_empty(&self) -> bool {
        self.icc.is_none() && self.exif.is_none() && self.xmp.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub fourcc: [u8; 4],
    pub data: &'a [u8],
}

pub fn parse_chunks(file: &[u8]) -> Result<Vec<Chunk<'_>>, ContainerError> {
    if file.len() < 12 || &file[0..4] != b"RIFF" || &file[8..12] != b"WEBP" {
        return Err(ContainerError::NotRiff);
    }

    let mut chunks = vec![];
    let mut offset = 12;
    while offset + 8 <= file.len() {
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&file[offset..offset + 4]);
        let size = u32::from_le_bytes([
            file[offset + 4],
            file[offset + 5],
            file[offset + 6],
            file[offset + 7],
        ]) as usize;
        let start = offset + 8;
        let end = start.checked_add(size).ok_or(ContainerError::Truncated(offset))?;
        if end > file.len() {
            return Err(ContainerError::Truncated(offset));
        }
        chunks.push(Chunk { fourcc, data: &file[start..end] });
        offset = end + (size & 1);
    }
    Ok(chunks)
}

/// Rebuilds an encoded WebP file as VP8X carrying `metadata`.
pub fn wrap_extended(
    bitstream: &[u8],
    width: u32,
    height: u32,
    metadata: &WebPMetadata<'_>,
) -> Result<Vec<u8>, ContainerError> {
    if metadata.is_empty() {
        return Ok(bitstream.to_vec());
    }
    if width == 0 || height == 0 || width > MAX_CANVAS || height > MAX_CANVAS {
        return Err(ContainerError::CanvasSize(width, height));
    }

    let mut alpha = false;
    let mut image = vec![];
    for chunk in parse_chunks(bitstream)? {
        match &chunk.fourcc {
            b"VP8X" => alpha |= chunk.data.first().is_some_and(|f| f & ALPHA_FLAG != 0),
            // Replaced by the blocks passed in
            b"ICCP" | b"EXIF" | b"XMP " => {}
            b"ALPH" => {
                alpha = true;
                image.push(chunk);
            }
            _ => image.push(chunk),
        }
    }
    if image.is_empty() {
        return Err(ContainerError::MissingImage);
    }

    let mut flags = 0u8;
    if metadata.icc.is_some() {
        flags |= ICC_FLAG;
    }
    if alpha {
        flags |= ALPHA_FLAG;
    }
    if metadata.exif.is_some() {
        flags |= EXIF_FLAG;
    }
    if metadata.xmp.is_some() {
        flags |= XMP_FLAG;
    }

    let mut header = [0u8; 10];
    header[0] = flags;
    header[4..7].copy_from_slice(&(width - 1).to_le_bytes()[..3]);
    header[7..10].copy_from_slice(&(height - 1).to_le_bytes()[..3]);

    let mut out = Vec::with_capacity(bitstream.len() + 64);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(b"WEBP");

    write_chunk(&mut out, b"VP8X", &header);
    if let Some(icc) = metadata.icc {
        write_chunk(&mut out, b"ICCP", icc);
    }
    for chunk in &image {
        write_chunk(&mut out, &chunk.fourcc, chunk.data);
    }
    if let Some(exif) = metadata.exif {
        write_chunk(&mut out, b"EXIF", exif);
    }
    if let Some(xmp) = metadata.xmp {
        write_chunk(&mut out, b"XMP ", xmp);
    }

    let riff_size = (out.len() - 8) as u32;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());
    Ok(out)
}

fn write_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_file(payload: &[u8]) -> Vec<u8> {
        let mut out = b"RIFF\0\0\0\0WEBP".to_vec();
        write_chunk(&mut out, b"VP8 ", payload);
        let size = (out.len() - 8) as u32;
        out[4..8].copy_from_slice(&size.to_le_bytes());
        out
    }

    #[test]
    fn test_no_metadata_is_passthrough() {
        let file = simple_file(&[1, 2, 3]);
        let wrapped = wrap_extended(&file, 4, 4, &WebPMetadata::default()).unwrap();
        assert_eq!(wrapped, file);
    }

    #[test]
    fn test_chunk_order_and_flags() {
        let file = simple_file(&[1, 2, 3]);
        let metadata = WebPMetadata {
            icc: Some(&b"icc"[..]),
            exif: Some(&b"Exif"[..]),
            xmp: Some(&b"<x/>"[..]),
        };
        let wrapped = wrap_extended(&file, 300, 200, &metadata).unwrap();
        let chunks = parse_chunks(&wrapped).unwrap();
        let order: Vec<_> = chunks.iter().map(|c| &c.fourcc).collect();
        assert_eq!(order, vec![b"VP8X", b"ICCP", b"VP8 ", b"EXIF", b"XMP "]);

        let vp8x = chunks[0].data;
        assert_eq!(vp8x[0], ICC_FLAG | EXIF_FLAG | XMP_FLAG);
        assert_eq!(u32::from_le_bytes([vp8x[4], vp8x[5], vp8x[6], 0]), 299);
        assert_eq!(u32::from_le_bytes([vp8x[7], vp8x[8], vp8x[9], 0]), 199);
        assert_eq!(chunks[2].data, &[1, 2, 3]);

        let riff_size = u32::from_le_bytes([wrapped[4], wrapped[5], wrapped[6], wrapped[7]]);
        assert_eq!(riff_size as usize, wrapped.len() - 8);
    }

    #[test]
    fn test_alpha_flag_carried_over() {
        let mut file = b"RIFF\0\0\0\0WEBP".to_vec();
        write_chunk(&mut file, b"VP8X", &[ALPHA_FLAG, 0, 0, 0, 3, 0, 0, 3, 0, 0]);
        write_chunk(&mut file, b"ALPH", &[9, 9]);
        write_chunk(&mut file, b"VP8 ", &[1, 2]);
        let size = (file.len() - 8) as u32;
        file[4..8].copy_from_slice(&size.to_le_bytes());

        let metadata = WebPMetadata { xmp: Some(&b"<x/>"[..]), ..Default::default() };
        let wrapped = wrap_extended(&file, 4, 4, &metadata).unwrap();
        let chunks = parse_chunks(&wrapped).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].data[0], ALPHA_FLAG | XMP_FLAG);
        assert_eq!(&chunks[1].fourcc, b"ALPH");
    }

    #[test]
    fn test_truncated_chunk_rejected() {
        let mut file = simple_file(&[1, 2, 3, 4]);
        file.truncate(file.len() - 2);
        let metadata = WebPMetadata { xmp: Some(&b"x"[..]), ..Default::default() };
        assert_eq!(
            wrap_extended(&file, 1, 1, &metadata),
            Err(ContainerError::Truncated(12))
        );
    }

    #[test]
    fn test_not_riff_rejected() {
        assert_eq!(parse_chunks(b"\xff\xd8\xff").unwrap_err(), ContainerError::NotRiff);
    }
}
