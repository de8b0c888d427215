//! ICC profile embedding for baseline JPEG
//!
//! Profiles are split over APP2 segments tagged `ICC_PROFILE\0`, each
//! carrying a 1-based sequence number and the total segment count.

use thiserror::Error;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP2: u8 = 0xE2;
const ICC_TAG: &[u8; 12] = b"ICC_PROFILE\0";

/// Largest profile slice per segment: 65535 - length field - tag - seq/count.
pub const MAX_SEGMENT_PAYLOAD: usize = 65535 - 2 - 12 - 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JpegError {
    #[error("Missing SOI marker")]
    NotJpeg,

    #[error("ICC profile needs {0} segments, at most 255 allowed")]
    ProfileTooLarge(usize),
}

pub fn embed_icc_profile(jpeg: &[u8], icc: &[u8]) -> Result<Vec<u8>, JpegError> {
    if jpeg.len() < 2 || jpeg[..2] != SOI {
        return Err(JpegError::NotJpeg);
    }
    if icc.is_empty() {
        return Ok(jpeg.to_vec());
    }

    let count = icc.len().div_ceil(MAX_SEGMENT_PAYLOAD);
    if count > 255 {
        return Err(JpegError::ProfileTooLarge(count));
    }

    let insert_at = after_jfif(jpeg);
    let mut out = Vec::with_capacity(jpeg.len() + icc.len() + count * 18);
    out.extend_from_slice(&jpeg[..insert_at]);

    for (i, slice) in icc.chunks(MAX_SEGMENT_PAYLOAD).enumerate() {
        let length = (2 + ICC_TAG.len() + 2 + slice.len()) as u16;
        out.extend_from_slice(&[0xFF, APP2]);
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(ICC_TAG);
        out.push((i + 1) as u8);
        out.push(count as u8);
        out.extend_from_slice(slice);
    }

    out.extend_from_slice(&jpeg[insert_at..]);
    Ok(out)
}

/// Offset just past SOI and a directly following APP0 segment.
fn after_jfif(jpeg: &[u8]) -> usize {
    let offset = SOI.len();
    if jpeg.len() >= offset + 4 && jpeg[offset] == 0xFF && jpeg[offset + 1] == APP0 {
        let length = u16::from_be_bytes([jpeg[offset + 2], jpeg[offset + 3]]) as usize;
        if offset + 2 + length <= jpeg.len() {
            return offset + 2 + length;
        }
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_jpeg() -> Vec<u8> {
        let mut jpeg = SOI.to_vec();
        // APP0 JFIF, length 16
        jpeg.extend_from_slice(&[0xFF, APP0, 0x00, 0x10]);
        jpeg.extend_from_slice(b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_single_segment_after_app0() {
        let jpeg = minimal_jpeg();
        let out = embed_icc_profile(&jpeg, b"profile").unwrap();
        assert_eq!(&out[..20], &jpeg[..20]);
        assert_eq!(&out[20..22], &[0xFF, APP2]);
        assert_eq!(u16::from_be_bytes([out[22], out[23]]), 2 + 12 + 2 + 7);
        assert_eq!(&out[24..36], ICC_TAG);
        assert_eq!(&out[36..38], &[1, 1]);
        assert_eq!(&out[38..45], b"profile");
        assert_eq!(&out[45..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_large_profile_is_split() {
        let icc = vec![7u8; MAX_SEGMENT_PAYLOAD + 10];
        let out = embed_icc_profile(&minimal_jpeg(), &icc).unwrap();
        let segments = out
            .windows(ICC_TAG.len())
            .filter(|w| *w == ICC_TAG.as_slice())
            .count();
        assert_eq!(segments, 2);
    }

    #[test]
    fn test_rejects_non_jpeg() {
        assert_eq!(embed_icc_profile(b"RIFF", b"icc"), Err(JpegError::NotJpeg));
    }
}
