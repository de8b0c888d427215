//! Container-level codec helpers
//!
//! - **WebP**: extended (VP8X) RIFF container with ICCP, EXIF and XMP chunks
//! - **JPEG**: ICC profile as APP2 `ICC_PROFILE` segments

pub mod jpeg;
pub mod webp;

pub use jpeg::embed_icc_profile;
pub use webp::{WebPMetadata, wrap_extended};
