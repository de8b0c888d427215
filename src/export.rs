//! Exporter - Fixed Codec Policy
//!
//! Format options are closed structs with fixed values. Each codec write for
//! a unit is attempted independently of the others.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host::{DocumentId, Host, HostError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    WebP,
    Jpeg,
}

impl Codec {
    /// Lowercase file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Codec::WebP => "webp",
            Codec::Jpeg => "jpg",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Codec::WebP => "WebP",
            Codec::Jpeg => "JPEG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebPCompression {
    Lossy,
    Lossless,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPExportOptions {
    pub compression: WebPCompression,
    /// 0-100
    pub quality: u8,
    pub include_xmp: bool,
    pub include_exif: bool,
    /// Colour profile chunk
    pub include_extras: bool,
}

impl Default for WebPExportOptions {
    fn default() -> Self {
        Self {
            compression: WebPCompression::Lossy,
            quality: 100,
            include_xmp: true,
            include_exif: true,
            include_extras: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JpegFormat {
    StandardBaseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matte {
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JpegExportOptions {
    pub format: JpegFormat,
    /// Host scale, 0-12
    pub quality: u8,
    pub embed_color_profile: bool,
    pub matte: Matte,
}

impl Default for JpegExportOptions {
    fn default() -> Self {
        Self {
            format: JpegFormat::StandardBaseline,
            quality: 12,
            embed_color_profile: true,
            matte: Matte::None,
        }
    }
}

/// Immutable per-codec export configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum ExportFormatSpec {
    WebP(WebPExportOptions),
    Jpeg(JpegExportOptions),
}

impl ExportFormatSpec {
    pub fn for_codec(codec: Codec) -> Self {
        match codec {
            Codec::WebP => ExportFormatSpec::WebP(WebPExportOptions::default()),
            Codec::Jpeg => ExportFormatSpec::Jpeg(JpegExportOptions::default()),
        }
    }

    pub fn codec(&self) -> Codec {
        match self {
            ExportFormatSpec::WebP(_) => Codec::WebP,
            ExportFormatSpec::Jpeg(_) => Codec::Jpeg,
        }
    }
}

/// What to do with the remaining codecs of a unit once one write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CodecFailurePolicy {
    #[default]
    Continue,
    AbortArtboard,
}

#[derive(Debug, Error)]
#[error("{} export to {} failed: {source}", codec.label(), path.display())]
pub struct ExportError {
    pub codec: Codec,
    pub path: PathBuf,
    #[source]
    pub source: HostError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedFile {
    pub name: String,
    pub codec: Codec,
    pub path: PathBuf,
    pub bytes: u64,
}

/// `<destination>/<name>.<ext>` with a lowercase extension.
pub fn export_path(destination: &Path, name: &str, codec: Codec) -> PathBuf {
    destination.join(format!("{}.{}", name, codec.extension()))
}

pub struct Exporter {
    specs: Vec<ExportFormatSpec>,
    failure_policy: CodecFailurePolicy,
}

impl Exporter {
    pub fn new(codecs: &[Codec], failure_policy: CodecFailurePolicy) -> Self {
        Self {
            specs: codecs.iter().copied().map(ExportFormatSpec::for_codec).collect(),
            failure_policy,
        }
    }

    /// Writes `doc` once per configured codec, in order.
    ///
    /// Whatever metadata `doc` still carries is embedded as the options
    /// allow. Under `CodecFailurePolicy::Continue` every codec is attempted.
    pub fn export<H: Host + ?Sized>(
        &self,
        host: &mut H,
        doc: DocumentId,
        destination: &Path,
        name: &str,
    ) -> Vec<Result<ExportedFile, ExportError>> {
        let mut results = Vec::with_capacity(self.specs.len());

        for spec in &self.specs {
            let codec = spec.codec();
            let path = export_path(destination, name, codec);

            let written = match spec {
                ExportFormatSpec::WebP(options) => host.export_webp(doc, &path, options),
                ExportFormatSpec::Jpeg(options) => host.export_jpeg(doc, &path, options),
            };

            match written {
                Ok(bytes) => {
                    tracing::debug!(codec = codec.label(), path = %path.display(), bytes, "Wrote file");
                    results.push(Ok(ExportedFile {
                        name: name.to_string(),
                        codec,
                        path,
                        bytes,
                    }));
                }
                Err(source) => {
                    tracing::error!(codec = codec.label(), path = %path.display(), error = %source, "Export failed");
                    results.push(Err(ExportError { codec, path, source }));
                    if self.failure_policy == CodecFailurePolicy::AbortArtboard {
                        break;
                    }
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_format_policy() {
        let webp = WebPExportOptions::default();
        assert_eq!(webp.compression, WebPCompression::Lossy);
        assert_eq!(webp.quality, 100);
        assert!(webp.include_xmp && webp.include_exif && webp.include_extras);

        let jpeg = JpegExportOptions::default();
        assert_eq!(jpeg.quality, 12);
        assert!(jpeg.embed_color_profile);
        assert_eq!(jpeg.matte, Matte::None);
    }

    #[test]
    fn test_export_path_lowercase_extension() {
        let path = export_path(Path::new("/out"), "Poster_Hero", Codec::Jpeg);
        assert_eq!(path, PathBuf::from("/out/Poster_Hero.jpg"));
        let path = export_path(Path::new("/out"), "Poster_Hero", Codec::WebP);
        assert_eq!(path, PathBuf::from("/out/Poster_Hero.webp"));
    }

    #[test]
    fn test_spec_serializes_with_codec_tag() {
        let json = serde_json::to_value(ExportFormatSpec::for_codec(Codec::WebP)).unwrap();
        assert_eq!(json["codec"], "webp");
        assert_eq!(json["quality"], 100);
    }
}
