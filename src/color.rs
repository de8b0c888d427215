//! Color Normalizer
//!
//! Non-RGB units are converted to the canonical profile. Every unit then has
//! its mode forced to RGB and its depth to 8 bits per channel. RGB units keep
//! their working profile.

use serde::Serialize;
use thiserror::Error;

use crate::host::{
    BitDepth, ColorMode, DocumentId, Host, HostError, ProfileConversion, RenderingIntent,
};

pub const CANONICAL_PROFILE: &str = "sRGB IEC61966-2.1";

/// Working profiles that survive normalization but exceed sRGB.
const WIDE_GAMUT_PROFILES: [&str; 4] = ["ProPhoto", "Adobe RGB", "Display P3", "Rec.2020"];

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("Could not read document state: {0}")]
    Inspect(#[source] HostError),

    #[error("Profile conversion failed: {0}")]
    Convert(#[source] HostError),

    #[error("Mode change failed: {0}")]
    Mode(#[source] HostError),

    #[error("Bit depth change failed: {0}")]
    Depth(#[source] HostError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub source_mode: Option<ColorMode>,
    pub converted_profile: bool,
    pub retained_profile: Option<String>,
    /// Best-effort steps that failed
    pub degraded: Vec<String>,
}

pub struct ColorNormalizer {
    profile: String,
}

impl ColorNormalizer {
    pub fn new(profile: impl Into<String>) -> Self {
        Self { profile: profile.into() }
    }

    pub fn conversion(&self) -> ProfileConversion {
        ProfileConversion {
            profile: self.profile.clone(),
            intent: RenderingIntent::RelativeColorimetric,
            black_point_compensation: false,
            dither: false,
        }
    }

    pub fn normalize<H: Host + ?Sized>(&self, host: &mut H, doc: DocumentId) -> NormalizeReport {
        let mut report = NormalizeReport::default();

        let info = match host.document_info(doc) {
            Ok(info) => info,
            Err(e) => {
                let e = ColorError::Inspect(e);
                tracing::debug!(error = %e, "Color normalization skipped");
                report.degraded.push(e.to_string());
                return report;
            }
        };
        report.source_mode = Some(info.mode);

        if info.mode != ColorMode::Rgb {
            match host.convert_color_profile(doc, &self.conversion()) {
                Ok(()) => report.converted_profile = true,
                Err(e) => report.degraded.push(ColorError::Convert(e).to_string()),
            }
        } else {
            if is_wide_gamut(&info.profile) {
                tracing::warn!(profile = %info.profile, "Retaining wide-gamut RGB working profile");
            }
            report.retained_profile = Some(info.profile);
        }

        if let Err(e) = host.set_mode(doc, ColorMode::Rgb) {
            report.degraded.push(ColorError::Mode(e).to_string());
        }
        if let Err(e) = host.set_bit_depth(doc, BitDepth::Eight) {
            report.degraded.push(ColorError::Depth(e).to_string());
        }

        for message in &report.degraded {
            tracing::debug!(error = %message, "Color normalization step degraded");
        }
        report
    }
}

impl Default for ColorNormalizer {
    fn default() -> Self {
        Self::new(CANONICAL_PROFILE)
    }
}

pub fn is_wide_gamut(profile: &str) -> bool {
    WIDE_GAMUT_PROFILES.iter().any(|p| profile.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_policy() {
        let conversion = ColorNormalizer::default().conversion();
        assert_eq!(conversion.profile, CANONICAL_PROFILE);
        assert_eq!(conversion.intent, RenderingIntent::RelativeColorimetric);
        assert!(!conversion.black_point_compensation);
        assert!(!conversion.dither);
    }

    #[test]
    fn test_wide_gamut_detection() {
        assert!(is_wide_gamut("ProPhoto RGB"));
        assert!(is_wide_gamut("Adobe RGB (1998)"));
        assert!(!is_wide_gamut(CANONICAL_PROFILE));
    }
}
