use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Style presets offered by the booth. Each maps to a fixed prompt sent to the
/// image model; anything outside this registry is rejected before any model
/// call is made.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, EnumIter, PartialEq, Eq, Hash,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum StylePreset {
    Vintage,
    Anime,
    Cyberpunk,
}

impl StylePreset {
    /// Prompt payload for the image model. Kept deliberately literal: the
    /// model receives exactly this text plus one photo per request.
    pub fn prompt(&self) -> &'static str {
        match self {
            StylePreset::Vintage => {
                "Restyle this photo as a faded 1970s film photograph: warm tones, \
                 soft grain, slight vignette. Keep every person's face, pose and \
                 framing exactly as in the original."
            }
            StylePreset::Anime => {
                "Redraw this photo as a hand-drawn anime illustration with clean \
                 line art and cel shading. Keep every person's face, pose and \
                 framing exactly as in the original."
            }
            StylePreset::Cyberpunk => {
                "Restyle this photo as a neon-lit cyberpunk scene: saturated pinks \
                 and blues, rain-slick reflections. Keep every person's face, pose \
                 and framing exactly as in the original."
            }
        }
    }

    /// Comma-separated list of valid preset names, for error messages.
    pub fn registry() -> String {
        StylePreset::iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
