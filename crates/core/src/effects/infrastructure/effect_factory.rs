use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::effects::domain::face_effect::FaceEffect;

use super::contour_effect::ContourEffect;
use super::red_nose_effect::RedNoseEffect;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    #[default]
    Nose,
    Contour,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectKind::Nose => write!(f, "nose"),
            EffectKind::Contour => write!(f, "contour"),
        }
    }
}

impl FromStr for EffectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nose" | "rudolph" => Ok(EffectKind::Nose),
            "contour" => Ok(EffectKind::Contour),
            other => Err(format!("unknown effect {other:?} (expected nose or contour)")),
        }
    }
}

/// Creates the overlay for `kind` with its default styling.
pub fn create_effect(kind: EffectKind) -> Box<dyn FaceEffect> {
    log::info!("Using {kind} effect");
    match kind {
        EffectKind::Nose => Box::new(RedNoseEffect::default()),
        EffectKind::Contour => Box::new(ContourEffect::default()),
    }
}
