use serde::Serialize;

use super::check_url;
use crate::{Result, error::ensure_arg};

/// Which signal of the source video is kept when repainting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ControlCondition {
    /// Body pose and facial expression
    Posebodyface,
    /// Body pose only
    Posebody,
    Depth,
    /// Line art
    Scribble,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRepainting {
    pub video_url: String,
    pub control_condition: ControlCondition,
}

impl VideoRepainting {
    pub(super) fn validate(&self) -> Result<()> {
        check_url("video_url", &self.video_url)
    }
}

/// Local edit; white areas of the mask get regenerated.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEdit {
    pub video_url: String,
    pub mask_url: Option<String>,
}

impl VideoEdit {
    pub(super) fn validate(&self) -> Result<()> {
        check_url("video_url", &self.video_url)?;
        if let Some(mask) = &self.mask_url {
            check_url("mask_url", mask)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoExtension {
    pub first_frame_image: String,
    /// Seconds
    pub duration: Option<u32>,
}

impl VideoExtension {
    pub(super) fn validate(&self) -> Result<()> {
        check_url("first_frame_image", &self.first_frame_image)?;
        if let Some(duration) = self.duration {
            ensure_arg!(duration > 0, "duration must be at least 1 second");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoExpansion {
    pub video_url: String,
    /// 1.5 grows the frame by half in each direction.
    pub expansion_ratio: Option<f32>,
}

impl VideoExpansion {
    pub(super) fn validate(&self) -> Result<()> {
        check_url("video_url", &self.video_url)?;
        if let Some(ratio) = self.expansion_ratio {
            ensure_arg!(
                ratio.is_finite() && ratio > 1.0,
                "expansion_ratio must be greater than 1.0, got {ratio}"
            );
        }
        Ok(())
    }
}
