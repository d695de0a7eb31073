use nonempty::NonEmpty;
use serde::Serialize;

use super::{MAX_NEGATIVE_PROMPT_CHARS, Size, check_len, check_url};
use crate::{Result, error::ensure_arg};

pub const MIN_SIDE: u32 = 512;
pub const MAX_SIDE: u32 = 1440;
pub const MAX_PIXELS: u64 = 2_000_000;
pub const MAX_IMAGES: u8 = 4;
pub const MAX_REFERENCE_IMAGES: usize = 3;

/// Text-to-image v2 (`wan2.x-t2i-*`, `wanx2.x-t2i-*`)
#[derive(Debug, Clone, PartialEq)]
pub struct TextToImage {
    pub negative_prompt: Option<String>,
    pub size: Size,
    pub n: u8,
    pub seed: Option<u32>,
    pub prompt_extend: Option<bool>,
    pub watermark: Option<bool>,
}

impl TextToImage {
    pub fn new(size: Size, n: u8) -> Self {
        Self {
            negative_prompt: None,
            size,
            n,
            seed: None,
            prompt_extend: None,
            watermark: None,
        }
    }

    pub(super) fn validate(&self) -> Result<()> {
        if let Some(negative) = &self.negative_prompt {
            check_len("negative_prompt", negative, MAX_NEGATIVE_PROMPT_CHARS)?;
        }
        ensure_arg!(
            (1..=MAX_IMAGES).contains(&self.n),
            "n must be between 1 and {MAX_IMAGES}, got {}",
            self.n
        );
        let Size { width, height } = self.size;
        ensure_arg!(
            (MIN_SIDE..=MAX_SIDE).contains(&width) && (MIN_SIDE..=MAX_SIDE).contains(&height),
            "width and height must be within [{MIN_SIDE}, {MAX_SIDE}], got {}",
            self.size
        );
        ensure_arg!(
            self.size.pixels() <= MAX_PIXELS,
            "size {} exceeds {MAX_PIXELS} pixels",
            self.size
        );
        Ok(())
    }
}

/// Which part of the scene a reference image provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefRole {
    /// Subject
    Obj,
    /// Background
    Bg,
}

/// Video from up to three reference images
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReference {
    pub ref_images_url: NonEmpty<String>,
    /// One entry per reference image when given.
    pub obj_or_bg: Option<Vec<RefRole>>,
    pub size: Option<Size>,
}

impl ImageReference {
    pub(super) fn validate(&self) -> Result<()> {
        let n_images = self.ref_images_url.len();
        ensure_arg!(
            n_images <= MAX_REFERENCE_IMAGES,
            "at most {MAX_REFERENCE_IMAGES} reference images are supported, got {n_images}"
        );
        for url in self.ref_images_url.iter() {
            check_url("ref_images_url", url)?;
        }
        if let Some(roles) = &self.obj_or_bg {
            ensure_arg!(
                roles.len() == n_images,
                "obj_or_bg needs one entry per reference image ({n_images}), got {}",
                roles.len()
            );
        }
        Ok(())
    }
}
