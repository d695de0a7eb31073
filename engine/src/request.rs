//! Requests for the asynchronous generation endpoints.
//!
//! A [`TaskRequest`] is a model name, a prompt and one [`Operation`]. The operation
//! decides the endpoint, the polling cadence family and which `input` /
//! `parameters` fields end up in the payload:
//!
//! ```text
//! { "model": "...", "input": { ["function",] "prompt", ... }, "parameters": { ... } }
//! ```
//!
//! Optional fields that weren't set are left out of the payload entirely.

use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};

use crate::{Error, Result, error::ensure_arg, polling::TaskFamily};

pub mod image;
pub mod video;

pub use image::{ImageReference, RefRole, TextToImage};
pub use video::{ControlCondition, VideoEdit, VideoExpansion, VideoExtension, VideoRepainting};

pub const MAX_PROMPT_CHARS: usize = 800;
pub const MAX_NEGATIVE_PROMPT_CHARS: usize = 500;

const TEXT_TO_IMAGE_PATH: &str = "services/aigc/text2image/image-synthesis";
const VIDEO_SYNTHESIS_PATH: &str = "services/aigc/video-generation/video-synthesis";

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub model: String,
    pub prompt: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    TextToImage(TextToImage),
    ImageReference(ImageReference),
    VideoRepainting(VideoRepainting),
    VideoEdit(VideoEdit),
    VideoExtension(VideoExtension),
    VideoExpansion(VideoExpansion),
}

/// The `input.function` discriminator of the video synthesis endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VideoFunction {
    ImageReference,
    VideoRepainting,
    VideoEdit,
    VideoExtension,
    VideoExpansion,
}

impl TaskRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, operation: Operation) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            operation,
        }
    }

    /// Shorthand for the common `wan2.x-t2i` call.
    pub fn text_to_image(
        model: impl Into<String>,
        prompt: impl Into<String>,
        size: Size,
        n: u8,
    ) -> Self {
        Self::new(
            model,
            prompt,
            Operation::TextToImage(TextToImage::new(size, n)),
        )
    }

    pub fn validate(&self) -> Result<()> {
        ensure_arg!(!self.model.trim().is_empty(), "model must not be empty");
        ensure_arg!(!self.prompt.trim().is_empty(), "prompt must not be empty");
        check_len("prompt", &self.prompt, MAX_PROMPT_CHARS)?;

        match &self.operation {
            Operation::TextToImage(op) => op.validate(),
            Operation::ImageReference(op) => op.validate(),
            Operation::VideoRepainting(op) => op.validate(),
            Operation::VideoEdit(op) => op.validate(),
            Operation::VideoExtension(op) => op.validate(),
            Operation::VideoExpansion(op) => op.validate(),
        }
    }

    pub fn family(&self) -> TaskFamily {
        self.operation.family()
    }

    pub(crate) fn endpoint(&self) -> &'static str {
        match self.operation {
            Operation::TextToImage(_) => TEXT_TO_IMAGE_PATH,
            _ => VIDEO_SYNTHESIS_PATH,
        }
    }

    /// Whether the request points at files uploaded to the platform's temporary storage.
    /// Those need an extra header so the platform resolves them.
    pub fn uses_oss_resources(&self) -> bool {
        self.operation.urls().any(|u| u.starts_with("oss://"))
    }

    pub fn payload(&self) -> Payload<'_> {
        let mut payload = Payload {
            model: &self.model,
            input: Input {
                function: self.operation.function(),
                prompt: &self.prompt,
                ..Default::default()
            },
            parameters: Parameters::default(),
        };
        self.operation
            .fill(&mut payload.input, &mut payload.parameters);
        payload
    }
}

impl Operation {
    pub fn family(&self) -> TaskFamily {
        match self {
            Operation::TextToImage(_) => TaskFamily::Short,
            _ => TaskFamily::Long,
        }
    }

    pub fn function(&self) -> Option<VideoFunction> {
        Some(match self {
            Operation::TextToImage(_) => return None,
            Operation::ImageReference(_) => VideoFunction::ImageReference,
            Operation::VideoRepainting(_) => VideoFunction::VideoRepainting,
            Operation::VideoEdit(_) => VideoFunction::VideoEdit,
            Operation::VideoExtension(_) => VideoFunction::VideoExtension,
            Operation::VideoExpansion(_) => VideoFunction::VideoExpansion,
        })
    }

    fn urls(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Operation::TextToImage(_) => Box::new(std::iter::empty()),
            Operation::ImageReference(op) => Box::new(op.ref_images_url.iter().map(String::as_str)),
            Operation::VideoRepainting(op) => Box::new(std::iter::once(op.video_url.as_str())),
            Operation::VideoEdit(op) => Box::new(
                std::iter::once(op.video_url.as_str()).chain(op.mask_url.as_deref()),
            ),
            Operation::VideoExtension(op) => {
                Box::new(std::iter::once(op.first_frame_image.as_str()))
            }
            Operation::VideoExpansion(op) => Box::new(std::iter::once(op.video_url.as_str())),
        }
    }

    fn fill<'a>(&'a self, input: &mut Input<'a>, params: &mut Parameters<'a>) {
        match self {
            Operation::TextToImage(op) => {
                input.negative_prompt = op.negative_prompt.as_deref();
                params.size = Some(op.size);
                params.n = Some(op.n);
                params.seed = op.seed;
                params.prompt_extend = op.prompt_extend;
                params.watermark = op.watermark;
            }
            Operation::ImageReference(op) => {
                input.ref_images_url = Some(&op.ref_images_url);
                params.obj_or_bg = op.obj_or_bg.as_deref();
                params.size = op.size;
            }
            Operation::VideoRepainting(op) => {
                input.video_url = Some(&op.video_url);
                params.control_condition = Some(op.control_condition);
            }
            Operation::VideoEdit(op) => {
                input.video_url = Some(&op.video_url);
                input.mask_url = op.mask_url.as_deref();
            }
            Operation::VideoExtension(op) => {
                input.first_frame_image = Some(&op.first_frame_image);
                params.duration = op.duration;
            }
            Operation::VideoExpansion(op) => {
                input.video_url = Some(&op.video_url);
                params.expansion_ratio = op.expansion_ratio;
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    model: &'a str,
    input: Input<'a>,
    parameters: Parameters<'a>,
}

#[derive(Debug, Default, Serialize)]
struct Input<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<VideoFunction>,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_images_url: Option<&'a nonempty::NonEmpty<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_frame_image: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
struct Parameters<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<Size>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_extend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watermark: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    obj_or_bg: Option<&'a [RefRole]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    control_condition: Option<ControlCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expansion_ratio: Option<f32>,
}

/// Output resolution, written `W*H` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("size must look like 1024*1024, got {s:?}"));
        let (w, h) = s.split_once('*').ok_or_else(invalid)?;
        Ok(Self {
            width: w.trim().parse().map_err(|_| invalid())?,
            height: h.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    ensure_arg!(len <= max, "{field} is {len} characters long, at most {max} are allowed");
    Ok(())
}

pub(crate) fn check_url(field: &str, url: &str) -> Result<()> {
    ensure_arg!(
        ["http://", "https://", "oss://"]
            .iter()
            .any(|scheme| url.starts_with(scheme)),
        "{field} must be an http(s) or oss:// URL, got {url:?}"
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use expect_test::expect;
    use nonempty::nonempty;

    use super::*;

    #[test]
    fn text_to_image_payload_omits_unset_fields() {
        let req = TaskRequest::text_to_image(
            "wan2.2-t2i-flash",
            "a red rose",
            "1328*1328".parse().unwrap(),
            1,
        );

        let value = serde_json::to_value(req.payload()).unwrap();
        assert_eq!(value["parameters"]["size"], "1328*1328");
        assert_eq!(value["parameters"]["n"], 1);
        assert!(value["input"].get("negative_prompt").is_none());

        let expect = expect![[r#"{"model":"wan2.2-t2i-flash","input":{"prompt":"a red rose"},"parameters":{"size":"1328*1328","n":1}}"#]];
        expect.assert_eq(&serde_json::to_string(&req.payload()).unwrap());
    }

    #[test]
    fn negative_prompt_goes_into_input() {
        let mut op = TextToImage::new(Size::new(1024, 1024), 2);
        op.negative_prompt = Some("people".into());
        op.seed = Some(42);
        let req = TaskRequest::new("wan2.2-t2i-plus", "snowy chapel", Operation::TextToImage(op));

        let expect = expect![[r#"{"model":"wan2.2-t2i-plus","input":{"prompt":"snowy chapel","negative_prompt":"people"},"parameters":{"size":"1024*1024","n":2,"seed":42}}"#]];
        expect.assert_eq(&serde_json::to_string(&req.payload()).unwrap());
    }

    #[test]
    fn image_reference_payload() {
        let req = TaskRequest::new(
            "wanx2.1-vace-plus",
            "a girl walks out of the forest",
            Operation::ImageReference(ImageReference {
                ref_images_url: nonempty!["http://x/obj.png".to_string(), "http://x/bg.png".to_string()],
                obj_or_bg: Some(vec![RefRole::Obj, RefRole::Bg]),
                size: Some(Size::new(1280, 720)),
            }),
        );

        let expect = expect![[r#"{"model":"wanx2.1-vace-plus","input":{"function":"image_reference","prompt":"a girl walks out of the forest","ref_images_url":["http://x/obj.png","http://x/bg.png"]},"parameters":{"size":"1280*720","obj_or_bg":["obj","bg"]}}"#]];
        expect.assert_eq(&serde_json::to_string(&req.payload()).unwrap());
        assert_eq!(req.endpoint(), VIDEO_SYNTHESIS_PATH);
        assert_eq!(req.family(), TaskFamily::Long);
    }

    #[test]
    fn repainting_payload() {
        let req = TaskRequest::new(
            "wanx2.1-vace-plus",
            "cyberpunk city",
            Operation::VideoRepainting(VideoRepainting {
                video_url: "http://x/in.mp4".into(),
                control_condition: ControlCondition::Depth,
            }),
        );
        let expect = expect![[r#"{"model":"wanx2.1-vace-plus","input":{"function":"video_repainting","prompt":"cyberpunk city","video_url":"http://x/in.mp4"},"parameters":{"control_condition":"depth"}}"#]];
        expect.assert_eq(&serde_json::to_string(&req.payload()).unwrap());
    }

    #[test]
    fn overlong_prompt_is_rejected() {
        let req = TaskRequest::text_to_image(
            "wan2.2-t2i-flash",
            "花".repeat(MAX_PROMPT_CHARS + 1),
            Size::new(1024, 1024),
            1,
        );
        let err = req.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");

        // Multibyte characters count once each
        let req = TaskRequest::text_to_image(
            "wan2.2-t2i-flash",
            "花".repeat(MAX_PROMPT_CHARS),
            Size::new(1024, 1024),
            1,
        );
        req.validate().unwrap();
    }

    #[test]
    fn oss_urls_are_detected() {
        let req = TaskRequest::new(
            "wanx2.1-vace-plus",
            "remove the car",
            Operation::VideoEdit(VideoEdit {
                video_url: "https://x/in.mp4".into(),
                mask_url: Some("oss://dashscope-instant/abc/mask.png".into()),
            }),
        );
        assert!(req.uses_oss_resources());
        req.validate().unwrap();
    }

    #[test]
    fn size_parsing() {
        assert_eq!("1440*720".parse::<Size>().unwrap(), Size::new(1440, 720));
        assert!("1440x720".parse::<Size>().is_err());
        assert!("*720".parse::<Size>().is_err());
    }
}
