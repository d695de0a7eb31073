//! Qwen-Image synthesis over the multimodal-generation endpoint. Synchronous: the
//! response already carries the image URL.

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    Connection, Error, Result, Size,
    error::ensure_arg,
    request::{MAX_NEGATIVE_PROMPT_CHARS, MAX_PROMPT_CHARS, check_len},
    speech::MULTIMODAL_PATH,
    task::Asset,
};

pub const MODEL: &str = "qwen-image";

/// The only resolutions qwen-image accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum QwenImageSize {
    /// 1664*928
    #[value(name = "16:9")]
    Landscape16x9,
    /// 1472*1140
    #[value(name = "4:3")]
    Landscape4x3,
    /// 1328*1328
    #[default]
    #[value(name = "1:1")]
    Square,
    /// 1140*1472
    #[value(name = "3:4")]
    Portrait3x4,
    /// 928*1664
    #[value(name = "9:16")]
    Portrait9x16,
}

impl QwenImageSize {
    pub fn size(&self) -> Size {
        match self {
            Self::Landscape16x9 => Size::new(1664, 928),
            Self::Landscape4x3 => Size::new(1472, 1140),
            Self::Square => Size::new(1328, 1328),
            Self::Portrait3x4 => Size::new(1140, 1472),
            Self::Portrait9x16 => Size::new(928, 1664),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QwenImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub size: QwenImageSize,
    pub prompt_extend: bool,
    pub watermark: bool,
    pub seed: Option<u32>,
}

impl QwenImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            size: QwenImageSize::default(),
            prompt_extend: true,
            watermark: false,
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_arg!(!self.prompt.trim().is_empty(), "prompt must not be empty");
        check_len("prompt", &self.prompt, MAX_PROMPT_CHARS)?;
        if let Some(negative) = &self.negative_prompt {
            check_len("negative_prompt", negative, MAX_NEGATIVE_PROMPT_CHARS)?;
        }
        Ok(())
    }

    fn payload(&self) -> Payload<'_> {
        Payload {
            model: MODEL,
            input: Input {
                messages: [Message {
                    role: "user",
                    content: [Text { text: &self.prompt }],
                }],
            },
            parameters: Parameters {
                size: self.size.size(),
                // qwen-image only ever renders one image per call
                n: 1,
                prompt_extend: self.prompt_extend,
                watermark: self.watermark,
                negative_prompt: self.negative_prompt.as_deref().filter(|n| !n.is_empty()),
                seed: self.seed,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    model: &'static str,
    input: Input<'a>,
    parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
struct Input<'a> {
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: [Text<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Text<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Parameters<'a> {
    size: Size,
    n: u8,
    prompt_extend: bool,
    watermark: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Response {
    output: Option<ResponseOutput>,
}

#[derive(Debug, Deserialize)]
struct ResponseOutput {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Vec<serde_json::Value>,
}

/// Renders `request` and returns the URL of the image.
pub async fn generate(conn: &Connection, request: &QwenImageRequest) -> Result<Asset> {
    request.validate()?;

    let response: Response = conn
        .send_json(conn.post(MULTIMODAL_PATH).json(&request.payload()))
        .await?;

    let choice = response
        .output
        .and_then(|o| o.choices.into_iter().next())
        .ok_or_else(|| Error::MalformedResponse("no output.choices in qwen-image response".into()))?;
    let url = choice
        .message
        .content
        .iter()
        .find_map(|item| item["image"].as_str())
        .ok_or_else(|| Error::MalformedResponse("no image in qwen-image response".into()))?;

    info!("qwen-image rendered {url}");
    Ok(Asset::new(url))
}

#[cfg(test)]
mod test {
    use expect_test::expect;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    #[test]
    fn payload_shape() {
        let req = QwenImageRequest::new("an orange kitten on the grass");
        let expect = expect![[r#"{"model":"qwen-image","input":{"messages":[{"role":"user","content":[{"text":"an orange kitten on the grass"}]}]},"parameters":{"size":"1328*1328","n":1,"prompt_extend":true,"watermark":false}}"#]];
        expect.assert_eq(&serde_json::to_string(&req.payload()).unwrap());
    }

    #[test]
    fn negative_prompt_and_seed_when_set() {
        let req = QwenImageRequest {
            negative_prompt: Some("blurry".into()),
            seed: Some(7),
            size: QwenImageSize::Portrait9x16,
            ..QwenImageRequest::new("poster")
        };
        let value = serde_json::to_value(req.payload()).unwrap();
        assert_eq!(value["parameters"]["negative_prompt"], "blurry");
        assert_eq!(value["parameters"]["seed"], 7);
        assert_eq!(value["parameters"]["size"], "928*1664");
    }

    #[tokio::test]
    async fn extracts_image_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{MULTIMODAL_PATH}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {"choices": [{
                    "finish_reason": "stop",
                    "message": {"role": "assistant", "content": [{"image": "http://x/cat.png"}]}
                }]},
                "usage": {"width": 1328, "height": 1328, "image_count": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;
        let conn = Connection::new("sk-test", server.uri());

        let asset = generate(&conn, &QwenImageRequest::new("cat")).await.unwrap();

        assert_eq!(asset.url, "http://x/cat.png");
    }

    #[tokio::test]
    async fn missing_image_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {"choices": [{"message": {"content": [{"text": "sorry"}]}}]}
            })))
            .mount(&server)
            .await;
        let conn = Connection::new("sk-test", server.uri());

        let err = generate(&conn, &QwenImageRequest::new("cat")).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "{err:?}");
    }
}
