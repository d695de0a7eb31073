//! Qwen-TTS speech synthesis. Unlike image and video generation this is a
//! single synchronous call.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumMessage, EnumString, IntoStaticStr};

use crate::{
    Connection, Error, Result,
    error::ensure_arg,
    media,
    request::check_len,
};

pub(crate) const MULTIMODAL_PATH: &str = "services/aigc/multimodal-generation/generation";
pub const MODEL: &str = "qwen-tts";
pub const MAX_TEXT_CHARS: usize = 500;
pub const SAMPLE_RATES: &[u32] = &[8000, 16000, 22050, 24000, 44100, 48000];
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumIter,
    EnumMessage,
    EnumString,
    IntoStaticStr,
    strum::Display,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
pub enum Voice {
    #[default]
    #[strum(to_string = "Cherry", message = "sweet female voice")]
    #[value(name = "Cherry")]
    Cherry,
    #[strum(to_string = "Chelsie", message = "gentle female voice")]
    #[value(name = "Chelsie")]
    Chelsie,
    #[strum(message = "calm, knowledgeable female voice")]
    Zhichu,
    #[strum(message = "lively female voice")]
    Zhixiaobai,
    #[strum(message = "fresh, sweet female voice")]
    Zhixiaoxia,
    #[strum(message = "elegant, mature female voice")]
    Zhimiao,
    #[strum(message = "soft, warm female voice")]
    Zhiyan,
    #[strum(message = "steady, magnetic male voice")]
    Zhiyuan,
    #[strum(message = "clear, natural male voice")]
    Zhiyun,
    #[strum(message = "mature, steady male voice")]
    Zhishuo,
    #[strum(message = "rational, professional male voice")]
    Zhiwei,
    #[strum(message = "bold male voice")]
    Zhihao,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    EnumIter,
    strum::Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Pcm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub volume: f32,
    pub speech_rate: f32,
    pub pitch_rate: f32,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            text: text.into(),
            voice,
            format: AudioFormat::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: 1.0,
            speech_rate: 1.0,
            pitch_rate: 1.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_arg!(!self.text.trim().is_empty(), "text must not be empty");
        check_len("text", &self.text, MAX_TEXT_CHARS)?;
        ensure_arg!(
            SAMPLE_RATES.contains(&self.sample_rate),
            "unsupported sample rate {}, expected one of {SAMPLE_RATES:?}",
            self.sample_rate
        );
        ensure_arg!(
            (0.1..=2.0).contains(&self.volume),
            "volume must be within [0.1, 2.0], got {}",
            self.volume
        );
        ensure_arg!(
            (0.5..=2.0).contains(&self.speech_rate),
            "speech_rate must be within [0.5, 2.0], got {}",
            self.speech_rate
        );
        ensure_arg!(
            (0.5..=2.0).contains(&self.pitch_rate),
            "pitch_rate must be within [0.5, 2.0], got {}",
            self.pitch_rate
        );
        Ok(())
    }

    fn payload(&self) -> Payload<'_> {
        let mut parameters = Parameters::default();
        if self.format != AudioFormat::default() {
            parameters.format = Some(self.format);
        }
        if self.sample_rate != DEFAULT_SAMPLE_RATE {
            parameters.sample_rate = Some(self.sample_rate);
        }
        if self.volume != 1.0 {
            parameters.volume = Some(self.volume);
        }
        if self.speech_rate != 1.0 {
            parameters.speech_rate = Some(self.speech_rate);
        }
        if self.pitch_rate != 1.0 {
            parameters.pitch_rate = Some(self.pitch_rate);
        }
        Payload {
            model: MODEL,
            input: Input {
                text: &self.text,
                voice: self.voice.into(),
            },
            parameters: (!parameters.is_empty()).then_some(parameters),
        }
    }
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    model: &'static str,
    input: Input<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Parameters>,
}

#[derive(Debug, Serialize)]
struct Input<'a> {
    text: &'a str,
    voice: &'static str,
}

#[derive(Debug, Default, PartialEq, Serialize)]
struct Parameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<AudioFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pitch_rate: Option<f32>,
}

impl Parameters {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    output: Option<ResponseOutput>,
}

#[derive(Debug, Deserialize)]
struct ResponseOutput {
    audio: Option<WireAudio>,
}

#[derive(Debug, Deserialize)]
struct WireAudio {
    url: Option<String>,
    data: Option<String>,
    id: Option<String>,
    expires_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Audio {
    pub data: Bytes,
    pub url: Option<String>,
    pub id: Option<String>,
    /// Unix timestamp after which `url` stops working.
    pub expires_at: Option<i64>,
}

/// Synthesizes `request`, fetching the audio if the platform returns a URL.
pub async fn synthesize(conn: &Connection, request: &SpeechRequest) -> Result<Audio> {
    request.validate()?;
    let payload = request.payload();
    debug!("Speech payload: {}", serde_json::to_string(&payload).unwrap_or_default());

    let response: Response = conn
        .send_json(conn.post(MULTIMODAL_PATH).json(&payload))
        .await?;
    let audio = response
        .output
        .and_then(|o| o.audio)
        .ok_or_else(|| Error::MalformedResponse("no output.audio in speech response".into()))?;

    let data = match (&audio.url, &audio.data) {
        (Some(url), _) => media::download(conn.http(), url).await?,
        (None, Some(b64)) if !b64.is_empty() => STANDARD
            .decode(b64)
            .map(Bytes::from)
            .map_err(|e| Error::MalformedResponse(format!("audio data isn't base64: {e}")))?,
        _ => {
            return Err(Error::MalformedResponse(
                "speech response has neither audio url nor data".into(),
            ));
        }
    };
    info!("Synthesized {} bytes of {} audio", data.len(), request.format);

    Ok(Audio {
        data,
        url: audio.url,
        id: audio.id,
        expires_at: audio.expires_at,
    })
}
