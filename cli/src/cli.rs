use std::path::PathBuf;

use engine::{
    Size,
    qwen_image::QwenImageSize,
    request::{ControlCondition, RefRole},
    speech::{AudioFormat, DEFAULT_SAMPLE_RATE, Voice},
    upload,
};

pub const DEFAULT_IMAGE_MODEL: &str = "wan2.2-t2i-flash";
pub const DEFAULT_VIDEO_MODEL: &str = "wanx2.1-vace-plus";

/// Generate images, video and speech on DashScope (Bailian).
///
/// The API key is read from DASHSCOPE_API_KEY.
#[derive(Debug, clap::Parser)]
#[command(name = "bailian", version)]
pub struct Cli {
    /// Overrides the base URL from the config file
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Text to image with the wan t2i models
    Image(Image),
    /// Video synthesis with the wan vace models
    #[command(subcommand)]
    Video(Video),
    /// Inspect or wait for a task submitted earlier
    #[command(subcommand)]
    Task(Task),
    /// Text to speech with qwen-tts
    Speech(Speech),
    /// List the speech voices
    Voices,
    /// Text to image with qwen-image
    QwenImage(QwenImage),
    /// Upload local files to temporary storage and print their oss:// URLs, or
    /// manage files already uploaded
    Upload(Upload),
    /// Check the API key and media tools
    Doctor,
    /// Show the config file, or write one with the defaults
    Config {
        #[arg(long)]
        init: bool,
    },
}

/// Where results go and how long to wait for them
#[derive(Debug, Clone, clap::Args)]
pub struct Output {
    /// Save results here instead of printing their URLs. Several results get
    /// numbered file names.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Give up after this many seconds. Defaults to the configured ceiling.
    #[arg(long, value_name = "SECS")]
    pub max_wait: Option<u64>,
}

#[derive(Debug, clap::Args)]
pub struct Image {
    pub prompt: String,

    #[arg(short, long, default_value = DEFAULT_IMAGE_MODEL)]
    pub model: String,

    #[arg(short, long, default_value = "1024*1024")]
    pub size: Size,

    #[arg(short, default_value_t = 1)]
    pub n: u8,

    #[arg(long)]
    pub negative_prompt: Option<String>,

    #[arg(long)]
    pub seed: Option<u32>,

    /// Let the platform rewrite the prompt
    #[arg(long)]
    pub prompt_extend: Option<bool>,

    #[arg(long)]
    pub watermark: bool,

    #[command(flatten)]
    pub output: Output,
}

#[derive(Debug, clap::Args)]
pub struct VideoCommon {
    #[arg(short, long)]
    pub prompt: String,

    #[arg(short, long, default_value = DEFAULT_VIDEO_MODEL)]
    pub model: String,

    #[command(flatten)]
    pub output: Output,
}

#[derive(Debug, clap::Subcommand)]
pub enum Video {
    /// Video from up to three reference images
    Reference {
        #[command(flatten)]
        common: VideoCommon,
        /// Reference image URL, repeat for several
        #[arg(long = "image", required = true)]
        images: Vec<String>,
        /// Role of each reference image, in the same order
        #[arg(long = "role")]
        roles: Vec<RefRole>,
        #[arg(short, long)]
        size: Option<Size>,
    },
    /// Restyle a video while keeping its motion
    Repaint {
        #[command(flatten)]
        common: VideoCommon,
        #[arg(long)]
        video: String,
        #[arg(long, value_enum, default_value_t = ControlCondition::Depth)]
        condition: ControlCondition,
    },
    /// Regenerate the masked area of a video
    Edit {
        #[command(flatten)]
        common: VideoCommon,
        #[arg(long)]
        video: String,
        #[arg(long)]
        mask: Option<String>,
    },
    /// Continue from a first frame
    Extend {
        #[command(flatten)]
        common: VideoCommon,
        #[arg(long)]
        first_frame: String,
        /// Seconds
        #[arg(long)]
        duration: Option<u32>,
    },
    /// Outpaint a video beyond its borders
    Expand {
        #[command(flatten)]
        common: VideoCommon,
        #[arg(long)]
        video: String,
        #[arg(long)]
        ratio: Option<f32>,
    },
}

#[derive(Debug, clap::Subcommand)]
pub enum Task {
    /// Poll once
    Status { task_id: String },
    /// Poll until the task finishes
    Wait {
        task_id: String,
        /// Use the video cadence
        #[arg(long)]
        video: bool,
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
        #[command(flatten)]
        output: Output,
    },
}

#[derive(Debug, clap::Args)]
pub struct Speech {
    pub text: String,

    #[arg(short, long, value_enum, default_value_t = Voice::Cherry)]
    pub voice: Voice,

    #[arg(short, long, value_enum, default_value_t = AudioFormat::Wav)]
    pub format: AudioFormat,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    #[arg(long, default_value_t = 1.0)]
    pub volume: f32,

    #[arg(long, default_value_t = 1.0)]
    pub speech_rate: f32,

    #[arg(long, default_value_t = 1.0)]
    pub pitch_rate: f32,

    /// Defaults to speech.<format>
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct QwenImage {
    pub prompt: String,

    #[arg(short, long, value_enum, default_value = "1:1")]
    pub size: QwenImageSize,

    #[arg(long)]
    pub negative_prompt: Option<String>,

    #[arg(long)]
    pub seed: Option<u32>,

    #[arg(long)]
    pub no_prompt_extend: bool,

    #[arg(long)]
    pub watermark: bool,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Upload {
    #[command(subcommand)]
    pub action: Option<UploadAction>,

    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Model the files will be used with
    #[arg(short, long, default_value = upload::DEFAULT_MODEL)]
    pub model: String,
}

#[derive(Debug, clap::Subcommand)]
pub enum UploadAction {
    /// Show one uploaded file
    Info { file_id: String },
    /// List uploaded files
    List {
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long, default_value_t = upload::DEFAULT_LIST_LIMIT, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },
    /// Delete an uploaded file
    Delete { file_id: String },
}

#[cfg(test)]
mod test {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn image_defaults() {
        let cli = Cli::parse_from(["bailian", "image", "a red rose"]);
        let Command::Image(image) = cli.command else {
            panic!("expected image command");
        };
        assert_eq!(image.model, DEFAULT_IMAGE_MODEL);
        assert_eq!(image.size, Size::new(1024, 1024));
        assert_eq!(image.n, 1);
        assert!(image.output.output.is_none());
    }

    #[test]
    fn reference_video_with_roles() {
        let cli = Cli::parse_from([
            "bailian",
            "video",
            "reference",
            "-p",
            "a cat on a sofa",
            "--image",
            "https://x/cat.png",
            "--image",
            "oss://dir/sofa.png",
            "--role",
            "obj",
            "--role",
            "bg",
            "--max-wait",
            "600",
        ]);
        let Command::Video(Video::Reference {
            common,
            images,
            roles,
            size,
        }) = cli.command
        else {
            panic!("expected video reference command");
        };
        assert_eq!(images.len(), 2);
        assert_eq!(roles, [RefRole::Obj, RefRole::Bg]);
        assert_eq!(size, None);
        assert_eq!(common.output.max_wait, Some(600));
    }

    #[test]
    fn bad_size_is_rejected() {
        assert!(Cli::try_parse_from(["bailian", "image", "x", "--size", "1024x1024"]).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Cli::try_parse_from(["bailian", "task", "wait", "T1", "--interval", "0"]).is_err());
        let cli = Cli::parse_from(["bailian", "task", "wait", "T1", "--interval", "2"]);
        let Command::Task(Task::Wait { interval, .. }) = cli.command else {
            panic!("expected task wait command");
        };
        assert_eq!(interval, Some(2));
    }

    #[test]
    fn upload_takes_files_or_an_action() {
        let cli = Cli::parse_from(["bailian", "upload", "a.png", "b.mp4"]);
        let Command::Upload(upload) = cli.command else {
            panic!("expected upload command");
        };
        assert!(upload.action.is_none());
        assert_eq!(upload.files.len(), 2);

        let cli = Cli::parse_from(["bailian", "upload", "list", "--limit", "5"]);
        let Command::Upload(upload) = cli.command else {
            panic!("expected upload command");
        };
        assert!(matches!(
            upload.action,
            Some(UploadAction::List {
                purpose: None,
                limit: 5
            })
        ));

        assert!(Cli::try_parse_from(["bailian", "upload"]).is_err());
    }

    #[test]
    fn voices_parse_by_name() {
        let cli = Cli::parse_from(["bailian", "speech", "hello", "--voice", "Chelsie"]);
        let Command::Speech(speech) = cli.command else {
            panic!("expected speech command");
        };
        assert_eq!(speech.voice, Voice::Chelsie);
    }
}
