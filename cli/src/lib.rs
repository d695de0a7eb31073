use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use engine::{
    AsyncTaskClient, Config, Connection, Operation, TaskFamily, TaskHandle, TaskOutput,
    TaskRequest, TaskResult,
    config::{config_path, save_config_file},
    media, preflight,
    qwen_image::{self, QwenImageRequest},
    request::{ImageReference, TextToImage, VideoEdit, VideoExpansion, VideoExtension, VideoRepainting},
    speech::{self, SpeechRequest, Voice},
    upload,
};
use log::{info, warn};
use nonempty::NonEmpty;
use strum::{EnumMessage as _, IntoEnumIterator as _};

use crate::cli::{Command, Output, Task, UploadAction, Video, VideoCommon};

pub mod cli;

pub async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Image(args) => image(args, &config).await,
        Command::Video(args) => video(args, &config).await,
        Command::Task(args) => task(args, &config).await,
        Command::Speech(args) => speech(args, &config).await,
        Command::Voices => {
            list_voices();
            Ok(())
        }
        Command::QwenImage(args) => qwen_image(args, &config).await,
        Command::Upload(args) => upload(args, &config).await,
        Command::Doctor => doctor().await,
        Command::Config { init } => show_config(init, &config),
    }
}

async fn image(args: cli::Image, config: &Config) -> Result<()> {
    let client = AsyncTaskClient::from_env(config)?;
    let op = TextToImage {
        negative_prompt: args.negative_prompt,
        seed: args.seed,
        prompt_extend: args.prompt_extend,
        watermark: args.watermark.then_some(true),
        ..TextToImage::new(args.size, args.n)
    };
    let request = TaskRequest::new(args.model, args.prompt, Operation::TextToImage(op));
    generate(&client, &request, &args.output).await
}

async fn video(args: Video, config: &Config) -> Result<()> {
    let client = AsyncTaskClient::from_env(config)?;
    let (common, op) = video_operation(args)?;
    let request = TaskRequest::new(common.model, common.prompt, op);
    generate(&client, &request, &common.output).await
}

fn video_operation(args: Video) -> Result<(VideoCommon, Operation)> {
    Ok(match args {
        Video::Reference {
            common,
            images,
            roles,
            size,
        } => {
            let ref_images_url =
                NonEmpty::from_vec(images).ok_or(eyre!("At least one --image is required"))?;
            let obj_or_bg = (!roles.is_empty()).then_some(roles);
            (
                common,
                Operation::ImageReference(ImageReference {
                    ref_images_url,
                    obj_or_bg,
                    size,
                }),
            )
        }
        Video::Repaint {
            common,
            video,
            condition,
        } => (
            common,
            Operation::VideoRepainting(VideoRepainting {
                video_url: video,
                control_condition: condition,
            }),
        ),
        Video::Edit {
            common,
            video,
            mask,
        } => (
            common,
            Operation::VideoEdit(VideoEdit {
                video_url: video,
                mask_url: mask,
            }),
        ),
        Video::Extend {
            common,
            first_frame,
            duration,
        } => (
            common,
            Operation::VideoExtension(VideoExtension {
                first_frame_image: first_frame,
                duration,
            }),
        ),
        Video::Expand {
            common,
            video,
            ratio,
        } => (
            common,
            Operation::VideoExpansion(VideoExpansion {
                video_url: video,
                expansion_ratio: ratio,
            }),
        ),
    })
}

async fn generate(client: &AsyncTaskClient, request: &TaskRequest, output: &Output) -> Result<()> {
    let max_wait = output
        .max_wait
        .map(Duration::from_secs)
        .unwrap_or(client.cadence(request.family()).max_wait);
    let result = client.generate(request, max_wait).await?;
    deliver(client.connection(), &result, output.output.as_deref()).await
}

async fn deliver(conn: &Connection, result: &TaskOutput, path: Option<&Path>) -> Result<()> {
    for failure in &result.failures {
        warn!("One result failed: {} ({})", failure.message, failure.code);
    }
    if result.assets.is_empty() {
        return Err(eyre!("Task {} produced no results", result.task_id));
    }
    for asset in &result.assets {
        if let Some(prompt) = &asset.actual_prompt {
            info!("Prompt used: {prompt}");
        }
    }

    match path {
        Some(path) => {
            for written in media::save_assets(conn.http(), &result.assets, path).await? {
                println!("{}", written.display());
            }
        }
        None => {
            for asset in &result.assets {
                println!("{}", asset.url);
            }
        }
    }
    Ok(())
}

async fn task(args: Task, config: &Config) -> Result<()> {
    let client = AsyncTaskClient::from_env(config)?;
    match args {
        Task::Status { task_id } => {
            match client.poll(&TaskHandle::new(task_id)).await? {
                TaskResult::Pending => println!("PENDING"),
                TaskResult::Running => println!("RUNNING"),
                TaskResult::Unrecognized(status) => println!("{status}"),
                TaskResult::Failed { reason } => println!("FAILED: {reason}"),
                TaskResult::Succeeded(output) => {
                    println!("SUCCEEDED");
                    for asset in output.assets {
                        println!("{}", asset.url);
                    }
                }
            }
            Ok(())
        }
        Task::Wait {
            task_id,
            video,
            interval,
            output,
        } => {
            let family = if video {
                TaskFamily::Long
            } else {
                TaskFamily::Short
            };
            let cadence = client.cadence(family);
            let result = client
                .await_completion(
                    &TaskHandle::new(task_id),
                    output
                        .max_wait
                        .map(Duration::from_secs)
                        .unwrap_or(cadence.max_wait),
                    interval.map(Duration::from_secs).unwrap_or(cadence.interval),
                )
                .await?;
            deliver(client.connection(), &result, output.output.as_deref()).await
        }
    }
}

async fn speech(args: cli::Speech, config: &Config) -> Result<()> {
    let conn = Connection::from_env(&config.base_url)?;
    let request = SpeechRequest {
        format: args.format,
        sample_rate: args.sample_rate,
        volume: args.volume,
        speech_rate: args.speech_rate,
        pitch_rate: args.pitch_rate,
        ..SpeechRequest::new(args.text, args.voice)
    };
    let audio = speech::synthesize(&conn, &request).await?;
    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("speech.{}", args.format)));
    media::save_bytes(&audio.data, &path).await?;
    println!("{}", path.display());
    Ok(())
}

fn list_voices() {
    for voice in Voice::iter() {
        println!("{:<12} {}", voice, voice.get_message().unwrap_or_default());
    }
}

async fn qwen_image(args: cli::QwenImage, config: &Config) -> Result<()> {
    let conn = Connection::from_env(&config.base_url)?;
    let request = QwenImageRequest {
        negative_prompt: args.negative_prompt,
        size: args.size,
        prompt_extend: !args.no_prompt_extend,
        watermark: args.watermark,
        seed: args.seed,
        ..QwenImageRequest::new(args.prompt)
    };
    let asset = qwen_image::generate(&conn, &request).await?;
    match args.output {
        Some(path) => {
            media::save_url(conn.http(), &asset.url, &path).await?;
            println!("{}", path.display());
        }
        None => println!("{}", asset.url),
    }
    Ok(())
}

async fn upload(args: cli::Upload, config: &Config) -> Result<()> {
    let conn = Connection::from_env(&config.base_url)?;
    match args.action {
        Some(UploadAction::Info { file_id }) => {
            let file = upload::get_file_info(&conn, &file_id).await?;
            println!("{file:#?}");
        }
        Some(UploadAction::List { purpose, limit }) => {
            let list = upload::list_files(&conn, purpose.as_deref(), limit).await?;
            for file in &list.files {
                println!(
                    "{}\t{}\t{}",
                    file.file_id,
                    file.name.as_deref().unwrap_or("-"),
                    file.size.map(|s| s.to_string()).unwrap_or_else(|| "-".into())
                );
            }
            if let Some(total) = list.total {
                info!("{} of {total} files shown", list.files.len());
            }
        }
        Some(UploadAction::Delete { file_id }) => {
            upload::delete_file(&conn, &file_id).await?;
            println!("Deleted {file_id}");
        }
        None => upload_files(&conn, &args.files, &args.model).await?,
    }
    Ok(())
}

async fn upload_files(conn: &Connection, files: &[PathBuf], model: &str) -> Result<()> {
    let results = upload::upload_many(conn, files, model).await;
    let total = results.len();
    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(uploaded) => println!("{}\t{}", path.display(), uploaded.oss_url),
            Err(e) => {
                eprintln!("{}\t{e}", path.display());
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(eyre!("{failed} of {total} uploads failed"));
    }
    Ok(())
}

async fn doctor() -> Result<()> {
    let report = preflight::run().await;
    print!("{report}");
    if !report.ready() {
        return Err(eyre!("Preflight checks failed"));
    }
    Ok(())
}

fn show_config(init: bool, config: &Config) -> Result<()> {
    let path = config_path()?;
    if init {
        if path.exists() {
            return Err(eyre!("{} already exists", path.display()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        save_config_file(&path, &Config::default())
            .wrap_err_with(|| format!("Couldn't write {}", path.display()))?;
        println!(
            "{}",
            indoc::formatdoc! {"
                Wrote {path}
                Intervals and ceilings are in seconds. The API key is never stored
                there, set DASHSCOPE_API_KEY instead.",
                path = path.display()
            }
        );
        return Ok(());
    }

    if !path.exists() {
        println!("{} doesn't exist, using defaults", path.display());
    } else {
        println!("{}", path.display());
    }
    println!("{config:#?}");
    Ok(())
}

#[cfg(test)]
mod test {
    use clap::Parser as _;
    use engine::{Asset, request::RefRole};

    use super::*;
    use crate::cli::Cli;

    fn video_args(args: &[&str]) -> Video {
        let cli = Cli::parse_from(["bailian", "video"].iter().chain(args));
        let Command::Video(video) = cli.command else {
            panic!("expected video command");
        };
        video
    }

    #[test]
    fn reference_without_roles_sends_none() {
        let (common, op) = video_operation(video_args(&[
            "reference",
            "-p",
            "a cat",
            "--image",
            "https://x/cat.png",
        ]))
        .unwrap();
        assert_eq!(common.prompt, "a cat");
        let Operation::ImageReference(op) = op else {
            panic!("expected image reference");
        };
        assert_eq!(op.obj_or_bg, None);
        assert_eq!(op.ref_images_url.head, "https://x/cat.png");
    }

    #[test]
    fn reference_roles_are_kept_in_order() {
        let (_, op) = video_operation(video_args(&[
            "reference",
            "-p",
            "x",
            "--image",
            "https://x/1.png",
            "--image",
            "https://x/2.png",
            "--role",
            "bg",
            "--role",
            "obj",
        ]))
        .unwrap();
        let Operation::ImageReference(op) = op else {
            panic!("expected image reference");
        };
        assert_eq!(op.obj_or_bg, Some(vec![RefRole::Bg, RefRole::Obj]));
    }

    #[test]
    fn extension_maps_to_its_operation() {
        let (_, op) = video_operation(video_args(&[
            "extend",
            "-p",
            "keep walking",
            "--first-frame",
            "oss://dir/frame.png",
            "--duration",
            "5",
        ]))
        .unwrap();
        assert_eq!(
            op,
            Operation::VideoExtension(VideoExtension {
                first_frame_image: "oss://dir/frame.png".into(),
                duration: Some(5),
            })
        );
    }

    #[tokio::test]
    async fn empty_result_is_an_error() {
        let conn = Connection::new("sk-test", "http://127.0.0.1:9");
        let output = TaskOutput {
            task_id: TaskHandle::new("T1"),
            assets: vec![],
            failures: vec![],
            usage: None,
        };
        let err = deliver(&conn, &output, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Task T1 produced no results");
    }

    #[tokio::test]
    async fn urls_are_printed_without_output_path() {
        let conn = Connection::new("sk-test", "http://127.0.0.1:9");
        let output = TaskOutput {
            task_id: TaskHandle::new("T1"),
            assets: vec![Asset::new("http://x/1.png")],
            failures: vec![],
            usage: None,
        };
        deliver(&conn, &output, None).await.unwrap();
    }
}
