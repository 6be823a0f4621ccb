//! Command-line front end: analyze one piece of evidence and emit a case record.
//!
//! ## Usage
//! `scene-forensics <media-path> [--user NAME] [--max-frames N] [--out DIR]`
//!
//! ## Environment Variables
//! - `GEMINI_API_KEY` - API key (required, `GOOGLE_GEMINI_API_KEY` also accepted)
//! - `GEMINI_MODEL` - model id (default: `gemini-2.5-flash`)
//! - `GEMINI_BASE_URL` - REST endpoint override
//! - `FORENSIC_MAX_FRAMES` - keyframes per video (default: `15`)
//! - `FFMPEG_PATH` / `FFPROBE_PATH` / `FFMPEG_THREADS` - decoder tooling
//! - `RUST_LOG` - log filter (default: `scene_forensics=info`)

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use log::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scene_forensics::cases::{CaseMeta, CaseRecord, new_case_id, stored_filename};
use scene_forensics::config::AnalysisConfig;
use scene_forensics::gemini::GeminiClient;
use scene_forensics::pipeline::ForensicPipeline;

const USAGE: &str = "usage: scene-forensics <media-path> [--user NAME] [--max-frames N] [--out DIR]";
const DEFAULT_USER: &str = "cli";

#[derive(Debug, PartialEq, Eq)]
struct Args {
    media: PathBuf,
    user: String,
    max_frames: Option<usize>,
    out_dir: Option<PathBuf>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut media = None;
    let mut user = DEFAULT_USER.to_string();
    let mut max_frames = None;
    let mut out_dir = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--user" => user = args.next().context("--user needs a value")?,
            "--max-frames" => {
                let value = args.next().context("--max-frames needs a value")?;
                let n: usize = value
                    .parse()
                    .with_context(|| format!("invalid --max-frames {:?}", value))?;
                if n == 0 {
                    bail!("--max-frames must be at least 1");
                }
                max_frames = Some(n);
            }
            "--out" => out_dir = Some(PathBuf::from(args.next().context("--out needs a value")?)),
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            _ if media.is_none() => media = Some(PathBuf::from(&arg)),
            _ => bail!("unexpected argument {:?}\n{}", arg, USAGE),
        }
    }

    Ok(Args {
        media: media.context(USAGE)?,
        user,
        max_frames,
        out_dir,
    })
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scene_forensics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let mut config = AnalysisConfig::from_env()?;
    if let Some(n) = args.max_frames {
        config.max_frames = n;
    }
    info!("[main] {:?}", config);

    let client = GeminiClient::from_config(&config)?;
    let pipeline = ForensicPipeline::from_config(client, &config);

    let (media_type, record) = pipeline
        .analyze_path(&args.media)
        .with_context(|| format!("analysis of {:?} failed", args.media))?;

    let original = args
        .media
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let case = CaseRecord::assemble(
        record,
        CaseMeta {
            case_id: new_case_id(),
            user: args.user,
            media_type,
            filename: stored_filename(&original),
        },
    );

    let json = serde_json::to_string_pretty(&case)?;
    println!("{}", json);

    if let Some(dir) = args.out_dir {
        fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;
        let path = dir.join(format!("{}.json", case.case_id));
        fs::write(&path, &json).with_context(|| format!("writing {:?}", path))?;
        info!("[main] Case {} saved to {:?}", case.case_id, path);
    }

    Ok(())
}
