//! PodcastAI CLI - AI Podcast Generator
//!
//! A command-line tool that turns documents into two-speaker podcast
//! scripts and audio.

use clap::{Parser, Subcommand};
use colored::Colorize;
use podcastai_core::{
    default_config, default_providers, select_engine, AudioOutcome, Config, OpenAiScriptModel,
    PodcastContext, PodcastError, PodcastScript, ScriptRequest, SegmentSynthesizer, SkippedSegment, Speaker,
};
use podcastai_core::engines::EngineProvider;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "podcastai",
    version,
    about = "AI Podcast Generator - Turn documents into conversations",
    long_about = "A CLI tool that writes two-speaker podcast scripts with OpenAI-compatible APIs and renders them to audio."
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a script and audio from a text file
    Generate {
        /// The source text to discuss
        #[arg(value_name = "TEXT_FILE")]
        text_file: PathBuf,

        /// Name of the source shown to the model (defaults to the file name)
        #[arg(long, value_name = "NAME")]
        source_name: Option<String>,

        /// Conversation style, e.g. Conversational, Educational, Interview
        #[arg(long, default_value = "Conversational", value_name = "STYLE")]
        style: String,

        /// Target length of the podcast
        #[arg(long, default_value = "10 minutes", value_name = "LENGTH")]
        length: String,

        /// Directory the podcast folder is created in
        #[arg(short, long, default_value = "podcasts", value_name = "DIR")]
        output_dir: PathBuf,

        /// Also write one WAV file per dialogue line
        #[arg(long)]
        keep_segments: bool,

        /// Only write the script, skip audio
        #[arg(long)]
        script_only: bool,
    },

    /// Render audio for a previously saved script.json
    Render {
        #[arg(value_name = "SCRIPT_JSON")]
        script: PathBuf,

        /// Directory the audio is written to
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,

        /// Also write one WAV file per dialogue line
        #[arg(long)]
        keep_segments: bool,
    },

    /// Show which speech engines are usable on this machine
    Engines,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };

    match cli.command {
        Command::Generate {
            text_file,
            source_name,
            style,
            length,
            output_dir,
            keep_segments,
            script_only,
        } => {
            let text_content = fs::read_to_string(&text_file)
                .map_err(|e| format!("Failed to read {}: {}", text_file.display(), e))?;
            if text_content.trim().is_empty() {
                eprintln!("{} {} is empty.", "Error:".red().bold(), text_file.display());
                std::process::exit(1);
            }

            let source_name = source_name.unwrap_or_else(|| {
                text_file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Document".to_string())
            });

            let request = ScriptRequest::new(text_content, source_name)
                .with_style(style)
                .with_target_duration(length);

            run_generate(config, request, &output_dir, keep_segments, script_only).await
        }
        Command::Render {
            script,
            output_dir,
            keep_segments,
        } => run_render(config, &script, &output_dir, keep_segments).await,
        Command::Engines => {
            run_engines(&config).await;
            Ok(())
        }
    }
}

async fn run_generate(
    mut config: Config,
    request: ScriptRequest,
    output_dir: &Path,
    keep_segments: bool,
    script_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Get API configuration from environment
    if let Ok(api_base) = env::var("OPENAI_API_BASE") {
        config.llm.api_base = api_base;
    }

    let api_key = env::var("OPEN_ROUTER_API_KEY")
        .or_else(|_| env::var("OPENAI_API_KEY"))
        .unwrap_or_else(|_| {
            eprintln!(
                "{}",
                "Warning: OPEN_ROUTER_API_KEY not set. API calls may fail.".yellow()
            );
            String::new()
        });

    let model = OpenAiScriptModel::new(&config.llm, &api_key)?;

    print_header("Podcast Generator");
    println!("{} {}", "Source:".bold(), request.source_name.bright_white());
    println!("{} {}", "Style:".bold(), request.style);
    println!("{} {}", "Length:".bold(), request.target_duration);
    println!("{} {}", "Model:".bold(), config.llm.model.dimmed());
    println!();
    println!("{}", "─".repeat(70).dimmed());

    let mut context = PodcastContext::build(config, Box::new(model)).await;
    if keep_segments {
        context.set_keep_segments(true);
    }

    let output = context.generate(&request, output_dir, !script_only).await?;

    print_script(&output.script);

    println!("{}", "─".repeat(70).dimmed());
    println!("{} {}", "Source type:".bold(), output.source_kind.display_name());
    println!("{} {}", "Lines:".bold(), output.script.line_count());
    println!(
        "{} {}",
        "Estimated duration:".bold(),
        output.script.estimated_duration()
    );
    println!(
        "{} {}",
        "Script:".bold(),
        output.script_path.display().to_string().bright_white()
    );

    print_audio_outcome(&output.audio);
    print_footer("Podcast ready.");

    Ok(())
}

async fn run_render(
    config: Config,
    script_path: &Path,
    output_dir: &Path,
    keep_segments: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(script_path)
        .map_err(|e| format!("Failed to read {}: {}", script_path.display(), e))?;
    let script = PodcastScript::from_json(&text, "Document")?;

    print_header("Podcast Renderer");
    println!("{} {}", "Source:".bold(), script.source_name().bright_white());
    println!("{} {}", "Lines:".bold(), script.line_count());
    println!();

    let binding = select_engine(default_providers(&config), &config.voices).await?;
    let mut synthesizer = SegmentSynthesizer::new(binding, &config.audio);
    if keep_segments {
        synthesizer.set_keep_segments(true);
    }

    let report = match synthesizer.render(&script, output_dir).await {
        Ok(report) => report,
        Err(PodcastError::Combination {
            source,
            segment_files,
            skipped,
        }) => {
            print_audio_outcome(&AudioOutcome::Failed {
                error: source.to_string(),
                segment_files,
                skipped,
            });
            return Err(source.to_string().into());
        }
        Err(e) => return Err(e.into()),
    };

    print_audio_outcome(&AudioOutcome::Ready(report));
    print_footer("Rendering complete.");

    Ok(())
}

/// Probe every configured engine and report which one would be bound.
async fn run_engines(config: &Config) {
    print_header("Speech Engines");

    let mut bound = None;
    for provider in default_providers(config) {
        let kind = provider.kind();
        match provider.initialize().await {
            Ok(_) => {
                let marker = if bound.is_none() {
                    bound = Some(kind);
                    "selected".bright_green().bold()
                } else {
                    "available".green()
                };
                println!("  {} {}", format!("{:<8}", kind.name()).bright_cyan(), marker);
            }
            Err(e) => {
                println!(
                    "  {} {} {}",
                    format!("{:<8}", kind.name()).bright_cyan(),
                    e.kind.to_string().yellow(),
                    format!("({})", e.message).dimmed()
                );
            }
        }
    }

    println!();
    if bound.is_none() {
        println!(
            "{}",
            "No speech engine available. Scripts can still be generated with --script-only.".red()
        );
    }
}

fn print_header(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "PodcastAI".bold(), title)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

fn print_footer(message: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", message).bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

fn print_script(script: &PodcastScript) {
    println!();
    for line in script.lines() {
        let label = match line.speaker {
            Speaker::One => line.speaker.label().bright_cyan().bold(),
            Speaker::Two => line.speaker.label().bright_magenta().bold(),
        };
        println!("{} {}", "▶".bright_cyan(), label);

        // Word wrap and indent the content
        let wrapped = textwrap(&line.text, 66);
        for wrapped_line in wrapped.lines() {
            println!("  {}", wrapped_line);
        }
        println!();
    }
}

fn print_audio_outcome(outcome: &AudioOutcome) {
    match outcome {
        AudioOutcome::Ready(report) => {
            println!(
                "{} {}",
                "Audio:".bold(),
                report.combined.display().to_string().bright_green()
            );
            println!(
                "{} {:.1} minutes ({}/{} segments)",
                "Audio length:".bold(),
                report.duration_seconds / 60.0,
                report.synthesized,
                report.total_segments
            );
            print_skipped(&report.skipped);
            if report.files.len() > 1 {
                println!("{} {} files written", "Segments:".bold(), report.files.len() - 1);
            }
        }
        AudioOutcome::Unavailable { reason } => {
            println!("{} {}", "Audio:".bold(), "not generated".yellow());
            println!("  {}", reason.dimmed());
        }
        AudioOutcome::Failed {
            error,
            segment_files,
            skipped,
        } => {
            println!("{} {}", "Audio:".bold(), "failed".red().bold());
            println!("  {}", error.dimmed());
            print_skipped(skipped);
            for file in segment_files {
                println!("  {} {}", "kept".yellow(), file.display());
            }
        }
    }
}

fn print_skipped(skipped: &[SkippedSegment]) {
    for segment in skipped {
        println!(
            "  {} {} {}",
            "skipped".yellow(),
            format!("({})", segment.speaker.label()).dimmed(),
            segment.to_error()
        );
    }
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
