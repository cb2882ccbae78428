//! bgstudio command-line interface
//!
//! Subcommands for running the HTTP server, processing local files and URLs,
//! posting to a running server, managing the model cache and listing
//! inference providers.

use super::config::CliConfigBuilder;
use crate::{
    backends::provider_diagnostics,
    cache::{format_size, ModelCache},
    client::RemovalClient,
    config::AppConfig,
    download::{validate_model_url, ModelDownloader},
    models::{ModelSource, DEFAULT_MODEL_URL},
    processor::BackgroundRemovalProcessor,
    services::io::{png_output_path, ImageLoader, ImageSource},
    tracing_config::init_cli_tracing,
    load_processor,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// Image extensions picked up when scanning directories
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Background removal with BiRefNet: cut out, crop, composite on white, watermark
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgstudio")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Padding around the subject as a fraction of its size (default 0.1)
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub padding: Option<f64>,

    /// Watermark image [default: logo-t.png]
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "no_watermark")]
    pub watermark: Option<PathBuf>,

    /// Disable the watermark stage
    #[arg(long, global = true)]
    pub no_watermark: bool,

    /// Model file path, `HuggingFace` URL or cached model ID
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Inference backend (tract, onnx)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Use custom cache directory
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind [default: 0.0.0.0]
        #[arg(long)]
        host: Option<String>,
        /// Port to bind [default: 8000]
        #[arg(long)]
        port: Option<u16>,
    },
    /// Process images locally and write PNG results
    Process {
        /// Image files, directories or http(s) URLs
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<String>,
        /// Output file (single input) or directory
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
        /// Process directories recursively
        #[arg(short, long)]
        recursive: bool,
        /// File name pattern for directory inputs (e.g. "*.jpg")
        #[arg(long)]
        pattern: Option<String>,
        /// Also write the segmentation mask as `<name>_mask.png`
        #[arg(long)]
        save_mask: bool,
    },
    /// Send an image to a running server and save the result
    Client {
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,
        /// Endpoint to post to [default: http://localhost:8000/remove-background/]
        #[arg(long)]
        server_url: Option<String>,
    },
    /// Download a model into the cache
    Download {
        /// `HuggingFace` repository URL
        #[arg(long, default_value = DEFAULT_MODEL_URL)]
        url: String,
        /// Download again even if cached
        #[arg(long)]
        force: bool,
    },
    /// List cached models
    Models {
        /// Remove this cached model instead of listing
        #[arg(long, value_name = "MODEL_ID")]
        clear: Option<String>,
    },
    /// List inference backends and their execution providers
    Providers,
}

pub async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let succeeded = run(&cli).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Execute a parsed command line, returning whether it succeeded
///
/// The model cache is only opened by subcommands that read or write it.
async fn run(cli: &Cli) -> Result<bool> {
    let config = CliConfigBuilder::from_cli(cli).context("Failed to build configuration")?;

    match &cli.command {
        Command::Serve { .. } => serve(&config, &open_cache(cli)?).await?,
        Command::Process {
            inputs,
            output,
            recursive,
            pattern,
            save_mask,
        } => {
            let processor = build_processor(&config, &open_cache(cli)?).await?;
            let options = ProcessOptions {
                output: output.as_deref(),
                recursive: *recursive,
                pattern: pattern.as_deref(),
                save_mask: *save_mask,
            };
            let processed = process_inputs(&processor, inputs, &options).await?;
            if processed == 0 {
                return Ok(false);
            }
        },
        Command::Client { input, output, .. } => {
            let (Some(input), Some(output)) = (input, output) else {
                println!("Usage: bgstudio client <INPUT> <OUTPUT> [--server-url URL]");
                return Ok(false);
            };
            run_client(&config, input, output).await?;
        },
        Command::Download { url, force } => download(&open_cache(cli)?, url, *force).await?,
        Command::Models { clear: Some(model_id) } => {
            if !clear_model(&open_cache(cli)?, model_id)? {
                return Ok(false);
            }
        },
        Command::Models { clear: None } => list_models(&open_cache(cli)?)?,
        Command::Providers => list_providers(),
    }

    Ok(true)
}

fn open_cache(cli: &Cli) -> Result<ModelCache> {
    match CliConfigBuilder::cache_dir(cli) {
        Some(dir) => ModelCache::with_custom_cache_dir(&dir)
            .context("Failed to create cache with custom directory"),
        None => ModelCache::new().context("Failed to create model cache"),
    }
}

/// Load the model, downloading the default one on first use
async fn build_processor(config: &AppConfig, cache: &ModelCache) -> Result<BackgroundRemovalProcessor> {
    ensure_model_available(&config.model.source, cache).await?;

    info!(
        "Loading model {} with {} backend",
        config.model.source.display_name(),
        config.model.backend
    );
    load_processor(config, cache).context("Failed to create background removal processor")
}

async fn ensure_model_available(source: &ModelSource, cache: &ModelCache) -> Result<()> {
    let ModelSource::Cached(model_id) = source else {
        return Ok(());
    };
    if cache.is_model_cached(model_id) {
        return Ok(());
    }
    if *model_id != ModelCache::url_to_model_id(DEFAULT_MODEL_URL) {
        anyhow::bail!(
            "Model '{}' not found in cache. Run `bgstudio download --url <URL>` first, or `bgstudio models` to list cached models.",
            model_id
        );
    }

    println!("📦 Model not cached. Downloading default model...");
    let downloader =
        ModelDownloader::new(cache.clone()).context("Failed to create model downloader")?;
    downloader
        .download_model(DEFAULT_MODEL_URL, None, false, true)
        .await
        .context("Failed to download default model")?;
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(config: &AppConfig, cache: &ModelCache) -> Result<()> {
    let processor = build_processor(config, cache).await?;
    crate::server::serve(&config.server, processor)
        .await
        .context("Server failed")
}

#[cfg(not(feature = "server"))]
async fn serve(_config: &AppConfig, _cache: &ModelCache) -> Result<()> {
    anyhow::bail!("HTTP server not compiled in. Please rebuild with --features server")
}

async fn run_client(config: &AppConfig, input: &Path, output: &Path) -> Result<()> {
    let client = RemovalClient::new(&config.client).context("Failed to create HTTP client")?;
    let outcome = client
        .remove_background(input, output)
        .await
        .with_context(|| format!("Request to {} failed", client.server_url()))?;
    println!("{}", outcome);
    Ok(())
}

async fn download(cache: &ModelCache, url: &str, force: bool) -> Result<()> {
    validate_model_url(url).context("Invalid model URL")?;
    println!("📦 Downloading model from: {}", url);

    let downloader =
        ModelDownloader::new(cache.clone()).context("Failed to create model downloader")?;
    let model_id = downloader
        .download_model(url, None, force, true)
        .await
        .context("Failed to download model")?;

    println!("✅ Model ready: {}", model_id);
    println!("   Cache location: {}", cache.model_dir(&model_id).display());
    Ok(())
}

fn list_models(cache: &ModelCache) -> Result<()> {
    let models = cache.list().context("Failed to list cached models")?;

    println!("📦 Cached models in {}", cache.cache_dir().display());
    if models.is_empty() {
        println!("No cached models found.");
        println!("\n💡 To download the default model, use:");
        println!("  bgstudio download");
        return Ok(());
    }

    for model in models {
        println!("📁 {}", model.model_id);
        println!("  └─ Location: {}", model.path.display());
        println!("  └─ Size: {}", format_size(model.size_bytes));
    }
    Ok(())
}

fn clear_model(cache: &ModelCache, model_id: &str) -> Result<bool> {
    let removed = cache
        .clear_model(model_id)
        .with_context(|| format!("Failed to remove cached model '{}'", model_id))?;
    if removed {
        println!("🗑️  Removed {}", model_id);
    } else {
        println!("Model '{}' is not cached. Run `bgstudio models` to list cached models.", model_id);
    }
    Ok(removed)
}

fn list_providers() {
    println!("🔧 Inference providers");
    for (backend, providers) in provider_diagnostics() {
        println!("{}:", backend);
        for (name, available, description) in providers {
            let status = if available { "✅" } else { "❌" };
            println!("  {} {:<8} {}", status, name, description);
        }
    }
}

/// Flags of the `process` subcommand
struct ProcessOptions<'a> {
    output: Option<&'a Path>,
    recursive: bool,
    pattern: Option<&'a str>,
    save_mask: bool,
}

/// Process every input and return the number of images written
async fn process_inputs(
    processor: &BackgroundRemovalProcessor,
    inputs: &[String],
    options: &ProcessOptions<'_>,
) -> Result<usize> {
    let mut sources = Vec::new();
    for input in inputs {
        match ImageSource::parse(input).context("Invalid input")? {
            ImageSource::Path(path) if path.is_dir() => {
                sources.extend(
                    find_image_files(&path, options.recursive, options.pattern)?
                        .into_iter()
                        .map(ImageSource::Path),
                );
            },
            ImageSource::Path(path) if path.is_file() => sources.push(ImageSource::Path(path)),
            ImageSource::Path(path) => anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            ),
            source => sources.push(source),
        }
    }

    if sources.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }

    let (output_file, output_dir) = resolve_output(options.output, sources.len())?;
    let loader = ImageLoader::new(Duration::from_secs(60))?;

    let progress = (sources.len() > 1).then(|| {
        let pb = ProgressBar::new(sources.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    });

    let start = instant::Instant::now();
    let mut processed = 0;
    let mut failed = 0;
    for source in &sources {
        if let Some(pb) = &progress {
            pb.set_message(source.describe());
        }

        let destination = output_file
            .clone()
            .unwrap_or_else(|| output_path_for(source, output_dir.as_deref()));
        match process_source(processor, &loader, source, &destination, options.save_mask).await {
            Ok(()) => {
                processed += 1;
                info!("✅ {} -> {}", source.describe(), destination.display());
            },
            Err(e) => {
                failed += 1;
                error!("❌ {}: {:#}", source.describe(), e);
            },
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!("{} processed, {} failed", processed, failed));
    }
    info!(
        "Processed {} image(s) in {:.2}s",
        processed,
        start.elapsed().as_secs_f64()
    );
    Ok(processed)
}

async fn process_source(
    processor: &BackgroundRemovalProcessor,
    loader: &ImageLoader,
    source: &ImageSource,
    destination: &Path,
    save_mask: bool,
) -> Result<()> {
    let image = loader.load(source).await?;
    let result = processor.process_image(&image)?;
    tracing::debug!(timings = %result.metadata.timings.summary(), "Processed");
    result.save_png(destination)?;
    if save_mask {
        let mask_path = mask_path_for(destination);
        result.mask.save_png(&mask_path)?;
        info!("🎭 Mask -> {}", mask_path.display());
    }
    Ok(())
}

/// `<dir>/<stem>_mask.png` next to an output image
fn mask_path_for(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy().into_owned());
    destination.with_file_name(format!("{}_mask.png", stem))
}

/// Split `-o` into an output file (single image input) or output directory
fn resolve_output(output: Option<&Path>, input_count: usize) -> Result<(Option<PathBuf>, Option<PathBuf>)> {
    let Some(output) = output else {
        return Ok((None, None));
    };

    if input_count == 1 && !output.is_dir() && output.extension().is_some() {
        return Ok((Some(output.to_path_buf()), None));
    }

    if output.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output.display()
        );
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;
    Ok((None, Some(output.to_path_buf())))
}

/// Default `.png` destination for a source
fn output_path_for(source: &ImageSource, output_dir: Option<&Path>) -> PathBuf {
    match source {
        ImageSource::Path(path) => png_output_path(path, output_dir),
        ImageSource::Url(url) => {
            let name = url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
                .filter(|n| !n.is_empty() && !n.contains(':'))
                .unwrap_or("download");
            png_output_path(Path::new(name), output_dir)
        },
        ImageSource::Bytes(_) => png_output_path(Path::new("output"), output_dir),
    }
}

/// Find image files in a directory, sorted for a stable processing order
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let pattern = pattern
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid --pattern")?;

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let path = entry.path();
            if is_image_file(path) && matches_pattern(path, pattern.as_ref()) {
                files.push(path.to_path_buf());
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn matches_pattern(path: &Path, pattern: Option<&glob::Pattern>) -> bool {
    match pattern {
        Some(pattern) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches(name)),
        None => true,
    }
}
