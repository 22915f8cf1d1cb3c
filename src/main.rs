use std::process::ExitCode;
use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use serde::Serialize;
use tracing::{error, info};

mod audit;
mod config;
mod error;
mod fetch;
mod handlers;
mod llm;
mod prompts;
mod render;
mod utils;

use config::Config;
use handlers::analyze::{RenovationPipeline, DEFAULT_MAX_IMAGES};
use utils::logging::init_logging;

#[derive(Debug, PartialEq)]
enum Command {
    Analyze {
        image_url: String,
    },
    AnalyzeBatch {
        image_urls: Vec<String>,
        max_images: usize,
    },
    Render {
        image_url: String,
        prompt: String,
        mask_prompt: String,
    },
}

fn usage() -> &'static str {
    "Usage:\n  aoda_renovator analyze <image_url>\n  aoda_renovator analyze-batch [--max-images <n>] <image_url>...\n  aoda_renovator render --image-url <url> --prompt <text> --mask <text>"
}

fn next_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let subcommand = args
        .get(1)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!(usage()))?;

    match subcommand {
        "analyze" => {
            let image_url = args
                .get(2)
                .filter(|value| !value.starts_with("--"))
                .ok_or_else(|| anyhow!("analyze needs an image URL\n{}", usage()))?;
            if args.len() > 3 {
                return Err(anyhow!("analyze takes exactly one image URL\n{}", usage()));
            }
            Ok(Command::Analyze {
                image_url: image_url.clone(),
            })
        }
        "analyze-batch" => {
            let mut image_urls = Vec::new();
            let mut max_images = DEFAULT_MAX_IMAGES;
            let mut index = 2;
            while index < args.len() {
                match args[index].as_str() {
                    "--max-images" => {
                        let value = next_value(args, &mut index, "--max-images")?;
                        max_images = value
                            .parse::<usize>()
                            .map_err(|_| anyhow!("Invalid --max-images value: {value}"))?;
                    }
                    other if other.starts_with("--") => {
                        return Err(anyhow!(
                            "Unknown analyze-batch argument: {other}\n{}",
                            usage()
                        ));
                    }
                    url => image_urls.push(url.to_string()),
                }
                index += 1;
            }
            if image_urls.is_empty() {
                return Err(anyhow!("No images provided\n{}", usage()));
            }
            Ok(Command::AnalyzeBatch {
                image_urls,
                max_images,
            })
        }
        "render" => {
            let mut image_url = None;
            let mut prompt = None;
            let mut mask_prompt = None;
            let mut index = 2;
            while index < args.len() {
                match args[index].as_str() {
                    "--image-url" => {
                        image_url = Some(next_value(args, &mut index, "--image-url")?.to_string())
                    }
                    "--prompt" => {
                        prompt = Some(next_value(args, &mut index, "--prompt")?.to_string())
                    }
                    "--mask" => {
                        mask_prompt = Some(next_value(args, &mut index, "--mask")?.to_string())
                    }
                    other => {
                        return Err(anyhow!("Unknown render argument: {other}\n{}", usage()));
                    }
                }
                index += 1;
            }
            Ok(Command::Render {
                image_url: image_url.ok_or_else(|| anyhow!("--image-url is required"))?,
                prompt: prompt.ok_or_else(|| anyhow!("--prompt is required"))?,
                mask_prompt: mask_prompt.ok_or_else(|| anyhow!("--mask is required"))?,
            })
        }
        "--help" | "-h" | "help" => Err(anyhow!(usage())),
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    // installed first so warnings raised while loading the config are recorded
    let _guards = init_logging(&config::log_level_from_env());
    info!("Starting aoda_renovator");
    let config = Config::load()?;

    let pipeline = Arc::new(RenovationPipeline::from_config(&config)?);

    match command {
        Command::Analyze { image_url } => {
            let response = pipeline.analyze(&image_url).await;
            print_json(&response)?;
            if !response.is_success() {
                error!("Audit of {image_url} failed");
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::AnalyzeBatch {
            image_urls,
            max_images,
        } => {
            let report = pipeline
                .analyze_batch(image_urls, max_images, config.max_concurrent_analyses)
                .await;
            print_json(&report)?;
        }
        Command::Render {
            image_url,
            prompt,
            mask_prompt,
        } => {
            let response = pipeline
                .render_with_prompts(&image_url, &prompt, &mask_prompt)
                .await?;
            print_json(&response)?;
            if !response.success {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
