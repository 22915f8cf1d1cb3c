use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::prompts::AUDIT_PROMPT;

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            max_bytes: (DEFAULT_MAX_IMAGE_SIZE_MB as usize) * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub erase_strength: f32,
    pub construct_strength: f32,
    pub grow_mask: Option<u32>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            erase_strength: DEFAULT_ERASE_STRENGTH,
            construct_strength: DEFAULT_CONSTRUCT_STRENGTH,
            grow_mask: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiSettings,
    pub fetcher: FetcherConfig,
    pub render: RenderConfig,
    pub audit_prompt: String,
    pub max_concurrent_analyses: usize,
}

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_MAX_IMAGE_SIZE_MB: u64 = 10;
const DEFAULT_ERASE_STRENGTH: f32 = 0.95;
const DEFAULT_CONSTRUCT_STRENGTH: f32 = 0.65;

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn normalize_log_level(value: Option<String>) -> String {
    value
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// `LOG_LEVEL` on its own, so logging can be installed before the rest of the config loads.
pub fn log_level_from_env() -> String {
    normalize_log_level(env::var("LOG_LEVEL").ok())
}

fn normalize_strength(name: &str, value: f32, default: f32) -> f32 {
    if !value.is_finite() {
        warn!("{name} is not a finite number; using {default}");
        return default;
    }
    if !(0.0..=1.0).contains(&value) {
        warn!("{name}={value} is outside [0, 1]; clamping");
    }
    value.clamp(0.0, 1.0)
}

fn load_audit_prompt(path: Option<PathBuf>) -> String {
    let Some(path) = path else {
        return AUDIT_PROMPT.to_string();
    };

    match fs::read_to_string(&path) {
        Ok(content) if !content.trim().is_empty() => {
            info!("Loaded audit prompt override from {}", path.display());
            content
        }
        Ok(_) => {
            warn!(
                "Audit prompt override at {} is empty; using built-in prompt",
                path.display()
            );
            AUDIT_PROMPT.to_string()
        }
        Err(err) => {
            warn!(
                "Failed to read audit prompt override at {}: {}; using built-in prompt",
                path.display(),
                err
            );
            AUDIT_PROMPT.to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_key = env_string("GEMINI_API_KEY", "");
        if api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is required"));
        }

        let timeout = Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECONDS).max(1));
        let max_image_mb = env_u64("MAX_IMAGE_SIZE_MB", DEFAULT_MAX_IMAGE_SIZE_MB).max(1);

        let grow_mask = match env_u64("EDIT_GROW_MASK", 0) {
            0 => None,
            pixels => Some(pixels.min(u32::MAX as u64) as u32),
        };

        let audit_prompt_path = env::var("AUDIT_PROMPT_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(Config {
            gemini: GeminiSettings {
                api_key: api_key.trim().to_string(),
                base_url: env_string(
                    "GEMINI_BASE_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                )
                .trim_end_matches('/')
                .to_string(),
                text_model: env_string("GEMINI_TEXT_MODEL", "gemini-3-pro-preview"),
                image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
                timeout,
            },
            fetcher: FetcherConfig {
                timeout,
                max_bytes: (max_image_mb as usize).saturating_mul(1024 * 1024),
            },
            render: RenderConfig {
                erase_strength: normalize_strength(
                    "ERASE_STRENGTH",
                    env_f32("ERASE_STRENGTH", DEFAULT_ERASE_STRENGTH),
                    DEFAULT_ERASE_STRENGTH,
                ),
                construct_strength: normalize_strength(
                    "CONSTRUCT_STRENGTH",
                    env_f32("CONSTRUCT_STRENGTH", DEFAULT_CONSTRUCT_STRENGTH),
                    DEFAULT_CONSTRUCT_STRENGTH,
                ),
                grow_mask,
            },
            audit_prompt: load_audit_prompt(audit_prompt_path),
            max_concurrent_analyses: env_u64("MAX_CONCURRENT_ANALYSES", 2).max(1) as usize,
        })
    }
}
