use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::audit::{AuditRecord, AuditRunner};
use crate::config::Config;
use crate::fetch::{ImageFetcher, ImageSource};
use crate::llm::media::to_data_uri;
use crate::llm::GeminiClient;
use crate::render::{RenderOutcome, RenovationRenderer};

pub const DEFAULT_MAX_IMAGES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub audit: Option<AuditRecord>,
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub image_number: usize,
    pub original_url: String,
    pub audit: Option<AuditRecord>,
    pub renovated_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total_images_found: usize,
    pub images_analyzed: usize,
    pub results: Vec<BatchEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderResponse {
    pub success: bool,
    pub image_base64: Option<String>,
    pub message: String,
}

/// Audit followed by a best-effort render, for one photo or a batch of them.
pub struct RenovationPipeline {
    auditor: AuditRunner,
    renderer: RenovationRenderer,
}

struct RenderedImage {
    data_uri: Option<String>,
    warning: Option<String>,
}

impl RenovationPipeline {
    pub fn new(auditor: AuditRunner, renderer: RenovationRenderer) -> Self {
        Self { auditor, renderer }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher: Arc<dyn ImageSource> = Arc::new(ImageFetcher::new(&config.fetcher)?);
        let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);
        let auditor = AuditRunner::new(fetcher.clone(), gemini.clone(), config.audit_prompt.clone());
        let renderer = RenovationRenderer::new(fetcher, gemini, config.render.clone());
        Ok(Self::new(auditor, renderer))
    }

    pub async fn analyze(&self, image_url: &str) -> AnalyzeResponse {
        let record = match self.auditor.run(image_url).await {
            Ok(record) => record,
            Err(err) => {
                return AnalyzeResponse {
                    audit: None,
                    image_data: None,
                    render_warning: None,
                    error: Some(format!("Analysis failed: {err}")),
                }
            }
        };

        let rendered = self.render_image(image_url, &record).await;
        AnalyzeResponse {
            audit: Some(record),
            image_data: rendered.data_uri,
            render_warning: rendered.warning,
            error: None,
        }
    }

    /// Analyzes at most `max_images` URLs, `max_concurrent` at a time, reporting in input order.
    pub async fn analyze_batch(
        self: &Arc<Self>,
        image_urls: Vec<String>,
        max_images: usize,
        max_concurrent: usize,
    ) -> BatchReport {
        let total_images_found = image_urls.len();
        let selected: Vec<String> = image_urls.into_iter().take(max_images).collect();
        info!(
            "Analyzing {} images (out of {} total)",
            selected.len(),
            total_images_found
        );

        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(selected.len());
        for (index, url) in selected.iter().enumerate() {
            let pipeline = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                info!("Analyzing image {}...", index + 1);
                pipeline.analyze(&url).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, (handle, url)) in handles.into_iter().zip(selected).enumerate() {
            let entry = match handle.await {
                Ok(response) => BatchEntry {
                    image_number: index + 1,
                    original_url: url,
                    audit: response.audit,
                    renovated_image: response.image_data,
                    render_warning: response.render_warning,
                    error: response.error,
                },
                Err(err) => {
                    error!("Analysis task for image {} aborted: {err}", index + 1);
                    BatchEntry {
                        image_number: index + 1,
                        original_url: url,
                        audit: None,
                        renovated_image: None,
                        render_warning: None,
                        error: Some(format!("analysis task aborted: {err}")),
                    }
                }
            };
            results.push(entry);
        }

        BatchReport {
            total_images_found,
            images_analyzed: results.len(),
            results,
        }
    }

    /// Single-pass render from caller-supplied prompts, skipping the audit.
    pub async fn render_with_prompts(
        &self,
        image_url: &str,
        prompt: &str,
        mask_prompt: &str,
    ) -> Result<RenderResponse> {
        if prompt.trim().is_empty() || mask_prompt.trim().is_empty() {
            return Err(anyhow!("prompt and mask_prompt are required"));
        }
        crate::fetch::validate_image_url(image_url)?;

        let outcome = self
            .renderer
            .render_single_pass(image_url, prompt, mask_prompt)
            .await;
        Ok(match outcome {
            RenderOutcome::Failed { reason } => RenderResponse {
                success: false,
                image_base64: None,
                message: format!("Image generation failed: {reason}"),
            },
            other => RenderResponse {
                success: true,
                image_base64: other.image().map(to_data_uri),
                message: "Image generated successfully".to_string(),
            },
        })
    }

    async fn render_image(&self, image_url: &str, record: &AuditRecord) -> RenderedImage {
        if !record.is_renderable() {
            info!("Audit for {image_url} carries no render prompts; skipping image generation");
            return RenderedImage {
                data_uri: None,
                warning: None,
            };
        }

        match self.renderer.render(image_url, record).await {
            Ok(outcome) => RenderedImage {
                data_uri: outcome.image().map(to_data_uri),
                warning: outcome.warning().map(str::to_string),
            },
            Err(err) => {
                warn!("Image generation error for {image_url}: {err}");
                RenderedImage {
                    data_uri: None,
                    warning: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::RenderConfig;
    use crate::error::{BackendError, PipelineError, PipelineResult};
    use crate::fetch::FetchedImage;
    use crate::llm::media::fixtures::{JPEG_BYTES, PNG_BYTES};
    use crate::llm::{EditRequest, ImageEditBackend, VisionBackend};

    /// Serves a JPEG for any https URL whose path does not mention "missing".
    struct StaticSource;

    #[async_trait]
    impl ImageSource for StaticSource {
        async fn fetch_image(&self, url: &str) -> PipelineResult<FetchedImage> {
            if url.contains("missing") {
                return Err(PipelineError::Transfer(format!("404 for {url}")));
            }
            Ok(FetchedImage::new(JPEG_BYTES.to_vec()))
        }
    }

    struct CannedVision;

    #[async_trait]
    impl VisionBackend for CannedVision {
        async fn analyze(&self, _image: &FetchedImage, _prompt: &str) -> Result<String, BackendError> {
            Ok(r#"{
                "barrier_detected": "Two inch threshold at the patio door",
                "renovation_suggestion": "Add threshold ramp",
                "estimated_cost_usd": 250,
                "compliance_note": "AODA maximum 1:12 slope for ramps",
                "clear_mask": "",
                "clear_prompt": "",
                "build_mask": "the patio door threshold and floor on both sides",
                "build_prompt": "Aluminium threshold ramp with non-slip surface",
                "mask_prompt": "the patio door threshold and floor on both sides",
                "image_gen_prompt": "Aluminium threshold ramp with non-slip surface"
            }"#
            .to_string())
        }
    }

    struct PngEditor {
        fail: bool,
    }

    #[async_trait]
    impl ImageEditBackend for PngEditor {
        async fn edit(&self, _request: EditRequest<'_>) -> Result<Vec<u8>, BackendError> {
            if self.fail {
                Err(BackendError::Timeout)
            } else {
                Ok(PNG_BYTES.to_vec())
            }
        }
    }

    fn pipeline(editor_fails: bool) -> Arc<RenovationPipeline> {
        let source: Arc<dyn ImageSource> = Arc::new(StaticSource);
        let auditor = AuditRunner::new(source.clone(), Arc::new(CannedVision), "audit");
        let renderer = RenovationRenderer::new(
            source,
            Arc::new(PngEditor { fail: editor_fails }),
            RenderConfig::default(),
        );
        Arc::new(RenovationPipeline::new(auditor, renderer))
    }

    #[tokio::test]
    async fn analyze_returns_audit_and_data_uri() {
        let response = pipeline(false)
            .analyze("https://photos.example.com/patio.jpg")
            .await;
        assert!(response.is_success());
        let audit = response.audit.expect("audit");
        // 40 cost + 30 non-structural + 15 ramp/threshold + 10 quick fix
        assert_eq!(audit.accessibility_score, 95);
        assert!(response
            .image_data
            .expect("image")
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn failed_render_still_returns_the_audit() {
        let response = pipeline(true)
            .analyze("https://photos.example.com/patio.jpg")
            .await;
        assert!(response.is_success());
        assert!(response.audit.is_some());
        assert!(response.image_data.is_none());

        let json = serde_json::to_value(&response).expect("serialize");
        assert!(json.get("error").is_none());
        assert!(json["image_data"].is_null());
    }

    #[tokio::test]
    async fn audit_failure_is_reported_as_error() {
        let response = pipeline(false)
            .analyze("https://photos.example.com/missing.jpg")
            .await;
        assert!(response.audit.is_none());
        assert!(response
            .error
            .expect("error")
            .starts_with("Analysis failed:"));
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_isolates_failures() {
        let urls = vec![
            "https://photos.example.com/1.jpg".to_string(),
            "https://photos.example.com/missing.jpg".to_string(),
            "https://photos.example.com/3.jpg".to_string(),
            "https://photos.example.com/4.jpg".to_string(),
        ];
        let report = pipeline(false).analyze_batch(urls, 3, 2).await;

        assert_eq!(report.total_images_found, 4);
        assert_eq!(report.images_analyzed, 3);
        let numbers: Vec<usize> = report.results.iter().map(|entry| entry.image_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(report.results[0].audit.is_some());
        assert!(report.results[1].audit.is_none());
        assert!(report.results[1].error.is_some());
        assert_eq!(report.results[2].original_url, "https://photos.example.com/3.jpg");
        assert!(report.results[2].renovated_image.is_some());
    }

    #[tokio::test]
    async fn prompt_render_requires_both_prompts() {
        let pipeline = pipeline(false);
        assert!(pipeline
            .render_with_prompts("https://photos.example.com/1.jpg", "grab bar", " ")
            .await
            .is_err());

        let response = pipeline
            .render_with_prompts("https://photos.example.com/1.jpg", "grab bar", "the wall")
            .await
            .expect("response");
        assert!(response.success);
        assert!(response.image_base64.is_some());
    }
}
