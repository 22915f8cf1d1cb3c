//! Turns an audit into an illustrative "after" photo.
//!
//! Simple fixes are a single region edit. Structural fixes are two edits: an erase pass at
//! high strength that removes the obstructing object, then a construct pass at moderate
//! strength that builds the accessible feature into the cleared photo. Backend failures never
//! surface as errors here; they degrade to a single-pass fallback, a partial result or
//! [`RenderOutcome::Failed`].

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::AuditRecord;
use crate::config::RenderConfig;
use crate::error::{BackendError, PipelineError, PipelineResult};
use crate::fetch::{validate_image_url, FetchedImage, ImageSource};
use crate::llm::{EditPass, EditRequest, ImageEditBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    SinglePass,
    TwoPass,
    /// Two-pass was attempted but the image came from a single-pass retry.
    FallbackSinglePass,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RenderMode::SinglePass => "single_pass",
            RenderMode::TwoPass => "two_pass",
            RenderMode::FallbackSinglePass => "fallback_single_pass",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Complete { image: Vec<u8>, mode: RenderMode },
    /// The erase pass succeeded but the construct pass did not.
    Partial { image: Vec<u8>, warning: String },
    Failed { reason: String },
}

impl RenderOutcome {
    pub fn image(&self) -> Option<&[u8]> {
        match self {
            RenderOutcome::Complete { image, .. } | RenderOutcome::Partial { image, .. } => {
                Some(image.as_slice())
            }
            RenderOutcome::Failed { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            RenderOutcome::Partial { warning, .. } => Some(warning.as_str()),
            _ => None,
        }
    }
}

pub struct RenovationRenderer {
    source: Arc<dyn ImageSource>,
    editor: Arc<dyn ImageEditBackend>,
    config: RenderConfig,
}

impl RenovationRenderer {
    pub fn new(
        source: Arc<dyn ImageSource>,
        editor: Arc<dyn ImageEditBackend>,
        config: RenderConfig,
    ) -> Self {
        Self {
            source,
            editor,
            config,
        }
    }

    /// Errors only for input the caller should not have sent: a malformed URL, or a record
    /// with neither the two-pass fields nor a single-pass prompt and region.
    pub async fn render(
        &self,
        image_url: &str,
        record: &AuditRecord,
    ) -> PipelineResult<RenderOutcome> {
        validate_image_url(image_url)?;

        let outcome = if record.is_two_pass() {
            self.render_two_pass(image_url, record).await
        } else {
            let (prompt, region) = record.single_pass_prompts().ok_or_else(|| {
                PipelineError::InvalidInput(
                    "image_gen_prompt and mask_prompt are required for a single-pass render"
                        .to_string(),
                )
            })?;
            self.render_single_pass(image_url, prompt, region).await
        };

        match &outcome {
            RenderOutcome::Complete { image, mode } => {
                info!("Rendered {image_url} ({mode}, {} bytes)", image.len())
            }
            RenderOutcome::Partial { warning, .. } => {
                warn!("Partial render for {image_url}: {warning}")
            }
            RenderOutcome::Failed { reason } => warn!("Render failed for {image_url}: {reason}"),
        }
        Ok(outcome)
    }

    pub async fn render_single_pass(
        &self,
        image_url: &str,
        prompt: &str,
        region: &str,
    ) -> RenderOutcome {
        let source = match self.fetch_source(image_url).await {
            Ok(source) => source,
            Err(reason) => return RenderOutcome::Failed { reason },
        };

        match self
            .edit(&source, EditPass::Single, prompt, region, self.config.construct_strength)
            .await
        {
            Ok(image) => RenderOutcome::Complete {
                image,
                mode: RenderMode::SinglePass,
            },
            Err(err) => RenderOutcome::Failed {
                reason: format!("single-pass edit failed: {err}"),
            },
        }
    }

    async fn render_two_pass(&self, image_url: &str, record: &AuditRecord) -> RenderOutcome {
        let source = match self.fetch_source(image_url).await {
            Ok(source) => source,
            Err(reason) => return RenderOutcome::Failed { reason },
        };

        let erased = match self
            .edit(
                &source,
                EditPass::Erase,
                &record.clear_prompt,
                &record.clear_mask,
                self.config.erase_strength,
            )
            .await
        {
            Ok(bytes) => FetchedImage::new(bytes),
            Err(err) => {
                warn!("Erase pass failed for {image_url}: {err}; trying single pass");
                return self
                    .fallback(&source, record, format!("erase pass failed: {err}"))
                    .await;
            }
        };

        let construct_err = match self
            .edit(
                &erased,
                EditPass::Construct,
                &record.build_prompt,
                &record.build_mask,
                self.config.construct_strength,
            )
            .await
        {
            Ok(image) => {
                return RenderOutcome::Complete {
                    image,
                    mode: RenderMode::TwoPass,
                }
            }
            Err(err) => err,
        };

        if construct_err.is_transient() {
            warn!("Construct pass failed for {image_url}: {construct_err}; trying single pass");
            let fallback = self
                .fallback(
                    &source,
                    record,
                    format!("construct pass failed: {construct_err}"),
                )
                .await;
            if fallback.image().is_some() {
                return fallback;
            }
        }

        RenderOutcome::Partial {
            image: erased.bytes,
            warning: format!(
                "construct pass failed ({construct_err}); returning the erased intermediate image"
            ),
        }
    }

    async fn fallback(
        &self,
        source: &FetchedImage,
        record: &AuditRecord,
        cause: String,
    ) -> RenderOutcome {
        let Some((prompt, region)) = record.alias_prompts() else {
            return RenderOutcome::Failed {
                reason: format!("{cause}; no single-pass prompts to fall back on"),
            };
        };

        match self
            .edit(source, EditPass::Single, prompt, region, self.config.construct_strength)
            .await
        {
            Ok(image) => RenderOutcome::Complete {
                image,
                mode: RenderMode::FallbackSinglePass,
            },
            Err(err) => RenderOutcome::Failed {
                reason: format!("{cause}; single-pass fallback failed: {err}"),
            },
        }
    }

    async fn fetch_source(&self, image_url: &str) -> Result<FetchedImage, String> {
        self.source
            .fetch_image(image_url)
            .await
            .map_err(|err| format!("could not fetch source image: {err}"))
    }

    async fn edit(
        &self,
        image: &FetchedImage,
        pass: EditPass,
        prompt: &str,
        region: &str,
        strength: f32,
    ) -> Result<Vec<u8>, BackendError> {
        info!("Running {pass} pass on region {region:?} at strength {strength:.2}");
        self.editor
            .edit(EditRequest {
                pass,
                image,
                prompt,
                search_region: region,
                strength,
                grow_mask: self.config.grow_mask,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::audit::record::sample_record;
    use crate::llm::media::fixtures::{JPEG_BYTES, PNG_BYTES};

    const ERASED: &[u8] = b"erased-photo";
    const BUILT: &[u8] = b"built-photo";
    const SINGLE: &[u8] = b"single-pass-photo";

    struct StaticSource {
        available: bool,
    }

    #[async_trait]
    impl ImageSource for StaticSource {
        async fn fetch_image(&self, _url: &str) -> PipelineResult<FetchedImage> {
            if self.available {
                Ok(FetchedImage::new(JPEG_BYTES.to_vec()))
            } else {
                Err(PipelineError::Timeout("source did not respond".to_string()))
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct EditCall {
        pass: EditPass,
        input: Vec<u8>,
        prompt: String,
        region: String,
        strength: f32,
    }

    /// Replies by prompt text; prompts without a script fail with a 500.
    struct ScriptedEditor {
        replies: HashMap<String, Result<Vec<u8>, BackendError>>,
        calls: Mutex<Vec<EditCall>>,
    }

    impl ScriptedEditor {
        fn new(replies: Vec<(&str, Result<&[u8], BackendError>)>) -> Arc<Self> {
            Arc::new(Self {
                replies: replies
                    .into_iter()
                    .map(|(prompt, reply)| (prompt.to_string(), reply.map(<[u8]>::to_vec)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<EditCall> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ImageEditBackend for ScriptedEditor {
        async fn edit(&self, request: EditRequest<'_>) -> Result<Vec<u8>, BackendError> {
            self.calls.lock().expect("calls lock").push(EditCall {
                pass: request.pass,
                input: request.image.bytes.clone(),
                prompt: request.prompt.to_string(),
                region: request.search_region.to_string(),
                strength: request.strength,
            });
            self.replies
                .get(request.prompt)
                .cloned()
                .unwrap_or_else(|| Err(server_error()))
        }
    }

    fn server_error() -> BackendError {
        BackendError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal".to_string(),
        }
    }

    fn structural_record() -> AuditRecord {
        AuditRecord {
            clear_mask: "the vanity cabinet".to_string(),
            clear_prompt: "empty matching floor and wall".to_string(),
            build_mask: "the sink wall and surrounding floor".to_string(),
            build_prompt: "floating sink with knee clearance".to_string(),
            mask_prompt: "the sink area".to_string(),
            image_gen_prompt: "accessible floating sink".to_string(),
            ..sample_record()
        }
    }

    fn renderer(editor: Arc<ScriptedEditor>, source_available: bool) -> RenovationRenderer {
        RenovationRenderer::new(
            Arc::new(StaticSource {
                available: source_available,
            }),
            editor,
            RenderConfig {
                erase_strength: 0.95,
                construct_strength: 0.65,
                grow_mask: None,
            },
        )
    }

    const URL: &str = "https://photos.example.com/bath.jpg";

    #[tokio::test]
    async fn two_pass_builds_on_the_erased_image() {
        let editor = ScriptedEditor::new(vec![
            ("empty matching floor and wall", Ok(PNG_BYTES)),
            ("floating sink with knee clearance", Ok(BUILT)),
        ]);
        let outcome = renderer(editor.clone(), true)
            .render(URL, &structural_record())
            .await
            .expect("render");

        assert_eq!(
            outcome,
            RenderOutcome::Complete {
                image: BUILT.to_vec(),
                mode: RenderMode::TwoPass
            }
        );
        let calls = editor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].pass, EditPass::Erase);
        assert_eq!(calls[0].input, JPEG_BYTES);
        assert_eq!(calls[0].region, "the vanity cabinet");
        assert_eq!(calls[0].strength, 0.95);
        assert_eq!(calls[1].pass, EditPass::Construct);
        assert_eq!(calls[1].input, PNG_BYTES);
        assert_eq!(calls[1].region, "the sink wall and surrounding floor");
        assert_eq!(calls[1].strength, 0.65);
    }

    #[tokio::test]
    async fn erase_failure_falls_back_to_single_pass() {
        let editor = ScriptedEditor::new(vec![("accessible floating sink", Ok(SINGLE))]);
        let outcome = renderer(editor.clone(), true)
            .render(URL, &structural_record())
            .await
            .expect("render");

        assert_eq!(
            outcome,
            RenderOutcome::Complete {
                image: SINGLE.to_vec(),
                mode: RenderMode::FallbackSinglePass
            }
        );
        let calls = editor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].pass, EditPass::Single);
        assert_eq!(calls[1].input, JPEG_BYTES);
        assert_eq!(calls[1].region, "the sink area");
    }

    #[tokio::test]
    async fn erase_failure_without_aliases_is_absent() {
        let record = AuditRecord {
            image_gen_prompt: String::new(),
            ..structural_record()
        };
        let editor = ScriptedEditor::new(vec![]);
        let outcome = renderer(editor.clone(), true)
            .render(URL, &record)
            .await
            .expect("render");

        assert!(outcome.image().is_none());
        assert_eq!(editor.calls().len(), 1);
    }

    #[tokio::test]
    async fn construct_failure_returns_erased_intermediate() {
        let editor = ScriptedEditor::new(vec![("empty matching floor and wall", Ok(ERASED))]);
        let outcome = renderer(editor.clone(), true)
            .render(URL, &structural_record())
            .await
            .expect("render");

        assert_eq!(outcome.image(), Some(ERASED));
        assert!(outcome.warning().is_some());
        // a status failure is the backend's answer, so no single-pass retry
        assert_eq!(editor.calls().len(), 2);
    }

    #[tokio::test]
    async fn construct_timeout_retries_single_pass() {
        let editor = ScriptedEditor::new(vec![
            ("empty matching floor and wall", Ok(ERASED)),
            ("floating sink with knee clearance", Err(BackendError::Timeout)),
            ("accessible floating sink", Ok(SINGLE)),
        ]);
        let outcome = renderer(editor.clone(), true)
            .render(URL, &structural_record())
            .await
            .expect("render");

        assert_eq!(
            outcome,
            RenderOutcome::Complete {
                image: SINGLE.to_vec(),
                mode: RenderMode::FallbackSinglePass
            }
        );
    }

    #[tokio::test]
    async fn construct_timeout_with_failed_fallback_keeps_intermediate() {
        let editor = ScriptedEditor::new(vec![
            ("empty matching floor and wall", Ok(ERASED)),
            ("floating sink with knee clearance", Err(BackendError::Timeout)),
        ]);
        let outcome = renderer(editor.clone(), true)
            .render(URL, &structural_record())
            .await
            .expect("render");

        assert_eq!(outcome.image(), Some(ERASED));
        assert_eq!(editor.calls().len(), 3);
    }

    #[tokio::test]
    async fn incomplete_structural_fields_take_the_single_pass_path() {
        let record = AuditRecord {
            clear_mask: "x".to_string(),
            clear_prompt: "y".to_string(),
            build_mask: String::new(),
            build_prompt: "z".to_string(),
            ..structural_record()
        };
        let editor = ScriptedEditor::new(vec![("accessible floating sink", Ok(SINGLE))]);
        let outcome = renderer(editor.clone(), true)
            .render(URL, &record)
            .await
            .expect("render");

        assert_eq!(
            outcome,
            RenderOutcome::Complete {
                image: SINGLE.to_vec(),
                mode: RenderMode::SinglePass
            }
        );
        assert_eq!(editor.calls().len(), 1);
    }

    #[tokio::test]
    async fn single_pass_backend_failure_is_absent_not_an_error() {
        let record = AuditRecord {
            clear_mask: String::new(),
            ..structural_record()
        };
        let editor = ScriptedEditor::new(vec![(
            "accessible floating sink",
            Err(BackendError::Transport("connection reset".to_string())),
        )]);
        let outcome = renderer(editor, true)
            .render(URL, &record)
            .await
            .expect("render");
        assert!(matches!(outcome, RenderOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn unreachable_source_is_absent() {
        let editor = ScriptedEditor::new(vec![]);
        let outcome = renderer(editor.clone(), false)
            .render(URL, &structural_record())
            .await
            .expect("render");
        assert!(outcome.image().is_none());
        assert!(editor.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_input_is_an_error() {
        let editor = ScriptedEditor::new(vec![]);
        let renderer = renderer(editor, true);

        let err = renderer
            .render("not a url", &structural_record())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));

        let promptless = AuditRecord {
            clear_mask: String::new(),
            image_gen_prompt: String::new(),
            build_prompt: String::new(),
            ..structural_record()
        };
        let err = renderer.render(URL, &promptless).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
