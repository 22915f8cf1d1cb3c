use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::audit::record::AuditRecord;
use crate::audit::score::score;
use crate::audit::validator::validate;
use crate::error::{BackendError, PipelineError, PipelineResult};
use crate::fetch::ImageSource;
use crate::llm::media::truncate_for_log;
use crate::llm::VisionBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStage {
    Fetching,
    Requesting,
    Parsing,
    Validating,
    Scored,
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuditStage::Fetching => "fetching",
            AuditStage::Requesting => "requesting",
            AuditStage::Parsing => "parsing",
            AuditStage::Validating => "validating",
            AuditStage::Scored => "scored",
        };
        f.write_str(label)
    }
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\s*```\s*$")
        .expect("Failed to compile code fence pattern")
});

fn strip_code_fence(reply: &str) -> &str {
    match CODE_FENCE.captures(reply).and_then(|captures| captures.get(1)) {
        Some(inner) => inner.as_str(),
        None => reply.trim(),
    }
}

/// Decodes the vision reply into a field map, unwrapping a single-object array.
pub fn parse_reply(reply: &str) -> PipelineResult<Map<String, Value>> {
    let body = strip_code_fence(reply);
    let parsed: Value = serde_json::from_str(body).map_err(|err| {
        PipelineError::Parse(format!(
            "{err}. Response: {}",
            truncate_for_log(body, 200)
        ))
    })?;

    let object = match parsed {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Parse("empty array in JSON response".to_string()))?,
        other => other,
    };

    match object {
        Value::Object(map) => Ok(map),
        other => Err(PipelineError::Parse(format!(
            "expected a JSON object, found {}",
            truncate_for_log(&other.to_string(), 200)
        ))),
    }
}

/// Fetch, ask, parse, validate, score. Any failing stage aborts the audit.
pub struct AuditRunner {
    source: Arc<dyn ImageSource>,
    vision: Arc<dyn VisionBackend>,
    prompt: String,
}

impl AuditRunner {
    pub fn new(
        source: Arc<dyn ImageSource>,
        vision: Arc<dyn VisionBackend>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            source,
            vision,
            prompt: prompt.into(),
        }
    }

    pub async fn run(&self, image_url: &str) -> PipelineResult<AuditRecord> {
        let mut stage = AuditStage::Fetching;
        let result = self.run_stages(image_url, &mut stage).await;
        match &result {
            Ok(record) => info!(
                "Audit complete for {image_url}: score={} two_pass={}",
                record.accessibility_score,
                record.is_two_pass()
            ),
            Err(err) => warn!("Audit of {image_url} failed while {stage}: {err}"),
        }
        result
    }

    async fn run_stages(
        &self,
        image_url: &str,
        stage: &mut AuditStage,
    ) -> PipelineResult<AuditRecord> {
        let image = self.source.fetch_image(image_url).await?;
        debug!(
            "Fetched {} ({} bytes, {})",
            image_url,
            image.bytes.len(),
            image.mime_type
        );

        *stage = AuditStage::Requesting;
        let reply = match self.vision.analyze(&image, &self.prompt).await {
            Ok(reply) => reply,
            Err(BackendError::EmptyReply(detail)) => {
                *stage = AuditStage::Parsing;
                return Err(PipelineError::Parse(format!("no text in vision reply: {detail}")));
            }
            Err(err) => return Err(err.into()),
        };

        *stage = AuditStage::Parsing;
        let fields = parse_reply(&reply)?;

        *stage = AuditStage::Validating;
        let mut record = validate(&fields)?;

        *stage = AuditStage::Scored;
        record.accessibility_score = score(&record);
        Ok(record)
    }
}
