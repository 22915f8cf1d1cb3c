use serde::Serialize;

/// Result of auditing one photo, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub barrier_detected: String,
    pub renovation_suggestion: String,
    pub estimated_cost_usd: f64,
    pub compliance_note: String,
    pub clear_mask: String,
    pub clear_prompt: String,
    pub build_mask: String,
    pub build_prompt: String,
    pub mask_prompt: String,
    pub image_gen_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<String>,
    pub accessibility_score: u8,
}

fn present(value: &str) -> bool {
    !value.trim().is_empty()
}

impl AuditRecord {
    /// Structural renovations carry a remove step and a build step, all four descriptions filled in.
    pub fn is_two_pass(&self) -> bool {
        present(&self.clear_mask)
            && present(&self.clear_prompt)
            && present(&self.build_mask)
            && present(&self.build_prompt)
    }

    /// `(prompt, search_region)` for a one-edit render, preferring the single-pass aliases.
    pub fn single_pass_prompts(&self) -> Option<(&str, &str)> {
        let prompt = [&self.image_gen_prompt, &self.build_prompt]
            .into_iter()
            .find(|value| present(value))?;
        let region = [&self.mask_prompt, &self.build_mask]
            .into_iter()
            .find(|value| present(value))?;
        Some((prompt.as_str(), region.as_str()))
    }

    /// The single-pass aliases exactly as the vision backend supplied them, both non-empty.
    pub fn alias_prompts(&self) -> Option<(&str, &str)> {
        if present(&self.image_gen_prompt) && present(&self.mask_prompt) {
            Some((self.image_gen_prompt.as_str(), self.mask_prompt.as_str()))
        } else {
            None
        }
    }

    pub fn is_renderable(&self) -> bool {
        self.is_two_pass() || self.single_pass_prompts().is_some()
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> AuditRecord {
    AuditRecord {
        barrier_detected: "Standard bathtub with 24 inch walls".to_string(),
        renovation_suggestion: "Replace tub with curbless shower and grab bars".to_string(),
        estimated_cost_usd: 4500.0,
        compliance_note: "AODA grab bar height 33-36 inches".to_string(),
        clear_mask: "the white bathtub against the left wall".to_string(),
        clear_prompt: "matching tile floor extending to the wall".to_string(),
        build_mask: "the left wall area and surrounding floor".to_string(),
        build_prompt: "Brushed nickel grab bars, curbless tile shower".to_string(),
        mask_prompt: "the left wall area and surrounding floor".to_string(),
        image_gen_prompt: "Brushed nickel grab bars, curbless tile shower".to_string(),
        cost_estimate: None,
        accessibility_score: 0,
    }
}
