//! crates/manuscript_core/src/gateway.rs
//!
//! The conversion gateway: convert, proofread and revise, each in a markdown and a
//! question/answer variant. Every call is a single attempt; failures are folded into
//! the returned result so the caller can show the message as-is.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::{ConversionResult, ProofreadResult, WorkflowKind};
use crate::ports::{GenerationRequest, GenerationService, TemplateName, TemplateStore};
use crate::prompts::{
    self, CONVERSION_MAX_TOKENS, FINDING_MARKER, LOOSE_FINDING_MARKER, PROOFREAD_MAX_TOKENS,
};

#[derive(Clone)]
pub struct ConversionGateway {
    generator: Arc<dyn GenerationService>,
    templates: Arc<dyn TemplateStore>,
}

impl ConversionGateway {
    pub fn new(generator: Arc<dyn GenerationService>, templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            generator,
            templates,
        }
    }

    /// Converts manuscript text. The model output is returned verbatim.
    pub async fn convert(
        &self,
        text: &str,
        kind: WorkflowKind,
        reporter_name: Option<&str>,
    ) -> ConversionResult {
        let template_name = match kind {
            WorkflowKind::Markdown => TemplateName::MarkdownRules,
            WorkflowKind::Qa => TemplateName::QaRules,
        };
        let template = match self.templates.load(template_name).await {
            Ok(template) => template,
            Err(e) => {
                error!("Failed to load template for {} conversion: {}", kind, e);
                return ConversionResult::failed(e.to_string());
            }
        };

        let request = GenerationRequest {
            prompt: prompts::conversion_prompt(&template, kind, text, reporter_name),
            max_output_tokens: CONVERSION_MAX_TOKENS,
        };
        info!("Converting {} characters ({}).", text.chars().count(), kind);
        match self.generator.generate(&request).await {
            Ok(output) => ConversionResult::ok(output),
            Err(e) => {
                error!("{} conversion failed: {}", kind, e);
                ConversionResult::failed(e.to_string())
            }
        }
    }

    /// Asks the model to annotate problems in converted text without changing it.
    pub async fn proofread(&self, text: &str, kind: WorkflowKind) -> ProofreadResult {
        let request = GenerationRequest {
            prompt: prompts::proofread_prompt(kind, text),
            max_output_tokens: PROOFREAD_MAX_TOKENS,
        };
        match self.generator.generate(&request).await {
            Ok(report) => {
                let issue_count = count_findings(&report);
                info!("Proofreading ({}) flagged roughly {} issues.", kind, issue_count);
                ProofreadResult {
                    success: true,
                    report,
                    issue_count,
                    error: None,
                }
            }
            Err(e) => {
                error!("{} proofreading failed: {}", kind, e);
                ProofreadResult::failed(e.to_string())
            }
        }
    }

    /// Applies a natural-language change request. The response replaces the text wholesale.
    pub async fn revise(&self, text: &str, request: &str, kind: WorkflowKind) -> ConversionResult {
        let request = GenerationRequest {
            prompt: prompts::revision_prompt(kind, text, request),
            max_output_tokens: CONVERSION_MAX_TOKENS,
        };
        match self.generator.generate(&request).await {
            Ok(output) => ConversionResult::ok(output),
            Err(e) => {
                error!("{} revision failed: {}", kind, e);
                ConversionResult::failed(e.to_string())
            }
        }
    }
}

/// Approximate number of findings in a proofread report.
///
/// Counts the strict marker, falling back to the loose one when the strict marker
/// never appears. Only a display hint; the model decides what it writes.
pub fn count_findings(report: &str) -> usize {
    match report.matches(FINDING_MARKER).count() {
        0 => report.matches(LOOSE_FINDING_MARKER).count(),
        n => n,
    }
}
