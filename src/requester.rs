//! Builds the report request and turns the model reply into a report

use crate::constants::{REPORT_MAX_OUTPUT_TOKENS, REPORT_RESPONSE_MIME_TYPE, REPORT_TEMPERATURE};
use crate::error::Result;
use crate::models::UserMedia;
use crate::provider::{CachedContext, GenerationConfig, ModelProvider, Part, RemoteFile};
use crate::report::{
    CLOSING_INSTRUCTION, InspectionReport, MEDIA_HEADER, REPORT_PROMPT, parse_report,
};

pub fn report_generation_config() -> GenerationConfig {
    GenerationConfig {
        temperature: REPORT_TEMPERATURE,
        max_output_tokens: REPORT_MAX_OUTPUT_TOKENS,
        response_mime_type: REPORT_RESPONSE_MIME_TYPE.to_string(),
    }
}

/// Prompt, media header, a label and file reference per ready item, closing instruction.
/// Items without a ready remote file are left out.
pub fn build_parts(media: &UserMedia) -> Vec<Part> {
    let mut parts = vec![Part::text(REPORT_PROMPT), Part::text(MEDIA_HEADER)];

    for (name, remote) in ready_media(media) {
        parts.push(Part::text(format!("User Document: {}", name)));
        parts.push(Part::file(remote));
    }

    parts.push(Part::text(CLOSING_INSTRUCTION));
    parts
}

fn ready_media(media: &UserMedia) -> impl Iterator<Item = (&String, &RemoteFile)> {
    media
        .iter()
        .filter(|(_, item)| item.is_usable())
        .filter_map(|(name, item)| item.remote.as_ref().map(|r| (name, r)))
}

/// One exchange against the cached context. A reply that is not a valid
/// report fails with `MalformedReport` and is never retried.
pub async fn generate_report<P: ModelProvider>(
    provider: &P,
    context: &CachedContext,
    media: &UserMedia,
) -> Result<InspectionReport> {
    let parts = build_parts(media);
    let skipped = media.len() - ready_media(media).count();
    if skipped > 0 {
        tracing::warn!(skipped, "Leaving media that is not ready out of the report request");
    }

    tracing::info!(
        cache = %context.name,
        media = media.len() - skipped,
        parts = parts.len(),
        "Requesting inspection report"
    );

    let reply = provider
        .send_request(context, &parts, &report_generation_config())
        .await?;

    let report = parse_report(&reply)?;
    tracing::info!(
        findings = report.detailed_inspection.len(),
        critical = report.executive_summary.critical_issues.len(),
        "Generated inspection report"
    );
    Ok(report)
}
