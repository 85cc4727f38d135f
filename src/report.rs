//! Inspection report schema, prompt text, parsing and persistence

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{InspectionError, Result};

/// Baked into the cached context alongside the reference standards
pub const SYSTEM_INSTRUCTION: &str = "You are an expert at analysing residential building and producing detailed inspection reports. \
Your job is to analyse the user provided media and produce a detailed inspection report based on the reference standards you have access to.";

/// Opening instruction of every report request
pub const REPORT_PROMPT: &str = r#"
You have been supplied with a set of building standards and manufacturer specifications to evaluate the photos and videos against.
Please be specific about any violations of building codes or manufacturer specifications found in the documentation.

Analyze the uploaded photos and videos of the building and generate a detailed inspection report in JSON format.
Be exhaustive in your inspection and cover all aspects of the building shown in the media.
When a finding comes from an extracted video frame, set mediaReference to the frame's document name (for example frame_15.jpg).

The response should be a valid JSON object with the following structure:

{
  "detailedInspection": [
    {
      "area": "string",
      "mediaReference": "string",
      "timestamp": "string",
      "condition": "string",
      "complianceStatus": "string",
      "issuesFound": ["string"],
      "referenceDoc": "string",
      "referenceSection": "string",
      "recommendation": "string"
    }
  ],
  "executiveSummary": {
    "overallCondition": "string",
    "criticalIssues": ["string"],
    "recommendedActions": ["string"]
  },
  "maintenanceNotes": {
    "recurringIssues": ["string"],
    "preventiveRecommendations": ["string"],
    "maintenanceSchedule": [
      {
        "frequency": "string",
        "tasks": ["string"]
      }
    ],
    "costConsiderations": ["string"]
  }
}

Ensure the response is a valid JSON object that can be parsed.
"#;

pub const MEDIA_HEADER: &str = "User provided media:";

pub const CLOSING_INSTRUCTION: &str = "Please generate a detailed building report. \
Please provide a detailed answer with elaboration on the report and reference material.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionReport {
    pub detailed_inspection: Vec<Finding>,
    pub executive_summary: ExecutiveSummary,
    pub maintenance_notes: MaintenanceNotes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub area: String,
    /// Media name the finding was drawn from, `frame_<t>.jpg` for video frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub condition: String,
    pub compliance_status: String,
    pub issues_found: Vec<String>,
    pub reference_doc: String,
    pub reference_section: String,
    pub recommendation: String,
}

impl Finding {
    /// Frame file referenced by this finding, if it points at a video frame
    pub fn frame_reference(&self) -> Option<&str> {
        self.media_reference
            .as_deref()
            .filter(|r| r.starts_with("frame_"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveSummary {
    pub overall_condition: String,
    pub critical_issues: Vec<String>,
    pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceNotes {
    pub recurring_issues: Vec<String>,
    pub preventive_recommendations: Vec<String>,
    pub maintenance_schedule: Vec<ScheduleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_considerations: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub frequency: String,
    pub tasks: Vec<String>,
}

/// Strictly parse a model reply into a report
pub fn parse_report(reply: &str) -> Result<InspectionReport> {
    serde_json::from_str(reply.trim()).map_err(|e| {
        tracing::warn!(error = %e, reply_len = reply.len(), "Model reply is not a valid report");
        InspectionError::MalformedReport(e.to_string())
    })
}

pub fn to_pretty_json(report: &InspectionReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(|e| InspectionError::MalformedReport(e.to_string()))
}

/// Write the report as indented JSON
pub async fn save_report(report: &InspectionReport, path: &Path) -> Result<()> {
    let json = to_pretty_json(report)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    tracing::info!(path = %path.display(), "Saved inspection report");
    Ok(())
}

/// Read a previously persisted report, `None` if the file does not exist
pub async fn load_report(path: &Path) -> Result<Option<InspectionReport>> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => parse_report(&json).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_REPORT: &str = r#"{
  "detailedInspection": [
    {
      "area": "Roof",
      "mediaReference": "frame_15.jpg",
      "timestamp": "00:15",
      "condition": "Fair",
      "complianceStatus": "Non-compliant",
      "issuesFound": ["Cracked tiles", "Missing flashing"],
      "referenceDoc": "roofing_code.pdf",
      "referenceSection": "4.2.1",
      "recommendation": "Replace cracked tiles and install flashing"
    },
    {
      "area": "Kitchen",
      "mediaReference": "kitchen.jpg",
      "condition": "Good",
      "complianceStatus": "Compliant",
      "issuesFound": [],
      "referenceDoc": "kitchen_ventilation.pdf",
      "referenceSection": "2.1",
      "recommendation": "No action required"
    }
  ],
  "executiveSummary": {
    "overallCondition": "Generally sound with roof defects",
    "criticalIssues": ["Roof water ingress risk"],
    "recommendedActions": ["Engage a licensed roofer"]
  },
  "maintenanceNotes": {
    "recurringIssues": ["Gutter blockage"],
    "preventiveRecommendations": ["Clean gutters twice a year"],
    "maintenanceSchedule": [
      { "frequency": "Annual", "tasks": ["Inspect roof", "Service hot water system"] }
    ],
    "costConsiderations": ["Roof repair $2,000-$4,000"]
  }
}"#;
