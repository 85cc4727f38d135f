//! Report rendering: an HTML page for the browser and a plain-text summary for the CLI

use std::fmt::Write;
use std::path::Path;

use crate::report::{Finding, InspectionReport};

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn list(out: &mut String, class: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = write!(out, "<ul class=\"{}\">", class);
    for item in items {
        let _ = write!(out, "<li>{}</li>", escape(item));
    }
    out.push_str("</ul>");
}

/// Frame image shown next to a finding, only when the file is still on disk
fn frame_image(finding: &Finding, frames_dir: &Path) -> Option<String> {
    let frame = finding.frame_reference()?;
    if !frames_dir.join(frame).is_file() {
        return None;
    }
    let caption = finding.timestamp.as_deref().unwrap_or("N/A");
    Some(format!(
        "<figure><img src=\"/frames/{}\" alt=\"{}\"><figcaption>Frame at {}</figcaption></figure>",
        escape(frame),
        escape(frame),
        escape(caption)
    ))
}

fn render_finding(out: &mut String, finding: &Finding, frames_dir: &Path) {
    let _ = write!(
        out,
        "<details class=\"finding\"><summary>{} - {}</summary>",
        escape(&finding.area),
        escape(&finding.condition)
    );

    if let Some(image) = frame_image(finding, frames_dir) {
        out.push_str(&image);
    }

    let _ = write!(
        out,
        "<p><strong>Compliance Status:</strong> <code>{}</code></p>",
        escape(&finding.compliance_status)
    );

    if !finding.issues_found.is_empty() {
        out.push_str("<p><strong>Issues Found:</strong></p>");
        list(out, "issues", &finding.issues_found);
    }

    let _ = write!(
        out,
        "<p><strong>Standard Reference:</strong> {} - {}</p>",
        escape(&finding.reference_doc),
        escape(&finding.reference_section)
    );

    let _ = write!(
        out,
        "<p><strong>Recommendation:</strong> {}</p>",
        escape(&finding.recommendation)
    );

    out.push_str("</details>");
}

/// Full HTML page for a report
pub fn render_html(report: &InspectionReport, frames_dir: &Path) -> String {
    let mut out = String::from(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Inspection Report</title></head><body>",
    );
    out.push_str("<h1>Inspection Report</h1>");

    let summary = &report.executive_summary;
    out.push_str("<section id=\"executive-summary\"><h2>Executive Summary</h2>");
    let _ = write!(
        out,
        "<h3>Overall Condition</h3><p>{}</p>",
        escape(&summary.overall_condition)
    );
    out.push_str("<h3>Critical Issues</h3>");
    list(&mut out, "critical", &summary.critical_issues);
    out.push_str("<h3>Recommended Actions</h3>");
    list(&mut out, "actions", &summary.recommended_actions);
    out.push_str("</section>");

    out.push_str("<section id=\"findings\"><h2>Detailed Inspection Findings</h2>");
    for finding in &report.detailed_inspection {
        render_finding(&mut out, finding, frames_dir);
    }
    out.push_str("</section>");

    let notes = &report.maintenance_notes;
    out.push_str("<section id=\"maintenance\"><h2>Maintenance Schedule</h2>");
    for entry in &notes.maintenance_schedule {
        let _ = write!(out, "<h3>{} Tasks</h3>", escape(&entry.frequency));
        list(&mut out, "tasks", &entry.tasks);
    }
    if let Some(costs) = notes.cost_considerations.as_deref().filter(|c| !c.is_empty()) {
        out.push_str("<h3>Cost Considerations</h3>");
        list(&mut out, "costs", costs);
    }
    out.push_str("</section>");

    out.push_str("<p><a href=\"/report/download\">Download Full Report</a></p>");
    out.push_str("</body></html>");
    out
}

/// Terminal summary printed by the CLI
pub fn render_text(report: &InspectionReport) -> String {
    let mut out = String::new();
    let summary = &report.executive_summary;

    let _ = writeln!(out, "Overall condition: {}", summary.overall_condition);
    if !summary.critical_issues.is_empty() {
        let _ = writeln!(out, "\nCritical issues:");
        for issue in &summary.critical_issues {
            let _ = writeln!(out, "  ! {}", issue);
        }
    }
    if !summary.recommended_actions.is_empty() {
        let _ = writeln!(out, "\nRecommended actions:");
        for action in &summary.recommended_actions {
            let _ = writeln!(out, "  - {}", action);
        }
    }

    let _ = writeln!(out, "\nFindings ({}):", report.detailed_inspection.len());
    for finding in &report.detailed_inspection {
        let _ = write!(
            out,
            "  {} - {} [{}]",
            finding.area, finding.condition, finding.compliance_status
        );
        if let Some(reference) = &finding.media_reference {
            let _ = write!(out, " ({})", reference);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{SAMPLE_REPORT, parse_report};

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_html_links_existing_frames_only() {
        let frames = tempfile::tempdir().unwrap();
        let report = parse_report(SAMPLE_REPORT).unwrap();

        let without = render_html(&report, frames.path());
        assert!(!without.contains("/frames/frame_15.jpg"));

        std::fs::write(frames.path().join("frame_15.jpg"), b"jpg").unwrap();
        let with = render_html(&report, frames.path());
        assert!(with.contains("<img src=\"/frames/frame_15.jpg\""));
        assert!(with.contains("Frame at 00:15"));
        assert!(with.contains("Standard Reference:</strong> roofing_code.pdf - 4.2.1"));
        assert!(with.contains("Recommendation:</strong> No action required"));
        assert!(with.contains("Cost Considerations"));
    }

    #[test]
    fn test_html_escapes_model_text() {
        let mut report = parse_report(SAMPLE_REPORT).unwrap();
        report.executive_summary.overall_condition = "<script>alert(1)</script>".into();
        let html = render_html(&report, Path::new("/nonexistent"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_text_summary() {
        let report = parse_report(SAMPLE_REPORT).unwrap();
        let text = render_text(&report);
        assert!(text.starts_with("Overall condition: Generally sound"));
        assert!(text.contains("Findings (2):"));
        assert!(text.contains("Roof - Fair [Non-compliant] (frame_15.jpg)"));
    }
}
