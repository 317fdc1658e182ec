use std::io::Cursor;

use chrono::NaiveDateTime;
use derive_more::Display;
use docx_rs::{AlignmentType, Docx, Paragraph, Run, Style, StyleType};

use crate::model::leave_request::{LeaveRequest, LeaveType};

#[derive(Debug, Display)]
pub enum DocumentError {
    #[display(fmt = "failed to pack leave note: {}", _0)]
    Pack(String),
}

impl std::error::Error for DocumentError {}

/// The lines printed under the title, in order.
pub fn leave_note_lines(
    req: &LeaveRequest,
    student_name: &str,
    generated_at: NaiveDateTime,
) -> Vec<String> {
    // untyped requests print as official leave
    let leave_type = req.leave_type.unwrap_or(LeaveType::Official);

    let mut lines = vec![
        format!("Student ID: {} ({})", req.student_id, student_name),
        format!("Leave type: {}", leave_type.label()),
        format!(
            "Leave period: {} to {}",
            req.start_date.format("%Y-%m-%d"),
            req.end_date.format("%Y-%m-%d")
        ),
        format!("Reason: {}", req.reason),
        format!("Status: {}", req.status.as_ref().to_uppercase()),
    ];

    if let Some(comment) = req.teacher_comment.as_deref().filter(|c| !c.is_empty()) {
        lines.push(format!("Teacher comment: {comment}"));
    }

    lines.push(format!(
        "Generated at: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    lines
}

/// Download name, e.g. `leave_12_20260301093000.docx`.
pub fn leave_note_filename(req: &LeaveRequest, generated_at: NaiveDateTime) -> String {
    format!("leave_{}_{}.docx", req.id, generated_at.format("%Y%m%d%H%M%S"))
}

const TITLE_STYLE: &str = "Title";

fn title_style() -> Style {
    Style::new(TITLE_STYLE, StyleType::Paragraph)
        .name(TITLE_STYLE)
        .size(56)
        .bold()
}

/// Builds the document tree: a Title-styled heading followed by one paragraph per line.
pub fn leave_note_docx(
    req: &LeaveRequest,
    student_name: &str,
    generated_at: NaiveDateTime,
) -> Docx {
    let title = Paragraph::new()
        .add_run(Run::new().add_text("Student Leave Note"))
        .style(TITLE_STYLE)
        .align(AlignmentType::Center);

    leave_note_lines(req, student_name, generated_at)
        .into_iter()
        .fold(
            Docx::new().add_style(title_style()).add_paragraph(title),
            |doc, line| doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line))),
        )
}

/// Renders the leave note as a `.docx` package.
pub fn render_leave_note(
    req: &LeaveRequest,
    student_name: &str,
    generated_at: NaiveDateTime,
) -> Result<Vec<u8>, DocumentError> {
    let mut buf = Vec::new();
    leave_note_docx(req, student_name, generated_at)
        .build()
        .pack(Cursor::new(&mut buf))
        .map_err(|e| DocumentError::Pack(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_request::{AiVerdict, LeaveStatus};
    use chrono::NaiveDate;

    fn approved() -> LeaveRequest {
        LeaveRequest {
            id: 12,
            student_id: 2,
            reason: "Dental surgery".to_string(),
            leave_type: Some(LeaveType::Sick),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            status: LeaveStatus::Approved,
            ai_check: Some(AiVerdict::Valid),
            teacher_comment: Some("Get well soon".to_string()),
            attachment_path: None,
            ai_details: None,
            created_at: at(2026, 2, 27, 10, 0, 0),
            reviewed_at: None,
            reviewed_by: Some(1),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn lines_describe_the_request() {
        let lines = leave_note_lines(&approved(), "student@test.com", at(2026, 3, 1, 9, 30, 0));
        assert_eq!(
            lines,
            vec![
                "Student ID: 2 (student@test.com)",
                "Leave type: Sick leave",
                "Leave period: 2026-03-01 to 2026-03-03",
                "Reason: Dental surgery",
                "Status: APPROVED",
                "Teacher comment: Get well soon",
                "Generated at: 2026-03-01 09:30:00",
            ]
        );
    }

    #[test]
    fn missing_type_falls_back_to_official() {
        let mut req = approved();
        req.leave_type = None;
        req.teacher_comment = None;
        let lines = leave_note_lines(&req, "s", at(2026, 3, 1, 0, 0, 0));
        assert_eq!(lines[1], "Leave type: Official leave");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn renders_a_zip_package_with_a_stable_name() {
        let generated = at(2026, 3, 1, 9, 30, 0);
        let bytes = render_leave_note(&approved(), "student@test.com", generated).unwrap();
        assert_eq!(&bytes[..2], b"PK");
        assert_eq!(
            leave_note_filename(&approved(), generated),
            "leave_12_20260301093000.docx"
        );
    }

    #[test]
    fn title_uses_the_title_style() {
        let xml = leave_note_docx(&approved(), "student@test.com", at(2026, 3, 1, 9, 30, 0)).build();
        let styles = String::from_utf8(xml.styles).unwrap();
        let document = String::from_utf8(xml.document).unwrap();

        assert!(styles.contains(r#"w:styleId="Title""#));
        assert!(document.contains(r#"w:pStyle w:val="Title""#));
    }
}
