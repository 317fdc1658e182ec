use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    sqlx::Type,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    sqlx::Type,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Sick,
    Personal,
    Official,
}

impl LeaveType {
    /// Human readable label used on the printed leave note.
    pub fn label(&self) -> &'static str {
        match self {
            LeaveType::Sick => "Sick leave",
            LeaveType::Personal => "Personal leave",
            LeaveType::Official => "Official leave",
        }
    }
}

/// Outcome of the reason plausibility check.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    sqlx::Type,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AiVerdict {
    Valid,
    Invalid,
    /// The scoring service could not be reached or answered garbage.
    Unavailable,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeaveRequest {
    pub id: i64,
    pub student_id: i64,
    pub reason: String,
    pub leave_type: Option<LeaveType>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: LeaveStatus,
    pub ai_check: Option<AiVerdict>,
    pub teacher_comment: Option<String>,
    pub attachment_path: Option<String>,
    pub ai_details: Option<String>,
    pub created_at: NaiveDateTime,
    pub reviewed_at: Option<NaiveDateTime>,
    pub reviewed_by: Option<i64>,
}

impl LeaveRequest {
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.student_id == user_id
    }

    /// Stored AI assessment, parsed back into JSON. Corrupt blobs read as `None`.
    pub fn ai_details_json(&self) -> Option<serde_json::Value> {
        self.ai_details
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn sample() -> LeaveRequest {
        LeaveRequest {
            id: 7,
            student_id: 3,
            reason: "Fever, clinic note attached".to_string(),
            leave_type: Some(LeaveType::Sick),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            status: LeaveStatus::Pending,
            ai_check: Some(AiVerdict::Valid),
            teacher_comment: None,
            attachment_path: None,
            ai_details: Some(r#"{"score":15,"details":{}}"#.to_string()),
            created_at: NaiveDate::from_ymd_opt(2026, 2, 28)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    #[test]
    fn statuses_parse_from_query_strings() {
        assert_eq!(LeaveStatus::from_str("approved").unwrap(), LeaveStatus::Approved);
        assert!(LeaveStatus::from_str("done").is_err());
        let all: Vec<String> = LeaveStatus::iter().map(|s| s.to_string()).collect();
        assert_eq!(all, ["pending", "approved", "rejected"]);
    }

    #[test]
    fn ai_details_are_parsed_or_dropped() {
        let mut req = sample();
        assert_eq!(req.ai_details_json().unwrap()["score"], 15);

        req.ai_details = Some("not json".to_string());
        assert!(req.ai_details_json().is_none());
    }

    #[test]
    fn ownership_is_by_student_id() {
        let req = sample();
        assert!(req.is_owned_by(3));
        assert!(!req.is_owned_by(4));
    }
}
