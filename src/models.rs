use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementStatus {
    Signed,
    Incomplete,
    Missing,
}

impl RequirementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequirementStatus::Signed => "signed",
            RequirementStatus::Incomplete => "incomplete",
            RequirementStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequirementStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "signed" => Ok(RequirementStatus::Signed),
            "incomplete" => Ok(RequirementStatus::Incomplete),
            "missing" => Ok(RequirementStatus::Missing),
            other => Err(format!("unknown requirement status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearingOfficer {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub department: Option<String>,
}

/// One obligation of one student toward one clearing officer, as signed by
/// one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRequirement {
    pub id: String,
    pub student_id: String,
    pub co_id: String,
    pub requirement_id: String,
    pub signed_by: String,
    pub status: RequirementStatus,
    #[serde(default)]
    pub requirement: Option<Requirement>,
    #[serde(default)]
    pub clearing_officer: Option<ClearingOfficer>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StudentRequirement {
    pub fn key(&self) -> RequirementKey {
        RequirementKey {
            student_id: self.student_id.clone(),
            co_id: self.co_id.clone(),
            requirement_id: self.requirement_id.clone(),
            signed_by: self.signed_by.clone(),
        }
    }
}

/// The (student, officer, requirement, role) tuple identifying a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementKey {
    pub student_id: String,
    pub co_id: String,
    pub requirement_id: String,
    pub signed_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudentRequirement {
    #[serde(flatten)]
    pub key: RequirementKey,
    pub status: RequirementStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceStats {
    pub total: usize,
    pub signed: usize,
    pub incomplete: usize,
    pub missing: usize,
    pub is_cleared: bool,
}

#[derive(Debug, Clone)]
pub struct StudentClearance {
    pub student_id: String,
    pub stats: ClearanceStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSummary {
    pub role: String,
    pub signed: usize,
    pub incomplete: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit {
    pub id: String,
    pub student_id: String,
    pub qr_code: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub exam_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmsMessage {
    pub number: String,
    pub message: String,
}

/// Tally of a settle-all batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub updated: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.updated + self.failed
    }
}
