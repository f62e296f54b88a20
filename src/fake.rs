//! In-memory backend used by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::api::{PermitService, RequirementStore, SmsGateway};
use crate::error::ApiError;
use crate::models::{
    NewStudentRequirement, Permit, RequirementStatus, SmsMessage, StudentRequirement,
};

#[derive(Default)]
pub struct FakeBackend {
    pub records: Mutex<Vec<StudentRequirement>>,
    pub failing_ids: HashSet<String>,
    pub failing_numbers: HashSet<String>,
    pub update_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub permit_calls: AtomicUsize,
    pub sent: Mutex<Vec<SmsMessage>>,
}

impl FakeBackend {
    pub fn with_records(records: Vec<StudentRequirement>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn permits(&self) -> usize {
        self.permit_calls.load(Ordering::SeqCst)
    }
}

pub fn record(
    id: &str,
    student_id: &str,
    co_id: &str,
    requirement_id: &str,
    signed_by: &str,
    status: RequirementStatus,
) -> StudentRequirement {
    StudentRequirement {
        id: id.to_string(),
        student_id: student_id.to_string(),
        co_id: co_id.to_string(),
        requirement_id: requirement_id.to_string(),
        signed_by: signed_by.to_string(),
        status,
        requirement: None,
        clearing_officer: None,
        created_at: None,
        updated_at: None,
    }
}

#[async_trait]
impl RequirementStore for FakeBackend {
    async fn list_student_requirements(&self) -> Result<Vec<StudentRequirement>, ApiError> {
        Ok(self.records.lock().await.clone())
    }

    async fn create_student_requirement(
        &self,
        new: &NewStudentRequirement,
    ) -> Result<StudentRequirement, ApiError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.contains(&new.key.student_id) {
            return Err(ApiError::Rejected("create refused".to_string()));
        }
        let mut created = record(
            &format!("created-{n}"),
            &new.key.student_id,
            &new.key.co_id,
            &new.key.requirement_id,
            &new.key.signed_by,
            new.status,
        );
        created.created_at = Some(Utc::now());
        self.records.lock().await.push(created.clone());
        Ok(created)
    }

    async fn update_status(
        &self,
        id: &str,
        status: RequirementStatus,
    ) -> Result<StudentRequirement, ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.contains(id) {
            return Err(ApiError::Status {
                endpoint: format!("/institutionalReq/update/{id}"),
                status: 503,
                message: None,
            });
        }
        let mut records = self.records.lock().await;
        let found = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ApiError::Rejected(format!("no record {id}")))?;
        found.status = status;
        found.updated_at = Some(Utc::now());
        Ok(found.clone())
    }
}

#[async_trait]
impl PermitService for FakeBackend {
    async fn generate_permit(
        &self,
        student_id: &str,
        exam_period: Option<&str>,
    ) -> Result<Permit, ApiError> {
        self.permit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Permit {
            id: format!("permit-{student_id}"),
            student_id: student_id.to_string(),
            qr_code: format!("QR-{student_id}"),
            issued_at: Utc::now(),
            exam_period: exam_period.map(|p| p.to_string()),
        })
    }

    async fn lookup_permit(&self, qr_code: &str) -> Result<Permit, ApiError> {
        let student_id = qr_code
            .strip_prefix("QR-")
            .ok_or_else(|| ApiError::Status {
                endpoint: format!("/qr-code/scan/{qr_code}"),
                status: 404,
                message: Some("Permit not found".to_string()),
            })?;
        Ok(Permit {
            id: format!("permit-{student_id}"),
            student_id: student_id.to_string(),
            qr_code: qr_code.to_string(),
            issued_at: Utc::now(),
            exam_period: None,
        })
    }
}

#[async_trait]
impl SmsGateway for FakeBackend {
    async fn send_sms(&self, message: &SmsMessage) -> Result<(), ApiError> {
        if self.failing_numbers.contains(&message.number) {
            return Err(ApiError::Rejected(format!("undeliverable: {}", message.number)));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
