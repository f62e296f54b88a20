use tracing::info;

use crate::api::PermitService;
use crate::clearance;
use crate::error::ApiError;
use crate::models::{Permit, StudentRequirement};

/// Issues an examination permit. Students with anything left unsigned are
/// refused before the backend is contacted.
pub async fn issue_permit<P>(
    service: &P,
    student_id: &str,
    exam_period: Option<&str>,
    all: &[StudentRequirement],
) -> Result<Permit, ApiError>
where
    P: PermitService + ?Sized,
{
    if !clearance::is_fully_cleared(student_id, all) {
        return Err(ApiError::NotCleared {
            student_id: student_id.to_string(),
        });
    }

    let permit = service.generate_permit(student_id, exam_period).await?;
    info!(student_id, permit_id = %permit.id, "permit issued");
    Ok(permit)
}

pub async fn lookup_permit<P>(service: &P, qr_code: &str) -> Result<Permit, ApiError>
where
    P: PermitService + ?Sized,
{
    let code = qr_code.trim();
    if code.is_empty() {
        return Err(ApiError::Rejected("QR code is empty".to_string()));
    }
    service.lookup_permit(code).await
}
