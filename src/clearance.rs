//! Reconciliation helpers over the flat student-requirement list.
//!
//! Records are assumed unique per (student, officer, requirement, role); the
//! lookups return the first match in list order.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::info;

use crate::api::RequirementStore;
use crate::bulk;
use crate::error::ApiError;
use crate::models::{
    BatchOutcome, ClearanceStats, NewStudentRequirement, RequirementKey, RequirementStatus,
    RoleSummary, StudentClearance, StudentRequirement,
};

pub fn find_existing<'a>(
    all: &'a [StudentRequirement],
    student_id: &str,
    co_id: &str,
    requirement_id: &str,
) -> Option<&'a StudentRequirement> {
    all.iter().find(|r| {
        r.student_id == student_id && r.co_id == co_id && r.requirement_id == requirement_id
    })
}

pub fn find_existing_by_role<'a>(
    all: &'a [StudentRequirement],
    student_id: &str,
    co_id: &str,
    requirement_id: &str,
    role: &str,
) -> Option<&'a StudentRequirement> {
    all.iter().find(|r| {
        r.student_id == student_id
            && r.co_id == co_id
            && r.requirement_id == requirement_id
            && r.signed_by.eq_ignore_ascii_case(role)
    })
}

fn records_for<'a>(
    student_id: &'a str,
    all: &'a [StudentRequirement],
) -> impl Iterator<Item = &'a StudentRequirement> + 'a {
    all.iter().filter(move |r| r.student_id == student_id)
}

/// A student with no records is not cleared.
pub fn is_fully_cleared(student_id: &str, all: &[StudentRequirement]) -> bool {
    let mut records = records_for(student_id, all).peekable();
    records.peek().is_some() && records.all(|r| r.status == RequirementStatus::Signed)
}

pub fn clearance_stats(student_id: &str, all: &[StudentRequirement]) -> ClearanceStats {
    let mut stats = records_for(student_id, all).fold(ClearanceStats::default(), |mut acc, r| {
        acc.total += 1;
        match r.status {
            RequirementStatus::Signed => acc.signed += 1,
            RequirementStatus::Incomplete => acc.incomplete += 1,
            RequirementStatus::Missing => acc.missing += 1,
        }
        acc
    });
    stats.is_cleared = stats.total > 0 && stats.signed == stats.total;
    stats
}

pub fn summarize_students(all: &[StudentRequirement]) -> Vec<StudentClearance> {
    let students: BTreeSet<&str> = all.iter().map(|r| r.student_id.as_str()).collect();
    students
        .into_iter()
        .map(|student_id| StudentClearance {
            student_id: student_id.to_string(),
            stats: clearance_stats(student_id, all),
        })
        .collect()
}

pub fn summarize_by_role(all: &[StudentRequirement]) -> Vec<RoleSummary> {
    let mut map: BTreeMap<String, RoleSummary> = BTreeMap::new();

    for record in all {
        let role = record.signed_by.to_ascii_lowercase();
        let entry = map.entry(role.clone()).or_insert_with(|| RoleSummary {
            role,
            ..RoleSummary::default()
        });
        match record.status {
            RequirementStatus::Signed => entry.signed += 1,
            RequirementStatus::Incomplete => entry.incomplete += 1,
            RequirementStatus::Missing => entry.missing += 1,
        }
    }

    map.into_values().collect()
}

/// Moves every record not already `missing` to `missing`. Updates run
/// concurrently; individual failures are counted, not retried.
pub async fn bulk_sweep_to_missing<S>(store: &S, all: &[StudentRequirement]) -> BatchOutcome
where
    S: RequirementStore + ?Sized,
{
    let requests = all
        .iter()
        .filter(|r| r.status != RequirementStatus::Missing)
        .map(|r| {
            (
                r.id.clone(),
                store.update_status(&r.id, RequirementStatus::Missing),
            )
        });
    bulk::settle_all("sweep_to_missing", requests).await
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignOutcome {
    Created(StudentRequirement),
    Updated(StudentRequirement),
    Unchanged(StudentRequirement),
}

/// Sets the status for the given key, creating the record on first contact.
pub async fn sign_requirement<S>(
    store: &S,
    all: &[StudentRequirement],
    key: &RequirementKey,
    status: RequirementStatus,
) -> Result<SignOutcome, ApiError>
where
    S: RequirementStore + ?Sized,
{
    let existing = find_existing_by_role(
        all,
        &key.student_id,
        &key.co_id,
        &key.requirement_id,
        &key.signed_by,
    );

    match existing {
        Some(record) if record.status == status => Ok(SignOutcome::Unchanged(record.clone())),
        Some(record) => {
            let updated = store.update_status(&record.id, status).await?;
            info!(id = %record.id, status = %status, "requirement updated");
            Ok(SignOutcome::Updated(updated))
        }
        None => {
            let created = store
                .create_student_requirement(&NewStudentRequirement {
                    key: key.clone(),
                    status,
                })
                .await?;
            info!(id = %created.id, status = %status, "requirement created");
            Ok(SignOutcome::Created(created))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkCreatePlan {
    pub to_create: Vec<NewStudentRequirement>,
    pub duplicates: usize,
}

/// Drops rows already present in `all` or repeated earlier in `rows`.
pub fn plan_bulk_create(
    all: &[StudentRequirement],
    rows: Vec<NewStudentRequirement>,
) -> BulkCreatePlan {
    let mut seen: HashSet<RequirementKey> = HashSet::new();
    let mut plan = BulkCreatePlan::default();

    for row in rows {
        let key = &row.key;
        let exists = find_existing_by_role(
            all,
            &key.student_id,
            &key.co_id,
            &key.requirement_id,
            &key.signed_by,
        )
        .is_some();
        if exists || !seen.insert(normalized(key)) {
            plan.duplicates += 1;
            continue;
        }
        plan.to_create.push(row);
    }

    plan
}

fn normalized(key: &RequirementKey) -> RequirementKey {
    RequirementKey {
        signed_by: key.signed_by.to_ascii_lowercase(),
        ..key.clone()
    }
}

pub async fn bulk_create<S>(store: &S, plan: &BulkCreatePlan) -> BatchOutcome
where
    S: RequirementStore + ?Sized,
{
    let requests = plan.to_create.iter().map(|row| {
        (
            format!("{}/{}", row.key.student_id, row.key.requirement_id),
            store.create_student_requirement(row),
        )
    });
    bulk::settle_all("bulk_create", requests).await
}
