use std::collections::HashMap;
use std::io::Read;

use anyhow::Context;
use serde::Deserialize;

use crate::models::{NewStudentRequirement, RequirementKey, RequirementStatus};

#[derive(Deserialize)]
struct RequirementRow {
    student_id: String,
    co_id: String,
    requirement_id: String,
    signed_by: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ContactRow {
    student_id: String,
    number: String,
}

pub fn read_requirement_rows<R: Read>(input: R) -> anyhow::Result<Vec<NewStudentRequirement>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<RequirementRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("invalid requirement row on line {line}"))?;
        if row.student_id.is_empty() || row.requirement_id.is_empty() {
            anyhow::bail!("line {line}: student_id and requirement_id are required");
        }
        let status = match row.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .parse::<RequirementStatus>()
                .map_err(|e| anyhow::anyhow!("line {line}: {e}"))?,
            None => RequirementStatus::Incomplete,
        };

        rows.push(NewStudentRequirement {
            key: RequirementKey {
                student_id: row.student_id,
                co_id: row.co_id,
                requirement_id: row.requirement_id,
                signed_by: row.signed_by.to_ascii_lowercase(),
            },
            status,
        });
    }

    Ok(rows)
}

pub fn read_contacts<R: Read>(input: R) -> anyhow::Result<HashMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut contacts = HashMap::new();

    for result in reader.deserialize::<ContactRow>() {
        let row = result.context("invalid contact row")?;
        contacts.insert(row.student_id, row.number);
    }

    Ok(contacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_defaults_to_incomplete() {
        let csv = "student_id,co_id,requirement_id,signed_by,status\n\
                   2021-0001,co-lib,r-card,Librarian,\n\
                   2021-0002,co-cash,r-fees,cashier,signed\n";
        let rows = read_requirement_rows(csv.as_bytes()).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, RequirementStatus::Incomplete);
        assert_eq!(rows[0].key.signed_by, "librarian");
        assert_eq!(rows[1].status, RequirementStatus::Signed);
    }

    #[test]
    fn status_column_is_optional() {
        let csv = "student_id,co_id,requirement_id,signed_by\n2021-0001,co-lib,r-card,librarian\n";
        let rows = read_requirement_rows(csv.as_bytes()).expect("rows");
        assert_eq!(rows[0].status, RequirementStatus::Incomplete);
    }

    #[test]
    fn unknown_status_names_the_line() {
        let csv = "student_id,co_id,requirement_id,signed_by,status\n\
                   2021-0001,co-lib,r-card,librarian,approved\n";
        let err = read_requirement_rows(csv.as_bytes()).expect_err("bad status");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn contacts_are_keyed_by_student() {
        let csv = "student_id,number\n2021-0001, 09175550101 \n";
        let contacts = read_contacts(csv.as_bytes()).expect("contacts");
        assert_eq!(contacts.get("2021-0001").map(String::as_str), Some("09175550101"));
    }
}
