use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::clearance;
use crate::models::StudentRequirement;

pub fn build_report(
    label: Option<&str>,
    generated_at: DateTime<Utc>,
    all: &[StudentRequirement],
) -> String {
    let students = clearance::summarize_students(all);
    let roles = clearance::summarize_by_role(all);

    let mut output = String::new();
    let scope_label = label.unwrap_or("all students");

    let _ = writeln!(output, "# Clearance Status Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Sign-offs by Role");

    if roles.is_empty() {
        let _ = writeln!(output, "No requirements recorded.");
    } else {
        let _ = writeln!(output, "| Role | Signed | Incomplete | Missing |");
        let _ = writeln!(output, "|---|---|---|---|");
        for role in roles.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                role.role, role.signed, role.incomplete, role.missing
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Clearance");

    if students.is_empty() {
        let _ = writeln!(output, "No students with requirements.");
    } else {
        let cleared = students.iter().filter(|s| s.stats.is_cleared).count();
        let _ = writeln!(
            output,
            "{} of {} students fully cleared ({:.1}%).",
            cleared,
            students.len(),
            cleared as f64 * 100.0 / students.len() as f64
        );
        let _ = writeln!(output);
        let _ = writeln!(output, "| Student | Signed | Incomplete | Missing | Cleared |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for student in students.iter() {
            let _ = writeln!(
                output,
                "| {} | {}/{} | {} | {} | {} |",
                student.student_id,
                student.stats.signed,
                student.stats.total,
                student.stats.incomplete,
                student.stats.missing,
                if student.stats.is_cleared { "yes" } else { "no" }
            );
        }
    }

    let mut outstanding: Vec<_> = students.iter().filter(|s| !s.stats.is_cleared).collect();
    outstanding.sort_by(|a, b| {
        (b.stats.missing, b.stats.incomplete).cmp(&(a.stats.missing, a.stats.incomplete))
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Outstanding");

    if outstanding.is_empty() {
        let _ = writeln!(output, "Everyone is cleared.");
    } else {
        for student in outstanding.iter().take(10) {
            let _ = writeln!(
                output,
                "- {}: {} missing, {} incomplete",
                student.student_id, student.stats.missing, student.stats.incomplete
            );
        }
    }

    output
}
