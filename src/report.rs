use std::fmt::Write;

use uuid::Uuid;

use crate::aggregate::{self, average_score};
use crate::models::{GradeSheet, GradeSheetStatus, User, UserRole};

fn display_name(users: &[User], id: Option<Uuid>) -> String {
    match id {
        None => "unassigned".to_string(),
        Some(id) => users
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.name.clone())
            .unwrap_or_else(|| format!("unknown ({id})")),
    }
}

fn format_average(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.2}"))
}

/// One dashboard line for a sheet.
pub fn sheet_line(sheet: &GradeSheet, users: &[User]) -> String {
    format!(
        "- {} [{}] {} at {} on {} (panel 1: {}, panel 2: {}) average {}",
        sheet.group_name,
        sheet.status,
        sheet.id,
        sheet.venue,
        sheet.date,
        display_name(users, sheet.panel1_id),
        display_name(users, sheet.panel2_id),
        format_average(aggregate::combined_average(sheet)),
    )
}

pub fn sheet_detail(sheet: &GradeSheet, users: &[User]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", sheet.group_name);
    let _ = writeln!(output, "Status: {} (revision {})", sheet.status, sheet.revision);
    let _ = writeln!(output, "Program: {}", sheet.program);
    let _ = writeln!(output, "Defense: {} at {}", sheet.date, sheet.venue);
    let _ = writeln!(output, "Proponents: {}", sheet.proponents.join(", "));
    let _ = writeln!(output, "Proposed titles:");
    for title in &sheet.proposed_titles {
        let marker = if sheet.selected_title.as_ref() == Some(title) {
            " (selected)"
        } else {
            ""
        };
        let _ = writeln!(output, "- {title}{marker}");
    }

    for (label, panel_id, grades) in [
        ("Panel 1", sheet.panel1_id, sheet.panel1_grades.as_ref()),
        ("Panel 2", sheet.panel2_id, sheet.panel2_grades.as_ref()),
    ] {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {label}: {}", display_name(users, panel_id));
        match grades {
            None => {
                let _ = writeln!(output, "No grades yet.");
            }
            Some(grades) => {
                let state = if grades.submitted { "submitted" } else { "draft" };
                let _ = writeln!(
                    output,
                    "{state}, average {}",
                    format_average(average_score(grades))
                );
                for (criterion, score) in &grades.title_defense_scores {
                    let _ = writeln!(output, "- {criterion}: {score}");
                }
                if let Some(comments) = grades.comments.as_deref().filter(|c| !c.is_empty()) {
                    let _ = writeln!(output, "Comments: {comments}");
                }
            }
        }
    }

    output
}

pub fn build_report(sheets: &[GradeSheet], users: &[User]) -> String {
    let counts = aggregate::status_counts(sheets);
    let mut output = String::new();

    let _ = writeln!(output, "# Defense Grading Masterlist");
    let _ = writeln!(output, "{} grade sheets", counts.total());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Summary");
    for status in GradeSheetStatus::ALL {
        let _ = writeln!(output, "- {}: {}", status, counts.get(status));
    }

    let mut ordered: Vec<&GradeSheet> = sheets.iter().collect();
    ordered.sort_by(|a, b| {
        a.status
            .progress()
            .cmp(&b.status.progress())
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.group_name.cmp(&b.group_name))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Sheets");
    if ordered.is_empty() {
        let _ = writeln!(output, "No grade sheets recorded.");
    } else {
        for sheet in ordered {
            let _ = writeln!(output, "{}", sheet_line(sheet, users));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Panel Workload");
    let panelists: Vec<&User> = users
        .iter()
        .filter(|user| user.role == UserRole::Panel)
        .collect();
    if panelists.is_empty() {
        let _ = writeln!(output, "No panelists registered.");
    } else {
        for panelist in panelists {
            let workload = aggregate::panelist_workload(panelist.id, sheets);
            let groups: Vec<&str> = aggregate::sheets_for_panelist(panelist.id, sheets)
                .into_iter()
                .map(|sheet| sheet.group_name.as_str())
                .collect();
            let _ = writeln!(
                output,
                "- {} ({}): {} assigned, {} submitted, {} pending{}",
                panelist.name,
                panelist.email,
                workload.assigned,
                workload.submitted,
                workload.pending,
                if groups.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", groups.join(", "))
                }
            );
        }
    }

    output
}
