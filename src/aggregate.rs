use uuid::Uuid;

use crate::models::{GradeSheet, GradeSheetStatus, PanelGrades, PanelSlot, StatusCounts, Workload};

pub fn sheets_for_panelist(panel_id: Uuid, sheets: &[GradeSheet]) -> Vec<&GradeSheet> {
    sheets
        .iter()
        .filter(|sheet| sheet.references(panel_id))
        .collect()
}

pub fn average_score(grades: &PanelGrades) -> Option<f64> {
    let count = grades.title_defense_scores.len();
    if count == 0 {
        return None;
    }

    let total: f64 = grades.title_defense_scores.values().sum();
    Some(total / count as f64)
}

/// Mean of whichever panel averages exist.
pub fn combined_average(sheet: &GradeSheet) -> Option<f64> {
    let averages: Vec<f64> = [PanelSlot::Panel1, PanelSlot::Panel2]
        .into_iter()
        .filter_map(|slot| sheet.grades(slot).and_then(average_score))
        .collect();

    if averages.is_empty() {
        None
    } else {
        Some(averages.iter().sum::<f64>() / averages.len() as f64)
    }
}

pub fn status_counts(sheets: &[GradeSheet]) -> StatusCounts {
    let mut counts = StatusCounts::default();

    for sheet in sheets {
        match sheet.derived_status() {
            GradeSheetStatus::NotStarted => counts.not_started += 1,
            GradeSheetStatus::InProgress => counts.in_progress += 1,
            GradeSheetStatus::Panel1Submitted => counts.panel1_submitted += 1,
            GradeSheetStatus::Panel2Submitted => counts.panel2_submitted += 1,
            GradeSheetStatus::Completed => counts.completed += 1,
        }
    }

    counts
}

pub fn panelist_workload(panel_id: Uuid, sheets: &[GradeSheet]) -> Workload {
    let mut workload = Workload::default();

    for sheet in sheets {
        let Some(slot) = sheet.slot_of(panel_id) else {
            continue;
        };
        workload.assigned += 1;
        if sheet.grades(slot).is_some_and(|grades| grades.submitted) {
            workload.submitted += 1;
        } else {
            workload.pending += 1;
        }
    }

    workload
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn grades(scores: &[f64], submitted: bool) -> PanelGrades {
        PanelGrades {
            title_defense_scores: scores
                .iter()
                .enumerate()
                .map(|(index, value)| (format!("c{}", index + 1), *value))
                .collect(),
            comments: None,
            submitted,
        }
    }

    fn sheet(name: &str, panel1: Option<Uuid>, panel2: Option<Uuid>) -> GradeSheet {
        GradeSheet {
            id: Uuid::new_v4(),
            group_name: name.to_string(),
            proponents: Vec::new(),
            proposed_titles: Vec::new(),
            selected_title: None,
            program: "BSCS".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            venue: "Room 204".to_string(),
            panel1_id: panel1,
            panel2_id: panel2,
            panel1_grades: None,
            panel2_grades: None,
            status: GradeSheetStatus::NotStarted,
            revision: 0,
        }
    }

    #[test]
    fn average_of_scores() {
        assert_eq!(average_score(&grades(&[80.0, 90.0], false)), Some(85.0));
        assert_eq!(average_score(&grades(&[], false)), None);
    }

    #[test]
    fn panelist_filter_preserves_order() {
        let panelist = Uuid::new_v4();
        let other = Uuid::new_v4();
        let sheets = vec![
            sheet("A", Some(panelist), Some(other)),
            sheet("B", Some(other), None),
            sheet("C", None, Some(panelist)),
        ];

        let names: Vec<&str> = sheets_for_panelist(panelist, &sheets)
            .into_iter()
            .map(|sheet| sheet.group_name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        assert!(sheets_for_panelist(Uuid::new_v4(), &sheets).is_empty());
    }

    #[test]
    fn combined_average_uses_available_panels() {
        let mut graded = sheet("A", None, None);
        assert_eq!(combined_average(&graded), None);

        graded.panel1_grades = Some(grades(&[70.0, 80.0], true));
        assert_eq!(combined_average(&graded), Some(75.0));

        graded.panel2_grades = Some(grades(&[95.0], false));
        assert_eq!(combined_average(&graded), Some(85.0));
    }

    #[test]
    fn counts_use_derived_status() {
        let mut completed = sheet("A", None, None);
        completed.panel1_grades = Some(grades(&[90.0], true));
        completed.panel2_grades = Some(grades(&[85.0], true));

        let mut in_progress = sheet("B", None, None);
        in_progress.panel2_grades = Some(grades(&[60.0], false));

        let counts = status_counts(&[completed, in_progress, sheet("C", None, None)]);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.not_started, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn workload_splits_submitted_and_pending() {
        let panelist = Uuid::new_v4();
        let mut done = sheet("A", Some(panelist), None);
        done.panel1_grades = Some(grades(&[88.0], true));
        let mut started = sheet("B", None, Some(panelist));
        started.panel2_grades = Some(grades(&[70.0], false));
        let unrelated = sheet("C", None, None);

        let workload = panelist_workload(panelist, &[done, started, unrelated]);
        assert_eq!(
            workload,
            Workload {
                assigned: 2,
                submitted: 1,
                pending: 1,
            }
        );
    }
}
