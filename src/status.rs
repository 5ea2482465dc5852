use crate::models::{GradeSheet, GradeSheetStatus, PanelGrades};

/// Combines both panel slots into a sheet status. First matching rule wins.
pub fn derive_status(
    panel1: Option<&PanelGrades>,
    panel2: Option<&PanelGrades>,
) -> GradeSheetStatus {
    let panel1_done = panel1.is_some_and(|grades| grades.submitted);
    let panel2_done = panel2.is_some_and(|grades| grades.submitted);

    if panel1_done && panel2_done {
        return GradeSheetStatus::Completed;
    }
    if panel1_done {
        return GradeSheetStatus::Panel1Submitted;
    }
    if panel2_done {
        return GradeSheetStatus::Panel2Submitted;
    }

    let started = |grades: Option<&PanelGrades>| grades.is_some_and(PanelGrades::is_started);
    if started(panel1) || started(panel2) {
        return GradeSheetStatus::InProgress;
    }

    GradeSheetStatus::NotStarted
}

impl GradeSheet {
    pub fn derived_status(&self) -> GradeSheetStatus {
        derive_status(self.panel1_grades.as_ref(), self.panel2_grades.as_ref())
    }

    /// Overwrites the stored status with the derived one.
    pub fn refresh_status(&mut self) -> GradeSheetStatus {
        self.status = self.derived_status();
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn grades(scores: &[(&str, f64)], comments: Option<&str>, submitted: bool) -> PanelGrades {
        PanelGrades {
            title_defense_scores: scores
                .iter()
                .map(|(key, value)| (key.to_string(), *value))
                .collect::<BTreeMap<_, _>>(),
            comments: comments.map(str::to_string),
            submitted,
        }
    }

    fn sheet(panel1: Option<PanelGrades>, panel2: Option<PanelGrades>) -> GradeSheet {
        GradeSheet {
            id: Uuid::new_v4(),
            group_name: "Group Alpha".to_string(),
            proponents: vec!["Avery Lee".to_string()],
            proposed_titles: vec!["Campus Wayfinding".to_string()],
            selected_title: None,
            program: "BSCS".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            venue: "Room 301".to_string(),
            panel1_id: Some(Uuid::new_v4()),
            panel2_id: Some(Uuid::new_v4()),
            panel1_grades: panel1,
            panel2_grades: panel2,
            status: GradeSheetStatus::NotStarted,
            revision: 0,
        }
    }

    #[test]
    fn both_submitted_is_completed_regardless_of_content() {
        let p1 = grades(&[], None, true);
        let p2 = grades(&[("c1", 40.0)], Some("needs work"), true);
        assert_eq!(derive_status(Some(&p1), Some(&p2)), GradeSheetStatus::Completed);
    }

    #[test]
    fn panel1_submission_wins_over_panel2_progress() {
        let p1 = grades(&[("c1", 90.0)], None, true);
        let p2 = grades(&[("c1", 70.0)], None, false);
        assert_eq!(
            derive_status(Some(&p1), Some(&p2)),
            GradeSheetStatus::Panel1Submitted
        );
    }

    #[test]
    fn panel1_submitted_without_panel2_object() {
        let p1 = grades(&[("c1", 90.0)], None, true);
        assert_eq!(derive_status(Some(&p1), None), GradeSheetStatus::Panel1Submitted);
    }

    #[test]
    fn panel2_submitted_alone() {
        let p2 = grades(&[("c1", 88.0)], None, true);
        assert_eq!(derive_status(None, Some(&p2)), GradeSheetStatus::Panel2Submitted);
    }

    #[test]
    fn empty_unsubmitted_slot_is_not_started() {
        let p2 = grades(&[], Some(""), false);
        assert_eq!(derive_status(None, Some(&p2)), GradeSheetStatus::NotStarted);
        assert_eq!(derive_status(None, None), GradeSheetStatus::NotStarted);
    }

    #[test]
    fn partial_scores_or_comment_mark_in_progress() {
        let p1 = grades(&[("criterion1", 5.0)], None, false);
        assert_eq!(derive_status(Some(&p1), None), GradeSheetStatus::InProgress);

        let p2 = grades(&[], Some("strong methodology"), false);
        assert_eq!(derive_status(None, Some(&p2)), GradeSheetStatus::InProgress);
    }

    #[test]
    fn derivation_ignores_stored_status_and_is_idempotent() {
        let options = [
            None,
            Some(grades(&[], None, false)),
            Some(grades(&[], Some("note"), false)),
            Some(grades(&[("c1", 50.0)], None, false)),
            Some(grades(&[("c1", 50.0)], None, true)),
        ];

        for p1 in &options {
            for p2 in &options {
                let mut sheet = sheet(p1.clone(), p2.clone());
                let first = sheet.derived_status();
                assert!(GradeSheetStatus::ALL.contains(&first));

                sheet.status = first;
                assert_eq!(sheet.derived_status(), first);

                sheet.status = GradeSheetStatus::Completed;
                assert_eq!(sheet.refresh_status(), first);
            }
        }
    }
}
