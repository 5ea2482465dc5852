use thiserror::Error;
use uuid::Uuid;

use crate::models::{GradeSheet, PanelGrades, User, UserRole};

pub const DEFAULT_SCORE_MIN: f64 = 0.0;
pub const DEFAULT_SCORE_MAX: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("a submission needs at least one title defense score")]
    EmptyScores,
    #[error("score {value} for `{criterion}` is outside {min}..={max}")]
    InvalidScoreValue {
        criterion: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("score for `{criterion}` must be a finite number")]
    NonFiniteScore { criterion: String },
    #[error("group name must not be blank")]
    MissingGroupName,
    #[error("panel 1 and panel 2 must be different users")]
    DuplicatePanelist,
    #[error("panelist {0} does not exist")]
    UnknownPanelist(Uuid),
    #[error("user {0} is not a panelist")]
    NotAPanelist(Uuid),
    #[error("selected title `{0}` is not one of the proposed titles")]
    TitleNotProposed(String),
    #[error("score range {min}..={max} is invalid")]
    InvalidRange { min: f64, max: f64 },
}

/// Inclusive bounds a submitted score must fall within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    min: f64,
    max: f64,
}

impl ScoreRange {
    pub fn new(min: f64, max: f64) -> Result<Self, ValidationError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ValidationError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_SCORE_MIN,
            max: DEFAULT_SCORE_MAX,
        }
    }
}

/// Checks a panel's grades before finalizing them and flips `submitted`.
///
/// Only called on submit; in-progress saves keep whatever the panelist typed.
pub fn validate_submission(
    mut grades: PanelGrades,
    range: &ScoreRange,
) -> Result<PanelGrades, ValidationError> {
    if grades.title_defense_scores.is_empty() {
        return Err(ValidationError::EmptyScores);
    }

    if let Some((criterion, value)) = grades
        .title_defense_scores
        .iter()
        .find(|(_, value)| !range.contains(**value))
    {
        return Err(ValidationError::InvalidScoreValue {
            criterion: criterion.clone(),
            value: *value,
            min: range.min(),
            max: range.max(),
        });
    }

    grades.submitted = true;
    Ok(grades)
}

/// Checks every save, drafts included. Range limits wait for submission,
/// but a non-finite score has no stored form.
pub fn validate_draft(grades: &PanelGrades) -> Result<(), ValidationError> {
    match grades
        .title_defense_scores
        .iter()
        .find(|(_, value)| !value.is_finite())
    {
        Some((criterion, _)) => Err(ValidationError::NonFiniteScore {
            criterion: criterion.clone(),
        }),
        None => Ok(()),
    }
}

/// Structural checks on sheet metadata against the known user profiles.
pub fn validate_sheet(sheet: &GradeSheet, users: &[User]) -> Result<(), ValidationError> {
    if sheet.group_name.trim().is_empty() {
        return Err(ValidationError::MissingGroupName);
    }

    if let (Some(panel1), Some(panel2)) = (sheet.panel1_id, sheet.panel2_id) {
        if panel1 == panel2 {
            return Err(ValidationError::DuplicatePanelist);
        }
    }

    for panel_id in [sheet.panel1_id, sheet.panel2_id].into_iter().flatten() {
        match users.iter().find(|user| user.id == panel_id) {
            None => return Err(ValidationError::UnknownPanelist(panel_id)),
            Some(user) if user.role != UserRole::Panel => {
                return Err(ValidationError::NotAPanelist(panel_id))
            }
            Some(_) => {}
        }
    }

    validate_selected_title(sheet)
}

pub fn validate_selected_title(sheet: &GradeSheet) -> Result<(), ValidationError> {
    match &sheet.selected_title {
        Some(title) if !sheet.proposed_titles.iter().any(|proposed| proposed == title) => {
            Err(ValidationError::TitleNotProposed(title.clone()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GradeSheetStatus;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn scores(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect()
    }

    fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            user_id: None,
            name: "Jules Moreno".to_string(),
            email: format!("{}@defense.example.edu", Uuid::new_v4()),
            role,
        }
    }

    fn sheet(panel1: Option<Uuid>, panel2: Option<Uuid>) -> GradeSheet {
        GradeSheet {
            id: Uuid::new_v4(),
            group_name: "Group Beta".to_string(),
            proponents: vec!["Kiara Patel".to_string(), "Avery Lee".to_string()],
            proposed_titles: vec!["Flood Alerts".to_string(), "Smart Canteen".to_string()],
            selected_title: None,
            program: "BSIT".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            venue: "AVR".to_string(),
            panel1_id: panel1,
            panel2_id: panel2,
            panel1_grades: None,
            panel2_grades: None,
            status: GradeSheetStatus::NotStarted,
            revision: 0,
        }
    }

    #[test]
    fn empty_submission_is_rejected() {
        let grades = PanelGrades {
            title_defense_scores: BTreeMap::new(),
            comments: Some("ok".to_string()),
            submitted: false,
        };
        assert_eq!(
            validate_submission(grades, &ScoreRange::default()),
            Err(ValidationError::EmptyScores)
        );
    }

    #[test]
    fn valid_submission_flips_submitted() {
        let grades = PanelGrades {
            title_defense_scores: scores(&[("c1", 95.0)]),
            comments: None,
            submitted: false,
        };
        let submitted = validate_submission(grades.clone(), &ScoreRange::default()).unwrap();
        assert!(submitted.submitted);
        assert_eq!(submitted.title_defense_scores, grades.title_defense_scores);
        assert_eq!(submitted.comments, grades.comments);
    }

    #[test]
    fn out_of_range_and_non_finite_scores_are_rejected() {
        let range = ScoreRange::default();
        for bad in [101.0, -0.5, f64::NAN, f64::INFINITY] {
            let grades = PanelGrades {
                title_defense_scores: scores(&[("c1", 80.0), ("c2", bad)]),
                comments: None,
                submitted: false,
            };
            match validate_submission(grades, &range) {
                Err(ValidationError::InvalidScoreValue { criterion, .. }) => {
                    assert_eq!(criterion, "c2")
                }
                other => panic!("expected InvalidScoreValue, got {other:?}"),
            }
        }
    }

    #[test]
    fn drafts_may_leave_the_range_but_not_the_reals() {
        let draft = PanelGrades {
            title_defense_scores: scores(&[("c1", 250.0), ("c2", -4.0)]),
            comments: None,
            submitted: false,
        };
        assert!(validate_draft(&draft).is_ok());

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let draft = PanelGrades {
                title_defense_scores: scores(&[("c1", 80.0), ("c2", bad)]),
                comments: None,
                submitted: false,
            };
            assert_eq!(
                validate_draft(&draft),
                Err(ValidationError::NonFiniteScore {
                    criterion: "c2".to_string()
                })
            );
        }
    }

    #[test]
    fn custom_range_is_honoured() {
        let range = ScoreRange::new(1.0, 5.0).unwrap();
        let grades = PanelGrades {
            title_defense_scores: scores(&[("c1", 5.0), ("c2", 1.0)]),
            comments: None,
            submitted: false,
        };
        assert!(validate_submission(grades, &range).is_ok());
        assert!(ScoreRange::new(10.0, 1.0).is_err());
        assert!(ScoreRange::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn duplicate_panelists_are_rejected() {
        let panel = user(UserRole::Panel);
        let sheet = sheet(Some(panel.id), Some(panel.id));
        assert_eq!(
            validate_sheet(&sheet, &[panel]),
            Err(ValidationError::DuplicatePanelist)
        );
    }

    #[test]
    fn panelists_must_exist_and_hold_the_panel_role() {
        let panel = user(UserRole::Panel);
        let adviser = user(UserRole::CourseAdviser);
        let users = vec![panel.clone(), adviser.clone()];

        let stranger = Uuid::new_v4();
        assert_eq!(
            validate_sheet(&sheet(Some(panel.id), Some(stranger)), &users),
            Err(ValidationError::UnknownPanelist(stranger))
        );
        assert_eq!(
            validate_sheet(&sheet(Some(adviser.id), Some(panel.id)), &users),
            Err(ValidationError::NotAPanelist(adviser.id))
        );
        assert!(validate_sheet(&sheet(Some(panel.id), None), &users).is_ok());
    }

    #[test]
    fn selected_title_must_be_proposed() {
        let mut sheet = sheet(None, None);
        sheet.selected_title = Some("Unrelated Topic".to_string());
        assert_eq!(
            validate_sheet(&sheet, &[]),
            Err(ValidationError::TitleNotProposed("Unrelated Topic".to_string()))
        );

        sheet.selected_title = Some("Smart Canteen".to_string());
        assert!(validate_sheet(&sheet, &[]).is_ok());
    }

    #[test]
    fn blank_group_name_is_rejected() {
        let mut sheet = sheet(None, None);
        sheet.group_name = "   ".to_string();
        assert_eq!(
            validate_sheet(&sheet, &[]),
            Err(ValidationError::MissingGroupName)
        );
    }
}
