use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    CourseAdviser,
    Panel,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::CourseAdviser => "COURSE_ADVISER",
            Self::Panel => "PANEL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADMIN" => Some(Self::Admin),
            "COURSE_ADVISER" => Some(Self::CourseAdviser),
            "PANEL" => Some(Self::Panel),
            _ => None,
        }
    }

    /// Admins and course advisers manage groups; panelists only grade.
    pub fn manages_sheets(self) -> bool {
        matches!(self, Self::Admin | Self::CourseAdviser)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    /// Account id at the external identity provider, when linked.
    pub user_id: Option<String>,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelGrades {
    #[serde(default)]
    pub title_defense_scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default)]
    pub submitted: bool,
}

impl PanelGrades {
    /// A slot counts as started once it holds any score or a non-empty comment.
    pub fn is_started(&self) -> bool {
        !self.title_defense_scores.is_empty()
            || self
                .comments
                .as_deref()
                .is_some_and(|comments| !comments.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeSheetStatus {
    NotStarted,
    InProgress,
    Panel1Submitted,
    Panel2Submitted,
    Completed,
}

impl GradeSheetStatus {
    pub const ALL: [GradeSheetStatus; 5] = [
        Self::NotStarted,
        Self::InProgress,
        Self::Panel1Submitted,
        Self::Panel2Submitted,
        Self::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Panel1Submitted => "PANEL_1_SUBMITTED",
            Self::Panel2Submitted => "PANEL_2_SUBMITTED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    /// Progress rank. The two single-submission states share a rank.
    pub fn progress(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Panel1Submitted | Self::Panel2Submitted => 2,
            Self::Completed => 3,
        }
    }
}

impl fmt::Display for GradeSheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelSlot {
    Panel1,
    Panel2,
}

impl fmt::Display for PanelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panel1 => f.write_str("panel 1"),
            Self::Panel2 => f.write_str("panel 2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeSheet {
    pub id: Uuid,
    pub group_name: String,
    pub proponents: Vec<String>,
    pub proposed_titles: Vec<String>,
    pub selected_title: Option<String>,
    pub program: String,
    pub date: NaiveDate,
    pub venue: String,
    pub panel1_id: Option<Uuid>,
    pub panel2_id: Option<Uuid>,
    pub panel1_grades: Option<PanelGrades>,
    pub panel2_grades: Option<PanelGrades>,
    pub status: GradeSheetStatus,
    /// Optimistic concurrency token, bumped by every stored write.
    pub revision: i64,
}

impl GradeSheet {
    /// A fresh sheet: no grades, `NOT_STARTED`, revision 0.
    pub fn from_details(id: Uuid, details: SheetDetails) -> Self {
        Self {
            id,
            group_name: details.group_name,
            proponents: details.proponents,
            proposed_titles: details.proposed_titles,
            selected_title: details.selected_title,
            program: details.program,
            date: details.date,
            venue: details.venue,
            panel1_id: details.panel1_id,
            panel2_id: details.panel2_id,
            panel1_grades: None,
            panel2_grades: None,
            status: GradeSheetStatus::NotStarted,
            revision: 0,
        }
    }

    pub fn slot_of(&self, panel_id: Uuid) -> Option<PanelSlot> {
        if self.panel1_id == Some(panel_id) {
            Some(PanelSlot::Panel1)
        } else if self.panel2_id == Some(panel_id) {
            Some(PanelSlot::Panel2)
        } else {
            None
        }
    }

    pub fn grades(&self, slot: PanelSlot) -> Option<&PanelGrades> {
        match slot {
            PanelSlot::Panel1 => self.panel1_grades.as_ref(),
            PanelSlot::Panel2 => self.panel2_grades.as_ref(),
        }
    }

    pub fn grades_mut(&mut self, slot: PanelSlot) -> &mut Option<PanelGrades> {
        match slot {
            PanelSlot::Panel1 => &mut self.panel1_grades,
            PanelSlot::Panel2 => &mut self.panel2_grades,
        }
    }

    pub fn references(&self, panel_id: Uuid) -> bool {
        self.panel1_id == Some(panel_id) || self.panel2_id == Some(panel_id)
    }
}

/// Sheet metadata supplied by an adviser. Status, grades and revision are
/// never part of it.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetDetails {
    pub group_name: String,
    pub proponents: Vec<String>,
    pub proposed_titles: Vec<String>,
    pub selected_title: Option<String>,
    pub program: String,
    pub date: NaiveDate,
    pub venue: String,
    pub panel1_id: Option<Uuid>,
    pub panel2_id: Option<Uuid>,
}

impl SheetDetails {
    pub fn apply_to(self, sheet: &mut GradeSheet) {
        sheet.group_name = self.group_name;
        sheet.proponents = self.proponents;
        sheet.proposed_titles = self.proposed_titles;
        sheet.selected_title = self.selected_title;
        sheet.program = self.program;
        sheet.date = self.date;
        sheet.venue = self.venue;
        sheet.panel1_id = self.panel1_id;
        sheet.panel2_id = self.panel2_id;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub not_started: usize,
    pub in_progress: usize,
    pub panel1_submitted: usize,
    pub panel2_submitted: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.not_started
            + self.in_progress
            + self.panel1_submitted
            + self.panel2_submitted
            + self.completed
    }

    pub fn get(&self, status: GradeSheetStatus) -> usize {
        match status {
            GradeSheetStatus::NotStarted => self.not_started,
            GradeSheetStatus::InProgress => self.in_progress,
            GradeSheetStatus::Panel1Submitted => self.panel1_submitted,
            GradeSheetStatus::Panel2Submitted => self.panel2_submitted,
            GradeSheetStatus::Completed => self.completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    pub assigned: usize,
    pub submitted: usize,
    pub pending: usize,
}
