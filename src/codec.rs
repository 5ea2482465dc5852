//! Text-blob encoding of the nested grade sheet fields.
//!
//! `proponents` and both panel slots are stored as JSON text. An absent
//! panel slot is stored as `NULL`, never as the string `"null"`.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{GradeSheet, GradeSheetStatus, PanelGrades};

pub fn encode_proponents(proponents: &[String]) -> serde_json::Result<String> {
    serde_json::to_string(proponents)
}

pub fn decode_proponents(raw: &str) -> serde_json::Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

pub fn encode_grades(grades: Option<&PanelGrades>) -> serde_json::Result<Option<String>> {
    grades.map(serde_json::to_string).transpose()
}

pub fn decode_grades(raw: Option<&str>) -> serde_json::Result<Option<PanelGrades>> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(text) => serde_json::from_str(text).map(Some),
    }
}

/// A grade sheet as the document store holds it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SheetRecord {
    pub id: Uuid,
    pub group_name: String,
    pub proponents: String,
    pub proposed_titles: Vec<String>,
    pub selected_title: Option<String>,
    pub program: String,
    pub defense_date: NaiveDate,
    pub venue: String,
    pub panel1_id: Option<Uuid>,
    pub panel2_id: Option<Uuid>,
    pub panel1_grades: Option<String>,
    pub panel2_grades: Option<String>,
    pub status: String,
    pub revision: i64,
}

impl SheetRecord {
    pub fn encode(sheet: &GradeSheet) -> serde_json::Result<Self> {
        Ok(Self {
            id: sheet.id,
            group_name: sheet.group_name.clone(),
            proponents: encode_proponents(&sheet.proponents)?,
            proposed_titles: sheet.proposed_titles.clone(),
            selected_title: sheet.selected_title.clone(),
            program: sheet.program.clone(),
            defense_date: sheet.date,
            venue: sheet.venue.clone(),
            panel1_id: sheet.panel1_id,
            panel2_id: sheet.panel2_id,
            panel1_grades: encode_grades(sheet.panel1_grades.as_ref())?,
            panel2_grades: encode_grades(sheet.panel2_grades.as_ref())?,
            status: sheet.status.as_str().to_string(),
            revision: sheet.revision,
        })
    }

    pub fn decode(self) -> serde_json::Result<GradeSheet> {
        let mut sheet = GradeSheet {
            id: self.id,
            group_name: self.group_name,
            proponents: decode_proponents(&self.proponents)?,
            proposed_titles: self.proposed_titles,
            selected_title: self.selected_title,
            program: self.program,
            date: self.defense_date,
            venue: self.venue,
            panel1_id: self.panel1_id,
            panel2_id: self.panel2_id,
            panel1_grades: decode_grades(self.panel1_grades.as_deref())?,
            panel2_grades: decode_grades(self.panel2_grades.as_deref())?,
            status: GradeSheetStatus::NotStarted,
            revision: self.revision,
        };
        let derived = sheet.refresh_status();
        if GradeSheetStatus::parse(&self.status) != Some(derived) {
            tracing::warn!(
                sheet = %sheet.id,
                stored = %self.status,
                derived = %derived,
                "stored status disagrees with panel grades"
            );
        }
        Ok(sheet)
    }
}
