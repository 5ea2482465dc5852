use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::identity::Session;
use crate::models::{SheetDetails, UserRole};
use crate::service::GradingService;
use crate::store::{DocumentStore, UserFilter};

#[derive(Debug, Clone, Deserialize)]
pub struct GroupRow {
    pub group_name: String,
    /// `;`-separated student names, in display order.
    pub proponents: String,
    /// `;`-separated candidate titles.
    pub proposed_titles: String,
    pub program: String,
    pub date: NaiveDate,
    pub venue: String,
    pub panel1_email: Option<String>,
    pub panel2_email: Option<String>,
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_groups(csv_path: &Path) -> anyhow::Result<Vec<GroupRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<GroupRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", index + 1))?;
        rows.push(row);
    }

    Ok(rows)
}

async fn panelist_id<S: DocumentStore>(
    service: &GradingService<S>,
    email: Option<&str>,
) -> anyhow::Result<Option<uuid::Uuid>> {
    let Some(email) = email.map(str::trim).filter(|email| !email.is_empty()) else {
        return Ok(None);
    };
    let user = service
        .store()
        .list_users(&UserFilter::by_email(email), 1, 0)
        .await?
        .into_iter()
        .next()
        .with_context(|| format!("no user profile for panelist {email}"))?;
    anyhow::ensure!(
        user.role == UserRole::Panel,
        "{email} is a {} and cannot sit on a panel",
        user.role
    );
    Ok(Some(user.id))
}

/// Creates one grade sheet per CSV row. Stops at the first row that fails.
pub async fn import_groups<S: DocumentStore>(
    service: &GradingService<S>,
    session: &Session,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    let rows = read_groups(csv_path)?;
    let mut created = 0usize;

    for row in rows {
        let details = SheetDetails {
            panel1_id: panelist_id(service, row.panel1_email.as_deref()).await?,
            panel2_id: panelist_id(service, row.panel2_email.as_deref()).await?,
            group_name: row.group_name.trim().to_string(),
            proponents: split_list(&row.proponents),
            proposed_titles: split_list(&row.proposed_titles),
            selected_title: None,
            program: row.program,
            date: row.date,
            venue: row.venue.trim().to_string(),
        };
        let group = details.group_name.clone();
        service
            .create_sheet(session, details)
            .await
            .with_context(|| format!("failed to import {group}"))?;
        created += 1;
    }

    tracing::info!(created, path = %csv_path.display(), "grading groups imported");
    Ok(created)
}
