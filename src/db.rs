use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::codec::SheetRecord;
use crate::models::{GradeSheet, GradeSheetStatus, PanelGrades, User, UserRole};
use crate::store::{CollaboratorError, DocumentStore, SheetFilter, UserFilter};

const SHEET_COLUMNS: &str = "id, group_name, proponents, proposed_titles, selected_title, \
     program, defense_date, venue, panel1_id, panel2_id, panel1_grades, panel2_grades, \
     status, revision";

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("schema migrations applied");
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            "avery.lee@defense.example.edu",
            UserRole::Admin,
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            "jules.moreno@defense.example.edu",
            UserRole::CourseAdviser,
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            "kiara.patel@defense.example.edu",
            UserRole::Panel,
        ),
        (
            Uuid::parse_str("7b1e6c0e-52a4-4d1c-9a61-0f3f2b8de4a1")?,
            "Rafael Dizon",
            "rafael.dizon@defense.example.edu",
            UserRole::Panel,
        ),
        (
            Uuid::parse_str("a9c3f7d2-8e15-4b6a-b0d4-5c2e91f7a3b8")?,
            "Mara Santos",
            "mara.santos@defense.example.edu",
            UserRole::Panel,
        ),
    ];

    for (id, name, email, role) in &users {
        sqlx::query(
            r#"
            INSERT INTO defense_grading.users (id, name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, role = EXCLUDED.role
            "#,
        )
        .bind(*id)
        .bind(*name)
        .bind(*email)
        .bind(role.as_str())
        .execute(pool)
        .await?;
    }

    for venue in ["AVR", "Room 301", "Engineering Lab 2"] {
        sqlx::query(
            "INSERT INTO defense_grading.venues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        )
        .bind(venue)
        .execute(pool)
        .await?;
    }

    let (kiara, rafael, mara) = (users[2].0, users[3].0, users[4].0);
    let mut in_progress = GradeSheet {
        id: Uuid::parse_str("5f0c2a8e-1d3b-4f6a-9e7c-2b4d6f8a0c1e")?,
        group_name: "Group 1".to_string(),
        proponents: vec!["Lia Cruz".to_string(), "Noel Bautista".to_string()],
        proposed_titles: vec![
            "Campus Wayfinding with Indoor Beacons".to_string(),
            "Queue Forecasting for the Registrar".to_string(),
        ],
        selected_title: None,
        program: "BSCS".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 3, 14).context("invalid date")?,
        venue: "AVR".to_string(),
        panel1_id: Some(kiara),
        panel2_id: Some(rafael),
        panel1_grades: Some(PanelGrades {
            title_defense_scores: [("relevance".to_string(), 88.0)].into_iter().collect(),
            comments: Some("Narrow the data collection plan.".to_string()),
            submitted: false,
        }),
        panel2_grades: None,
        status: GradeSheetStatus::NotStarted,
        revision: 0,
    };
    in_progress.refresh_status();

    let mut fresh = GradeSheet {
        id: Uuid::parse_str("c2e4a6b8-0d1f-4a3c-8e5b-7d9f1a3c5e7b")?,
        group_name: "Group 2".to_string(),
        proponents: vec!["Ivy Ramos".to_string()],
        proposed_titles: vec!["Flood Alert Dashboard".to_string()],
        selected_title: Some("Flood Alert Dashboard".to_string()),
        program: "BSIT".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 3, 16).context("invalid date")?,
        venue: "Room 301".to_string(),
        panel1_id: Some(mara),
        panel2_id: Some(kiara),
        panel1_grades: None,
        panel2_grades: None,
        status: GradeSheetStatus::NotStarted,
        revision: 0,
    };
    fresh.refresh_status();

    for sheet in [in_progress, fresh] {
        insert_sheet(pool, &SheetRecord::encode(&sheet)?, true).await?;
    }

    Ok(())
}

async fn insert_sheet(pool: &PgPool, record: &SheetRecord, skip_existing: bool) -> sqlx::Result<u64> {
    let conflict = if skip_existing {
        " ON CONFLICT (id) DO NOTHING"
    } else {
        ""
    };
    let result = sqlx::query(&format!(
        "INSERT INTO defense_grading.grade_sheets ({SHEET_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14){conflict}"
    ))
    .bind(record.id)
    .bind(&record.group_name)
    .bind(&record.proponents)
    .bind(&record.proposed_titles)
    .bind(&record.selected_title)
    .bind(&record.program)
    .bind(record.defense_date)
    .bind(&record.venue)
    .bind(record.panel1_id)
    .bind(record.panel2_id)
    .bind(&record.panel1_grades)
    .bind(&record.panel2_grades)
    .bind(&record.status)
    .bind(record.revision)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    user_id: Option<String>,
    name: String,
    email: String,
    role: String,
}

impl UserRow {
    fn into_user(self, operation: &'static str) -> Result<User, CollaboratorError> {
        let role = UserRole::parse(&self.role).ok_or_else(|| {
            CollaboratorError::new(operation, format!("unknown role `{}`", self.role))
        })?;
        Ok(User {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            email: self.email,
            role,
        })
    }
}

fn failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> CollaboratorError {
    move |err| CollaboratorError::new(operation, err)
}

fn decode(record: SheetRecord, operation: &'static str) -> Result<GradeSheet, CollaboratorError> {
    record
        .decode()
        .map_err(|err| CollaboratorError::new(operation, err))
}

fn encode(sheet: &GradeSheet, operation: &'static str) -> Result<SheetRecord, CollaboratorError> {
    SheetRecord::encode(sheet).map_err(|err| CollaboratorError::new(operation, err))
}

/// Postgres adapter for the document store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DocumentStore for PgStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, CollaboratorError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, user_id, name, email, role FROM defense_grading.users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(failed("get user"))?;

        row.map(|row| row.into_user("get user")).transpose()
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, CollaboratorError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, user_id, name, email, role FROM defense_grading.users WHERE TRUE",
        );
        if let Some(role) = filter.role {
            query.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(email) = &filter.email {
            query.push(" AND email = ").push_bind(email.clone());
        }
        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        query
            .push(" ORDER BY name, email, id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(failed("list users"))?;

        rows.into_iter()
            .map(|row| row.into_user("list users"))
            .collect()
    }

    async fn create_user(&self, user: &User) -> Result<(), CollaboratorError> {
        sqlx::query(
            r#"
            INSERT INTO defense_grading.users (id, user_id, name, email, role)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(failed("create user"))?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<bool, CollaboratorError> {
        let result = sqlx::query(
            r#"
            UPDATE defense_grading.users
            SET user_id = $2, name = $3, email = $4, role = $5
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(failed("update user"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, CollaboratorError> {
        let result = sqlx::query("DELETE FROM defense_grading.users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(failed("delete user"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_sheet(&self, id: Uuid) -> Result<Option<GradeSheet>, CollaboratorError> {
        let record: Option<SheetRecord> = sqlx::query_as(&format!(
            "SELECT {SHEET_COLUMNS} FROM defense_grading.grade_sheets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(failed("get grade sheet"))?;

        record
            .map(|record| decode(record, "get grade sheet"))
            .transpose()
    }

    async fn list_sheets(
        &self,
        filter: &SheetFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GradeSheet>, CollaboratorError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {SHEET_COLUMNS} FROM defense_grading.grade_sheets WHERE TRUE"
        ));
        if let Some(panel_id) = filter.panel_id {
            query
                .push(" AND (panel1_id = ")
                .push_bind(panel_id)
                .push(" OR panel2_id = ")
                .push_bind(panel_id)
                .push(")");
        }
        query
            .push(" ORDER BY created_at, id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let records = query
            .build_query_as::<SheetRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(failed("list grade sheets"))?;

        records
            .into_iter()
            .map(|record| decode(record, "list grade sheets"))
            .collect()
    }

    async fn create_sheet(&self, sheet: &GradeSheet) -> Result<(), CollaboratorError> {
        let record = encode(sheet, "create grade sheet")?;
        insert_sheet(&self.pool, &record, false)
            .await
            .map_err(failed("create grade sheet"))?;
        Ok(())
    }

    async fn update_sheet(
        &self,
        sheet: &GradeSheet,
        expected_revision: i64,
    ) -> Result<bool, CollaboratorError> {
        let record = encode(sheet, "update grade sheet")?;
        let result = sqlx::query(
            r#"
            UPDATE defense_grading.grade_sheets
            SET group_name = $3, proponents = $4, proposed_titles = $5, selected_title = $6,
                program = $7, defense_date = $8, venue = $9, panel1_id = $10, panel2_id = $11,
                panel1_grades = $12, panel2_grades = $13, status = $14,
                revision = revision + 1
            WHERE id = $1 AND revision = $2
            "#,
        )
        .bind(record.id)
        .bind(expected_revision)
        .bind(&record.group_name)
        .bind(&record.proponents)
        .bind(&record.proposed_titles)
        .bind(&record.selected_title)
        .bind(&record.program)
        .bind(record.defense_date)
        .bind(&record.venue)
        .bind(record.panel1_id)
        .bind(record.panel2_id)
        .bind(&record.panel1_grades)
        .bind(&record.panel2_grades)
        .bind(&record.status)
        .execute(&self.pool)
        .await
        .map_err(failed("update grade sheet"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_sheet(&self, id: Uuid) -> Result<bool, CollaboratorError> {
        let result = sqlx::query("DELETE FROM defense_grading.grade_sheets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(failed("delete grade sheet"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_venues(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<String>, CollaboratorError> {
        sqlx::query_scalar(
            "SELECT name FROM defense_grading.venues ORDER BY created_at, name LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(failed("list venues"))
    }

    async fn add_venue(&self, name: &str) -> Result<bool, CollaboratorError> {
        let result = sqlx::query(
            "INSERT INTO defense_grading.venues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(failed("add venue"))?;
        Ok(result.rows_affected() > 0)
    }
}
