//! The document store contract the grading service runs against.
//!
//! `db::PgStore` is the production adapter; `memory::MemoryStore` keeps the
//! same semantics in process and backs the tests.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{GradeSheet, User, UserRole};

/// A store or identity backend failed. Carries the operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {cause}")]
pub struct CollaboratorError {
    pub operation: &'static str,
    pub cause: String,
}

impl CollaboratorError {
    pub fn new(operation: &'static str, cause: impl fmt::Display) -> Self {
        Self {
            operation,
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub email: Option<String>,
    pub user_id: Option<String>,
}

impl UserFilter {
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }
}

/// Status is not a filter: it is re-derived on read, so callers filter
/// decoded sheets themselves.
#[derive(Debug, Clone, Default)]
pub struct SheetFilter {
    pub panel_id: Option<Uuid>,
}

/// Every `list_*` call returns at most `limit` items after skipping
/// `offset`, in a stable order, so callers can page through.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, CollaboratorError>;
    async fn list_users(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, CollaboratorError>;
    async fn create_user(&self, user: &User) -> Result<(), CollaboratorError>;
    /// Returns false when no profile has the user's id.
    async fn update_user(&self, user: &User) -> Result<bool, CollaboratorError>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, CollaboratorError>;

    async fn get_sheet(&self, id: Uuid) -> Result<Option<GradeSheet>, CollaboratorError>;
    async fn list_sheets(
        &self,
        filter: &SheetFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GradeSheet>, CollaboratorError>;
    async fn create_sheet(&self, sheet: &GradeSheet) -> Result<(), CollaboratorError>;
    /// Writes `sheet` only if the stored revision still equals
    /// `expected_revision`, bumping it by one. Returns false when the
    /// revision moved on or the sheet is gone.
    async fn update_sheet(
        &self,
        sheet: &GradeSheet,
        expected_revision: i64,
    ) -> Result<bool, CollaboratorError>;
    async fn delete_sheet(&self, id: Uuid) -> Result<bool, CollaboratorError>;

    async fn list_venues(&self, limit: i64, offset: i64)
        -> Result<Vec<String>, CollaboratorError>;
    /// Inserts the venue unless an identical name exists. Returns whether it was added.
    async fn add_venue(&self, name: &str) -> Result<bool, CollaboratorError>;
}

#[cfg(test)]
pub mod memory {
    use std::sync::{Mutex, MutexGuard};

    use uuid::Uuid;

    use super::{CollaboratorError, DocumentStore, SheetFilter, UserFilter};
    use crate::codec::SheetRecord;
    use crate::models::{GradeSheet, User};

    fn user_matches(filter: &UserFilter, user: &User) -> bool {
        filter.role.map_or(true, |role| user.role == role)
            && filter.email.as_deref().map_or(true, |email| user.email == email)
            && filter
                .user_id
                .as_deref()
                .map_or(true, |user_id| user.user_id.as_deref() == Some(user_id))
    }

    fn sheet_matches(filter: &SheetFilter, sheet: &GradeSheet) -> bool {
        filter.panel_id.map_or(true, |panel_id| sheet.references(panel_id))
    }

    #[derive(Debug, Default)]
    struct MemoryState {
        users: Vec<User>,
        sheets: Vec<SheetRecord>,
        venues: Vec<String>,
    }

    /// In-process store. Sheets are held in their encoded form, like the
    /// Postgres rows.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        state: Mutex<MemoryState>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(
            &self,
            operation: &'static str,
        ) -> Result<MutexGuard<'_, MemoryState>, CollaboratorError> {
            self.state
                .lock()
                .map_err(|_| CollaboratorError::new(operation, "store lock poisoned"))
        }
    }

    fn page<T>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
        items
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect()
    }

    fn decode_record(
        record: &SheetRecord,
        operation: &'static str,
    ) -> Result<GradeSheet, CollaboratorError> {
        record
            .clone()
            .decode()
            .map_err(|err| CollaboratorError::new(operation, err))
    }

    impl DocumentStore for MemoryStore {
        async fn get_user(&self, id: Uuid) -> Result<Option<User>, CollaboratorError> {
            let state = self.lock("get user")?;
            Ok(state.users.iter().find(|user| user.id == id).cloned())
        }

        async fn list_users(
            &self,
            filter: &UserFilter,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<User>, CollaboratorError> {
            let state = self.lock("list users")?;
            Ok(page(
                state.users.iter().filter(|user| user_matches(filter, user)).cloned(),
                limit,
                offset,
            ))
        }

        async fn create_user(&self, user: &User) -> Result<(), CollaboratorError> {
            let mut state = self.lock("create user")?;
            if state
                .users
                .iter()
                .any(|existing| existing.id == user.id || existing.email == user.email)
            {
                return Err(CollaboratorError::new(
                    "create user",
                    format!("a profile for {} already exists", user.email),
                ));
            }
            state.users.push(user.clone());
            Ok(())
        }

        async fn update_user(&self, user: &User) -> Result<bool, CollaboratorError> {
            let mut state = self.lock("update user")?;
            match state.users.iter_mut().find(|existing| existing.id == user.id) {
                Some(existing) => {
                    *existing = user.clone();
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete_user(&self, id: Uuid) -> Result<bool, CollaboratorError> {
            let mut state = self.lock("delete user")?;
            let before = state.users.len();
            state.users.retain(|user| user.id != id);
            if state.users.len() == before {
                return Ok(false);
            }
            for record in state.sheets.iter_mut() {
                if record.panel1_id == Some(id) {
                    record.panel1_id = None;
                }
                if record.panel2_id == Some(id) {
                    record.panel2_id = None;
                }
            }
            Ok(true)
        }

        async fn get_sheet(&self, id: Uuid) -> Result<Option<GradeSheet>, CollaboratorError> {
            let state = self.lock("get grade sheet")?;
            state
                .sheets
                .iter()
                .find(|record| record.id == id)
                .map(|record| decode_record(record, "get grade sheet"))
                .transpose()
        }

        async fn list_sheets(
            &self,
            filter: &SheetFilter,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<GradeSheet>, CollaboratorError> {
            let state = self.lock("list grade sheets")?;
            let mut sheets = Vec::new();
            for record in &state.sheets {
                let sheet = decode_record(record, "list grade sheets")?;
                if sheet_matches(filter, &sheet) {
                    sheets.push(sheet);
                }
            }
            Ok(page(sheets.into_iter(), limit, offset))
        }

        async fn create_sheet(&self, sheet: &GradeSheet) -> Result<(), CollaboratorError> {
            let record = SheetRecord::encode(sheet)
                .map_err(|err| CollaboratorError::new("create grade sheet", err))?;
            let mut state = self.lock("create grade sheet")?;
            if state.sheets.iter().any(|existing| existing.id == sheet.id) {
                return Err(CollaboratorError::new(
                    "create grade sheet",
                    format!("sheet {} already exists", sheet.id),
                ));
            }
            state.sheets.push(record);
            Ok(())
        }

        async fn update_sheet(
            &self,
            sheet: &GradeSheet,
            expected_revision: i64,
        ) -> Result<bool, CollaboratorError> {
            let mut record = SheetRecord::encode(sheet)
                .map_err(|err| CollaboratorError::new("update grade sheet", err))?;
            let mut state = self.lock("update grade sheet")?;
            let Some(stored) = state.sheets.iter_mut().find(|stored| stored.id == sheet.id) else {
                return Ok(false);
            };
            if stored.revision != expected_revision {
                return Ok(false);
            }
            record.revision = expected_revision + 1;
            *stored = record;
            Ok(true)
        }

        async fn delete_sheet(&self, id: Uuid) -> Result<bool, CollaboratorError> {
            let mut state = self.lock("delete grade sheet")?;
            let before = state.sheets.len();
            state.sheets.retain(|record| record.id != id);
            Ok(state.sheets.len() != before)
        }

        async fn list_venues(
            &self,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<String>, CollaboratorError> {
            let state = self.lock("list venues")?;
            Ok(page(state.venues.iter().cloned(), limit, offset))
        }

        async fn add_venue(&self, name: &str) -> Result<bool, CollaboratorError> {
            let mut state = self.lock("add venue")?;
            if state.venues.iter().any(|venue| venue == name) {
                return Ok(false);
            }
            state.venues.push(name.to_string());
            Ok(true)
        }
    }
}
