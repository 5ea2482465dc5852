use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::config::GradingPolicy;
use crate::identity::{IdentityError, IdentityProvider, Session};
use crate::models::{
    GradeSheet, GradeSheetStatus, PanelGrades, PanelSlot, SheetDetails, User, UserRole,
};
use crate::store::{CollaboratorError, DocumentStore, SheetFilter, UserFilter};
use crate::validation::{
    validate_draft, validate_selected_title, validate_sheet, validate_submission, ValidationError,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },
    #[error("{role} users cannot {action}")]
    Forbidden { role: UserRole, action: &'static str },
    #[error("{user} is not a panelist on sheet {sheet}")]
    NotAssigned { user: Uuid, sheet: Uuid },
    #[error("{0} grades were already submitted")]
    AlreadySubmitted(PanelSlot),
    #[error("sheet {id} kept changing underneath us; gave up after {attempts} attempts")]
    Conflict { id: Uuid, attempts: u32 },
}

/// What happened at the identity provider while managing a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountSync {
    Done,
    Skipped,
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// Grade sheet workflows over a document store.
///
/// Every write to a sheet recomputes its status and goes through the
/// store's conditional update, retrying on a lost race.
pub struct GradingService<S> {
    store: S,
    policy: GradingPolicy,
}

impl<S: DocumentStore> GradingService<S> {
    pub fn new(store: S, policy: GradingPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sheets visible to the session: all of them for managers, assigned ones for panelists.
    pub async fn dashboard(&self, session: &Session) -> Result<Vec<GradeSheet>, ServiceError> {
        let filter = if session.user.role.manages_sheets() {
            SheetFilter::default()
        } else {
            SheetFilter {
                panel_id: Some(session.user.id),
            }
        };
        self.all_sheets(&filter).await
    }

    pub async fn masterlist(
        &self,
        session: &Session,
        status: Option<GradeSheetStatus>,
    ) -> Result<Vec<GradeSheet>, ServiceError> {
        require_manager(session, "view the masterlist")?;
        let mut sheets = self.all_sheets(&SheetFilter::default()).await?;
        if let Some(status) = status {
            sheets.retain(|sheet| sheet.status == status);
        }
        Ok(sheets)
    }

    pub async fn sheet(&self, session: &Session, id: Uuid) -> Result<GradeSheet, ServiceError> {
        let sheet = self.load_sheet(id).await?;
        if !session.user.role.manages_sheets() && !sheet.references(session.user.id) {
            return Err(ServiceError::NotAssigned {
                user: session.user.id,
                sheet: id,
            });
        }
        Ok(sheet)
    }

    pub async fn create_sheet(
        &self,
        session: &Session,
        details: SheetDetails,
    ) -> Result<GradeSheet, ServiceError> {
        require_manager(session, "create grade sheets")?;

        let sheet = GradeSheet::from_details(Uuid::new_v4(), details);

        let panelists = self.assigned_users(&sheet).await?;
        validate_sheet(&sheet, &panelists)?;
        self.remember_venue(&sheet.venue).await?;
        self.store.create_sheet(&sheet).await?;

        tracing::info!(sheet = %sheet.id, group = %sheet.group_name, "grade sheet created");
        Ok(sheet)
    }

    /// Replaces sheet metadata. A slot whose panelist changes loses its grades.
    pub async fn update_details(
        &self,
        session: &Session,
        id: Uuid,
        details: SheetDetails,
    ) -> Result<GradeSheet, ServiceError> {
        require_manager(session, "edit grade sheets")?;

        let users = self.assigned_users_for(&[details.panel1_id, details.panel2_id]).await?;
        let venue = details.venue.clone();
        let sheet = self
            .write_sheet(id, |sheet| {
                if sheet.panel1_id != details.panel1_id {
                    sheet.panel1_grades = None;
                }
                if sheet.panel2_id != details.panel2_id {
                    sheet.panel2_grades = None;
                }
                details.clone().apply_to(sheet);
                validate_sheet(sheet, &users)?;
                Ok(())
            })
            .await?;
        self.remember_venue(&venue).await?;

        tracing::info!(sheet = %id, "grade sheet details updated");
        Ok(sheet)
    }

    pub async fn select_title(
        &self,
        session: &Session,
        id: Uuid,
        title: Option<String>,
    ) -> Result<GradeSheet, ServiceError> {
        require_manager(session, "select titles")?;

        self.write_sheet(id, |sheet| {
            sheet.selected_title = title.clone();
            validate_selected_title(sheet)?;
            Ok(())
        })
        .await
    }

    pub async fn delete_sheet(&self, session: &Session, id: Uuid) -> Result<(), ServiceError> {
        require_manager(session, "delete grade sheets")?;
        if !self.store.delete_sheet(id).await? {
            return Err(ServiceError::NotFound {
                kind: "grade sheet",
                id,
            });
        }
        tracing::info!(sheet = %id, "grade sheet deleted");
        Ok(())
    }

    /// Saves the session user's own panel slot; `submit` finalizes it.
    ///
    /// Only the caller's slot is taken from `grades`. The other slot always
    /// comes from the freshly read sheet, so a concurrent submission by the
    /// other panelist survives.
    pub async fn save_grades(
        &self,
        session: &Session,
        id: Uuid,
        mut grades: PanelGrades,
        submit: bool,
    ) -> Result<GradeSheet, ServiceError> {
        grades.submitted = false;
        validate_draft(&grades)?;
        let grades = if submit {
            validate_submission(grades, &self.policy.score_range)?
        } else {
            grades
        };
        let user = session.user.id;

        let sheet = self
            .write_sheet(id, |sheet| {
                let slot = sheet.slot_of(user).ok_or(ServiceError::NotAssigned {
                    user,
                    sheet: sheet.id,
                })?;
                if sheet.grades(slot).is_some_and(|existing| existing.submitted) {
                    return Err(ServiceError::AlreadySubmitted(slot));
                }
                *sheet.grades_mut(slot) = Some(grades.clone());
                Ok(())
            })
            .await?;

        if submit {
            tracing::info!(sheet = %id, panelist = %user, status = %sheet.status, "grades submitted");
        } else {
            tracing::info!(sheet = %id, panelist = %user, status = %sheet.status, "grades saved");
        }
        Ok(sheet)
    }

    pub async fn venues(&self) -> Result<Vec<String>, ServiceError> {
        let store = &self.store;
        let page_size = self.policy.list_limit;
        Ok(collect_pages(page_size, move |offset| store.list_venues(page_size, offset)).await?)
    }

    pub async fn add_venue(&self, session: &Session, name: &str) -> Result<bool, ServiceError> {
        require_manager(session, "add venues")?;
        Ok(self.remember_venue(name).await?)
    }

    pub async fn users(&self, session: &Session) -> Result<Vec<User>, ServiceError> {
        require_manager(session, "list users")?;
        let filter = UserFilter::default();
        let (store, filter) = (&self.store, &filter);
        let page_size = self.policy.list_limit;
        Ok(collect_pages(page_size, move |offset| {
            store.list_users(filter, page_size, offset)
        })
        .await?)
    }

    /// Profiles of the panelists named on `sheets`, for display. Open to
    /// every role, unlike `users`.
    pub async fn panelists_of(&self, sheets: &[GradeSheet]) -> Result<Vec<User>, ServiceError> {
        let mut ids: Vec<Uuid> = sheets
            .iter()
            .flat_map(|sheet| [sheet.panel1_id, sheet.panel2_id])
            .flatten()
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.store.get_user(id).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    /// Creates a profile, linking an identity-provider account when a
    /// password is given and the provider allows it.
    pub async fn add_user<I: IdentityProvider>(
        &self,
        session: &Session,
        identity: &I,
        new_user: NewUser,
        password: Option<&str>,
    ) -> Result<(User, AccountSync), ServiceError> {
        require_admin(session, "add users")?;

        let (account_id, sync) = match password {
            None => (None, AccountSync::Skipped),
            Some(password) => {
                match identity
                    .create_account(&new_user.email, password, &new_user.name)
                    .await
                {
                    Ok(account_id) => (Some(account_id), AccountSync::Done),
                    Err(IdentityError::Unsupported(op)) => (None, AccountSync::Unsupported(op)),
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let user = User {
            id: Uuid::new_v4(),
            user_id: account_id,
            name: new_user.name,
            email: new_user.email,
            role: new_user.role,
        };
        self.store.create_user(&user).await?;

        tracing::info!(user = %user.id, role = %user.role, "user profile created");
        Ok((user, sync))
    }

    /// Admins edit any profile; anyone may rename themselves.
    pub async fn update_user<I: IdentityProvider>(
        &self,
        session: &Session,
        identity: &I,
        user: User,
    ) -> Result<AccountSync, ServiceError> {
        let existing = self
            .store
            .get_user(user.id)
            .await?
            .ok_or(ServiceError::NotFound {
                kind: "user",
                id: user.id,
            })?;

        let self_rename = session.user.id == user.id
            && existing.role == user.role
            && existing.email == user.email
            && existing.user_id == user.user_id;
        if !self_rename {
            require_admin(session, "edit other profiles")?;
        }

        // Provider first: a provider failure must leave the profile as it was.
        let sync = match (&existing.user_id, existing.name != user.name) {
            (Some(account_id), true) => match identity.update_name(account_id, &user.name).await {
                Ok(()) => AccountSync::Done,
                Err(IdentityError::Unsupported(op)) => AccountSync::Unsupported(op),
                Err(err) => return Err(err.into()),
            },
            _ => AccountSync::Skipped,
        };

        if !self.store.update_user(&user).await? {
            return Err(ServiceError::NotFound {
                kind: "user",
                id: user.id,
            });
        }

        tracing::info!(user = %user.id, "user profile updated");
        Ok(sync)
    }

    pub async fn delete_user<I: IdentityProvider>(
        &self,
        session: &Session,
        identity: &I,
        id: Uuid,
    ) -> Result<AccountSync, ServiceError> {
        require_admin(session, "delete users")?;

        let user = self
            .store
            .get_user(id)
            .await?
            .ok_or(ServiceError::NotFound { kind: "user", id })?;

        let sync = match &user.user_id {
            None => AccountSync::Skipped,
            Some(account_id) => match identity.delete_account(account_id).await {
                Ok(()) => AccountSync::Done,
                Err(IdentityError::Unsupported(op)) => AccountSync::Unsupported(op),
                Err(err) => return Err(err.into()),
            },
        };
        self.store.delete_user(id).await?;

        tracing::info!(user = %id, "user profile deleted");
        Ok(sync)
    }

    async fn all_sheets(&self, filter: &SheetFilter) -> Result<Vec<GradeSheet>, ServiceError> {
        let store = &self.store;
        let page_size = self.policy.list_limit;
        Ok(collect_pages(page_size, move |offset| {
            store.list_sheets(filter, page_size, offset)
        })
        .await?)
    }

    async fn load_sheet(&self, id: Uuid) -> Result<GradeSheet, ServiceError> {
        self.store
            .get_sheet(id)
            .await?
            .ok_or(ServiceError::NotFound {
                kind: "grade sheet",
                id,
            })
    }

    /// Read-modify-write with a conditional update. `apply` runs against a
    /// fresh copy on every attempt.
    async fn write_sheet<F>(&self, id: Uuid, mut apply: F) -> Result<GradeSheet, ServiceError>
    where
        F: FnMut(&mut GradeSheet) -> Result<(), ServiceError>,
    {
        let attempts = self.policy.write_attempts.max(1);

        for attempt in 1..=attempts {
            let mut sheet = self.load_sheet(id).await?;
            let expected = sheet.revision;

            apply(&mut sheet)?;
            sheet.refresh_status();

            if self.store.update_sheet(&sheet, expected).await? {
                sheet.revision = expected + 1;
                return Ok(sheet);
            }
            tracing::warn!(sheet = %id, attempt, "grade sheet revision moved, retrying");
        }

        Err(ServiceError::Conflict { id, attempts })
    }

    async fn assigned_users(&self, sheet: &GradeSheet) -> Result<Vec<User>, ServiceError> {
        self.assigned_users_for(&[sheet.panel1_id, sheet.panel2_id]).await
    }

    async fn assigned_users_for(&self, ids: &[Option<Uuid>]) -> Result<Vec<User>, ServiceError> {
        let mut users = Vec::new();
        for id in ids.iter().flatten() {
            if let Some(user) = self.store.get_user(*id).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn remember_venue(&self, name: &str) -> Result<bool, CollaboratorError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }
        self.store.add_venue(name).await
    }
}

/// Fetches pages of `page_size` until one comes back short.
async fn collect_pages<T, F, Fut>(
    page_size: i64,
    mut fetch: F,
) -> Result<Vec<T>, CollaboratorError>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<Vec<T>, CollaboratorError>>,
{
    let page_size = page_size.max(1);
    let mut items = Vec::new();
    let mut offset = 0;

    loop {
        let page = fetch(offset).await?;
        let fetched = page.len();
        items.extend(page);
        if i64::try_from(fetched).map_or(true, |fetched| fetched < page_size) {
            return Ok(items);
        }
        offset += page_size;
    }
}

fn require_manager(session: &Session, action: &'static str) -> Result<(), ServiceError> {
    if session.user.role.manages_sheets() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden {
            role: session.user.role,
            action,
        })
    }
}

fn require_admin(session: &Session, action: &'static str) -> Result<(), ServiceError> {
    if session.user.role == UserRole::Admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden {
            role: session.user.role,
            action,
        })
    }
}
