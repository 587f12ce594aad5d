use crate::application::bootstrap::bootstrap_workspace;
use crate::application::busy::BusyTracker;
use crate::application::session::{EnsureSessionResult, SessionManager, SignUpResult};
use crate::application::status::{StatusBoard, StatusLevel, StatusMessage};
use crate::application::week_sync::{
    apply_outcome, apply_week_results, clear_day, plan_week, PendingSave, SaveOutcome,
    SaveSummary, WeekSavePlan, WeekSyncService,
};
use crate::domain::balance::format_minutes;
use crate::domain::models::{DayRecord, Session, Week, WorkDay};
use crate::domain::week::default_week;
use crate::infrastructure::auth_client::ReqwestAuthClient;
use crate::infrastructure::config::{
    load_app_config, load_remote_config, AppConfig, ClearMode, RemoteConfig, StorageBackend,
    REMOTE_ANON_KEY_KEYS, REMOTE_URL_KEYS,
};
use crate::infrastructure::entry_store::{EntryStore, LocalEntryStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_store::{KeyringSessionStore, ProjectKey, SessionStore};
use crate::infrastructure::supabase_client::SupabaseEntryStore;
use crate::infrastructure::week_slot_store::SqliteWeekSlotStore;
use chrono::{Datelike, Local, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const LOCAL_PROFILE: &str = "local";
pub const LOGIN_REQUIRED: &str = "login_required";

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    app_config: AppConfig,
    local_store: Arc<LocalEntryStore<SqliteWeekSlotStore>>,
    session_store: Arc<dyn SessionStore>,
    busy: Arc<BusyTracker>,
    status: StatusBoard,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_session_store(workspace_root, Arc::new(KeyringSessionStore::default()))
    }

    pub fn with_session_store(
        workspace_root: PathBuf,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let app_config = load_app_config(&bootstrap.config_dir)?;
        let slots = Arc::new(SqliteWeekSlotStore::new(&bootstrap.database_path));

        tracing::info!(
            storage = storage_name(app_config.storage),
            root = %workspace_root.display(),
            "app state initialized"
        );

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            local_store: Arc::new(LocalEntryStore::new(slots, LOCAL_PROFILE)),
            session_store,
            busy: Arc::new(BusyTracker::default()),
            status: StatusBoard::new(app_config.status_message_seconds),
            app_config,
            runtime: Mutex::new(RuntimeState::default()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn busy(&self) -> &Arc<BusyTracker> {
        &self.busy
    }

    /// Logs the failure and turns it into the string handed to the frontend.
    /// A missing session maps to `login_required`.
    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        match error {
            InfraError::SessionRequired => LOGIN_REQUIRED.to_string(),
            _ => error.to_string(),
        }
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, "{message}");
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        tracing::error!(command, "{message}");
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug)]
struct RuntimeState {
    week: Week,
    user_id: Option<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            week: default_week(),
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayResponse {
    pub day: String,
    pub check_in: String,
    pub check_out: String,
    pub balance_minutes: i64,
    pub balance_label: String,
    pub unsaved: bool,
    pub sync_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WeekResponse {
    pub days: Vec<DayResponse>,
    pub weekly_total_minutes: i64,
    pub weekly_total_label: String,
    pub unsaved_count: usize,
    /// Work day matching the local calendar date, for highlighting only.
    pub today: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SaveDayResponse {
    pub outcome: String,
    pub day: DayResponse,
    pub weekly_total_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SaveWeekResponse {
    pub summary: SaveSummary,
    pub week: WeekResponse,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<StatusMessage>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionResponse {
    pub storage: String,
    pub signed_in: bool,
    pub confirmation_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

pub async fn load_week_impl(state: &AppState) -> Result<WeekResponse, InfraError> {
    let _busy = state.busy.enter();
    let service = sync_service(state).await?;

    let week = match service.load_week().await {
        Ok(week) => week,
        Err(error) => {
            state.log_error("load_week", &format!("falling back to default week: {error}"));
            state.status.post(
                StatusLevel::Error,
                "Could not load saved times; showing the default week",
            );
            default_week()
        }
    };

    let mut runtime = lock_runtime(state)?;
    runtime.week = week;
    runtime.user_id = Some(service.user_id().to_string());
    state.log_info(
        "load_week",
        &format!("week loaded for {}", service.user_id()),
    );
    Ok(to_week_response(&runtime.week))
}

pub fn get_week_impl(state: &AppState) -> Result<WeekResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(to_week_response(&runtime.week))
}

pub fn update_day_impl(
    state: &AppState,
    day: String,
    check_in: String,
    check_out: String,
) -> Result<DayResponse, InfraError> {
    let day = parse_day(&day)?;
    let mut runtime = lock_runtime(state)?;
    let record = runtime.week.day_mut(day);
    record.set_times(check_in.trim(), check_out.trim());
    Ok(to_day_response(record))
}

pub async fn save_day_impl(state: &AppState, day: String) -> Result<SaveDayResponse, InfraError> {
    let day = parse_day(&day)?;
    let _busy = state.busy.enter();
    let outcome = persist_day(state, day).await?;
    save_day_response(state, day, &outcome)
}

pub async fn save_week_impl(state: &AppState) -> Result<SaveWeekResponse, InfraError> {
    let _busy = state.busy.enter();
    let service = sync_service(state).await?;

    let WeekSavePlan {
        pending,
        skipped,
        invalid,
    } = {
        let runtime = lock_runtime(state)?;
        plan_week(&runtime.week)
    };
    let expected = pending.len();
    let results = service.persist_all(pending).await;

    let mut runtime = lock_runtime(state)?;
    let summary = apply_week_results(&mut runtime.week, skipped, invalid, results, expected);
    post_week_summary(state, &summary);
    state.log_info(
        "save_week",
        &format!(
            "saved={} failed={} skipped={} invalid={}",
            summary.saved, summary.failed, summary.skipped, summary.invalid
        ),
    );

    Ok(SaveWeekResponse {
        summary,
        week: to_week_response(&runtime.week),
    })
}

/// Resets one day to the reference window. With `clearMode: immediate` the
/// cleared day is persisted right away; otherwise it waits for the next save.
pub async fn clear_day_impl(state: &AppState, day: String) -> Result<DayResponse, InfraError> {
    let day = parse_day(&day)?;
    {
        let mut runtime = lock_runtime(state)?;
        clear_day(runtime.week.day_mut(day));
    }

    if state.app_config.clear_mode == ClearMode::Immediate {
        let _busy = state.busy.enter();
        persist_day(state, day).await?;
    } else {
        state
            .status
            .post(StatusLevel::Info, format!("{day} reset; save to keep the change"));
    }

    let runtime = lock_runtime(state)?;
    Ok(to_day_response(runtime.week.day(day)))
}

pub async fn clear_week_impl(state: &AppState) -> Result<WeekResponse, InfraError> {
    let _busy = state.busy.enter();
    let service = sync_service(state).await?;

    let week = match service.clear_week().await {
        Ok(week) => week,
        Err(error) => {
            state
                .status
                .post(StatusLevel::Error, format!("Could not clear the week: {error}"));
            return Err(error);
        }
    };

    let mut runtime = lock_runtime(state)?;
    runtime.week = week;
    state.status.post(StatusLevel::Success, "Week cleared");
    state.log_info("clear_week", &format!("entries deleted for {}", service.user_id()));
    Ok(to_week_response(&runtime.week))
}

pub fn get_status_impl(state: &AppState) -> StatusResponse {
    StatusResponse {
        busy: state.busy.is_busy(),
        message: state.status.current(),
    }
}

pub async fn sign_in_impl(
    state: &AppState,
    email: String,
    password: String,
) -> Result<SessionResponse, InfraError> {
    let _busy = state.busy.enter();
    let manager = session_manager(state)?;
    let session = manager.sign_in(&email, &password).await?;
    reset_runtime_for(state, &session.user_id)?;
    state.log_info("sign_in", &format!("signed in as {}", session.user_id));
    Ok(signed_in_response(&session))
}

pub async fn sign_up_impl(
    state: &AppState,
    email: String,
    password: String,
) -> Result<SessionResponse, InfraError> {
    let _busy = state.busy.enter();
    let manager = session_manager(state)?;
    match manager.sign_up(&email, &password).await? {
        SignUpResult::SignedIn(session) => {
            reset_runtime_for(state, &session.user_id)?;
            state.log_info("sign_up", &format!("signed up as {}", session.user_id));
            Ok(signed_in_response(&session))
        }
        SignUpResult::ConfirmationRequired(user) => {
            state.status.post(
                StatusLevel::Info,
                "Check your e-mail to confirm the account, then sign in",
            );
            state.log_info("sign_up", &format!("confirmation pending for {}", user.id));
            Ok(SessionResponse {
                storage: storage_name(StorageBackend::Remote).to_string(),
                signed_in: false,
                confirmation_required: true,
                user_id: Some(user.id),
                email: user.email,
            })
        }
    }
}

pub async fn sign_out_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    let _busy = state.busy.enter();
    if state.app_config.storage == StorageBackend::Remote {
        session_manager(state)?.sign_out().await?;
    }

    let mut runtime = lock_runtime(state)?;
    *runtime = RuntimeState::default();
    state.log_info("sign_out", "session cleared");
    Ok(SessionResponse {
        storage: storage_name(state.app_config.storage).to_string(),
        signed_in: false,
        confirmation_required: false,
        user_id: None,
        email: None,
    })
}

pub async fn current_user_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    if state.app_config.storage == StorageBackend::Local {
        return Ok(SessionResponse {
            storage: storage_name(StorageBackend::Local).to_string(),
            signed_in: true,
            confirmation_required: false,
            user_id: Some(LOCAL_PROFILE.to_string()),
            email: None,
        });
    }

    match session_manager(state)?.ensure_session().await? {
        EnsureSessionResult::Existing(session) | EnsureSessionResult::Refreshed(session) => {
            Ok(signed_in_response(&session))
        }
        EnsureSessionResult::LoginRequired => Ok(SessionResponse {
            storage: storage_name(StorageBackend::Remote).to_string(),
            signed_in: false,
            confirmation_required: false,
            user_id: None,
            email: None,
        }),
    }
}

async fn persist_day(state: &AppState, day: WorkDay) -> Result<SaveOutcome, InfraError> {
    let service = sync_service(state).await?;

    let pending = {
        let mut runtime = lock_runtime(state)?;
        let record = runtime.week.day_mut(day);
        record.recompute();
        PendingSave::from_record(record)
    };
    let Some(pending) = pending else {
        state.status.post(
            StatusLevel::Error,
            format!("{day} needs both a check-in and a check-out time"),
        );
        return Ok(SaveOutcome::Invalid);
    };

    match service.persist(&pending).await {
        Ok(outcome) => {
            let mut runtime = lock_runtime(state)?;
            apply_outcome(runtime.week.day_mut(day), &pending, &outcome);
            state.status.post(StatusLevel::Success, format!("{day} saved"));
            state.log_info("save_day", &format!("{day} {}", outcome_name(&outcome)));
            Ok(outcome)
        }
        Err(error) => {
            state
                .status
                .post(StatusLevel::Error, format!("Could not save {day}: {error}"));
            Err(error)
        }
    }
}

fn save_day_response(
    state: &AppState,
    day: WorkDay,
    outcome: &SaveOutcome,
) -> Result<SaveDayResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(SaveDayResponse {
        outcome: outcome_name(outcome).to_string(),
        day: to_day_response(runtime.week.day(day)),
        weekly_total_minutes: runtime.week.weekly_total(),
    })
}

fn post_week_summary(state: &AppState, summary: &SaveSummary) {
    if summary.failed > 0 {
        state.status.post(
            StatusLevel::Error,
            format!("Saved {} day(s); {} failed", summary.saved, summary.failed),
        );
    } else if summary.invalid > 0 {
        state.status.post(
            StatusLevel::Error,
            format!(
                "Saved {} day(s); {} need both times",
                summary.saved, summary.invalid
            ),
        );
    } else if summary.saved == 0 {
        state.status.post(StatusLevel::Info, "Nothing to save");
    } else {
        state
            .status
            .post(StatusLevel::Success, format!("Saved {} day(s)", summary.saved));
    }
}

fn reset_runtime_for(state: &AppState, user_id: &str) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    if runtime.user_id.as_deref() != Some(user_id) {
        *runtime = RuntimeState::default();
    }
    Ok(())
}

/// The store and user every sync operation runs against. Remote storage
/// needs a live session; without one no store call is made.
async fn sync_service(state: &AppState) -> Result<WeekSyncService<dyn EntryStore>, InfraError> {
    let (store, user_id): (Arc<dyn EntryStore>, String) = match state.app_config.storage {
        StorageBackend::Local => {
            let store: Arc<dyn EntryStore> = state.local_store.clone();
            (store, LOCAL_PROFILE.to_string())
        }
        StorageBackend::Remote => {
            let remote = required_remote_config(state)?;
            let session = session_manager_for(state, &remote)?
                .ensure_session()
                .await?
                .into_session()?;
            let store: Arc<dyn EntryStore> =
                Arc::new(SupabaseEntryStore::new(&remote, session.access_token)?);
            (store, session.user_id)
        }
    };

    Ok(WeekSyncService::new(store, user_id).with_concurrency(state.app_config.save_concurrency))
}

fn session_manager(
    state: &AppState,
) -> Result<SessionManager<dyn SessionStore, ReqwestAuthClient>, InfraError> {
    let remote = required_remote_config(state)?;
    session_manager_for(state, &remote)
}

fn session_manager_for(
    state: &AppState,
    remote: &RemoteConfig,
) -> Result<SessionManager<dyn SessionStore, ReqwestAuthClient>, InfraError> {
    let project = ProjectKey::from_remote_url(&remote.url)?;
    let auth_client = Arc::new(ReqwestAuthClient::new(remote)?);
    Ok(SessionManager::new(Arc::clone(&state.session_store), auth_client, project))
}

fn required_remote_config(state: &AppState) -> Result<RemoteConfig, InfraError> {
    load_remote_config(&state.config_dir)?.ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "remote storage is not configured (set url/anonKey in remote.json or {} and {})",
            REMOTE_URL_KEYS[0], REMOTE_ANON_KEY_KEYS[0]
        ))
    })
}

fn parse_day(value: &str) -> Result<WorkDay, InfraError> {
    WorkDay::from_name(value)
        .ok_or_else(|| InfraError::Validation(format!("unknown work day: {}", value.trim())))
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::Store(format!("runtime lock poisoned: {error}")))
}

fn storage_name(storage: StorageBackend) -> &'static str {
    match storage {
        StorageBackend::Local => "local",
        StorageBackend::Remote => "remote",
    }
}

fn outcome_name(outcome: &SaveOutcome) -> &'static str {
    match outcome {
        SaveOutcome::Inserted(_) => "inserted",
        SaveOutcome::Updated(_) => "updated",
        SaveOutcome::Invalid => "invalid",
    }
}

fn signed_in_response(session: &Session) -> SessionResponse {
    SessionResponse {
        storage: storage_name(StorageBackend::Remote).to_string(),
        signed_in: true,
        confirmation_required: false,
        user_id: Some(session.user_id.clone()),
        email: session.email.clone(),
    }
}

fn to_day_response(record: &DayRecord) -> DayResponse {
    DayResponse {
        day: record.day().as_str().to_string(),
        check_in: record.check_in().to_string(),
        check_out: record.check_out().to_string(),
        balance_minutes: record.balance_minutes(),
        balance_label: format_minutes(record.balance_minutes()),
        unsaved: record.is_unsaved(),
        sync_state: record.state().as_str().to_string(),
        identity: record.identity().map(|identity| identity.to_string()),
    }
}

fn to_week_response(week: &Week) -> WeekResponse {
    WeekResponse {
        days: week.records().iter().map(to_day_response).collect(),
        weekly_total_minutes: week.weekly_total(),
        weekly_total_label: format_minutes(week.weekly_total()),
        unsaved_count: week.unsaved_count(),
        today: current_work_day().map(|day| day.as_str().to_string()),
    }
}

fn current_work_day() -> Option<WorkDay> {
    WorkDay::from_weekday(Local::now().weekday())
}
