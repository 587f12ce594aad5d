pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use crate::application::bootstrap::bootstrap_workspace;
    use crate::application::commands::{
        clear_day_impl, clear_week_impl, current_user_impl, get_status_impl, get_week_impl,
        load_week_impl, save_day_impl, save_week_impl, sign_in_impl, sign_out_impl, sign_up_impl,
        update_day_impl, AppState, DayResponse, SaveDayResponse, SaveWeekResponse,
        SessionResponse, StatusResponse, WeekResponse,
    };
    use serde::Serialize;
    use std::path::PathBuf;
    use tauri::{Emitter, Manager};
    use tracing_subscriber::{fmt, EnvFilter};

    const BUSY_EVENT: &str = "busy-changed";

    #[derive(Debug, Serialize)]
    struct BootstrapResponse {
        workspace_root: String,
        database_path: String,
    }

    #[tauri::command]
    fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
        let workspace_root = match root {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir().map_err(|error| error.to_string())?,
        };

        let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
        Ok(BootstrapResponse {
            workspace_root: result.workspace_root.display().to_string(),
            database_path: result.database_path.display().to_string(),
        })
    }

    #[tauri::command]
    fn ping() -> &'static str {
        "pong"
    }

    #[tauri::command]
    async fn load_week(state: tauri::State<'_, AppState>) -> Result<WeekResponse, String> {
        load_week_impl(state.inner())
            .await
            .map_err(|error| state.command_error("load_week", &error))
    }

    #[tauri::command]
    fn get_week(state: tauri::State<'_, AppState>) -> Result<WeekResponse, String> {
        get_week_impl(state.inner()).map_err(|error| state.command_error("get_week", &error))
    }

    #[tauri::command]
    fn update_day(
        state: tauri::State<'_, AppState>,
        day: String,
        check_in: String,
        check_out: String,
    ) -> Result<DayResponse, String> {
        update_day_impl(state.inner(), day, check_in, check_out)
            .map_err(|error| state.command_error("update_day", &error))
    }

    #[tauri::command]
    async fn save_day(state: tauri::State<'_, AppState>, day: String) -> Result<SaveDayResponse, String> {
        save_day_impl(state.inner(), day)
            .await
            .map_err(|error| state.command_error("save_day", &error))
    }

    #[tauri::command]
    async fn save_week(state: tauri::State<'_, AppState>) -> Result<SaveWeekResponse, String> {
        save_week_impl(state.inner())
            .await
            .map_err(|error| state.command_error("save_week", &error))
    }

    #[tauri::command]
    async fn clear_day(state: tauri::State<'_, AppState>, day: String) -> Result<DayResponse, String> {
        clear_day_impl(state.inner(), day)
            .await
            .map_err(|error| state.command_error("clear_day", &error))
    }

    #[tauri::command]
    async fn clear_week(state: tauri::State<'_, AppState>) -> Result<WeekResponse, String> {
        clear_week_impl(state.inner())
            .await
            .map_err(|error| state.command_error("clear_week", &error))
    }

    #[tauri::command]
    fn get_status(state: tauri::State<'_, AppState>) -> StatusResponse {
        get_status_impl(state.inner())
    }

    #[tauri::command]
    async fn sign_in(
        state: tauri::State<'_, AppState>,
        email: String,
        password: String,
    ) -> Result<SessionResponse, String> {
        sign_in_impl(state.inner(), email, password)
            .await
            .map_err(|error| state.command_error("sign_in", &error))
    }

    #[tauri::command]
    async fn sign_up(
        state: tauri::State<'_, AppState>,
        email: String,
        password: String,
    ) -> Result<SessionResponse, String> {
        sign_up_impl(state.inner(), email, password)
            .await
            .map_err(|error| state.command_error("sign_up", &error))
    }

    #[tauri::command]
    async fn sign_out(state: tauri::State<'_, AppState>) -> Result<SessionResponse, String> {
        sign_out_impl(state.inner())
            .await
            .map_err(|error| state.command_error("sign_out", &error))
    }

    #[tauri::command]
    async fn current_user(state: tauri::State<'_, AppState>) -> Result<SessionResponse, String> {
        current_user_impl(state.inner())
            .await
            .map_err(|error| state.command_error("current_user", &error))
    }

    pub fn run() {
        fmt().with_env_filter(EnvFilter::from_default_env()).init();

        let workspace_root = std::env::current_dir().expect("failed to resolve current directory");
        let app_state = AppState::new(workspace_root).expect("failed to initialize app state");

        tauri::Builder::default()
            .manage(app_state)
            .setup(|app| {
                let handle = app.handle().clone();
                let mut busy = app.state::<AppState>().busy().subscribe();
                tauri::async_runtime::spawn(async move {
                    while busy.changed().await.is_ok() {
                        let is_busy = *busy.borrow_and_update();
                        if let Err(error) = handle.emit(BUSY_EVENT, is_busy) {
                            tracing::warn!(%error, "failed to emit busy state");
                        }
                    }
                });
                Ok(())
            })
            .invoke_handler(tauri::generate_handler![
                ping,
                bootstrap,
                load_week,
                get_week,
                update_day,
                save_day,
                save_week,
                clear_day,
                clear_week,
                get_status,
                sign_in,
                sign_up,
                sign_out,
                current_user
            ])
            .run(tauri::generate_context!())
            .expect("failed to run tauri app");
    }
}
