pub mod bank;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod models;
pub mod recorder;
pub mod routes;
pub mod session;
pub mod state;

use std::sync::Arc;

/// Assembles the application state from the environment: the quiz bank
/// (built-ins plus any JSON quizzes in `QUIZ_BANK_DIR`), the static login
/// table from `QUIZ_USERS`, and a flat-file result recorder writing to
/// `QUIZ_RESULTS_DIR`.
pub fn build_state() -> anyhow::Result<state::AppState> {
    let mut bank = bank::QuizBank::builtin();
    let bank_dir =
        std::env::var("QUIZ_BANK_DIR").unwrap_or_else(|_| "quiz_bank".to_string());
    bank.load_dir(std::path::Path::new(&bank_dir))?;

    let users_spec = std::env::var("QUIZ_USERS").unwrap_or_else(|_| "admin:admin".to_string());
    let credentials = state::build_credentials(&users_spec)?;

    let results_dir =
        std::env::var("QUIZ_RESULTS_DIR").unwrap_or_else(|_| "results".to_string());
    let recorder: Arc<dyn recorder::ResultRecorder> =
        Arc::new(recorder::FileResultRecorder::new(results_dir));

    Ok(state::AppState::new(bank, credentials, recorder))
}
