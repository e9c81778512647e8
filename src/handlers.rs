use crate::error::AppError;
use crate::recorder::AttemptRecord;
use crate::state::{AppState, UserSession};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum::extract::State;
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const SESSION_COOKIE: &str = "quiz_session";
static RATE_LIMIT: Lazy<DashMap<String, (u32, Instant)>> = Lazy::new(DashMap::new);

fn check_rate_limit(scope: &str, key: &str, limit_per_minute: u32) -> bool {
    let now = Instant::now();
    let full_key = format!("{scope}:{key}");
    if let Some(mut entry) = RATE_LIMIT.get_mut(&full_key) {
        if now.duration_since(entry.1) > Duration::from_secs(60) {
            *entry = (1, now);
            true
        } else if entry.0 >= limit_per_minute {
            false
        } else {
            entry.0 += 1;
            true
        }
    } else {
        RATE_LIMIT.insert(full_key, (1, now));
        true
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn current_login(jar: &CookieJar, state: &AppState) -> Option<(String, UserSession)> {
    let sid = jar.get(SESSION_COOKIE)?.value().to_string();
    let logins = state.logins.read().await;
    logins.get(&sid).map(|user| (sid.clone(), user.clone()))
}

async fn ensure_csrf(headers: &HeaderMap, jar: &CookieJar, state: &AppState) -> bool {
    let sid = match jar.get(SESSION_COOKIE) {
        Some(v) => v.value().to_string(),
        None => return false,
    };
    let header = match headers.get("x-csrf-token").and_then(|h| h.to_str().ok()) {
        Some(v) => v,
        None => return false,
    };
    let logins = state.logins.read().await;
    logins
        .get(&sid)
        .map(|u| u.csrf_token == header)
        .unwrap_or(false)
}

fn unauthorized(request_id: String) -> AppError {
    AppError::new(
        StatusCode::UNAUTHORIZED,
        "UNAUTHORIZED",
        "not logged in",
        request_id,
    )
}

fn csrf_rejected(request_id: String) -> AppError {
    AppError::new(
        StatusCode::FORBIDDEN,
        "FORBIDDEN",
        "csrf token invalid",
        request_id,
    )
}

#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOut {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<AuthPayload>,
) -> Result<(CookieJar, Json<UserOut>), AppError> {
    let req_id = request_id_from_headers(&headers);
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local");
    if !check_rate_limit("auth_login", ip, 30) {
        return Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "too many requests",
            req_id,
        ));
    }

    let login = payload.login.trim().to_string();
    let hash = state
        .credentials
        .get(&login)
        .cloned()
        .ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "invalid credentials",
                req_id.clone(),
            )
        })?;
    let parsed_hash = PasswordHash::new(&hash).map_err(|_| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "bad hash",
            req_id.clone(),
        )
    })?;
    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "invalid credentials",
            req_id,
        ));
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let csrf_token = uuid::Uuid::new_v4().to_string();
    state.logins.write().await.insert(
        session_id.clone(),
        UserSession {
            username: login.clone(),
            student_name: None,
            csrf_token: csrf_token.clone(),
        },
    );

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    let csrf_cookie = Cookie::build(("csrf_token", csrf_token))
        .http_only(false)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    Ok((
        jar.add(cookie).add(csrf_cookie),
        Json(UserOut {
            username: login,
            student_name: None,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    let req_id = request_id_from_headers(&headers);
    let sid = jar
        .get(SESSION_COOKIE)
        .map(|v| v.value().to_string())
        .ok_or_else(|| unauthorized(req_id))?;
    state.logins.write().await.remove(&sid);
    Ok((jar.remove(Cookie::from(SESSION_COOKIE)), StatusCode::NO_CONTENT))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<UserOut>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let (_, user) = current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(req_id))?;
    Ok(Json(UserOut {
        username: user.username,
        student_name: user.student_name,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NamePayload {
    pub name: String,
}

pub async fn set_student_name(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<NamePayload>,
) -> Result<Json<UserOut>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if !ensure_csrf(&headers, &jar, &state).await {
        return Err(csrf_rejected(req_id));
    }
    let (sid, user) = current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(request_id_from_headers(&headers)))?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "name must not be empty",
            request_id_from_headers(&headers),
        ));
    }

    let mut logins = state.logins.write().await;
    if let Some(entry) = logins.get_mut(&sid) {
        entry.student_name = Some(name.clone());
    }
    Ok(Json(UserOut {
        username: user.username,
        student_name: Some(name),
    }))
}

#[derive(Debug, Serialize)]
pub struct QuizListResponse {
    pub items: Vec<crate::models::QuizSummary>,
    pub total: usize,
}

pub async fn list_quizzes(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<QuizListResponse>, AppError> {
    let req_id = request_id_from_headers(&headers);
    current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(req_id))?;
    let items = state.bank.summaries();
    Ok(Json(QuizListResponse {
        total: items.len(),
        items,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "quizId")]
    pub quiz_id: String,
}

pub async fn start_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<StartPayload>,
) -> Result<Json<crate::session::SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if !ensure_csrf(&headers, &jar, &state).await {
        return Err(csrf_rejected(req_id));
    }
    let (sid, user) = current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(request_id_from_headers(&headers)))?;
    if user.student_name.is_none() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "student name is not set",
            request_id_from_headers(&headers),
        ));
    }

    let quiz = state.bank.get(&payload.quiz_id).ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "QUIZ_NOT_FOUND",
            format!("quiz '{}' not found", payload.quiz_id),
            request_id_from_headers(&headers),
        )
    })?;

    let mut session = state.registry.get_or_create(&sid);
    session.start(&payload.quiz_id, quiz);
    info!("quiz '{}' started for {}", payload.quiz_id, user.username);
    Ok(Json(session.view(Some(quiz))))
}

pub async fn session_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<crate::session::SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let (sid, _) = current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(req_id))?;
    let session = state.registry.get_or_create(&sid);
    let quiz = session.quiz_id().and_then(|id| state.bank.get(id));
    Ok(Json(session.view(quiz)))
}

#[derive(Debug, Deserialize)]
pub struct AnswerPayload {
    #[serde(rename = "selectedIndex", default)]
    pub selected_index: Option<usize>,
}

pub async fn submit_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<AnswerPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if !ensure_csrf(&headers, &jar, &state).await {
        return Err(csrf_rejected(req_id));
    }
    let (sid, user) = current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(request_id_from_headers(&headers)))?;

    // Mutation and the recording handoff happen under the registry's per-key
    // lock; the recorder itself runs detached so persistence can never block
    // or fail the quiz flow.
    let (attempt, response) = {
        let mut session = state.registry.get_or_create(&sid);
        let quiz = session.quiz_id().and_then(|id| state.bank.get(id));
        let Some(quiz) = quiz else {
            return Err(AppError::from_session(
                crate::session::SessionError::NotInProgress,
                request_id_from_headers(&headers),
            ));
        };

        let outcome = session
            .submit_answer(quiz, payload.selected_index)
            .map_err(|err| AppError::from_session(err, request_id_from_headers(&headers)))?;

        let attempt = if outcome.completed && session.mark_recorded() {
            Some(AttemptRecord {
                student_name: user
                    .student_name
                    .clone()
                    .unwrap_or_else(|| user.username.clone()),
                quiz_id: session.quiz_id().unwrap_or_default().to_string(),
                answers: session.selected_indices(),
                score: session.score_summary(),
                completed_at: Utc::now(),
            })
        } else {
            None
        };

        if outcome.completed {
            info!(
                "quiz '{}' completed by {} with score {}",
                session.quiz_id().unwrap_or_default(),
                user.username,
                session.score_summary()
            );
        }

        let response = json!({
            "correct": outcome.is_correct,
            "completed": outcome.completed
        });
        drop(session);
        (attempt, response)
    };

    if let Some(record) = attempt {
        let recorder = state.recorder.clone();
        tokio::spawn(async move {
            if let Err(err) = recorder.record(record).await {
                warn!("failed to record quiz result: {}", err);
            }
        });
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct GotoPayload {
    pub index: usize,
}

pub async fn goto_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<GotoPayload>,
) -> Result<Json<crate::session::SessionView>, AppError> {
    let req_id = request_id_from_headers(&headers);
    if !ensure_csrf(&headers, &jar, &state).await {
        return Err(csrf_rejected(req_id));
    }
    let (sid, _) = current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(request_id_from_headers(&headers)))?;

    let mut session = state.registry.get_or_create(&sid);
    session
        .go_to_question(payload.index)
        .map_err(|err| AppError::from_session(err, request_id_from_headers(&headers)))?;
    let quiz = session.quiz_id().and_then(|id| state.bank.get(id));
    Ok(Json(session.view(quiz)))
}

fn performance_message(percentage: u32) -> &'static str {
    if percentage >= 90 {
        "Excellent work! You've mastered this topic!"
    } else if percentage >= 70 {
        "Good job! You have a solid understanding."
    } else if percentage >= 50 {
        "Not bad! Consider reviewing the material."
    } else {
        "Keep studying! Practice makes perfect."
    }
}

pub async fn session_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let (sid, _) = current_login(&jar, &state)
        .await
        .ok_or_else(|| unauthorized(req_id.clone()))?;

    let session = state.registry.get_or_create(&sid);
    if !session.is_completed() {
        return Err(AppError::new(
            StatusCode::CONFLICT,
            "INVALID_STATE",
            "quiz is not completed",
            req_id,
        ));
    }

    let quiz = session.quiz_id().and_then(|id| state.bank.get(id));
    let total = session.answered().len();
    let percentage = ((session.score() as f64 / total as f64) * 100.0).round() as u32;

    Ok(Json(json!({
        "quizId": session.quiz_id(),
        "quizTitle": quiz.map(|q| q.title.clone()),
        "score": session.score(),
        "scoreSummary": session.score_summary(),
        "percentage": percentage,
        "message": performance_message(percentage),
        "history": session.answered(),
    })))
}
