use crate::models::{AnsweredQuestion, QuestionView, Quiz};
use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no quiz is in progress")]
    NotInProgress,
    #[error("no answer selected")]
    MissingSelection,
    #[error("answered questions are read-only; return to the current question to continue")]
    ReviewIsReadOnly,
    #[error("question index {index} is out of range (max {max})")]
    IndexOutOfRange { index: usize, max: usize },
    #[error("selected option {selected} does not exist")]
    UnknownOption { selected: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmitOutcome {
    pub is_correct: bool,
    pub completed: bool,
}

/// One user's progress through a single quiz attempt.
///
/// The submission frontier is `answered.len()`; `current_question_index` is a
/// cursor that may trail the frontier while the user reviews earlier answers.
/// Submission is only accepted at the frontier, so revisiting a question can
/// never re-score it.
#[derive(Debug, Default)]
pub struct QuizSession {
    active_quiz_id: Option<String>,
    current_question_index: usize,
    question_count: usize,
    score: usize,
    answered: Vec<AnsweredQuestion>,
    started_at: Option<DateTime<Utc>>,
    completed: bool,
    recorded: bool,
}

impl QuizSession {
    pub fn state(&self) -> SessionState {
        if self.active_quiz_id.is_none() {
            SessionState::Idle
        } else if self.completed {
            SessionState::Completed
        } else {
            SessionState::InProgress
        }
    }

    pub fn quiz_id(&self) -> Option<&str> {
        self.active_quiz_id.as_deref()
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn answered(&self) -> &[AnsweredQuestion] {
        &self.answered
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Selected option indices in submission order.
    pub fn selected_indices(&self) -> Vec<usize> {
        self.answered.iter().map(|a| a.selected_index).collect()
    }

    pub fn score_summary(&self) -> String {
        format!("{}/{}", self.score, self.question_count)
    }

    /// Begin a new attempt, discarding any previous one (including retakes of
    /// the same quiz). The bank guarantees `quiz` has at least one question.
    pub fn start(&mut self, quiz_id: &str, quiz: &Quiz) {
        self.active_quiz_id = Some(quiz_id.to_string());
        self.current_question_index = 0;
        self.question_count = quiz.questions.len();
        self.score = 0;
        self.answered.clear();
        self.started_at = Some(Utc::now());
        self.completed = false;
        self.recorded = false;
    }

    /// Record an answer for the frontier question and advance. A `None`
    /// selection is rejected without any state change, so repeated empty
    /// submissions are idempotent.
    pub fn submit_answer(
        &mut self,
        quiz: &Quiz,
        selected_index: Option<usize>,
    ) -> Result<SubmitOutcome, SessionError> {
        if self.state() != SessionState::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if self.current_question_index < self.answered.len() {
            return Err(SessionError::ReviewIsReadOnly);
        }
        let selected = selected_index.ok_or(SessionError::MissingSelection)?;
        let question = &quiz.questions[self.current_question_index];
        if selected >= question.options.len() {
            return Err(SessionError::UnknownOption { selected });
        }

        let snapshot = AnsweredQuestion::from_submission(question, selected);
        let is_correct = snapshot.is_correct;
        if is_correct {
            self.score += 1;
        }
        self.answered.push(snapshot);
        self.current_question_index += 1;
        self.completed = self.answered.len() >= self.question_count;

        Ok(SubmitOutcome {
            is_correct,
            completed: self.completed,
        })
    }

    /// Move the cursor to an already-answered question or back to the
    /// frontier. Never touches the score or the answer history.
    pub fn go_to_question(&mut self, index: usize) -> Result<(), SessionError> {
        if self.state() != SessionState::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if index > self.answered.len() {
            return Err(SessionError::IndexOutOfRange {
                index,
                max: self.answered.len(),
            });
        }
        self.current_question_index = index;
        Ok(())
    }

    /// Claims the one-shot recording slot for a completed attempt. Returns
    /// true exactly once per attempt.
    pub fn mark_recorded(&mut self) -> bool {
        if self.completed && !self.recorded {
            self.recorded = true;
            true
        } else {
            false
        }
    }

    /// Read-only projection for the presentation layer. `quiz` is the bank
    /// entry for `active_quiz_id`; the answer key never leaks into the view.
    pub fn view(&self, quiz: Option<&Quiz>) -> SessionView {
        let state = self.state();
        let mut view = SessionView {
            state,
            quiz_id: self.active_quiz_id.clone(),
            quiz_title: quiz.map(|q| q.title.clone()),
            question_number: None,
            question_count: None,
            progress: None,
            score: self.score,
            answered_count: self.answered.len(),
            completed: self.completed,
            question: None,
            review: None,
            score_summary: None,
            history: Vec::new(),
        };
        match state {
            SessionState::Idle => {}
            SessionState::InProgress => {
                view.question_number = Some(self.current_question_index + 1);
                view.question_count = Some(self.question_count);
                view.progress = Some(
                    (self.current_question_index + 1) as f64 / self.question_count as f64,
                );
                if self.current_question_index < self.answered.len() {
                    view.review = Some(self.answered[self.current_question_index].clone());
                } else if let Some(quiz) = quiz {
                    view.question =
                        Some(QuestionView::from(&quiz.questions[self.current_question_index]));
                }
            }
            SessionState::Completed => {
                view.question_count = Some(self.question_count);
                view.progress = Some(1.0);
                view.score_summary = Some(self.score_summary());
                view.history = self.answered.clone();
            }
        }
        view
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    pub score: usize,
    pub answered_count: usize,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<AnsweredQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<AnsweredQuestion>,
}

/// Maps opaque session keys to quiz sessions, created lazily. The per-key
/// shard lock serializes mutations of any single session; lifetime and
/// eviction are the deployment's concern, not the registry's.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, QuizSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A missing key is not a failure: it gets a fresh idle session.
    pub fn get_or_create(&self, key: &str) -> RefMut<'_, String, QuizSession> {
        self.sessions.entry(key.to_string()).or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Question;

    fn quiz_with_correct_indices(correct: &[usize]) -> Quiz {
        Quiz {
            title: "Fixture".into(),
            questions: correct
                .iter()
                .enumerate()
                .map(|(i, &c)| Question {
                    text: format!("Question {}", i + 1),
                    options: vec!["A".into(), "B".into(), "C".into()],
                    correct_index: c,
                    explanation: format!("Explanation {}", i + 1),
                    image: None,
                })
                .collect(),
        }
    }

    #[test]
    fn fresh_session_is_idle() {
        let session = QuizSession::default();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.score(), 0);
        assert!(session.answered().is_empty());
    }

    #[test]
    fn n_submissions_complete_an_n_question_quiz() {
        let quiz = quiz_with_correct_indices(&[0, 1, 2, 0]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        for i in 0..4 {
            assert_eq!(session.state(), SessionState::InProgress);
            session.submit_answer(&quiz, Some(i % 3)).unwrap();
        }
        assert!(session.is_completed());
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.current_question_index(), 4);
    }

    #[test]
    fn score_counts_only_strict_index_matches() {
        let quiz = quiz_with_correct_indices(&[1, 0]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        session.submit_answer(&quiz, Some(1)).unwrap();
        session.submit_answer(&quiz, Some(1)).unwrap();
        assert_eq!(session.score(), 1);
        assert_eq!(
            session.score(),
            session.answered().iter().filter(|a| a.is_correct).count()
        );
        assert_eq!(session.score_summary(), "1/2");
    }

    #[test]
    fn missing_selection_is_an_idempotent_no_op() {
        let quiz = quiz_with_correct_indices(&[1, 0]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        session.submit_answer(&quiz, Some(1)).unwrap();
        for _ in 0..3 {
            let err = session.submit_answer(&quiz, None).unwrap_err();
            assert_eq!(err, SessionError::MissingSelection);
            assert_eq!(session.current_question_index(), 1);
            assert_eq!(session.score(), 1);
            assert_eq!(session.answered().len(), 1);
        }
    }

    #[test]
    fn out_of_range_selection_leaves_state_unchanged() {
        let quiz = quiz_with_correct_indices(&[1]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        let err = session.submit_answer(&quiz, Some(7)).unwrap_err();
        assert_eq!(err, SessionError::UnknownOption { selected: 7 });
        assert_eq!(session.answered().len(), 0);
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn navigation_never_changes_score_or_history() {
        let quiz = quiz_with_correct_indices(&[1, 1, 0]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        session.submit_answer(&quiz, Some(1)).unwrap();
        session.submit_answer(&quiz, Some(0)).unwrap();

        session.go_to_question(0).unwrap();
        assert_eq!(session.score(), 1);
        assert_eq!(session.answered().len(), 2);
        session.go_to_question(2).unwrap();
        assert_eq!(session.answered().len(), 2);

        let err = session.go_to_question(3).unwrap_err();
        assert_eq!(err, SessionError::IndexOutOfRange { index: 3, max: 2 });
    }

    #[test]
    fn submitting_while_reviewing_is_rejected() {
        let quiz = quiz_with_correct_indices(&[1, 1]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        session.submit_answer(&quiz, Some(1)).unwrap();
        session.go_to_question(0).unwrap();

        let err = session.submit_answer(&quiz, Some(1)).unwrap_err();
        assert_eq!(err, SessionError::ReviewIsReadOnly);
        assert_eq!(session.score(), 1);
        assert_eq!(session.answered().len(), 1);

        // Back at the frontier, submission resumes normally.
        session.go_to_question(1).unwrap();
        session.submit_answer(&quiz, Some(1)).unwrap();
        assert!(session.is_completed());
        assert_eq!(session.score(), 2);
    }

    #[test]
    fn submit_and_goto_are_invalid_while_idle_or_completed() {
        let quiz = quiz_with_correct_indices(&[0]);
        let mut session = QuizSession::default();
        assert_eq!(
            session.submit_answer(&quiz, Some(0)).unwrap_err(),
            SessionError::NotInProgress
        );
        assert_eq!(
            session.go_to_question(0).unwrap_err(),
            SessionError::NotInProgress
        );

        session.start("fixture", &quiz);
        session.submit_answer(&quiz, Some(0)).unwrap();
        assert_eq!(
            session.submit_answer(&quiz, Some(0)).unwrap_err(),
            SessionError::NotInProgress
        );
    }

    #[test]
    fn start_resets_everything_even_from_completed() {
        let quiz = quiz_with_correct_indices(&[0, 1]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        session.submit_answer(&quiz, Some(0)).unwrap();
        session.submit_answer(&quiz, Some(1)).unwrap();
        assert!(session.is_completed());
        assert!(session.mark_recorded());

        session.start("fixture", &quiz);
        assert_eq!(session.state(), SessionState::InProgress);
        assert_eq!(session.score(), 0);
        assert!(session.answered().is_empty());
        assert_eq!(session.current_question_index(), 0);
        assert!(!session.is_completed());
    }

    #[test]
    fn recording_slot_is_claimed_exactly_once() {
        let quiz = quiz_with_correct_indices(&[0]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        assert!(!session.mark_recorded());
        session.submit_answer(&quiz, Some(0)).unwrap();
        assert!(session.mark_recorded());
        assert!(!session.mark_recorded());
    }

    #[test]
    fn algebra_basics_scenario() {
        let quiz = quiz_with_correct_indices(&[1, 1, 0]);
        let mut session = QuizSession::default();
        session.start("algebra-basics", &quiz);
        for selected in [1, 0, 0] {
            session.submit_answer(&quiz, Some(selected)).unwrap();
        }
        assert_eq!(session.score_summary(), "2/3");
        assert!(!session.answered()[1].is_correct);
        assert_eq!(session.selected_indices(), vec![1, 0, 0]);
    }

    #[test]
    fn view_tracks_progress_and_hides_future_questions() {
        let quiz = quiz_with_correct_indices(&[0, 1, 2, 0]);
        let mut session = QuizSession::default();
        session.start("fixture", &quiz);
        session.submit_answer(&quiz, Some(0)).unwrap();

        let view = session.view(Some(&quiz));
        assert_eq!(view.question_number, Some(2));
        assert_eq!(view.progress, Some(0.5));
        assert!(view.question.is_some());
        assert!(view.review.is_none());

        session.go_to_question(0).unwrap();
        let view = session.view(Some(&quiz));
        assert!(view.question.is_none());
        assert!(view.review.is_some());
        assert_eq!(view.progress, Some(0.25));
    }

    #[test]
    fn registry_creates_lazily_and_isolates_keys() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
        let quiz = quiz_with_correct_indices(&[0]);
        {
            let mut session = registry.get_or_create("alice");
            session.start("fixture", &quiz);
            session.submit_answer(&quiz, Some(0)).unwrap();
        }
        {
            let session = registry.get_or_create("bob");
            assert_eq!(session.state(), SessionState::Idle);
        }
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_or_create("alice").score(), 1);
    }
}
