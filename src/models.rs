use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// May embed markdown/LaTeX; rendered by the client as-is.
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Question {
    pub fn is_correct(&self, selected_index: usize) -> bool {
        selected_index == self.correct_index
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub title: String,
    pub questions: Vec<Question>,
}

/// Snapshot taken when an answer is submitted. Never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredQuestion {
    pub question_text: String,
    pub selected_index: usize,
    pub correct_index: usize,
    pub is_correct: bool,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl AnsweredQuestion {
    pub fn from_submission(question: &Question, selected_index: usize) -> Self {
        Self {
            question_text: question.text.clone(),
            selected_index,
            correct_index: question.correct_index,
            is_correct: question.is_correct(selected_index),
            explanation: question.explanation.clone(),
            image: question.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: String,
    pub title: String,
    pub question_count: usize,
}

/// The question as shown to the taker: everything except the answer key.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub text: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            text: q.text.clone(),
            options: q.options.clone(),
            image: q.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub issue: String,
}

pub fn validate_quiz(quiz: &Quiz) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    if quiz.title.trim().is_empty() {
        issues.push(ValidationIssue {
            field: "title".into(),
            issue: "must not be empty".into(),
        });
    }
    if quiz.questions.is_empty() {
        issues.push(ValidationIssue {
            field: "questions".into(),
            issue: "must contain at least one question".into(),
        });
    }

    for (i, q) in quiz.questions.iter().enumerate() {
        if q.text.trim().is_empty() {
            issues.push(ValidationIssue {
                field: format!("questions[{i}].text"),
                issue: "must not be empty".into(),
            });
        }
        if q.options.len() < 2 {
            issues.push(ValidationIssue {
                field: format!("questions[{i}].options"),
                issue: "must contain at least 2 options".into(),
            });
        }
        for (j, opt) in q.options.iter().enumerate() {
            if opt.trim().is_empty() {
                issues.push(ValidationIssue {
                    field: format!("questions[{i}].options[{j}]"),
                    issue: "must not be empty".into(),
                });
            }
        }
        if q.correct_index >= q.options.len() {
            issues.push(ValidationIssue {
                field: format!("questions[{i}].correctIndex"),
                issue: "must reference an existing option".into(),
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
