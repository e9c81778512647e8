use crate::models::{validate_quiz, Question, Quiz, QuizSummary, ValidationIssue};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Immutable quiz lookup, populated once at startup. Insertion order is the
/// order quizzes are listed in.
#[derive(Default)]
pub struct QuizBank {
    order: Vec<String>,
    quizzes: HashMap<String, Quiz>,
}

/// Lowercase alphanumeric id derived from a title or file stem.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

impl QuizBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validation happens here, at the boundary: a quiz that would break a
    /// session (no questions, dangling correct index) never enters the bank.
    pub fn insert(&mut self, id: &str, quiz: Quiz) -> Result<(), Vec<ValidationIssue>> {
        if self.quizzes.contains_key(id) {
            return Err(vec![ValidationIssue {
                field: "id".into(),
                issue: format!("quiz id '{id}' is already registered"),
            }]);
        }
        validate_quiz(&quiz)?;
        self.order.push(id.to_string());
        self.quizzes.insert(id.to_string(), quiz);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Quiz> {
        self.quizzes.get(id)
    }

    pub fn summaries(&self) -> Vec<QuizSummary> {
        self.order
            .iter()
            .filter_map(|id| {
                self.quizzes.get(id).map(|quiz| QuizSummary {
                    id: id.clone(),
                    title: quiz.title.clone(),
                    question_count: quiz.questions.len(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Loads every `*.json` file in `dir` as a quiz keyed by the slug of its
    /// file stem. Files that fail to parse or validate are skipped with a
    /// warning; a missing directory is not an error.
    pub fn load_dir(&mut self, dir: &Path) -> anyhow::Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        let mut loaded = 0;
        for path in entries {
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("skipping unreadable quiz file {}: {}", path.display(), err);
                    continue;
                }
            };
            let quiz: Quiz = match serde_json::from_str(&raw) {
                Ok(quiz) => quiz,
                Err(err) => {
                    warn!("skipping malformed quiz file {}: {}", path.display(), err);
                    continue;
                }
            };
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let id = slugify(stem);
            match self.insert(&id, quiz) {
                Ok(()) => {
                    info!("loaded quiz '{}' from {}", id, path.display());
                    loaded += 1;
                }
                Err(issues) => {
                    warn!(
                        "skipping invalid quiz file {}: {}",
                        path.display(),
                        issues
                            .iter()
                            .map(|i| format!("{}: {}", i.field, i.issue))
                            .collect::<Vec<_>>()
                            .join("; ")
                    );
                }
            }
        }
        Ok(loaded)
    }

    /// The stock quiz set shipped with the server.
    pub fn builtin() -> Self {
        let mut bank = Self::new();
        for quiz in [
            algebra_basics(),
            geometry(),
            calculus(),
            learning_behaviours(),
        ] {
            let id = slugify(&quiz.title);
            bank.insert(&id, quiz)
                .expect("builtin quizzes are statically valid");
        }
        bank
    }
}

fn question(
    text: &str,
    options: &[&str],
    correct_index: usize,
    explanation: &str,
) -> Question {
    Question {
        text: text.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_index,
        explanation: explanation.to_string(),
        image: None,
    }
}

fn algebra_basics() -> Quiz {
    Quiz {
        title: "Algebra Basics".into(),
        questions: vec![
            question(
                "Solve for x: $2x + 5 = 13$",
                &["$x = 3$", "$x = 4$", "$x = 5$", "$x = 6$"],
                1,
                "Subtract 5 from both sides: $2x = 8$, then divide by 2: $x = 4$",
            ),
            question(
                "What is the slope of the line passing through points $(2, 3)$ and $(6, 11)$?",
                &["$m = 1$", "$m = 2$", "$m = 3$", "$m = 4$"],
                1,
                "Using slope formula: $m = \\frac{y_2 - y_1}{x_2 - x_1} = \\frac{11 - 3}{6 - 2} = \\frac{8}{4} = 2$",
            ),
            question(
                "Expand: $(x + 3)^2$",
                &["$x^2 + 6x + 9$", "$x^2 + 3x + 9$", "$x^2 + 6x + 6$", "$x^2 + 9$"],
                0,
                "$(x + 3)^2 = x^2 + 2(x)(3) + 3^2 = x^2 + 6x + 9$",
            ),
        ],
    }
}

fn geometry() -> Quiz {
    Quiz {
        title: "Geometry".into(),
        questions: vec![
            question(
                "What is the area of a circle with radius $r = 5$ cm?",
                &["$25\\pi$ cm²", "$10\\pi$ cm²", "$5\\pi$ cm²", "$\\pi$ cm²"],
                0,
                "Area of circle = $\\pi r^2 = \\pi \\times 5^2 = 25\\pi$ cm²",
            ),
            question(
                "In a right triangle, if one angle is $30°$, what is the other acute angle?",
                &["$45°$", "$60°$", "$90°$", "$120°$"],
                1,
                "In a triangle, angles sum to $180°$. With one right angle ($90°$) and one $30°$ angle: $180° - 90° - 30° = 60°$",
            ),
        ],
    }
}

fn calculus() -> Quiz {
    Quiz {
        title: "Calculus".into(),
        questions: vec![
            question(
                "What is $\\frac{d}{dx}[x^3 + 2x^2 - 5x + 1]$?",
                &["$3x^2 + 4x - 5$", "$3x^2 + 2x - 5$", "$x^3 + 4x - 5$", "$3x^2 + 4x - 1$"],
                0,
                "Using power rule: $\\frac{d}{dx}[x^n] = nx^{n-1}$, so $\\frac{d}{dx}[x^3 + 2x^2 - 5x + 1] = 3x^2 + 4x - 5$",
            ),
            question(
                "Evaluate: $\\int_0^2 (3x^2 + 1) dx$",
                &["$8$", "$9$", "$10$", "$11$"],
                2,
                "$\\int (3x^2 + 1) dx = x^3 + x + C$. Evaluating from 0 to 2: $(2^3 + 2) - (0^3 + 0) = 8 + 2 = 10$",
            ),
        ],
    }
}

fn learning_behaviours() -> Quiz {
    let behaviours = [
        ("Communication", "Sharing ideas clearly and listening respectfully."),
        ("Collaboration", "Working effectively with others toward a common goal."),
        ("Engaged Learning", "Actively participating in lessons and completing learning tasks."),
        ("Behaviour", "Following class expectations and demonstrating self-control."),
    ];
    Quiz {
        title: "Learning Behaviours".into(),
        questions: behaviours
            .iter()
            .map(|(name, description)| {
                question(
                    &format!("{name}: {description}\n\nHow often do you demonstrate this behaviour?"),
                    &["Never", "Inconsistently", "Often", "Consistently", "Always"],
                    4,
                    "This question is for self-assessment; there is no correct answer.",
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_titles() {
        assert_eq!(slugify("Algebra Basics"), "algebra-basics");
        assert_eq!(slugify("  Y8 -- MyExam!  "), "y8-myexam");
        assert_eq!(slugify("Calculus"), "calculus");
    }

    #[test]
    fn builtin_bank_lists_in_insertion_order() {
        let bank = QuizBank::builtin();
        let summaries = bank.summaries();
        let ids: Vec<_> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            ["algebra-basics", "geometry", "calculus", "learning-behaviours"]
        );
        assert_eq!(summaries[0].question_count, 3);
    }

    #[test]
    fn lookup_by_slug() {
        let bank = QuizBank::builtin();
        let quiz = bank.get("algebra-basics").unwrap();
        assert_eq!(quiz.title, "Algebra Basics");
        assert!(bank.get("unknown-quiz").is_none());
    }

    #[test]
    fn zero_question_quiz_is_rejected_at_the_boundary() {
        let mut bank = QuizBank::new();
        let err = bank
            .insert(
                "empty",
                Quiz {
                    title: "Empty".into(),
                    questions: vec![],
                },
            )
            .unwrap_err();
        assert!(err.iter().any(|i| i.field == "questions"));
        assert!(bank.get("empty").is_none());
        assert!(bank.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut bank = QuizBank::builtin();
        let err = bank.insert("calculus", algebra_basics()).unwrap_err();
        assert!(err[0].issue.contains("already registered"));
        assert_eq!(bank.len(), 4);
    }

    #[test]
    fn load_dir_skips_invalid_files() {
        let dir = std::env::temp_dir().join(format!("quiz-bank-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("My Exam.json"),
            serde_json::to_string(&algebra_basics()).unwrap(),
        )
        .unwrap();
        fs::write(dir.join("broken.json"), "{ not json").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut bank = QuizBank::new();
        let loaded = bank.load_dir(&dir).unwrap();
        assert_eq!(loaded, 1);
        assert!(bank.get("my-exam").is_some());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_dir_missing_directory_is_not_an_error() {
        let mut bank = QuizBank::new();
        let loaded = bank
            .load_dir(Path::new("/nonexistent/quiz-bank-dir"))
            .unwrap();
        assert_eq!(loaded, 0);
    }
}
