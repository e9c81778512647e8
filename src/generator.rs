use crate::models::{validate_quiz, Question, Quiz};
use futures::future::BoxFuture;
use serde_json::json;

/// One-shot prompt-and-parse quiz generation against a text-generation API.
/// Not part of the serving path; used by the `generate_quiz` bin.
pub trait QuizGenerator: Send + Sync {
    fn generate_quiz(
        &self,
        instruction: &str,
        question_count: usize,
    ) -> BoxFuture<'static, anyhow::Result<Quiz>>;
}

/// Offline stand-in used when no API key is configured.
#[derive(Clone)]
pub struct MockGenerator;

impl QuizGenerator for MockGenerator {
    fn generate_quiz(
        &self,
        instruction: &str,
        question_count: usize,
    ) -> BoxFuture<'static, anyhow::Result<Quiz>> {
        let instruction = instruction.to_string();
        Box::pin(async move {
            let questions = (0..question_count.max(1))
                .map(|idx| Question {
                    text: format!("{}: placeholder question {}", instruction, idx + 1),
                    options: vec!["True".into(), "False".into()],
                    correct_index: 0,
                    explanation: "Placeholder generated without an API key.".into(),
                    image: None,
                })
                .collect();
            Ok(Quiz {
                title: format!("Quiz: {instruction}"),
                questions,
            })
        })
    }
}

#[derive(Clone)]
pub struct OpenAiGenerator {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        })
    }
}

/// Models tend to wrap JSON replies in markdown fences.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn build_prompt(instruction: &str, question_count: usize) -> String {
    format!(
        "Create a quiz about the following instruction: {instruction}\n\n\
         Respond with JSON only, matching this structure exactly:\n\
         {{\n\
           \"title\": \"Quiz Title\",\n\
           \"questions\": [\n\
             {{\n\
               \"text\": \"Question text?\",\n\
               \"options\": [\"Option 1\", \"Option 2\", \"Option 3\", \"Option 4\"],\n\
               \"correctIndex\": 0,\n\
               \"explanation\": \"Why that option is correct\"\n\
             }}\n\
           ]\n\
         }}\n\n\
         Produce exactly {question_count} single-select questions with at least \
         2 options each; correctIndex is the zero-based position of the right \
         option."
    )
}

impl QuizGenerator for OpenAiGenerator {
    fn generate_quiz(
        &self,
        instruction: &str,
        question_count: usize,
    ) -> BoxFuture<'static, anyhow::Result<Quiz>> {
        let client = self.client.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let api_key = self.api_key.clone();
        let model = self.model.clone();
        let prompt = build_prompt(instruction, question_count.max(1));

        Box::pin(async move {
            let response = client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&json!({
                    "model": model,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": 0.7
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("generation request failed ({}): {}", status, body);
            }

            let payload: serde_json::Value = response.json().await?;
            let content = payload["choices"][0]["message"]["content"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("generation reply has no content"))?;

            let cleaned = strip_code_fences(content);
            if cleaned.is_empty() {
                anyhow::bail!("generation reply is empty");
            }
            let quiz: Quiz = serde_json::from_str(&cleaned)?;
            if let Err(issues) = validate_quiz(&quiz) {
                anyhow::bail!(
                    "generated quiz failed validation: {}",
                    issues
                        .iter()
                        .map(|i| format!("{}: {}", i.field, i.issue))
                        .collect::<Vec<_>>()
                        .join("; ")
                );
            }
            Ok(quiz)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fences_handles_plain_and_fenced() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn mock_generator_yields_a_valid_quiz() {
        let quiz = MockGenerator.generate_quiz("Rust basics", 3).await.unwrap();
        assert_eq!(quiz.questions.len(), 3);
        assert!(validate_quiz(&quiz).is_ok());
    }

    #[tokio::test]
    async fn mock_generator_never_yields_zero_questions() {
        let quiz = MockGenerator.generate_quiz("Rust basics", 0).await.unwrap();
        assert_eq!(quiz.questions.len(), 1);
    }
}
