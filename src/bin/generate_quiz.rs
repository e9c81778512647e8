use nice_quiz::bank::slugify;
use nice_quiz::generator::{MockGenerator, OpenAiGenerator, QuizGenerator};
use std::path::Path;
use std::sync::Arc;

/// One-shot quiz generation into the bank directory. The server picks the
/// file up on its next start.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().init();

    let mut args = std::env::args().skip(1);
    let instruction = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: generate_quiz <instruction> [question_count]"))?;
    let question_count: usize = args.next().map(|v| v.parse()).transpose()?.unwrap_or(5);

    let generator: Arc<dyn QuizGenerator> = match OpenAiGenerator::from_env() {
        Some(real) => Arc::new(real),
        None => {
            tracing::warn!("OPENAI_API_KEY not set, using the offline mock generator");
            Arc::new(MockGenerator)
        }
    };

    let quiz = generator.generate_quiz(&instruction, question_count).await?;

    let bank_dir = std::env::var("QUIZ_BANK_DIR").unwrap_or_else(|_| "quiz_bank".to_string());
    let path = Path::new(&bank_dir).join(format!("{}.json", slugify(&quiz.title)));
    tokio::fs::create_dir_all(&bank_dir).await?;
    tokio::fs::write(&path, serde_json::to_vec_pretty(&quiz)?).await?;

    println!("Title: {}", quiz.title);
    println!("Questions: {}", quiz.questions.len());
    println!("Saved to: {}", path.display());
    Ok(())
}
