pub mod gemini;
pub mod prompt;

pub use gemini::GeminiClient;
pub use prompt::reply_prompt;
