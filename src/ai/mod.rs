pub mod gemini;
pub mod normalize;
pub mod prompts;
