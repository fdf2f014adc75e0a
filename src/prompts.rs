//! Prompts sent to the generative model.
//!
//! Every prompt lives here so changing the grading wording means editing one
//! place, and tests can inspect the prompts without a live model.
//!
//! Callers can override both via [`crate::config::GradingConfig`]; the
//! constants here are used only when no override is provided.

/// Prompt sent with each rasterised handwritten page.
pub const HANDWRITING_OCR_PROMPT: &str = "Please extract all the text from this handwritten answer sheet image.
Return only the extracted text, without any additional commentary.
Be as accurate as possible in reading the handwriting.";

/// Grading instructions placed ahead of the student answers and the key.
///
/// The closing line fixes the phrase that [`crate::score::extract_score`]
/// looks for.
pub const COMPARISON_INSTRUCTIONS: &str = "Compare the following student answers with the answer key.
Provide a short analysis of matching and non-matching answers.

I want the output to be structured in the following way:
Question wise Matching Aspects and non-matching aspects and score for that question
and in the end there will be \"Total Score : 'score'/100\"";

/// Separator appended after every transcribed handwritten page.
pub const PAGE_BREAK: &str = "\n\n--- Page Break ---\n\n";

/// Build the comparison prompt for one student.
///
/// Student answers come first, then the answer key.
pub fn comparison_prompt(instructions: &str, student_text: &str, key_text: &str) -> String {
    format!(
        "{instructions}\n\nStudent Answers:\n{student_text}\n\nAnswer Key:\n{key_text}\n"
    )
}
