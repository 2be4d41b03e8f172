//! Instruction framing for the seeded user message.

use toolrelay_config::USER_PROMPT_PLACEHOLDER;

/// Substitute the user's request into the instruction template.
pub fn render_instruction(template: &str, user_prompt: &str) -> String {
    template.replace(USER_PROMPT_PLACEHOLDER, user_prompt)
}
