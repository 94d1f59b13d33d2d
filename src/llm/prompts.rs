/// Mode-specific system instructions for the rewrite flow
use crate::access::RewriteMode;

const IMPROVE_PROMPT: &str = "\
You are an expert prompt engineer. Rewrite the user's prompt so a large \
language model produces a noticeably better answer: make the goal explicit, \
add missing context and constraints, specify the desired format and tone, \
and remove ambiguity. Return only the rewritten prompt, with no commentary.";

const REFINE_PROMPT: &str = "\
You are an expert prompt engineer. The user's prompt is already workable; \
polish it. Tighten the wording, fix grammar, sharpen vague phrasing, and \
keep the original intent and length as close as possible. Return only the \
refined prompt, with no commentary.";

const FOLLOWUP_PROMPT: &str = "\
You are an expert prompt engineer. The user is continuing an earlier \
prompt-improvement session. Using the previous prompt as context, write a \
follow-up prompt that carries the conversation forward and addresses the \
user's new request. Return only the follow-up prompt, with no commentary.";

/// System instructions for a rewrite mode
pub fn system_prompt(mode: RewriteMode) -> &'static str {
    match mode {
        RewriteMode::Improve => IMPROVE_PROMPT,
        RewriteMode::Refine => REFINE_PROMPT,
        RewriteMode::Followup => FOLLOWUP_PROMPT,
    }
}

/// Build the user turn. For follow-ups the previous prompt is folded into
/// the same turn so the provider sees the full context.
pub fn user_turn(mode: RewriteMode, prompt: &str, previous_prompt: Option<&str>) -> String {
    match (mode, previous_prompt) {
        (RewriteMode::Followup, Some(previous)) if !previous.trim().is_empty() => format!(
            "Previous prompt:\n{}\n\nFollow-up request:\n{}",
            previous.trim(),
            prompt
        ),
        _ => prompt.to_string(),
    }
}
