// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Common instruction appended to all prompts that rewrite a candidate's resume.
pub const TRUTHFULNESS_INSTRUCTION: &str = "\
    CRITICAL: Maintain truthfulness. Every rewrite must be supported by something the \
    resume already says. Do NOT invent employers, titles, dates, metrics, or skills. \
    Rephrasing, reordering emphasis, and adopting the job description's vocabulary for \
    experience the candidate already has are allowed.";

/// Instruction that keeps edit targets matchable against the source document.
pub const VERBATIM_TARGET_INSTRUCTION: &str = "\
    CRITICAL: `target_text` must be copied VERBATIM from the resume text, character for \
    character, and must not span more than one line of the resume. \
    Edits whose target cannot be found in the resume are discarded.";
