// All LLM prompt constants for the tailoring module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Role statement for gap analysis. Combined with `JSON_ONLY_SYSTEM` at call time.
pub const GAP_ANALYSIS_ROLE: &str =
    "You are an expert resume writer and Applicant Tracking System (ATS) specialist. \
    You compare a resume against a job description and propose precise, minimal edits.";

/// Gap analysis prompt template.
/// Replace: {truthfulness_instruction}, {verbatim_instruction}, {job_description}, {resume_text}
pub const GAP_ANALYSIS_PROMPT_TEMPLATE: &str = r#"{truthfulness_instruction}

{verbatim_instruction}

Analyze the resume below against the job description. Work section by section, using the
resume's own section headers and order. For each section identify the gaps relative to the
job description, give short suggestions, and propose concrete edits.

Return a JSON object with this EXACT schema (no extra fields):
{
  "sections": [
    {
      "section_name": "Experience",
      "original_text": "the section's text exactly as it appears in the resume",
      "gaps": ["No mention of delivery metrics"],
      "suggestions": ["Quantify the impact of the team you managed"],
      "edits": [
        {
          "target_text": "Managed a team of 5 developers.",
          "new_content": "Led a team of 5 developers, improving delivery speed by 20%.",
          "action": "replace",
          "rationale": "Adds leadership language and a measurable outcome"
        }
      ]
    }
  ]
}

Rules for edits:
- "action" is "replace" (substitute target_text with new_content) or "append"
  (add new_content right after the line containing target_text).
- Keep each edit to a single bullet or line.
- Use keywords from the job description where the candidate's experience supports them.
- Do not propose edits for sections that already match the job well.

JOB DESCRIPTION:
{job_description}

RESUME:
{resume_text}"#;

/// Role statement for score estimation. Combined with `JSON_ONLY_SYSTEM` at call time.
pub const SCORING_ROLE: &str =
    "You are an Applicant Tracking System (ATS) scoring engine. \
    You estimate how well a resume matches a job description on a 0-100 scale.";

/// Scoring prompt template. Replace: {job_description}, {changes_summary}
pub const SCORING_PROMPT_TEMPLATE: &str = r#"A resume was analyzed against the job description below.
The proposed changes, by section, are:

{changes_summary}

Estimate the resume's ATS match score BEFORE the changes (initial_score) and AFTER all
proposed changes are applied (projected_score). Both are integers from 0 to 100.

Return a JSON object:
{
  "initial_score": 62,
  "projected_score": 81,
  "reasoning": "One or two sentences explaining the difference"
}

JOB DESCRIPTION:
{job_description}"#;

/// Substitutes `{name}` placeholders in a single left-to-right pass. Inserted values are
/// never rescanned, so a job description containing `{resume_text}` stays literal.
/// Braces that do not open a known placeholder (the JSON examples) are copied as-is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];
        let placeholder = values.iter().find_map(|(name, value)| {
            let token_len = name.len() + 2;
            let matches =
                rest[1..].starts_with(name) && rest[1 + name.len()..].starts_with('}');
            matches.then_some((token_len, *value))
        });
        match placeholder {
            Some((token_len, value)) => {
                out.push_str(value);
                rest = &rest[token_len..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
