pub const REFERENCE_LABEL: &str = "REFERENCE MATERIAL";
pub const JOB_DESCRIPTION_LABEL: &str = "JOB DESCRIPTION";

/// Builds the single prompt sent to the completion service.
///
/// Layout: `instruction`, then every reference as
/// `\n### REFERENCE MATERIAL i ###\n<text>`, then every job description as
/// `\n### JOB DESCRIPTION j ###\n<text>`. Indices are 1-based per group.
/// Nothing is truncated here; the token budget is checked afterwards.
pub fn assemble<S: AsRef<str>>(
    references: &[S],
    job_descriptions: &[S],
    instruction: &str,
) -> String {
    let body_len: usize = references
        .iter()
        .chain(job_descriptions)
        .map(|t| t.as_ref().len() + 32)
        .sum();
    let mut prompt = String::with_capacity(instruction.len() + body_len);
    prompt.push_str(instruction);

    push_sections(&mut prompt, REFERENCE_LABEL, references);
    push_sections(&mut prompt, JOB_DESCRIPTION_LABEL, job_descriptions);
    prompt
}

fn push_sections<S: AsRef<str>>(prompt: &mut String, label: &str, texts: &[S]) {
    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("\n### {label} {} ###\n", i + 1));
        prompt.push_str(text.as_ref());
    }
}
