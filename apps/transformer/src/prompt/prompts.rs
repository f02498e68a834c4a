// Default instruction placed at the head of every transformation prompt.
// Override at runtime with PROMPT_INSTRUCTION_PATH.

/// Instruction template. The model must separate outputs with `[DIVIDER]`
/// (see `llm_client::prompts::DIVIDER`).
pub const DEFAULT_INSTRUCTION: &str = r####"You are provided with two kinds of text input, each introduced by a marker of the form:
### [TITLE] ###

Input 1: "Job Description to be Transformed" - a current job description that needs updating.
Input 2: "Reference Material" - supporting content describing relevant concepts and methodologies.

Task:
Transform each job description into a forward-thinking, AI-augmented version. For every task or section in the original job description, add specific, actionable enhancements driven by AI. Draw on all reference materials so that each updated task reflects current AI methodologies and practices. The result for each job description should be a cohesive, detailed job description that explains how AI will augment and transform the role's current responsibilities.

Format:
- Start each job description with its job title on the first line.
- Strictly separate each job description with "[DIVIDER]".
- Do not reproduce the "### [TITLE] ###" markers in your output."####;
