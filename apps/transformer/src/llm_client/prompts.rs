// Fixed prompt fragments for the completion call.

/// System message sent with every completion request.
pub const SYSTEM_ROLE: &str = "NLP and data visualization expert analyzing qualitative feedback";

/// Literal token the model places between output documents.
pub const DIVIDER: &str = "[DIVIDER]";
