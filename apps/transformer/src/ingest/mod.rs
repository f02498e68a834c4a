// Ingestion: listed document → plain text → cleaned text.

pub mod cleaner;
pub mod extractor;

pub use cleaner::{FooterCleaner, PageTotal};
pub use extractor::{ExtractedText, TextExtractor};

use crate::drive::DocumentRef;

#[derive(Debug, Clone)]
pub struct CleanedText {
    pub source: DocumentRef,
    pub text: String,
}

impl ExtractedText {
    pub fn clean(self, cleaner: &FooterCleaner) -> CleanedText {
        CleanedText {
            text: cleaner.clean(&self.raw_text),
            source: self.source,
        }
    }
}
