use std::fmt;
use std::str::FromStr;

use regex::Regex;

/// Page total expected in a `N of TOTAL` print footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTotal {
    Exactly(u32),
    Any,
}

impl Default for PageTotal {
    fn default() -> Self {
        PageTotal::Exactly(8)
    }
}

impl FromStr for PageTotal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "any" | "*" => Ok(PageTotal::Any),
            other => other
                .parse::<u32>()
                .map(PageTotal::Exactly)
                .map_err(|_| format!("expected a page count or 'any', got '{other}'")),
        }
    }
}

impl fmt::Display for PageTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageTotal::Exactly(n) => write!(f, "{n}"),
            PageTotal::Any => f.write_str("any"),
        }
    }
}

/// Strips browser print footers (`3 of 8  7/15/2024, 2:05 PM`) left behind
/// by PDF text extraction, replacing each with a single newline.
#[derive(Debug, Clone)]
pub struct FooterCleaner {
    pattern: Regex,
}

impl FooterCleaner {
    pub fn new(total: PageTotal) -> Result<Self, regex::Error> {
        let total = match total {
            PageTotal::Exactly(n) => n.to_string(),
            PageTotal::Any => r"\d+".to_string(),
        };
        let pattern = Regex::new(&format!(
            r"\d+ of {total}\s+\d{{1,2}}/\d{{1,2}}/\d{{4}},\s+\d{{1,2}}:\d{{2}}\s*(?:AM|PM)"
        ))?;
        Ok(Self { pattern })
    }

    /// Removes footers until none remain. Removing one footer can splice
    /// its neighbours into a new match, so a single pass is not idempotent.
    pub fn clean(&self, text: &str) -> String {
        let mut current = text.to_string();
        while self.pattern.is_match(&current) {
            current = self.pattern.replace_all(&current, "\n").into_owned();
        }
        current
    }
}
