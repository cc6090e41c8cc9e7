use std::sync::LazyLock;

use regex::Regex;

use crate::errors::InputError;

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:stages?|tents?|arenas?|festival|line-?up|tickets?|venue|amphitheat(?:er|re)|all\s+ages|(?:presented|sponsored|supported|powered)\s+by|in\s+association\s+with)\b",
    )
    .unwrap()
});
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:https?://|www\.)\S+|\b[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|net|org|ca|co|uk|io|fm|tv|de|fr|au|nz|us|info|events?|live|app)\b",
    )
    .unwrap()
});
static NUMERIC_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\d+(?:st|nd|rd|th|am|pm|h)?$").unwrap());

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec",
];
const WEEKDAYS: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "mon", "tue",
    "tues", "wed", "thu", "thur", "thurs", "fri", "sat", "sun",
];
// Allowed between calendar tokens ("FRIDAY JULY 15 TO SUNDAY JULY 17").
const CALENDAR_FILLERS: &[&str] = &["to", "thru", "through", "til", "till", "until", "and", "from", "doors"];

/// Decides whether a line (or segment) of OCR text is boilerplate rather than a name.
pub trait NoiseClassifier: Send + Sync {
    fn is_noise_line(&self, line: &str) -> bool;
}

/// Caller-supplied boilerplate: literal strings (case-insensitive, whole words) and regexes.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    patterns: Vec<Regex>,
}

impl DenyList {
    pub fn new<L, P>(literals: L, patterns: P) -> Result<Self, InputError>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let mut list = DenyList::default();
        list.extend_literals(literals)?;
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let re = Regex::new(&format!("(?i){pattern}")).map_err(|source| {
                InputError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })?;
            list.patterns.push(re);
        }
        Ok(list)
    }

    /// Add literal strings, e.g. words confirmed as non-artists through feedback.
    fn extend_literals<L>(&mut self, literals: L) -> Result<(), InputError>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        for literal in literals {
            let literal = literal.as_ref().trim();
            if literal.is_empty() {
                continue;
            }
            let pattern = literal_pattern(literal);
            let re = Regex::new(&pattern).map_err(|source| InputError::InvalidPattern {
                pattern: literal.to_string(),
                source,
            })?;
            self.patterns.push(re);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when removing every deny-list match leaves no letters or digits behind.
    pub fn consumes(&self, text: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let mut rest = text.to_string();
        for re in &self.patterns {
            rest = re.replace_all(&rest, " ").into_owned();
        }
        !rest.chars().any(char::is_alphanumeric)
    }
}

fn literal_pattern(literal: &str) -> String {
    let escaped = regex::escape(literal)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(r"\s+");
    let starts_word = literal.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_');
    let ends_word = literal.chars().last().is_some_and(|c| c.is_alphanumeric() || c == '_');
    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

/// Default rule set for festival posters: calendar lines, bare numbers,
/// stage/venue keywords, URLs, plus a caller deny-list.
#[derive(Debug, Clone, Default)]
pub struct PosterNoise {
    deny: DenyList,
}

impl PosterNoise {
    pub fn new(deny: DenyList) -> Self {
        PosterNoise { deny }
    }
}

impl NoiseClassifier for PosterNoise {
    fn is_noise_line(&self, line: &str) -> bool {
        let line = line.trim();
        is_calendar_or_numeric(line)
            || KEYWORD_RE.is_match(line)
            || URL_RE.is_match(line)
            || self.deny.consumes(line)
    }
}

/// Every token is a month, weekday, number, time or ordinal ("JULY 15", "2022", "FRI 10PM").
fn is_calendar_or_numeric(line: &str) -> bool {
    let tokens: Vec<String> = line
        .split(|c: char| {
            c.is_whitespace()
                || matches!(c, ',' | '-' | '–' | '—' | '/' | '|' | '.' | ':' | '&' | '•' | '·' | '@')
        })
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut saw_date = false;
    for token in &tokens {
        if MONTHS.contains(&token.as_str())
            || WEEKDAYS.contains(&token.as_str())
            || NUMERIC_TOKEN_RE.is_match(token)
        {
            saw_date = true;
        } else if !CALENDAR_FILLERS.contains(&token.as_str()) {
            return false;
        }
    }
    saw_date
}
