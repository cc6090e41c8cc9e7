use std::sync::LazyLock;

use regex::Regex;

// Bullets, middle dots, commas, pipes and spaced slashes/dashes. "â€¢" is a
// UTF-8 bullet that was decoded as Latin-1 somewhere upstream.
static EXPLICIT_SEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"â€¢|[•●⚫◦‣∙·・★☆✦✧✱⬤▪♦◆|,;]|\s[/*]\s|\s[–—]\s").unwrap()
});
// Back-to-back and billing words that join two separate acts.
static JOINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:b2b|b3b|vs\.?|versus|feat\.?|ft\.|featuring|presents)\s+").unwrap()
});
// Only a spaced ampersand separates; "R&B" and "A&M" are single tokens.
static AMPERSAND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+&\s*|\s*&\s+").unwrap());
static WS_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}|\t").unwrap());
static PERFORMANCE_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[(\[]?\b(?:live(?:\s+set)?|dj\s+set|a/v|av\s+show|showcase)[)\]]?$").unwrap()
});

const ABBREVIATIONS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "st", "jr", "sr", "mt", "vs", "feat", "ft", "no", "vol", "lt", "sgt",
    "prof", "rev", "bros",
];
const STOPWORDS: &[&str] = &[
    "mc", "dj", "the", "and", "with", "live", "feat", "ft", "vs", "b2b", "x", "presents", "more", "tba",
    "tbc", "guests", "special guests", "and more", "many more", "much more",
];
const NAME_PREFIXES: &[&str] = &[
    "the", "dj", "mc", "lil", "big", "young", "dr", "mr", "ms", "mrs", "lady", "los", "las", "les",
    "el",
];
const NAME_PARTICLES: &[&str] = &[
    "van", "von", "de", "der", "den", "del", "della", "di", "da", "la", "le", "of", "the", "y",
    "du",
];
const CONNECTORS: &[&str] = &["and", "&", "x", "+", "vs", "vs.", "b2b", "with", "feat", "feat.", "ft", "ft."];

/// A piece of a line plus whether it came from the word-window heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub text: String,
    pub heuristic: bool,
}

/// Split a line on explicit separators: glyph bullets, commas, joiner words,
/// sentence periods (not abbreviations) and ampersands (not collaborations).
pub fn split_explicit(line: &str) -> Vec<String> {
    EXPLICIT_SEP_RE
        .split(line)
        .flat_map(|part| JOINER_RE.split(part).map(str::to_string).collect::<Vec<_>>())
        .flat_map(|part| split_periods(&part))
        .flat_map(|part| split_ampersand(&part))
        .filter(|part| !part.trim().is_empty())
        .collect()
}

/// Break an over-long segment on whitespace columns, or failing that into
/// likely name-sized word windows.
pub fn split_long(segment: &str, threshold: usize) -> Vec<Piece> {
    let trimmed = segment.trim();
    if trimmed.chars().count() <= threshold {
        return vec![Piece {
            text: trimmed.to_string(),
            heuristic: false,
        }];
    }

    let columns: Vec<&str> = WS_RUN_RE
        .split(trimmed)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if columns.len() > 1 {
        return columns
            .into_iter()
            .map(|c| Piece {
                text: c.to_string(),
                heuristic: false,
            })
            .collect();
    }

    word_windows(trimmed)
        .into_iter()
        .map(|text| Piece {
            text,
            heuristic: true,
        })
        .collect()
}

/// Group words into "DJ X", "The X", "X van Y" and title-case pairs.
pub fn word_windows(text: &str) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let n = tokens.len();
    let mut out = Vec::new();
    let mut i = 0;

    while i < n {
        let current = tokens[i];
        if is_one_of(current, CONNECTORS) {
            i += 1;
            continue;
        }

        let next = tokens.get(i + 1).copied();
        let after = tokens.get(i + 2).copied();

        if is_one_of(current, NAME_PREFIXES) {
            if let Some(next) = next.filter(|t| !is_one_of(t, CONNECTORS)) {
                out.push(format!("{} {}", current, next));
                i += 2;
                continue;
            }
        }

        if let (Some(mid), Some(last)) = (next, after) {
            if is_one_of(mid, NAME_PARTICLES) && is_name_word(current) && is_name_word(last) {
                out.push(format!("{} {} {}", current, mid, last));
                i += 3;
                continue;
            }
        }

        if let Some(next) = next {
            if is_name_word(current)
                && is_name_word(next)
                && !is_one_of(next, NAME_PREFIXES)
                && !is_one_of(next, CONNECTORS)
            {
                out.push(format!("{} {}", current, next));
                i += 2;
                continue;
            }
        }

        out.push(current.to_string());
        i += 1;
    }

    out
}

/// Normalize whitespace and edges, drop performance suffixes, reject stopwords.
pub fn clean_segment(segment: &str) -> Option<String> {
    let mut text = segment.split_whitespace().collect::<Vec<_>>().join(" ");
    text = trim_edges(&text);

    if let Some(m) = PERFORMANCE_SUFFIX_RE.find(&text) {
        let head = trim_edges(&text[..m.start()]);
        if head.chars().any(char::is_alphanumeric) {
            text = head;
        }
    }
    text = strip_sentence_period(&text);

    if text.chars().count() < 2 || !text.chars().any(char::is_alphanumeric) {
        return None;
    }
    if is_one_of(&text, STOPWORDS) {
        return None;
    }
    Some(text)
}

fn trim_edges(text: &str) -> String {
    let mut t = text
        .trim_matches(|c: char| {
            c.is_whitespace()
                || matches!(
                    c,
                    '-' | '–' | '—' | '_' | ':' | ';' | '"' | '\'' | '“' | '”' | '‘' | '’' | '*'
                        | '+' | '=' | '~' | '<' | '>' | '#'
                )
        })
        .to_string();
    if t.starts_with(['(', '[']) && !t.contains([')', ']']) {
        t = t[1..].trim_start().to_string();
    }
    if t.ends_with([')', ']']) && !t.contains(['(', '[']) {
        t = t[..t.len() - 1].trim_end().to_string();
    }
    t
}

fn split_periods(part: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = part.char_indices().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, &(byte, c)) in chars.iter().enumerate() {
        if c != '.' {
            continue;
        }
        let followed_by_space = chars.get(idx + 1).is_some_and(|(_, n)| n.is_whitespace());
        if !followed_by_space {
            continue;
        }
        let word = part[start..byte].split_whitespace().last().unwrap_or("");
        if is_abbreviation(word) {
            continue;
        }
        pieces.push(part[start..byte].to_string());
        start = byte + c.len_utf8();
    }
    pieces.push(part[start..].to_string());
    pieces
}

fn split_ampersand(part: &str) -> Vec<String> {
    let sides: Vec<&str> = AMPERSAND_RE.split(part).collect();
    if sides.len() < 2 {
        return vec![part.to_string()];
    }
    // "Chase & Status": one word either side is a single act.
    let collaboration =
        sides.len() == 2 && sides.iter().all(|s| s.split_whitespace().count() == 1);
    if collaboration {
        return vec![part.to_string()];
    }
    sides.into_iter().map(str::to_string).collect()
}

fn strip_sentence_period(text: &str) -> String {
    let Some(body) = text.strip_suffix('.') else {
        return text.to_string();
    };
    let last = body.split_whitespace().last().unwrap_or("");
    if last.contains('.') || is_abbreviation(last) {
        text.to_string()
    } else {
        body.to_string()
    }
}

fn is_abbreviation(word: &str) -> bool {
    let word = word.trim_start_matches(|c: char| !c.is_alphanumeric());
    word.contains('.') || word.chars().count() == 1 || is_one_of(word, ABBREVIATIONS)
}

fn is_name_word(word: &str) -> bool {
    word.chars()
        .next()
        .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit())
}

fn is_one_of(word: &str, list: &[&str]) -> bool {
    let lower = word.to_lowercase();
    list.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bullets_and_commas() {
        assert_eq!(split_explicit("Soul Clap • Justin Martin"), vec!["Soul Clap ", " Justin Martin"]);
        assert_eq!(split_explicit("A, B ⚫ C · D").len(), 4);
        assert_eq!(split_explicit("Soul Clap â€¢ Justin Martin").len(), 2);
    }

    #[test]
    fn separators_only() {
        assert!(split_explicit("• • ,").is_empty());
    }

    #[test]
    fn ampersand_collaborations_stay_whole() {
        assert_eq!(split_explicit("Chase & Status"), vec!["Chase & Status"]);
        assert_eq!(split_explicit("R&B Night").len(), 1);
        assert_eq!(
            split_explicit("Claude VonStroke & Justin Martin"),
            vec!["Claude VonStroke", "Justin Martin"]
        );
    }

    #[test]
    fn periods_respect_abbreviations() {
        assert_eq!(split_explicit("Dr. Dre"), vec!["Dr. Dre"]);
        assert_eq!(split_explicit("J. Cole"), vec!["J. Cole"]);
        assert_eq!(split_explicit("M.I.A. Bonobo").len(), 1);
        assert_eq!(split_explicit("Bonobo. Caribou"), vec!["Bonobo", " Caribou"]);
    }

    #[test]
    fn joiner_words() {
        assert_eq!(
            split_explicit("Claude VonStroke B2B Justin Martin"),
            vec!["Claude VonStroke", "Justin Martin"]
        );
    }

    #[test]
    fn long_segment_splits_on_columns() {
        let pieces = split_long("Claude VonStroke     Justin Martin    Soul Clap", 25);
        let texts: Vec<_> = pieces.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Claude VonStroke", "Justin Martin", "Soul Clap"]);
        assert!(pieces.iter().all(|p| !p.heuristic));
    }

    #[test]
    fn long_segment_falls_back_to_word_windows() {
        let pieces = split_long("Claude VonStroke Justin Martin Soul Clap", 25);
        let texts: Vec<_> = pieces.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Claude VonStroke", "Justin Martin", "Soul Clap"]);
        assert!(pieces.iter().all(|p| p.heuristic));
    }

    #[test]
    fn short_segment_untouched() {
        let pieces = split_long("  Soul Clap ", 25);
        assert_eq!(pieces, vec![Piece { text: "Soul Clap".into(), heuristic: false }]);
    }

    #[test]
    fn word_windows_keep_prefixes_and_particles() {
        assert_eq!(
            word_windows("DJ Snake The Chemical Armin van Buuren DE LA SOUL"),
            vec!["DJ Snake", "The Chemical", "Armin van Buuren", "DE LA SOUL"]
        );
        assert_eq!(word_windows("Bonobo and Caribou"), vec!["Bonobo", "Caribou"]);
    }

    #[test]
    fn clean_rejects_stopwords_and_short() {
        assert_eq!(clean_segment("  DJ "), None);
        assert_eq!(clean_segment("THE"), None);
        assert_eq!(clean_segment("x"), None);
        assert_eq!(clean_segment("---"), None);
        assert_eq!(clean_segment("and more"), None);
    }

    #[test]
    fn clean_normalizes() {
        assert_eq!(clean_segment("  Justin    Martin. ").as_deref(), Some("Justin Martin"));
        assert_eq!(clean_segment("- Soul Clap -").as_deref(), Some("Soul Clap"));
        assert_eq!(clean_segment("Bonobo (Live)").as_deref(), Some("Bonobo"));
        assert_eq!(clean_segment("BICEP DJ SET").as_deref(), Some("BICEP"));
        assert_eq!(clean_segment("M.I.A.").as_deref(), Some("M.I.A."));
        assert_eq!(clean_segment("(Sandy) Rivera").as_deref(), Some("(Sandy) Rivera"));
    }
}
