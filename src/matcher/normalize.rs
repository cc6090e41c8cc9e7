use std::collections::HashSet;
use std::fmt;

/// Whole-token spellings that a plain character substitution would get wrong.
/// Matched against each lowercased whitespace token before `$` and `!` are handled.
const STYLIZED_NAMES: &[(&str, &str)] = &[("p!nk", "pink")];

/// Canonical identity of a name. Only ever compared, never displayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase, apply stylized substitutions, fold diacritics, keep alphanumerics.
///
/// `$` becomes `s` and `!` is dropped before generic stripping, so
/// "A$AP Rocky" and "ASAP Rocky" share a key. ASCII input yields `[a-z0-9]*`.
pub fn normalize(name: &str) -> NormalizedKey {
    let lower = name.trim().to_lowercase();
    let mut key = String::with_capacity(lower.len());
    for token in lower.split_whitespace() {
        let token = STYLIZED_NAMES
            .iter()
            .find(|(stylized, _)| *stylized == token)
            .map_or(token, |&(_, plain)| plain);
        push_folded(&mut key, token);
    }
    NormalizedKey(key)
}

fn push_folded(key: &mut String, token: &str) {
    for c in token.chars() {
        match c {
            '$' => key.push('s'),
            '!' => {}
            c => {
                if let Some(folded) = fold_diacritic(c) {
                    key.push(folded);
                } else if c.is_alphanumeric() {
                    key.push(c);
                }
            }
        }
    }
}

pub fn is_exact_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Intersection-over-union of normalized whitespace tokens, in `0.0..=1.0`.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let ta = token_set(a);
    let tb = token_set(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

fn token_set(s: &str) -> HashSet<NormalizedKey> {
    s.split_whitespace()
        .map(normalize)
        .filter(|k| !k.is_empty())
        .collect()
}

fn fold_diacritic(c: char) -> Option<char> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ğ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => 'i',
        'ł' | 'ľ' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ř' => 'r',
        'ś' | 'š' | 'ş' => 's',
        'ť' | 'ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_special_characters_and_spaces() {
        let cases = [
            ("The Artist!", "theartist"),
            ("DJ Snake", "djsnake"),
            ("A$AP Rocky", "asaprocky"),
            ("Deadmau5", "deadmau5"),
            ("Ty Dolla $ign", "tydollasign"),
            ("P!nk", "pink"),
            ("Blink-182", "blink182"),
            ("   A$AP   Rocky   ", "asaprocky"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize(input).as_str(), expected, "input: {input}");
        }
    }

    #[test]
    fn case_insensitive() {
        for input in ["DEADMAU5", "DeadMau5", "deadMAU5"] {
            assert_eq!(normalize(input).as_str(), "deadmau5");
        }
        assert_eq!(normalize("P!NK").as_str(), "pink");
        assert_eq!(normalize("A$AP ROCKY"), normalize("ASAP Rocky"));
    }

    #[test]
    fn idempotent() {
        for input in ["A$AP Rocky", "P!nk", "Tiësto", "Røyksopp", "!!!", "Blink-182"] {
            let once = normalize(input);
            assert_eq!(normalize(once.as_str()), once, "input: {input}");
        }
    }

    #[test]
    fn stylized_spellings_only_replace_whole_tokens() {
        assert_eq!(normalize("Sp!nky").as_str(), "spnky");
        assert_eq!(normalize("P!nkish").as_str(), "pnkish");
        assert_eq!(normalize("P!nk Floyd").as_str(), "pinkfloyd");
        assert_eq!(normalize("Featuring  P!NK").as_str(), "featuringpink");
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(normalize("Röyksopp").as_str(), "royksopp");
        assert_eq!(normalize("Tiësto").as_str(), "tiesto");
        assert_eq!(normalize("MØ").as_str(), "mo");
    }

    #[test]
    fn exact_match() {
        assert!(is_exact_match("P!nk", "Pink"));
        assert!(is_exact_match("The-Artist", "The Artist"));
        assert!(is_exact_match("Ty Dolla $ign", "Ty Dolla Sign"));
        assert!(!is_exact_match("The Artist", "The Artists"));
        assert!(!is_exact_match("DJ Snake", "DJ Shadow"));
    }

    #[test]
    fn similarity_is_jaccard_over_tokens() {
        assert_eq!(token_similarity("Soul Clap", "soul clap"), 1.0);
        assert_eq!(token_similarity("Justin Martin", "Justin Bieber"), 1.0 / 3.0);
        assert_eq!(token_similarity("Justin Martin", "Soul Clap"), 0.0);
        assert_eq!(token_similarity("", "Soul Clap"), 0.0);
    }
}
