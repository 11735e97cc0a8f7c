//! Literal phrase replacement for final transcripts.
//!
//! Applied by the daemon before a transcript reaches its sink. Phrases come
//! from `[output.replacements]` in the config file; matching is
//! case-insensitive on word boundaries, longest phrase first, so
//! "new paragraph" wins over "new".

use std::collections::BTreeMap;

/// Apply configured phrase replacements to a transcript.
pub fn apply_replacements(text: &str, replacements: &BTreeMap<String, String>) -> String {
    if replacements.is_empty() {
        return text.to_string();
    }

    // Longer phrases match first.
    let mut phrases: Vec<(&String, &String)> = replacements.iter().collect();
    phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut result = text.to_string();
    for (phrase, replacement) in phrases {
        if phrase.is_empty() {
            continue;
        }
        result = replace_phrase(&result, phrase, replacement);
    }
    result
}

/// Replace every case-insensitive occurrence of `phrase` that sits on word
/// boundaries.
///
/// Matching walks `text` itself so every index is a char boundary of the
/// original; lowercasing can change a string's byte length (e.g. 'İ'), so
/// offsets found in a lowercased copy must never be used to slice `text`.
fn replace_phrase(text: &str, phrase: &str, replacement: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(ch) = text[cursor..].chars().next() {
        if let Some(len) = case_insensitive_prefix(&text[cursor..], phrase) {
            let end = cursor + len;
            if on_word_boundaries(text, cursor, end) {
                result.push_str(replacement);
                cursor = end;
                continue;
            }
        }
        result.push(ch);
        cursor += ch.len_utf8();
    }
    result
}

/// Byte length of a case-insensitive match of `phrase` at the start of
/// `text`, if any. Characters compare pairwise, so the returned length
/// always lies on a char boundary of `text`.
fn case_insensitive_prefix(text: &str, phrase: &str) -> Option<usize> {
    let mut len = 0;
    let mut text_chars = text.chars();
    for expected in phrase.chars() {
        let actual = text_chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        len += actual.len_utf8();
    }
    Some(len)
}

fn on_word_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    let after_ok = end == text.len()
        || text[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    before_ok && after_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_map_returns_text_unchanged() {
        assert_eq!(apply_replacements("hello world", &BTreeMap::new()), "hello world");
    }

    #[test]
    fn single_phrase_replaced() {
        let replacements = map(&[("new line", "\n")]);
        assert_eq!(
            apply_replacements("first new line second", &replacements),
            "first \n second"
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let replacements = map(&[("period", ".")]);
        assert_eq!(apply_replacements("end Period", &replacements), "end .");
        assert_eq!(apply_replacements("end PERIOD", &replacements), "end .");
    }

    #[test]
    fn longer_phrases_win() {
        let replacements = map(&[("new", "NEW"), ("new paragraph", "\n\n")]);
        assert_eq!(
            apply_replacements("start new paragraph here", &replacements),
            "start \n\n here"
        );
    }

    #[test]
    fn word_boundary_prevents_partial_match() {
        let replacements = map(&[("comma", ",")]);
        assert_eq!(apply_replacements("commander is here", &replacements), "commander is here");
        assert_eq!(apply_replacements("pause comma go", &replacements), "pause , go");
    }

    #[test]
    fn multiple_occurrences_all_replaced() {
        let replacements = map(&[("comma", ",")]);
        assert_eq!(
            apply_replacements("a comma b comma c", &replacements),
            "a , b , c"
        );
    }

    #[test]
    fn phrase_at_start_and_end() {
        let replacements = map(&[("stop", ".")]);
        assert_eq!(apply_replacements("stop middle stop", &replacements), ". middle .");
    }

    #[test]
    fn non_ascii_text_never_misaligns_offsets() {
        // 'İ' lowercases to two chars, so byte offsets computed on a
        // lowercased copy would not line up with the original text.
        let replacements = map(&[("comma", ",")]);
        assert_eq!(apply_replacements("İ comma", &replacements), "İ ,");
        assert_eq!(
            apply_replacements("İstanbul comma İzmir", &replacements),
            "İstanbul , İzmir"
        );
    }

    #[test]
    fn non_ascii_phrases_match_case_insensitively() {
        let replacements = map(&[("grüß", "greet")]);
        assert_eq!(apply_replacements("GRÜß dich", &replacements), "greet dich");

        let replacements = map(&[("señor", "mr")]);
        assert_eq!(apply_replacements("hola Señor Ruiz", &replacements), "hola mr Ruiz");
    }

    #[test]
    fn empty_phrase_is_ignored() {
        let replacements = map(&[("", "x")]);
        assert_eq!(apply_replacements("untouched", &replacements), "untouched");
    }

    #[test]
    fn replacement_output_not_rescanned() {
        // "dot" -> "period" must not then become "." via the "period" rule
        // within the same phrase pass ordering (longest first: "period" runs
        // before "dot" since it is longer).
        let replacements = map(&[("dot", "period"), ("period", ".")]);
        assert_eq!(apply_replacements("say dot", &replacements), "say period");
    }
}
