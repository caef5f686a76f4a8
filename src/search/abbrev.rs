//! Abbreviation scoring for type-ahead queries.
//!
//! A query such as `ffx` is treated as a compressed spelling of a candidate
//! name: every query character must occur in the name, in order, but not
//! necessarily next to each other. The score rewards
//!
//! 1. **Tight windows** - the shortest stretch of the name covering the query.
//! 2. **Coverage** - how much of the whole name the query accounts for.
//! 3. **Word starts** - query characters landing on the first letter of the
//!    name or of a word ("Firefox Web Browser" for `fwb`).
//! 4. **Contiguity** - a gap-free match always outranks a scattered one.
//!
//! Matching is case-insensitive. The result is always within `[0, 1]`.

/// Weight of the window tightness term against whole-name coverage.
const WINDOW_WEIGHT: f32 = 0.7;
const COVERAGE_WEIGHT: f32 = 0.3;

/// Score `name` against the typed `query`.
///
/// Returns `1.0` for an empty query and `0.0` when the query characters do not
/// all occur in `name` in order.
pub fn score(name: &str, query: &str) -> f32 {
    if query.is_empty() {
        return 1.0;
    }

    let name: Vec<char> = name.chars().flat_map(char::to_lowercase).collect();
    let query: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
    if query.len() > name.len() {
        return 0.0;
    }

    let Some((start, end)) = shortest_window(&name, &query) else {
        return 0.0;
    };
    let window_len = end - start;
    let query_len = query.len() as f32;

    let mut score = query_len / window_len as f32;
    score = score * WINDOW_WEIGHT + (query_len / name.len() as f32) * COVERAGE_WEIGHT;

    // Word-start bonus: characters right after whitespace that the query
    // also contains count as hits, the rest as misses.
    let mut word_hits: u32 = 0;
    let mut misses: u32 = 1;
    for i in start..end.saturating_sub(1) {
        if name[i].is_whitespace() {
            if query.contains(&name[i + 1]) {
                word_hits += 1;
            } else {
                misses += 1;
            }
        }
    }
    // A match on the very first letter counts double.
    if query[0] == name[0] {
        word_hits += 2;
    }
    let good = (4 * word_hits * word_hits) as f32;
    score = (score + 3.0 * good / (good + misses as f32)) / 4.0;

    if window_len == query.len() {
        0.9 + 0.1 * score
    } else {
        0.9 * score
    }
}

/// Half-open `[start, end)` range of the shortest stretch of `name` that
/// contains `query` as a subsequence.
fn shortest_window(name: &[char], query: &[char]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for start in 0..name.len() {
        if name[start] != query[0] {
            continue;
        }
        // A failed greedy match from here fails from every later start too.
        let Some(end) = greedy_end(name, query, start) else {
            break;
        };
        let shorter = best.is_none_or(|(s, e)| end - start < e - s);
        if shorter {
            best = Some((start, end));
            if end - start == query.len() {
                break;
            }
        }
    }
    best
}

fn greedy_end(name: &[char], query: &[char], start: usize) -> Option<usize> {
    let mut q = 0;
    for (i, ch) in name.iter().enumerate().skip(start) {
        if *ch == query[q] {
            q += 1;
            if q == query.len() {
                return Some(i + 1);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_query_scores_one() {
        assert_eq!(score("Firefox", ""), 1.0);
        assert_eq!(score("", ""), 1.0);
    }

    #[test]
    fn out_of_order_characters_score_zero() {
        assert_eq!(score("Firefox", "xf"), 0.0);
        assert_eq!(score("Firefox Web Browser", "rowz"), 0.0);
        assert_eq!(score("ab", "abc"), 0.0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(score("Firefox", "FIRE"), score("firefox", "fire"));
    }

    #[test]
    fn word_start_abbreviation_beats_scattered_letters() {
        let name = "Firefox Web Browser";
        assert!(score(name, "ffx") > score(name, "rowz"));
        assert!(score(name, "fwb") > score(name, "iee"));
    }

    #[test]
    fn contiguous_match_outranks_scattered_match() {
        let name = "Terminal";
        assert!(score(name, "term") > score(name, "tral"));
        assert!(score(name, "min") > 0.9);
        assert!(score(name, "tml") <= 0.9);
    }

    #[test]
    fn shortest_window_is_found() {
        let name: Vec<char> = "xaxxbaab".chars().collect();
        let query: Vec<char> = "ab".chars().collect();
        assert_eq!(shortest_window(&name, &query), Some((6, 8)));
    }

    #[test]
    fn later_unmatched_start_keeps_earlier_window() {
        assert!(score("Firefox", "fr") > 0.0);
        assert!(score("axb a", "ab") > 0.0);
        let name: Vec<char> = "axb a".chars().collect();
        let query: Vec<char> = "ab".chars().collect();
        assert_eq!(shortest_window(&name, &query), Some((0, 3)));
    }

    #[test]
    fn exact_name_is_the_best_query() {
        let name = "Firefox Web Browser";
        let exact = score(name, name);
        for q in ["f", "fi", "fire", "firefox", "fwb", "web browser", "Firefox Web"] {
            assert!(exact >= score(name, q), "query {q} outranked exact match");
        }
    }

    proptest! {
        #[test]
        fn score_stays_in_unit_range(name in "[a-zA-Z ]{0,16}", query in "[a-zA-Z ]{0,6}") {
            let s = score(&name, &query);
            prop_assert!((0.0..=1.0).contains(&s), "score {s} out of range");
        }

        #[test]
        fn exact_match_is_maximal(name in "[a-c ]{1,10}", query in "[a-c ]{1,10}") {
            prop_assert!(score(&name, &name) >= score(&name, &query));
        }

        #[test]
        fn in_order_subsequence_scores_above_zero(
            name in "[a-e ]{1,16}",
            keep in proptest::collection::vec(any::<bool>(), 16),
        ) {
            let query: String = name
                .chars()
                .zip(keep)
                .filter_map(|(ch, kept)| kept.then_some(ch))
                .collect();
            prop_assume!(!query.is_empty());
            prop_assert!(score(&name, &query) > 0.0, "{name:?} / {query:?} scored zero");
        }

        #[test]
        fn missing_character_scores_zero(name in "[a-m]{0,12}", query in "[a-m]{0,4}") {
            let with_stranger = format!("{query}z");
            prop_assert_eq!(score(&name, &with_stranger), 0.0);
        }
    }
}
