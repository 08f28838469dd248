//! Turns a normalized string into its set of character q-grams.

const Q: usize = 2;
const PAD: char = '_';

/// Returns the deduplicated set of length-2 q-grams of `normalized`.
///
/// The string is padded with one `_` sentinel on each side before slicing so
/// that, e.g., `"al"` contributes `"_a"`, `"al"`, `"l_"`. An empty input
/// produces the empty set; an input shorter than the q-gram width produces
/// the single unpadded element `{normalized}`.
pub fn qgrams(normalized: &str) -> Vec<String> {
    if normalized.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < Q {
        return vec![normalized.to_string()];
    }

    let padded: Vec<char> = std::iter::once(PAD)
        .chain(chars.iter().copied())
        .chain(std::iter::once(PAD))
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for window in padded.windows(Q) {
        let gram: String = window.iter().collect();
        if seen.insert(gram.clone()) {
            out.push(gram);
        }
    }
    out
}
