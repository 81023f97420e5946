use std::collections::HashMap;

/// Tokenize text into one symbol per non-whitespace character, in order.
///
/// Whitespace (anything `char::is_whitespace` accepts, including U+3000) is
/// dropped. No case folding or normalization is applied, so the same function
/// serves index build and query time for scripts without word boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(String::from)
        .collect()
}

/// Count occurrences of each symbol in a token sequence.
pub fn term_frequencies(tokens: &[String]) -> HashMap<&str, u32> {
    let mut freqs = HashMap::new();
    for t in tokens {
        *freqs.entry(t.as_str()).or_insert(0) += 1;
    }
    freqs
}
