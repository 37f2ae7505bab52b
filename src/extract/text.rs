//! Text and number helpers shared by the section extractors.

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

/// First run of digits with at most one decimal point.
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern is valid"));

/// A decimal-comma number with dot thousands separators, e.g. "1.234,50".
static GROUPED_DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:\.\d{3})+,\d+").expect("grouped decimal pattern is valid")
});

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text content of an element, `None` when it is blank.
pub fn text_of(el: ElementRef<'_>) -> Option<String> {
    let raw: String = el.text().collect();
    non_empty(normalize_whitespace(&raw))
}

pub fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Join the present fragments with single spaces; `None` if nothing remains.
pub fn join_fragments<I>(fragments: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let parts: Vec<String> = fragments.into_iter().flatten().collect();
    non_empty(parts.join(" "))
}

/// First numeric match in `text` as a float.
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER.find(text)?.as_str().parse().ok()
}

/// Integer part of the first numeric match in `text`.
pub fn first_integer(text: &str) -> Option<i64> {
    let matched = NUMBER.find(text)?.as_str();
    let integer = matched.split('.').next()?;
    integer.parse().ok()
}

/// Rewrite decimal commas to decimal points.
///
/// Dots are dropped only inside a grouped number ("1.234,50" becomes
/// "1234.50"); dots elsewhere in the text are left alone.
pub fn normalize_decimal_comma(text: &str) -> String {
    GROUPED_DECIMAL
        .replace_all(text, |caps: &regex::Captures<'_>| caps[0].replace('.', ""))
        .replace(',', ".")
}

/// True for `h1`..`h6`.
pub fn is_heading(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}
