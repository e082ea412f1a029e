//! Dot-path helpers.
//!
//! Paths address nodes of the model tree: `""` is the root, `"a.0.b"` is key
//! `b` of the first element of array `a`. Bracket notation (`a[0][b]`) is
//! accepted on input and normalized to dots.

/// Converts bracket notation to dot notation and strips one leading dot.
///
/// Only brackets around word characters are rewritten.
///
/// ```
/// use formstate_core::path::normalize;
///
/// assert_eq!(normalize("contacts[0][email]"), "contacts.0.email");
/// assert_eq!(normalize(".name"), "name");
/// assert_eq!(normalize("a[b-c]"), "a[b-c]");
/// ```
#[must_use]
pub fn normalize(model_key: &str) -> String {
    let mut out = String::with_capacity(model_key.len());
    let mut rest = model_key;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) if close > 0 && after[..close].chars().all(is_word_char) => {
                out.push('.');
                out.push_str(&after[..close]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    match out.strip_prefix('.') {
        Some(stripped) => stripped.to_owned(),
        None => out,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a path at its last dot into `(parent, field)`.
///
/// A path without dots has the root `""` as parent.
#[must_use]
pub fn parse_parent_scope(path: &str) -> (&str, &str) {
    match path.rfind('.') {
        Some(dot) => (&path[..dot], &path[dot + 1..]),
        None => ("", path),
    }
}

/// Splits a path at its first dot into `(first, rest)`.
#[must_use]
pub fn parse_root_scope(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    }
}

/// Literal prefix containment: `path` is in `scope` when it starts with it.
///
/// This is a string test, so `"ab"` counts as inside `"a"`. Every path is in
/// the root scope.
#[must_use]
pub fn in_scope(path: &str, scope: &str) -> bool {
    path.starts_with(scope)
}

/// Segment-aware containment: `path` equals `scope` or lies below it.
#[must_use]
pub fn within(path: &str, scope: &str) -> bool {
    scope.is_empty()
        || path == scope
        || (path.starts_with(scope) && path.as_bytes().get(scope.len()) == Some(&b'.'))
}

/// Joins two paths with a dot, treating empty strings as absent.
#[must_use]
pub fn add_scope(scope: &str, model_key: &str) -> String {
    match (scope.is_empty(), model_key.is_empty()) {
        (true, _) => model_key.to_owned(),
        (false, true) => scope.to_owned(),
        (false, false) => format!("{scope}.{model_key}"),
    }
}

/// Nesting depth: `-1` for the root, otherwise the number of dots.
#[must_use]
pub fn scope_length(path: &str) -> isize {
    if path.is_empty() {
        return -1;
    }
    path.bytes().filter(|b| *b == b'.').count() as isize
}

/// Iterates the segments of a path. The root yields a single empty segment.
pub fn segments(path: &str) -> std::str::Split<'_, char> {
    path.split('.')
}

/// Last segment of a path.
#[must_use]
pub fn field_name(path: &str) -> &str {
    parse_parent_scope(path).1
}

/// Turns a camel-case identifier into a sentence-cased phrase.
///
/// ```
/// use formstate_core::path::humanize_camel_case;
///
/// assert_eq!(humanize_camel_case("firstName"), "First name");
/// assert_eq!(humanize_camel_case("email"), "Email");
/// ```
#[must_use]
pub fn humanize_camel_case(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for c in name.chars() {
        match words.last_mut() {
            Some(word) if !c.is_uppercase() => word.push(c),
            _ => words.push(c.to_string()),
        }
    }
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                capitalize(word)
            } else {
                uncapitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn uncapitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
