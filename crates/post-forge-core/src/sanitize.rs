// crates/post-forge-core/src/sanitize.rs
// ============================================================================
// Module: Post Forge Sanitizer
// Description: Contextual input cleansing for ingress, listing, and storage.
// Purpose: Keep hostile or malformed text out of prompts, HTML, and the store.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Three pure cleansing contexts:
//! - [`ingress`] runs on all forum content before any prompt injection.
//! - [`listing`] runs on generated content before it reaches the storefront;
//!   it is intentionally aggressive and will mangle raw HTML blocks.
//! - [`store`] runs on externally sourced bytes before any database write.
//!
//! All three are idempotent: applying a function to its own output is a
//! no-op. [`ingress`] decodes entities to a fixpoint so nested encodings
//! cannot smuggle content past a single pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sanitizer errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    /// The input is not valid UTF-8.
    #[error("invalid utf-8 at byte {position}")]
    InvalidUtf8 {
        /// Byte offset of the first invalid sequence.
        position: usize,
    },
}

// ============================================================================
// SECTION: Ingress Context
// ============================================================================

/// Upper bound on decode passes; real content stabilizes in one or two.
const MAX_DECODE_PASSES: usize = 16;

/// Cleans forum content before prompt injection.
///
/// Strips ASCII control characters except LF, removes NUL, and decodes HTML
/// entities to a fixpoint. Meaningful punctuation is left untouched.
#[must_use]
pub fn ingress(text: &str) -> String {
    let mut current = strip_controls(text);
    for _ in 0..MAX_DECODE_PASSES {
        let decoded = strip_controls(&decode_entities(&current));
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

/// Removes ASCII control characters except LF.
fn strip_controls(text: &str) -> String {
    text.chars().filter(|ch| *ch == '\n' || !ch.is_ascii_control()).collect()
}

/// Decodes one pass of HTML entities; unrecognized sequences pass through.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'&' {
            if let Some((decoded, consumed)) = decode_entity_at(&text[index..]) {
                out.push(decoded);
                index += consumed;
                continue;
            }
        }
        let ch = next_char(text, index);
        out.push(ch);
        index += ch.len_utf8();
    }
    out
}

/// Returns the char starting at a known boundary.
fn next_char(text: &str, index: usize) -> char {
    text[index..].chars().next().unwrap_or('\u{fffd}')
}

/// Decodes a single entity at the start of `rest`, returning the character
/// and the number of bytes consumed.
fn decode_entity_at(rest: &str) -> Option<(char, usize)> {
    let semicolon = find_semicolon(rest)?;
    let body = &rest[1..semicolon];
    let consumed = semicolon + 1;
    let decoded = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        _ => decode_numeric_entity(body)?,
    };
    Some((decoded, consumed))
}

/// Entity bodies longer than this are not entities.
const MAX_ENTITY_BYTES: usize = 32;

/// Finds the terminating semicolon of a candidate entity, searching bytes so
/// multi-byte characters in the window cannot split a slice.
fn find_semicolon(rest: &str) -> Option<usize> {
    rest.as_bytes()
        .iter()
        .take(MAX_ENTITY_BYTES)
        .position(|byte| *byte == b';')
}

/// Decodes `#NN` / `#xHH` entity bodies.
fn decode_numeric_entity(body: &str) -> Option<char> {
    let digits = body.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

// ============================================================================
// SECTION: Listing Context
// ============================================================================

/// Elements removed together with their content.
const CONTAINER_ELEMENTS: [&str; 2] = ["script", "iframe"];
/// Elements whose tags are removed (content, if any, is left for escaping).
const VOID_ELEMENTS: [&str; 4] = ["object", "embed", "form", "base"];

/// Cleans generated content before it is sent to the storefront.
///
/// Removes script/iframe elements with their content, drops
/// object/embed/form/base tags, strips inline event handlers, neutralizes
/// `javascript:` and `data:text/html` URL schemes, then escapes the
/// remaining HTML metacharacters. The result contains no executable HTML.
#[must_use]
pub fn listing(text: &str) -> String {
    let mut cleaned = text.to_string();
    for element in CONTAINER_ELEMENTS {
        cleaned = remove_container_element(&cleaned, element);
    }
    for element in VOID_ELEMENTS {
        cleaned = remove_tags(&cleaned, element);
    }
    cleaned = strip_event_handlers(&cleaned);
    cleaned = replace_ascii_insensitive(&cleaned, "javascript:", "javascript-blocked:");
    cleaned = replace_ascii_insensitive(&cleaned, "data:text/html", "data:text/plain");
    escape_entities(&cleaned)
}

/// Removes `<element ...> ... </element>` including the content. An unclosed
/// element removes everything to the end of the text.
fn remove_container_element(text: &str, element: &str) -> String {
    let open = format!("<{element}");
    let close = format!("</{element}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = find_tag_start(rest, &open) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start..];
        let Some(close_at) = find_ascii_insensitive(after_open, &close) else {
            return out;
        };
        let tail = &after_open[close_at..];
        match tail.find('>') {
            Some(gt) => rest = &tail[gt + 1..],
            None => return out,
        }
    }
}

/// Removes every `<element ...>` and `</element ...>` tag occurrence.
fn remove_tags(text: &str, element: &str) -> String {
    let open = format!("<{element}");
    let close = format!("</{element}");
    let without_close = remove_single_tags(text, &close);
    remove_single_tags(&without_close, &open)
}

/// Removes tags starting with `prefix` through the next `>`.
fn remove_single_tags(text: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = find_tag_start(rest, prefix) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('>') {
            Some(gt) => rest = &tail[gt + 1..],
            None => return out,
        }
    }
}

/// Finds a tag prefix whose next character ends the tag name.
fn find_tag_start(text: &str, prefix: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = find_ascii_insensitive(&text[from..], prefix) {
        let start = from + found;
        let after = start + prefix.len();
        let boundary = text[after..].chars().next();
        let ends_name =
            boundary.is_none_or(|ch| ch.is_ascii_whitespace() || ch == '>' || ch == '/');
        if ends_name {
            return Some(start);
        }
        from = start + 1;
    }
    None
}

/// Strips `on*=value` inline handler patterns.
fn strip_event_handlers(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut index = 0;
    while index < bytes.len() {
        if let Some(consumed) = event_handler_len(text, index) {
            index += consumed;
            continue;
        }
        let ch = next_char(text, index);
        out.push(ch);
        index += ch.len_utf8();
    }
    out
}

/// Returns the byte length of an `on*=value` pattern at `index`, if one
/// starts there on a word boundary.
fn event_handler_len(text: &str, index: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if index > 0 && bytes[index - 1].is_ascii_alphanumeric() {
        return None;
    }
    let rest = &text[index..];
    if !starts_with_ascii_insensitive(rest, "on") {
        return None;
    }
    let name_len = rest[2..].bytes().take_while(u8::is_ascii_alphabetic).count();
    if name_len == 0 {
        return None;
    }
    let mut cursor = 2 + name_len;
    cursor += rest[cursor..].bytes().take_while(u8::is_ascii_whitespace).count();
    if rest.as_bytes().get(cursor) != Some(&b'=') {
        return None;
    }
    cursor += 1;
    cursor += rest[cursor..].bytes().take_while(u8::is_ascii_whitespace).count();
    let value = &rest[cursor..];
    let value_len = match value.bytes().next() {
        Some(quote @ (b'"' | b'\'')) => {
            value[1..].find(char::from(quote)).map_or(value.len(), |end| end + 2)
        }
        Some(_) => value
            .bytes()
            .take_while(|byte| !byte.is_ascii_whitespace() && *byte != b'>')
            .count(),
        None => 0,
    };
    Some(cursor + value_len)
}

/// Escapes HTML metacharacters, leaving existing entities untouched so the
/// transform stays idempotent.
fn escape_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        let ch = next_char(text, index);
        match ch {
            '&' if !is_entity_start(&text[index..]) => out.push_str("&amp;"),
            '&' => out.push('&'),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
        index += ch.len_utf8();
    }
    out
}

/// Returns whether `rest` begins with a well-formed entity.
fn is_entity_start(rest: &str) -> bool {
    let Some(semicolon) = find_semicolon(rest) else {
        return false;
    };
    let body = &rest[1..semicolon];
    if body.is_empty() {
        return false;
    }
    if let Some(digits) = body.strip_prefix('#') {
        let digits = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')).unwrap_or(digits);
        return !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_hexdigit());
    }
    body.bytes().all(|byte| byte.is_ascii_alphabetic())
}

// ============================================================================
// SECTION: Store Context
// ============================================================================

/// Validates and cleans externally sourced bytes before a database write.
///
/// # Errors
///
/// Returns [`SanitizeError::InvalidUtf8`] when the bytes are not valid
/// UTF-8; nothing is repaired or replaced.
pub fn store(input: &[u8]) -> Result<String, SanitizeError> {
    let text = std::str::from_utf8(input).map_err(|error| SanitizeError::InvalidUtf8 {
        position: error.valid_up_to(),
    })?;
    Ok(text.chars().filter(|ch| *ch != '\0').collect())
}

// ============================================================================
// SECTION: ASCII Helpers
// ============================================================================

/// Case-insensitive ASCII substring search.
fn find_ascii_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let hay = haystack.as_bytes();
    let ndl = needle.as_bytes();
    hay.windows(ndl.len()).position(|window| window.eq_ignore_ascii_case(ndl))
}

/// Case-insensitive ASCII prefix check.
fn starts_with_ascii_insensitive(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Case-insensitive ASCII replace-all.
fn replace_ascii_insensitive(text: &str, needle: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(found) = find_ascii_insensitive(rest, needle) {
        out.push_str(&rest[..found]);
        out.push_str(replacement);
        rest = &rest[found + needle.len()..];
    }
    out.push_str(rest);
    out
}
