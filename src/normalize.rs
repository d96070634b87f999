//! Body normalization: turns a (possibly multipart, possibly HTML) message
//! body into plain text.
//!
//! Selection order:
//! 1. All `text/plain` leaves (tree order), joined by a blank line
//! 2. Otherwise all `text/html` leaves, joined and converted to text
//! 3. Otherwise the top-level leaf decoded directly (converted if it looks like markup)
//!
//! Undecodable leaves contribute an empty string; normalization never fails.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::mailbox::types::{BodyPart, MAX_PART_DEPTH};

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid script/style regex")
});

/// An opening script/style tag that never closes swallows the rest of the document.
static UNCLOSED_SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style)\b.*").expect("valid unclosed script/style regex")
});

static BLOCK_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<br\s*/?>|</?(?:p|div|li|ul|ol|dl|dt|dd|tr|td|th|table|thead|tbody|tfoot|h[1-6]|blockquote|pre|section|article|header|footer|nav|aside|title|hr|address|center)\b[^>]*>",
    )
    .expect("valid block boundary regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid entity regex")
});

static INLINE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid whitespace regex"));

static MARKUP_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<\s*(?:!doctype|html|head|body|div|p|br|span|table|a|img|b|i|strong|em|ul|ol|li|h[1-6])\b[^>]*>",
    )
    .expect("valid markup hint regex")
});

/// Normalize a message body into plain text.
pub fn normalize(body: &BodyPart) -> String {
    let mut plain = Vec::new();
    let mut html = Vec::new();
    collect_text_leaves(body, 0, &mut plain, &mut html);

    if !plain.is_empty() {
        debug!(leaves = plain.len(), "Normalizing from text/plain parts");
        return plain
            .into_iter()
            .map(decode_payload)
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    if !html.is_empty() {
        debug!(leaves = html.len(), "Normalizing from text/html parts");
        let combined = html
            .into_iter()
            .map(decode_payload)
            .collect::<Vec<_>>()
            .join("\n\n");
        return html_to_text(&combined);
    }

    match body {
        BodyPart::Leaf { data, .. } => {
            let decoded = decode_payload(data);
            if looks_like_markup(&decoded) {
                html_to_text(&decoded)
            } else {
                decoded
            }
        }
        BodyPart::Node { .. } => String::new(),
    }
}

/// Depth-first walk partitioning leaves into plain and html buckets.
fn collect_text_leaves<'a>(
    part: &'a BodyPart,
    depth: usize,
    plain: &mut Vec<&'a str>,
    html: &mut Vec<&'a str>,
) {
    if depth > MAX_PART_DEPTH {
        warn!(depth, "Body part tree too deep, ignoring deeper parts");
        return;
    }
    match part {
        BodyPart::Leaf { mime_type, data } => {
            let mime = mime_type.trim();
            if mime.eq_ignore_ascii_case("text/plain") {
                plain.push(data);
            } else if mime.eq_ignore_ascii_case("text/html") {
                html.push(data);
            }
        }
        BodyPart::Node { children } => {
            for child in children {
                collect_text_leaves(child, depth + 1, plain, html);
            }
        }
    }
}

/// Decode a URL-safe base64 payload (padding optional) into text.
///
/// Invalid UTF-8 is replaced; an undecodable payload yields `""`.
pub fn decode_payload(data: &str) -> String {
    let mut normalized: String = data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    if normalized.is_empty() {
        return String::new();
    }
    let remainder = normalized.len() % 4;
    if remainder != 0 {
        normalized.extend(std::iter::repeat_n('=', 4 - remainder));
    }

    match STANDARD.decode(normalized.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(error = %e, "Undecodable body payload, substituting empty text");
            String::new()
        }
    }
}

/// Encode text the way mailboxes carry leaf payloads.
pub fn encode_payload(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text.as_bytes())
}

/// Convert HTML to plain text.
///
/// Drops `script`/`style` elements and comments, breaks lines at block
/// boundaries, strips remaining tags, decodes entities, then trims each line
/// and drops empty ones.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = COMMENT.replace_all(html, "");
    let text = SCRIPT_STYLE.replace_all(&text, "");
    let text = UNCLOSED_SCRIPT_STYLE.replace_all(&text, "");
    let text = BLOCK_BOUNDARY.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(|line| INLINE_WHITESPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn looks_like_markup(text: &str) -> bool {
    MARKUP_HINT.is_match(text)
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "rsquo" => '’',
        "lsquo" => '‘',
        "rdquo" => '”',
        "ldquo" => '“',
        "copy" => '©',
        "reg" => '®',
        _ => return None,
    };
    Some(c)
}
