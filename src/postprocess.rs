//! Post-processing: deterministic cleanup of LLM-generated text.
//!
//! Two jobs live here:
//!
//! - [`clean_markdown`] tidies the final report before it is shown or
//!   exported. Chat models wrap answers in code fences, open with a chatty
//!   preamble, and invent `example.com` citations; none of that belongs in a
//!   report.
//! - [`extract_json`] pulls the JSON payload out of a reply for the stages
//!   that ask the model for structured output (query lists).
//!
//! ## Rule Order
//!
//! Fences are stripped and line endings normalised first so that preamble
//! and heading detection see clean lines; the final-newline pass runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all report cleanup rules to raw LLM output.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Drop a conversational preamble before the first heading
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Ensure heading lines have a blank line before them
/// 7. Unlink placeholder citations (`[text](https://example.com/…)` → `text`)
/// 8. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 9. Ensure the text ends with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = strip_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    let s = unlink_placeholder_citations(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|json)?[ \t]*\r?\n(.*?)\r?\n```\s*$")
        .expect("valid fence regex")
});

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Drop a conversational preamble ───────────────────────────────────
//
// "Sure! Here is the report you asked for:" followed by the actual document.
// Only a short run of lines ending in ':' before the first heading is
// removed; real introductory paragraphs are left alone.

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(sure|certainly|of course|here is|here's|below is)\b.*:\s*$")
        .expect("valid preamble regex")
});

fn strip_preamble(input: &str) -> String {
    let mut lines = input.lines().enumerate().skip_while(|(_, l)| l.trim().is_empty());
    match lines.next() {
        Some((idx, first)) if RE_PREAMBLE.is_match(first.trim()) => input
            .lines()
            .skip(idx + 1)
            .skip_while(|l| l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => input.to_string(),
    }
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("valid blank-line regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Normalise heading spacing ────────────────────────────────────────

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 64);
    let mut in_code = false;
    for (i, line) in input.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        if !in_code && is_heading(line) && i > 0 {
            let trimmed = result.trim_end_matches('\n');
            result.truncate(trimmed.len());
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rule 7: Unlink placeholder citations ─────────────────────────────────────
//
// Models asked to cite sources sometimes invent links to placeholder hosts.
// The link text is kept, the fake target dropped.

static RE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]*)\)").expect("valid link regex"));

fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    if u.is_empty() || u == "#" || u.eq_ignore_ascii_case("url") || u.eq_ignore_ascii_case("link") {
        return true;
    }
    let fake_domains = ["example.com", "example.org", "placeholder.com", "yourdomain.com"];
    fake_domains.iter().any(|d| u.contains(d))
}

fn unlink_placeholder_citations(input: &str) -> String {
    RE_LINK
        .replace_all(input, |caps: &regex::Captures<'_>| {
            // Image syntax `![alt](…)` is matched from the `[`; leave it alone.
            let start = caps.get(0).map_or(0, |m| m.start());
            if start > 0 && input.as_bytes()[start - 1] == b'!' {
                return caps[0].to_string();
            }
            if is_placeholder_url(&caps[2]) {
                caps[1].to_string()
            } else {
                caps[0].to_string()
            }
        })
        .to_string()
}

// ── Rule 8: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 9: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── JSON extraction ──────────────────────────────────────────────────────────

/// Return the JSON object or array embedded in an LLM reply.
///
/// Accepts a bare payload, a fenced ```json block, or a payload surrounded
/// by prose; the outermost `{…}` / `[…]` span is returned. `None` when the
/// reply contains neither.
pub fn extract_json(reply: &str) -> Option<&str> {
    let body = reply.trim();
    let start = body.find(['{', '['])?;
    let open = body.as_bytes()[start];
    let close = if open == b'{' { '}' } else { ']' };
    let end = body.rfind(close)?;
    (end > start).then(|| &body[start..=end])
}

// ── Tests ────────────────────────────────────────────────────────────────────
