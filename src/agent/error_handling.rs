// tabchat - Tab-scoped AI chat client with streaming response orchestration
// Copyright (C) 2025  Simon Peter Rothgang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerErrorClass {
    RateLimit,
    AuthRequired,
    ContextLength,
    Internal,
    Other,
}

pub fn classify_producer_error(input: &str) -> ProducerErrorClass {
    let lower = input.to_ascii_lowercase();
    if looks_like_rate_limit_error_lower(&lower) {
        ProducerErrorClass::RateLimit
    } else if looks_like_auth_required_error_lower(&lower) {
        ProducerErrorClass::AuthRequired
    } else if looks_like_context_length_error_lower(&lower) {
        ProducerErrorClass::ContextLength
    } else if looks_like_internal_error_lower(&lower) {
        ProducerErrorClass::Internal
    } else {
        ProducerErrorClass::Other
    }
}

/// Text placed into the system turn that replaces a failed response.
pub fn format_producer_error(input: &str) -> String {
    let detail = summarize_error(input);
    match classify_producer_error(input) {
        ProducerErrorClass::RateLimit => {
            format!("Error: the AI platform is rate limiting requests. Try again later. ({detail})")
        }
        ProducerErrorClass::AuthRequired => {
            format!("Error: you are not signed in to the AI platform. ({detail})")
        }
        ProducerErrorClass::ContextLength => format!(
            "Error: the conversation is too long for this model. Clear the tab. ({detail})"
        ),
        ProducerErrorClass::Internal => format!("Error: internal producer failure. ({detail})"),
        ProducerErrorClass::Other => format!("Error: {detail}"),
    }
}

pub fn summarize_error(input: &str) -> String {
    if let Some(msg) = extract_json_string_field(input, "message") {
        return truncate_for_log(&msg);
    }
    let fallback = input.lines().find(|line| !line.trim().is_empty()).unwrap_or(input);
    truncate_for_log(fallback.trim())
}

fn looks_like_rate_limit_error_lower(lower: &str) -> bool {
    ["rate limit", "rate-limit", "quota", "too many requests", "usage limit"]
        .iter()
        .any(|needle| lower.contains(needle))
        || contains_status_code(lower, "429")
}

fn looks_like_auth_required_error_lower(lower: &str) -> bool {
    [
        "auth required",
        "authentication failed",
        "please log in",
        "login required",
        "not authenticated",
        "unauthorized",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
        || contains_status_code(lower, "401")
}

fn looks_like_context_length_error_lower(lower: &str) -> bool {
    ["context length", "context_length", "maximum context", "too many tokens", "prompt is too long"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn looks_like_internal_error_lower(lower: &str) -> bool {
    [
        "internal error",
        "internal server error",
        "bridge",
        "transport",
        "connection closed",
        "channel closed",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
        || contains_status_code(lower, "500")
}

/// `code` as a standalone number, so "1500 tokens" does not match "500".
fn contains_status_code(lower: &str, code: &str) -> bool {
    lower.match_indices(code).any(|(start, _)| {
        let before = lower[..start].chars().next_back();
        let after = lower[start + code.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

pub(crate) fn truncate_for_log(input: &str) -> String {
    const LIMIT: usize = 240;
    let mut out = String::new();
    for (i, ch) in input.chars().enumerate() {
        if i >= LIMIT {
            out.push_str("...");
            break;
        }
        out.push(ch);
    }
    out.replace('\n', " ")
}

fn extract_json_string_field(input: &str, field: &str) -> Option<String> {
    let needle = format!("\"{field}\"");
    let start = input.find(&needle)? + needle.len();
    let rest = input[start..].trim_start();
    let colon_idx = rest.find(':')?;
    let mut chars = rest[colon_idx + 1..].trim_start().chars();
    if chars.next()? != '"' {
        return None;
    }

    let mut escaped = false;
    let mut out = String::new();
    for ch in chars {
        if escaped {
            out.push(match ch {
                'n' => '\n',
                't' => '\t',
                _ => ch,
            });
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => return Some(out),
            _ => out.push(ch),
        }
    }
    None
}
