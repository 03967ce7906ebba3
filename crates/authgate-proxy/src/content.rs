//! Response body rewriting.
//!
//! Text-like upstream responses are buffered and rewritten so that every
//! reference to the upstream origin points back through the gateway. Three
//! strategies stack up:
//!
//! 1. literal replacement of the upstream origin string, for all text types
//! 2. for HTML, insertion of the proxy prefix into root-relative
//!    `href`/`src`/`action`/`formaction` attribute values, double or single
//!    quoted
//! 3. for JSON, a structural walk that rewrites string values, falling back
//!    to the literal strategy when the body does not parse
//!
//! Rewriting never fails a response: when nothing applies the original body
//! passes through unchanged.
//!
//! This is a best-effort text transform, not an HTML or JS parser. Unquoted
//! attribute values and URLs built up at runtime by minified scripts are not
//! rewritten; the literal origin replacement still catches most of those
//! when the full origin appears in the text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Context for a single response rewrite.
#[derive(Debug, Clone)]
pub struct RewriteContext<'a> {
    /// Upstream origin literal, e.g. `https://idp.example.com`.
    pub upstream_origin: &'a str,
    /// Replacement, e.g. `https://gw.example.com/oidc`.
    pub gateway_base: &'a str,
    /// The proxy prefix alone, e.g. `/oidc`.
    pub proxy_prefix: &'a str,
}

/// Whether a content type should be buffered and rewritten.
#[must_use]
pub fn is_text_like(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.contains("json")
        || essence.contains("javascript")
        || essence.contains("xml")
        || essence.contains("x-www-form-urlencoded")
}

fn is_html(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.starts_with("text/html") || lower.starts_with("application/xhtml")
}

fn is_json(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}

/// Rewrite a buffered text body according to its content type.
#[must_use]
pub fn rewrite_body(body: &str, content_type: &str, ctx: &RewriteContext<'_>) -> String {
    if is_json(content_type) {
        return rewrite_json(body, ctx);
    }
    let replaced = replace_origin(body, ctx);
    if is_html(content_type) {
        rewrite_html_attributes(&replaced, ctx)
    } else {
        replaced
    }
}

fn replace_origin(body: &str, ctx: &RewriteContext<'_>) -> String {
    body.replace(ctx.upstream_origin, ctx.gateway_base)
}

/// Prefix root-relative attribute URLs that are not already under the proxy
/// prefix. Attributes already pointing at the prefix stay put, which makes
/// the rewrite idempotent.
fn rewrite_html_attributes(body: &str, ctx: &RewriteContext<'_>) -> String {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    let re = ATTR.get_or_init(|| {
        Regex::new(r#"(?i)\b(href|src|action|formaction)=(?:"(/[^"]*)"|'(/[^']*)')"#)
            .expect("attribute pattern is valid")
    });
    let prefix = ctx.proxy_prefix.trim_end_matches('/');
    re.replace_all(body, |caps: &regex::Captures<'_>| {
        let attr = &caps[1];
        let (quote, value) = match (caps.get(2), caps.get(3)) {
            (Some(double), _) => ('"', double.as_str()),
            (None, Some(single)) => ('\'', single.as_str()),
            (None, None) => return caps[0].to_string(),
        };
        if value == prefix || value.starts_with(&format!("{prefix}/")) {
            caps[0].to_string()
        } else {
            format!("{attr}={quote}{prefix}{value}{quote}")
        }
    })
    .into_owned()
}

/// Structurally rewrite JSON string values that start with the upstream
/// origin. Unparseable bodies fall back to the literal replacement.
fn rewrite_json(body: &str, ctx: &RewriteContext<'_>) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(mut value) => {
            rewrite_json_value(&mut value, ctx);
            serde_json::to_string(&value).unwrap_or_else(|_| replace_origin(body, ctx))
        }
        Err(_) => replace_origin(body, ctx),
    }
}

fn rewrite_json_value(value: &mut Value, ctx: &RewriteContext<'_>) {
    match value {
        Value::String(s) => {
            if s.starts_with(ctx.upstream_origin) {
                *s = format!("{}{}", ctx.gateway_base, &s[ctx.upstream_origin.len()..]);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_json_value(item, ctx);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                rewrite_json_value(item, ctx);
            }
        }
        _ => {}
    }
}
