//! Embedded external content
//!
//! An embed is a block-level decorator: it carries a validated absolute
//! `http`/`https` URL and a pixel size, and has no inline children.

use serde_json::{Map, Value};
use url::{Host, Url};

use super::Alignment;
use crate::error::ValidationError;

/// Width used when none is given
pub const DEFAULT_WIDTH: &str = "560";
/// Height used when none is given
pub const DEFAULT_HEIGHT: &str = "315";

/// An `embed` node
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedNode {
    /// Normalized absolute URL
    pub url: String,
    /// Width in pixels, as a digit string
    pub width: String,
    /// Height in pixels, as a digit string
    pub height: String,
    /// Block alignment
    pub align: Alignment,
    /// Keys we don't interpret, written back as-is
    pub extra: Map<String, Value>,
}

impl EmbedNode {
    /// Create a validated embed
    ///
    /// The URL is normalized (`example.com/video` becomes
    /// `https://example.com/video`). Empty dimensions fall back to
    /// 560x315. Nothing is created if validation fails.
    pub fn new(url: &str, width: &str, height: &str) -> Result<Self, ValidationError> {
        let url = normalize_url(url)?;
        let width = parse_dimension("width", width, DEFAULT_WIDTH)?;
        let height = parse_dimension("height", height, DEFAULT_HEIGHT)?;

        Ok(Self {
            url: url.into(),
            width,
            height,
            align: Alignment::None,
            extra: Map::new(),
        })
    }

    /// Set the block alignment
    pub fn with_alignment(mut self, align: Alignment) -> Self {
        self.align = align;
        self
    }

    /// Re-check the stored URL (fields are public and may have been changed)
    pub fn validate(&self) -> Result<Url, ValidationError> {
        let url = normalize_url(&self.url)?;
        parse_dimension("width", &self.width, DEFAULT_WIDTH)?;
        parse_dimension("height", &self.height, DEFAULT_HEIGHT)?;
        Ok(url)
    }
}

/// Parse and normalize an embed URL
///
/// Input without a scheme gets `https://`. The result must be `http` or
/// `https` with a real host (a dotted domain, `localhost`, or an IP).
pub fn normalize_url(input: &str) -> Result<Url, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "URL is empty"));
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(input, &e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    }

    match url.host() {
        Some(Host::Domain(domain)) if domain == "localhost" || domain.contains('.') => {}
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {}
        Some(Host::Domain(_)) => return Err(invalid(input, "host is not a domain name")),
        None => return Err(invalid(input, "missing host")),
    }

    Ok(url)
}

/// Whether `s` starts with `scheme:`
///
/// `example.com:8080/x` and `localhost:3000` read as host:port, not as a
/// scheme, so they still get `https://` prepended.
fn has_scheme(s: &str) -> bool {
    if s.contains("://") {
        return true;
    }
    let Some((scheme, rest)) = s.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid_chars = chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-');
    let looks_like_port = rest.chars().next().is_some_and(|c| c.is_ascii_digit());

    starts_alpha && valid_chars && !looks_like_port
}

/// Accept a pixel size as a digit string; empty means `default`
pub(crate) fn parse_dimension(
    field: &'static str,
    value: &str,
    default: &str,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(default.to_string());
    }
    match trimmed.parse::<u32>() {
        Ok(px) if px > 0 && trimmed.bytes().all(|b| b.is_ascii_digit()) => Ok(px.to_string()),
        _ => Err(ValidationError::InvalidDimension {
            field,
            value: value.to_string(),
        }),
    }
}

fn invalid(url: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
