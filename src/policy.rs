//! Request-level compression policy and the content-type allow-list.

use crate::codec::GZIP;
use crate::encoding::request_accepts;
use crate::error::{Error, Result};
use bytes::Bytes;
use http::Request;
use std::str::FromStr;
use std::sync::Arc;

/// Whether a request's response should be considered for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Decision {
    /// Compress when the client's `Accept-Encoding` allows gzip.
    #[default]
    Negotiate,
    /// Never compress.
    Skip,
    /// Always compress, whatever the client advertises.
    Force,
}

impl Decision {
    /// Resolves this decision against a request.
    pub fn should_compress<B>(self, req: &Request<B>) -> bool {
        match self {
            Decision::Negotiate => request_accepts(req, GZIP),
            Decision::Skip => false,
            Decision::Force => true,
        }
    }
}

/// Per-request policy hook.
pub type PolicyFn = Arc<dyn Fn(&Request<Bytes>) -> Decision + Send + Sync>;

/// One allow-list entry, either `type/subtype` or `type/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypePattern {
    main: String,
    /// `None` matches every subtype.
    sub: Option<String>,
}

impl ContentTypePattern {
    /// Returns whether a `Content-Type` value matches this pattern.
    ///
    /// Parameters such as `charset` are ignored and comparison is
    /// case-insensitive.
    pub fn matches(&self, content_type: &str) -> bool {
        let Some((main, sub)) = essence(content_type).split_once('/') else {
            return false;
        };
        if !main.trim().eq_ignore_ascii_case(&self.main) {
            return false;
        }
        match &self.sub {
            None => true,
            Some(expected) => sub.trim().eq_ignore_ascii_case(expected),
        }
    }
}

impl FromStr for ContentTypePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidContentType(s.to_string());

        let (main, sub) = essence(s).split_once('/').ok_or_else(invalid)?;
        let (main, sub) = (main.trim(), sub.trim());
        if !is_token(main) || main == "*" || !is_token(sub) {
            return Err(invalid());
        }

        Ok(Self {
            main: main.to_ascii_lowercase(),
            sub: (sub != "*").then(|| sub.to_ascii_lowercase()),
        })
    }
}

/// Ordered content-type allow-list. Empty allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes(Vec<ContentTypePattern>);

impl ContentTypes {
    /// Parses every pattern, failing on the first malformed one.
    pub fn parse<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|p| p.as_ref().parse())
            .collect::<Result<Vec<_>>>()
            .map(ContentTypes)
    }

    /// Returns whether a response with this `Content-Type` may be compressed.
    pub fn allows(&self, content_type: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|p| p.matches(content_type))
    }

    /// Returns true when no pattern is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Strips parameters from a media type.
fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    fn request(accept_encoding: Option<&str>) -> Request<()> {
        let mut builder = Request::builder();
        if let Some(value) = accept_encoding {
            builder = builder.header(header::ACCEPT_ENCODING, value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_decisions() {
        let cases = [
            (Decision::Negotiate, false, false),
            (Decision::Negotiate, true, true),
            (Decision::Skip, false, false),
            (Decision::Skip, true, false),
            (Decision::Force, false, true),
            (Decision::Force, true, true),
        ];
        for (decision, advertise, expect) in cases {
            let req = request(advertise.then_some("gzip"));
            assert_eq!(decision.should_compress(&req), expect, "{decision:?} {advertise}");
        }
    }

    #[test]
    fn test_negotiate_rejects_quality_zero() {
        assert!(!Decision::Negotiate.should_compress(&request(Some("gzip;q=0, br"))));
    }

    #[test]
    fn test_exact_match() {
        let types = ContentTypes::parse(["application/json"]).unwrap();
        assert!(types.allows("application/json"));
        assert!(types.allows("Application/Json"));
        assert!(types.allows("application/json; charset=utf-8"));
        assert!(!types.allows("text/xml"));
        assert!(!types.allows("application/jsonp"));
    }

    #[test]
    fn test_wildcard_subtype() {
        let types = ContentTypes::parse(["Text/*"]).unwrap();
        assert!(types.allows("text/plain; charset=utf-8"));
        assert!(types.allows("TEXT/HTML"));
        assert!(!types.allows("application/text"));
    }

    #[test]
    fn test_empty_allows_everything() {
        let types = ContentTypes::default();
        assert!(types.allows("image/png"));
        assert!(types.allows(""));
    }

    #[test]
    fn test_malformed_content_type_never_matches() {
        let types = ContentTypes::parse(["text/*"]).unwrap();
        assert!(!types.allows("text"));
        assert!(!types.allows(""));
    }

    #[test]
    fn test_pattern_parameters_are_ignored() {
        let types = ContentTypes::parse(["text/html; charset=utf-8"]).unwrap();
        assert!(types.allows("text/html"));
    }

    #[test]
    fn test_invalid_patterns() {
        for pattern in ["", "text", "/plain", "text/", "*/*", "text/pl ain", "a/b/c"] {
            assert!(
                matches!(
                    ContentTypes::parse([pattern]),
                    Err(Error::InvalidContentType(_))
                ),
                "{pattern:?} should be rejected"
            );
        }
    }
}
