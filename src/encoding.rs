//! `Accept-Encoding` parsing and negotiation.

use http::{Request, header};
use std::collections::HashMap;

/// Quality assigned to a coding that carries no usable `q` parameter.
const DEFAULT_QVALUE: f64 = 1.0;

/// Content-codings advertised by a client, mapped to their quality values.
///
/// Names are stored lower-cased. When a coding appears more than once the
/// last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Codings(HashMap<String, f64>);

impl Codings {
    /// Returns the quality for `coding`, or `None` if it was not mentioned.
    pub fn quality(&self, coding: &str) -> Option<f64> {
        self.0.get(&coding.to_ascii_lowercase()).copied()
    }

    /// Returns whether `coding` was mentioned with a strictly positive quality.
    pub fn accepts(&self, coding: &str) -> bool {
        self.quality(coding).is_some_and(|q| q > 0.0)
    }

    /// Number of distinct codings.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no coding was parsed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A non-fatal problem found while parsing an `Accept-Encoding` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodingError {
    /// A list element with no coding name, e.g. `gzip, , br`.
    #[error("empty content-coding")]
    EmptyCoding,

    /// A `q` parameter that is not a number.
    #[error("invalid qvalue {value:?} for coding {coding:?}")]
    InvalidQuality {
        /// Coding the parameter belonged to.
        coding: String,
        /// Raw parameter value.
        value: String,
    },
}

/// Parses a list of codings as found in an `Accept-Encoding` header.
///
/// Parsing is forgiving: the returned map always holds every coding that
/// could be recovered, and the problems encountered along the way are
/// returned next to it. Quality values are clamped into `[0, 1]`; a coding
/// with a malformed one is left out, as if it had not been listed.
pub fn parse_encodings(value: &str) -> (Codings, Vec<CodingError>) {
    let mut codings = HashMap::new();
    let mut errors = Vec::new();

    for element in value.split(',') {
        if let Some((coding, quality)) = parse_coding(element, &mut errors) {
            codings.insert(coding, quality);
        }
    }

    (Codings(codings), errors)
}

/// Parses a single element like `gzip` or `br;q=0.8`.
fn parse_coding(element: &str, errors: &mut Vec<CodingError>) -> Option<(String, f64)> {
    let mut parts = element.split(';');
    let coding = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    if coding.is_empty() {
        errors.push(CodingError::EmptyCoding);
        return None;
    }

    let mut quality = DEFAULT_QVALUE;
    for param in parts {
        let param = param.trim();
        let Some(raw) = param
            .strip_prefix("q=")
            .or_else(|| param.strip_prefix("Q="))
        else {
            continue;
        };

        match raw.trim().parse::<f64>() {
            Ok(q) if !q.is_nan() => quality = q.clamp(0.0, 1.0),
            _ => {
                errors.push(CodingError::InvalidQuality {
                    coding,
                    value: raw.to_string(),
                });
                return None;
            }
        }
    }

    Some((coding, quality))
}

/// Returns whether an `Accept-Encoding` value accepts `coding`.
///
/// A missing header, a coding that is not listed, and `q=0` all mean no.
pub fn accepts(value: Option<&str>, coding: &str) -> bool {
    let Some(value) = value else {
        return false;
    };

    let (codings, errors) = parse_encodings(value);
    if !errors.is_empty() {
        tracing::trace!(?errors, "ignoring malformed accept-encoding elements");
    }
    codings.accepts(coding)
}

/// Returns whether the request advertises support for `coding`.
///
/// Repeated `Accept-Encoding` fields are combined as one list.
pub fn request_accepts<B>(req: &Request<B>, coding: &str) -> bool {
    let values: Vec<&str> = req
        .headers()
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    if values.is_empty() {
        return false;
    }
    accepts(Some(&values.join(",")), coding)
}
