//! Validated token and request-scoped claims access.
//!
//! The subject is redacted in Debug output to prevent exposure in logs.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A token whose signature, issuer, audience, and time claims all checked out.
///
/// Only the `TokenGate` constructs these; outside the crate they are read-only.
///
/// ```compile_fail
/// use resource_server::auth::ValidatedToken;
///
/// fn elevate(token: &mut ValidatedToken) {
///     token.subject = Some("admin".to_string());
/// }
/// ```
#[derive(Clone, PartialEq)]
pub struct ValidatedToken {
    pub(crate) issuer: String,
    pub(crate) audience: Vec<String>,
    pub(crate) subject: Option<String>,
    pub(crate) expires_at: i64,
    pub(crate) issued_at: Option<i64>,
    pub(crate) not_before: Option<i64>,
    pub(crate) payload: Map<String, Value>,
}

impl ValidatedToken {
    /// `iss`.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `aud`, normalized to a list.
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// `sub`, if present. Redacted in Debug output.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// `exp` (Unix epoch seconds).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    pub fn not_before(&self) -> Option<i64> {
        self.not_before
    }

    /// Every claim exactly as signed, in payload order.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

/// Custom Debug implementation that redacts the subject.
///
/// The payload is summarized by claim name only, since it carries `sub` too.
impl fmt::Debug for ValidatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedToken")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("subject", &self.subject.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .field("not_before", &self.not_before)
            .field("claim_names", &self.payload.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One `(type, value)` claim pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Flatten a payload into claim pairs.
///
/// Arrays yield one pair per element, in order. Strings are used verbatim,
/// numbers and booleans as JSON text, nested objects and arrays as compact
/// JSON. Nulls produce nothing.
pub fn flatten_claims(payload: &Map<String, Value>) -> Vec<Claim> {
    let mut claims = Vec::with_capacity(payload.len());

    for (name, value) in payload {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(rendered) = render_claim_value(item) {
                        claims.push(Claim::new(name.as_str(), rendered));
                    }
                }
            }
            other => {
                if let Some(rendered) = render_claim_value(other) {
                    claims.push(Claim::new(name.as_str(), rendered));
                }
            }
        }
    }

    claims
}

fn render_claim_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Some(value.to_string())
        }
    }
}

/// Read-only claims accessor attached to an authenticated request.
#[derive(Clone)]
pub struct ClaimsContext {
    token: Arc<ValidatedToken>,
    claims: Arc<[Claim]>,
}

impl fmt::Debug for ClaimsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimsContext")
            .field("token", &self.token)
            .field("claim_count", &self.claims.len())
            .finish()
    }
}

impl ClaimsContext {
    pub fn new(token: ValidatedToken) -> Self {
        let claims = flatten_claims(&token.payload).into();
        Self {
            token: Arc::new(token),
            claims,
        }
    }

    /// The validated token behind this context.
    pub fn token(&self) -> &ValidatedToken {
        &self.token
    }

    /// `sub`, if the token carries one.
    pub fn subject(&self) -> Option<&str> {
        self.token.subject()
    }

    /// The `name` claim.
    pub fn display_name(&self) -> Option<&str> {
        self.find_first("name")
    }

    /// First value of a claim.
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// All values of a claim, in payload order.
    pub fn find_all(&self, claim_type: &str) -> Vec<&str> {
        self.claims
            .iter()
            .filter(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
            .collect()
    }

    /// Granted scopes from `scope` then `scp`.
    ///
    /// String values are split on whitespace. Order and duplicates are kept.
    pub fn scopes(&self) -> Vec<&str> {
        ["scope", "scp"]
            .iter()
            .flat_map(|name| self.find_all(name))
            .flat_map(str::split_whitespace)
            .collect()
    }

    /// Every flattened claim.
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }
}
