//! Authorization for the log service.
//!
//! Every RPC is checked before it touches the log: the transport supplies a
//! *subject* (the caller's identity), the service names the *object* being
//! acted on and the *action*, and the [`Authorizer`] says yes or no.
//!
//! The built-in [`Acl`] implementation is driven by a JSON policy file of
//! entries, each granting or denying an action on an object to a principal.
//! Deny entries win over allows; a request that matches nothing is denied.
//!
//! ## Policy file
//!
//! ```json
//! [
//!   { "principal": "9f2a…", "object": "*", "action": "produce", "effect": "allow" },
//!   { "principal": "9f2a…", "object": "*", "action": "consume", "effect": "allow" },
//!   { "principal": "*",     "object": "*", "action": "consume", "effect": "deny"  }
//! ]
//! ```
//!
//! Principals are the certificate fingerprints handed out by the transport
//! layer (see [`crate::tls`]). Patterns support a `*` wildcard: `*` alone
//! matches anything, a leading or trailing `*` matches a suffix or prefix.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// The single resource the service currently exposes.
pub const OBJECT_WILDCARD: &str = "*";
pub const ACTION_PRODUCE: &str = "produce";
pub const ACTION_CONSUME: &str = "consume";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{subject:?} is not permitted to {action} on {object}")]
    Denied {
        subject: String,
        object: String,
        action: String,
    },

    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed policy file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Decides whether `subject` may perform `action` on `object`.
///
/// Consulted by the service before any log access; a denial must
/// short-circuit the request.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// One policy rule. All three patterns must match for the rule to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal: String,
    pub object: String,
    pub action: String,
    pub effect: Effect,
}

impl AclEntry {
    fn matches(&self, subject: &str, object: &str, action: &str) -> bool {
        pattern_matches(&self.principal, subject)
            && pattern_matches(&self.object, object)
            && pattern_matches(&self.action, action)
    }
}

/// Policy-file-driven [`Authorizer`]: deny overrides allow, default deny.
pub struct Acl {
    entries: Vec<AclEntry>,
}

impl Acl {
    pub fn new(entries: Vec<AclEntry>) -> Self {
        Self { entries }
    }

    /// Load entries from a JSON policy file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&raw)?))
    }

    /// An ACL that permits every request. For development setups without a
    /// policy file; not meant for anything internet-facing.
    pub fn allow_all() -> Self {
        Self::new(vec![AclEntry {
            principal: "*".to_string(),
            object: "*".to_string(),
            action: "*".to_string(),
            effect: Effect::Allow,
        }])
    }
}

impl Authorizer for Acl {
    fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<(), AuthError> {
        let mut allowed = false;
        for entry in &self.entries {
            if !entry.matches(subject, object, action) {
                continue;
            }
            match entry.effect {
                Effect::Deny => {
                    warn!(subject, object, action, "denied by acl entry");
                    return Err(AuthError::Denied {
                        subject: subject.to_string(),
                        object: object.to_string(),
                        action: action.to_string(),
                    });
                }
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Ok(())
        } else {
            warn!(subject, object, action, "no matching acl entry, default deny");
            Err(AuthError::Denied {
                subject: subject.to_string(),
                object: object.to_string(),
                action: action.to_string(),
            })
        }
    }
}

/// `*` wildcard matching: bare `*` matches everything, a trailing `*`
/// matches a prefix, a leading `*` matches a suffix.
fn pattern_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    pattern == value
}
