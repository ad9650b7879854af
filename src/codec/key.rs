//! Key Codec Module
//!
//! Renders structured logical keys into physical store keys.
//!
//! Layout:
//! - data entries: `{prefix}:{namespace}:{part}:...:v{version}`
//! - bookkeeping: `{prefix}:__{kind}:...`
//!
//! Parts are percent-escaped (`%` and `:`), so rendering is injective, and
//! user namespaces may not start with `__`, so data and bookkeeping keys
//! never share a prefix. Every data key carries exactly one trailing version
//! segment, which keeps versioned keys distinct from any other logical key.

use std::fmt;

use crate::codec::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

const RESERVED_PREFIX: &str = "__";

// == Cache Key ==
/// A structured logical key: a namespace plus ordered components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    parts: Vec<String>,
}

impl CacheKey {
    /// Builds a key, validating the namespace and every component.
    ///
    /// # Arguments
    /// * `namespace` - ASCII letters, digits, `_`, `-` or `.`; must not start with `__`
    /// * `parts` - non-empty components without control characters
    pub fn new<I, S>(namespace: &str, parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_namespace(namespace)?;

        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() {
            return Err(CacheError::InvalidKey(format!(
                "key in namespace '{}' has no components",
                namespace
            )));
        }
        for part in &parts {
            if part.is_empty() {
                return Err(CacheError::InvalidKey(format!(
                    "empty component in namespace '{}'",
                    namespace
                )));
            }
            if part.chars().any(char::is_control) {
                return Err(CacheError::InvalidKey(format!(
                    "control character in component {:?}",
                    part
                )));
            }
        }

        Ok(Self {
            namespace: namespace.to_string(),
            parts,
        })
    }

    /// Shorthand for a key with a single component.
    pub fn single(namespace: &str, part: impl Into<String>) -> Result<Self> {
        Self::new(namespace, [part.into()])
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        for part in &self.parts {
            write!(f, "/{}", part)?;
        }
        Ok(())
    }
}

// == Key Codec ==
/// Renders logical keys and bookkeeping keys under one store prefix.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    // == Constructor ==
    /// Creates a codec rooted at `prefix`.
    pub fn new(prefix: &str) -> Result<Self> {
        if prefix.is_empty() || !prefix.chars().all(is_name_char) {
            return Err(CacheError::InvalidKey(format!(
                "invalid key prefix {:?}",
                prefix
            )));
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // == Render ==
    /// Renders the unversioned base of a logical key.
    ///
    /// The base identifies the logical key in tag sets, dependency sets and
    /// version counters.
    pub fn render(&self, key: &CacheKey) -> Result<String> {
        let mut rendered = format!("{}:{}", self.prefix, key.namespace);
        for part in &key.parts {
            rendered.push(':');
            rendered.push_str(&escape(part));
        }

        if rendered.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidKey(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        Ok(rendered)
    }

    /// Physical data key for a rendered base at a given version.
    pub fn physical(&self, base: &str, version: u64) -> String {
        format!("{}:v{}", base, version)
    }

    /// Counter holding the number of version bumps for a base.
    pub fn version_key(&self, base: &str) -> String {
        self.system("version", base)
    }

    /// Set of bases carrying a tag.
    pub fn tag_key(&self, tag: &str) -> String {
        self.system("tag", &escape(tag))
    }

    /// Set of bases that depend on `base`.
    pub fn dependents_key(&self, base: &str) -> String {
        self.system("rdeps", base)
    }

    /// Set of bases that `base` depends on.
    pub fn dependencies_key(&self, base: &str) -> String {
        self.system("deps", base)
    }

    /// Counter for one rate window bucket of an accounting scheme.
    pub fn rate_key(&self, scheme: &str, identity: &str, window_secs: u64, bucket: i64) -> String {
        self.system(
            "rate",
            &format!("{}:{}:{}:{}", scheme, escape(identity), window_secs, bucket),
        )
    }

    fn system(&self, kind: &str, rest: &str) -> String {
        format!("{}:{}{}:{}", self.prefix, RESERVED_PREFIX, kind, rest)
    }
}

// == Helpers ==
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() || !namespace.chars().all(is_name_char) {
        return Err(CacheError::InvalidKey(format!(
            "invalid namespace {:?}",
            namespace
        )));
    }
    if namespace.starts_with(RESERVED_PREFIX) {
        return Err(CacheError::InvalidKey(format!(
            "namespace {:?} uses the reserved '{}' prefix",
            namespace, RESERVED_PREFIX
        )));
    }
    Ok(())
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}
