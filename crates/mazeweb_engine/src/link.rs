//! Value types for building HTTP `Link` entity-headers (RFC 8288 style).
//!
//! These are write-only value objects: a fresh header is built for every
//! response and rendered once via `Display`. Parameters are an ordered list,
//! not a map, because one link may legitimately carry the same parameter name
//! twice (the canonical project link carries both `rel=latest-version` and
//! `rel=edit`).

use std::fmt;

/// A single `name=value` parameter attached to a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParam {
    name: String,
    value: String,
}

impl LinkParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for LinkParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// An individual link: a target reference plus its parameters, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    reference: String,
    params: Vec<LinkParam>,
}

impl Link {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            params: vec![],
        }
    }

    /// Append a parameter, preserving insertion order and duplicates.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(LinkParam::new(name, value));
        self
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.reference)?;
        for param in &self.params {
            write!(f, "; {}", param)?;
        }
        Ok(())
    }
}

/// A `Link` header: one or more links, rendered comma-joined in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHeader {
    links: Vec<Link>,
}

impl LinkHeader {
    pub fn new(links: Vec<Link>) -> Self {
        Self { links }
    }
}

impl fmt::Display for LinkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, link) in self.links.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", link)?;
        }
        Ok(())
    }
}
