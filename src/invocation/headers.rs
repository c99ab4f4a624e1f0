//! Static request headers injected into every backend call
//!
//! A `HeaderSet` is built once from configuration and merged per call with
//! any caller overrides. Merging replaces: a key present in the override
//! drops every value the base held for it.

use crate::error::{BridgeError, Result};
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tonic::metadata::MetadataMap;

/// Ordered header name to values mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderSet {
    headers: HeaderMap,
}

impl HeaderSet {
    /// Create an empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Name: Value` flag. The value keeps everything after the first
    /// colon, minus leading spaces.
    pub fn parse_flag(flag: &str) -> Result<(String, String)> {
        let (name, value) = flag.split_once(':').ok_or_else(|| {
            BridgeError::config(format!(
                "invalid header '{}': expecting `key: value`",
                flag
            ))
        })?;
        Ok((name.trim().to_string(), value.trim_start_matches(' ').to_string()))
    }

    /// Build a header set from repeated `Name: Value` flags; repeated names accumulate
    pub fn from_flags<I, S>(flags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for flag in flags {
            let (name, value) = Self::parse_flag(flag.as_ref())?;
            set.add(&name, &value)?;
        }
        Ok(set)
    }

    /// Append a value for a header, keeping existing values
    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = Self::validate(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Set a header, replacing any existing values
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = Self::validate(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Set `Authorization: Bearer <token>`
    pub fn set_bearer(&mut self, token: &str) -> Result<()> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| BridgeError::config("bearer token contains invalid header characters"))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// All values for a header name (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Distinct header names, lowercased
    pub fn names(&self) -> Vec<&str> {
        self.headers.keys().map(|k| k.as_str()).collect()
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.headers.keys_len()
    }

    /// Whether there are no headers
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Merge overrides on top of this set. Every name present in `overrides`
    /// replaces the full value list this set holds for it.
    pub fn merge(&self, overrides: &HeaderSet) -> HeaderSet {
        let mut merged = self.clone();
        overrides.apply_to_headers(&mut merged.headers);
        merged
    }

    /// Apply onto an outbound HTTP header map. Single values overwrite the
    /// existing entry; multiple values replace the whole list.
    pub fn apply_to_headers(&self, target: &mut HeaderMap) {
        for name in self.headers.keys() {
            let mut values = self.headers.get_all(name).iter();
            let Some(first) = values.next() else {
                continue;
            };
            target.insert(name.clone(), first.clone());
            for value in values {
                target.append(name.clone(), value.clone());
            }
        }
    }

    /// Apply onto gRPC request metadata with the same semantics as `apply_to_headers`
    pub fn apply_to_metadata(&self, metadata: &mut MetadataMap) {
        if self.is_empty() {
            return;
        }
        let mut headers = std::mem::take(metadata).into_headers();
        self.apply_to_headers(&mut headers);
        *metadata = MetadataMap::from_headers(headers);
    }

    /// Borrow the underlying header map
    pub fn as_header_map(&self) -> &HeaderMap {
        &self.headers
    }

    fn validate(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| BridgeError::config(format!("invalid header name '{}'", name)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| BridgeError::config(format!("invalid value for header '{}'", name)))?;
        Ok((header_name, header_value))
    }
}
