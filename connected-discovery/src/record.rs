// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Service record types

use crate::DiscoveryError;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// Maximum instance name length in bytes (DNS label, RFC 1035)
pub const MAX_INSTANCE_NAME_LEN: usize = 63;

/// Maximum number of TXT attribute entries per record
pub const MAX_ATTRIBUTES: usize = 32;

/// Maximum length of one encoded `key=value` TXT pair (RFC 6763)
pub const MAX_TXT_PAIR_LEN: usize = 255;

/// A service advertised or discovered on the local network
///
/// A record starts *unresolved* (`host` is `None`) and becomes *resolved*
/// once the backend supplies an address. Discovery never hands unresolved
/// records to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Instance name, unique within a service type at any given moment
    pub name: String,

    /// Service type, canonically `_myapp._tcp.local.`
    pub service_type: String,

    /// Resolved address, `None` until resolution completes
    pub host: Option<IpAddr>,

    /// Port number
    pub port: u16,

    /// TXT key/value attributes
    pub attributes: HashMap<String, String>,
}

impl ServiceRecord {
    /// Create an unresolved record with no attributes
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            host: None,
            port,
            attributes: HashMap::new(),
        }
    }

    /// Set the resolved address
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the TXT attributes
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether this record carries a resolved address
    pub fn is_resolved(&self) -> bool {
        self.host.is_some()
    }

    /// Identity of this record within the coordinator
    pub fn key(&self) -> ServiceKey {
        ServiceKey {
            service_type: self.service_type.clone(),
            name: self.name.clone(),
        }
    }

    /// Canonicalize the service type and enforce record bounds
    ///
    /// Returns the record with `service_type` rewritten to the canonical
    /// `_name._proto.local.` form.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::InvalidServiceType` for a malformed type and
    /// `DiscoveryError::InvalidRecord` when the name or attributes exceed
    /// their bounds.
    pub fn canonicalize(mut self) -> Result<Self, DiscoveryError> {
        self.service_type = normalize_service_type(&self.service_type)?;

        if self.name.is_empty() {
            return Err(DiscoveryError::InvalidRecord(
                "instance name is empty".to_string(),
            ));
        }
        if self.name.len() > MAX_INSTANCE_NAME_LEN {
            return Err(DiscoveryError::InvalidRecord(format!(
                "instance name exceeds {MAX_INSTANCE_NAME_LEN} bytes: {}",
                self.name.len()
            )));
        }
        if self.attributes.len() > MAX_ATTRIBUTES {
            return Err(DiscoveryError::InvalidRecord(format!(
                "too many TXT attributes: {} (max {MAX_ATTRIBUTES})",
                self.attributes.len()
            )));
        }
        for (key, value) in &self.attributes {
            if key.is_empty() {
                return Err(DiscoveryError::InvalidRecord(
                    "empty TXT attribute key".to_string(),
                ));
            }
            // key '=' value, encoded as one TXT string
            if key.len() + 1 + value.len() > MAX_TXT_PAIR_LEN {
                return Err(DiscoveryError::InvalidRecord(format!(
                    "TXT pair for key {key:?} exceeds {MAX_TXT_PAIR_LEN} bytes"
                )));
            }
        }

        Ok(self)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host {
            Some(host) => write!(f, "{} ({}:{})", self.name, host, self.port),
            None => write!(f, "{} (unresolved)", self.name),
        }
    }
}

/// Identity of an advertisement or discovered record: (service type, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    /// Canonical service type
    pub service_type: String,
    /// Instance name
    pub name: String,
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_type, self.name)
    }
}

/// Normalize a service type to the canonical `_name._proto.local.` form
///
/// Accepts `_myapp._tcp`, `_myapp._tcp.`, `_myapp._tcp.local` and
/// `_myapp._tcp.local.`; only the `_tcp` and `_udp` protocols are legal.
///
/// # Errors
///
/// Returns `DiscoveryError::InvalidServiceType` when the input does not
/// have the `_name._proto` shape.
pub fn normalize_service_type(raw: &str) -> Result<String, DiscoveryError> {
    let base = raw.trim().trim_end_matches('.');
    let base = base.strip_suffix(".local").unwrap_or(base);

    if base.is_empty() {
        return Err(DiscoveryError::InvalidServiceType(
            "empty service type".to_string(),
        ));
    }
    if !base.starts_with('_') {
        return Err(DiscoveryError::InvalidServiceType(format!(
            "{raw:?} does not start with an underscore label"
        )));
    }
    let protocol_ok = base.strip_suffix("._tcp").or_else(|| base.strip_suffix("._udp"));
    match protocol_ok {
        Some(label) if label.len() > 1 => Ok(format!("{base}.local.")),
        _ => Err(DiscoveryError::InvalidServiceType(format!(
            "{raw:?} is not of the form _name._tcp or _name._udp"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_service_type_forms() {
        for input in [
            "_myapp._tcp",
            "_myapp._tcp.",
            "_myapp._tcp.local",
            "_myapp._tcp.local.",
            "  _myapp._tcp  ",
        ] {
            assert_eq!(
                normalize_service_type(input).unwrap(),
                "_myapp._tcp.local.",
                "input: {input:?}"
            );
        }

        assert_eq!(
            normalize_service_type("_files._udp").unwrap(),
            "_files._udp.local."
        );
    }

    #[test]
    fn test_normalize_service_type_rejects_malformed() {
        for input in ["", "myapp._tcp", "_myapp._quic", "_tcp", "_._tcp", "_myapp"] {
            assert!(
                normalize_service_type(input).is_err(),
                "expected rejection for {input:?}"
            );
        }
    }

    #[test]
    fn test_canonicalize_rewrites_type() {
        let record = ServiceRecord::new("printer", "_ipp._tcp", 631)
            .canonicalize()
            .unwrap();
        assert_eq!(record.service_type, "_ipp._tcp.local.");
        assert_eq!(record.name, "printer");
        assert!(!record.is_resolved());
    }

    #[test]
    fn test_canonicalize_rejects_long_name() {
        let record = ServiceRecord::new("x".repeat(64), "_myapp._tcp", 8080);
        assert!(matches!(
            record.canonicalize(),
            Err(DiscoveryError::InvalidRecord(_))
        ));

        // 63 bytes is the limit, not past it
        let record = ServiceRecord::new("x".repeat(63), "_myapp._tcp", 8080);
        assert!(record.canonicalize().is_ok());
    }

    #[test]
    fn test_canonicalize_rejects_empty_name() {
        let record = ServiceRecord::new("", "_myapp._tcp", 8080);
        assert!(matches!(
            record.canonicalize(),
            Err(DiscoveryError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_canonicalize_attribute_bounds() {
        let mut attributes = HashMap::new();
        for i in 0..MAX_ATTRIBUTES + 1 {
            attributes.insert(format!("k{i}"), "v".to_string());
        }
        let record =
            ServiceRecord::new("dev", "_myapp._tcp", 1).with_attributes(attributes);
        assert!(record.canonicalize().is_err());

        let mut attributes = HashMap::new();
        attributes.insert("key".to_string(), "v".repeat(MAX_TXT_PAIR_LEN));
        let record =
            ServiceRecord::new("dev", "_myapp._tcp", 1).with_attributes(attributes);
        assert!(record.canonicalize().is_err());

        let mut attributes = HashMap::new();
        attributes.insert(String::new(), "v".to_string());
        let record =
            ServiceRecord::new("dev", "_myapp._tcp", 1).with_attributes(attributes);
        assert!(record.canonicalize().is_err());
    }

    #[test]
    fn test_record_key_identity() {
        let a = ServiceRecord::new("dev", "_myapp._tcp.local.", 1);
        let b = ServiceRecord::new("dev", "_myapp._tcp.local.", 2)
            .with_host("192.168.1.7".parse().unwrap());
        // Same identity even though host/port differ
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "_myapp._tcp.local./dev");
    }

    #[test]
    fn test_record_display() {
        let record = ServiceRecord::new("printer", "_ipp._tcp.local.", 631)
            .with_host("10.0.0.5".parse().unwrap());
        assert_eq!(record.to_string(), "printer (10.0.0.5:631)");

        let record = ServiceRecord::new("printer", "_ipp._tcp.local.", 631);
        assert_eq!(record.to_string(), "printer (unresolved)");
    }
}
