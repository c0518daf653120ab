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

//! Conversions between mdns-sd types and service records

use connected_discovery::{BackendError, ServiceRecord};

/// Extract the instance name from an mDNS fullname
///
/// A fullname has the form `<instance>.<service type>`, for example
/// `Living Room._myapp._tcp.local.`. Returns the fullname unchanged when
/// the suffix does not match.
pub(crate) fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(&format!(".{service_type}"))
        .unwrap_or(fullname)
        .to_string()
}

/// Build a service record from a resolved mdns-sd service
///
/// Prefers an IPv4 address; link-local IPv6 addresses often carry zone IDs
/// and are less reliable to dial.
pub(crate) fn record_from_resolved(
    info: &mdns_sd::ServiceInfo,
) -> Result<ServiceRecord, BackendError> {
    let addresses = info.get_addresses();
    let host = addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()
        .ok_or_else(|| {
            BackendError::ResolveFailed(format!("no address for {}", info.get_fullname()))
        })?;

    let attributes = info
        .get_properties()
        .iter()
        .map(|p| (p.key().to_string(), p.val_str().to_string()))
        .collect();

    Ok(ServiceRecord::new(
        instance_name(info.get_fullname(), info.get_type()),
        info.get_type(),
        info.get_port(),
    )
    .with_host(host)
    .with_attributes(attributes))
}
