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

//! Network interface resolution

use crate::DiscoveryError;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// One address of a host network interface
#[derive(Debug, Clone)]
pub struct InterfaceAddr {
    /// Interface name (e.g. `en0`, `wlan0`)
    pub name: String,

    /// Address bound to the interface
    pub addr: IpAddr,

    /// Whether this is a loopback interface
    pub loopback: bool,
}

/// Enumerates the host's network interfaces
///
/// The production implementation lives in `connected-discovery-mdns`
/// (`SystemInterfaces`); tests supply fixed lists.
pub trait InterfaceEnumerator: Send + Sync {
    /// List interface addresses in OS enumeration order
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the interface table cannot be read.
    fn list_interfaces(&self) -> io::Result<Vec<InterfaceAddr>>;
}

/// Picks the local address peers should connect to
///
/// Does not cache: interfaces are re-enumerated on every call, since
/// addresses change whenever a network is joined or left.
pub struct NetworkInterfaceResolver {
    enumerator: Box<dyn InterfaceEnumerator>,
}

impl NetworkInterfaceResolver {
    /// Create a resolver over the given enumerator
    pub fn new(enumerator: impl InterfaceEnumerator + 'static) -> Self {
        Self {
            enumerator: Box::new(enumerator),
        }
    }

    /// First non-loopback IPv4 address in OS enumeration order
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::NoInterfaceFound` when no non-loopback IPv4
    /// address exists, and `DiscoveryError::Io` when enumeration fails.
    pub fn first_usable_ipv4(&self) -> Result<Ipv4Addr, DiscoveryError> {
        for interface in self.enumerator.list_interfaces()? {
            if interface.loopback {
                continue;
            }
            if let IpAddr::V4(addr) = interface.addr {
                log::debug!("Selected local address {addr} on {}", interface.name);
                return Ok(addr);
            }
        }
        Err(DiscoveryError::NoInterfaceFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedInterfaces(Vec<InterfaceAddr>);

    impl InterfaceEnumerator for FixedInterfaces {
        fn list_interfaces(&self) -> io::Result<Vec<InterfaceAddr>> {
            Ok(self.0.clone())
        }
    }

    struct FailingInterfaces;

    impl InterfaceEnumerator for FailingInterfaces {
        fn list_interfaces(&self) -> io::Result<Vec<InterfaceAddr>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    fn iface(name: &str, addr: &str, loopback: bool) -> InterfaceAddr {
        InterfaceAddr {
            name: name.to_string(),
            addr: addr.parse().unwrap(),
            loopback,
        }
    }

    #[test]
    fn test_first_usable_ipv4_in_os_order() {
        let resolver = NetworkInterfaceResolver::new(FixedInterfaces(vec![
            iface("lo", "127.0.0.1", true),
            iface("wlan0", "192.168.1.42", false),
            iface("eth0", "10.0.0.3", false),
        ]));

        assert_eq!(
            resolver.first_usable_ipv4().unwrap(),
            "192.168.1.42".parse::<Ipv4Addr>().unwrap()
        );
    }

    #[test]
    fn test_skips_loopback_and_ipv6() {
        let resolver = NetworkInterfaceResolver::new(FixedInterfaces(vec![
            iface("lo", "127.0.0.1", true),
            iface("wlan0", "fe80::1", false),
            iface("eth0", "10.0.0.3", false),
        ]));

        assert_eq!(
            resolver.first_usable_ipv4().unwrap(),
            "10.0.0.3".parse::<Ipv4Addr>().unwrap()
        );
    }

    #[test]
    fn test_no_usable_interface() {
        let resolver = NetworkInterfaceResolver::new(FixedInterfaces(vec![
            iface("lo", "127.0.0.1", true),
            iface("wlan0", "fe80::1", false),
        ]));

        assert!(matches!(
            resolver.first_usable_ipv4(),
            Err(DiscoveryError::NoInterfaceFound)
        ));
    }

    #[test]
    fn test_enumeration_failure_propagates() {
        let resolver = NetworkInterfaceResolver::new(FailingInterfaces);
        assert!(matches!(
            resolver.first_usable_ipv4(),
            Err(DiscoveryError::Io(_))
        ));
    }

    #[test]
    fn test_no_caching_between_calls() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Counting(Arc<AtomicUsize>);

        impl InterfaceEnumerator for Counting {
            fn list_interfaces(&self) -> io::Result<Vec<InterfaceAddr>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(vec![InterfaceAddr {
                    name: "eth0".to_string(),
                    addr: "10.0.0.3".parse().unwrap(),
                    loopback: false,
                }])
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = NetworkInterfaceResolver::new(Counting(calls.clone()));

        resolver.first_usable_ipv4().unwrap();
        resolver.first_usable_ipv4().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
