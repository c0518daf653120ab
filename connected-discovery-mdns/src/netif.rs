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

//! System network interface enumeration

use connected_discovery::{InterfaceAddr, InterfaceEnumerator};
use std::io;

/// Enumerates interfaces through the operating system via if-addrs
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceEnumerator for SystemInterfaces {
    fn list_interfaces(&self) -> io::Result<Vec<InterfaceAddr>> {
        let interfaces = if_addrs::get_if_addrs()?;
        Ok(interfaces
            .into_iter()
            .map(|iface| InterfaceAddr {
                loopback: iface.is_loopback(),
                addr: iface.ip(),
                name: iface.name,
            })
            .collect())
    }
}
