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

//! In-memory multicast backend for testing
//!
//! [`MockBackend`] simulates a local network segment entirely in process.
//! Services published on it, whether through a coordinator or scripted
//! directly, are visible to every browse on the same backend instance.
//! Tests drive announcement and disappearance timing deterministically
//! without touching a real network.

pub mod backend;

pub use backend::MockBackend;
