// Copyright (c) 2026 Routelens
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Process configuration (TOML file + environment overrides).
pub mod config;
/// ECDSA P-256 request signing and verification.
pub mod signing;
/// BIRD control-socket client.
pub mod bird;
/// BGP community pattern matching and output annotation.
pub mod community;
/// `show protocols` summary parsing.
pub mod summary;
/// Query input validation.
pub mod validate;
