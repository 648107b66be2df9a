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

#![forbid(unsafe_code)]

//! Generate a P-256 keypair for request signing and print both hex
//! encodings (private SEC1 DER, public SPKI DER).

use anyhow::Result;
use routelens::core::signing::{export_private_key_hex, export_public_key_hex, generate_keypair};

fn main() -> Result<()> {
    let (secret, public) = generate_keypair()?;
    println!("private: {}", export_private_key_hex(&secret)?);
    println!("public:  {}", export_public_key_hex(&public)?);
    Ok(())
}
