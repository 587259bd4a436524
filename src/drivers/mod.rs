// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reference drivers built only on the public device and client contracts.
//!
//! - [`focuser::Focuser`] - Transport-backed focuser with abort and polling
//! - [`agent::FilterAgent`] - Agent that follows another device through
//!   an embedded client

pub mod agent;
pub mod focuser;
