// Copyright 2017-2020 Parity Technologies (UK) Ltd.
// This file is part of Substrate.

// Substrate is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Substrate is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Substrate.  If not, see <http://www.gnu.org/licenses/>.

//! The overlayed changes to state.
//!
//! [`OverlayDriver`] is the per-cache staging layer: it records the value
//! observed at first read of every key (`original_values`), the latest value
//! and earliest contract index that wrote each key (`modified_keys`), and a
//! per-contract breakdown of writes (`contract_modifications`). [`macros`]
//! provides the shared turn-token counters ([`macros::MacroBarrier`]) that
//! peer caches use to take turns during conflict resolution and merge.

#![warn(missing_docs)]

pub mod macros;
mod overlay;

pub use macros::{MacroBarrier, Macros};
pub use overlay::OverlayDriver;
