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

//! Shared turn-token counters ("macros") stored in the common layer.
//!
//! Three named counters gate the three places a cohort of caches must take
//! turns: `EXECUTION` (unused for gating today, kept for parity with the
//! source protocol and for observability), `CONFLICT_RESOLUTION` (the
//! commit-ordering turn token: cache `s` may start conflict resolution once
//! this reads `s`) and `RESET` (non-zero while an epoch's reset is still
//! in flight).

use cr_kvdb::{decode_counter, encode_counter, KvDriver};

/// Reserved macro key names. User contracts must never write these keys.
pub struct Macros;

impl Macros {
	/// Incremented once per cache after its first execution pass.
	pub const EXECUTION: &'static str = "_execution_phase";
	/// The conflict-resolution turn token; cache `sbb_idx` may start CR when
	/// this equals `sbb_idx`, and increments again once that cache commits.
	pub const CONFLICT_RESOLUTION: &'static str = "_conflict_resolution_phase";
	/// Non-zero while an epoch's reset is still in flight.
	pub const RESET: &'static str = "_reset_phase";
	/// All three reserved names, for validation and bulk reset.
	pub const ALL: [&'static str; 3] = [Self::EXECUTION, Self::CONFLICT_RESOLUTION, Self::RESET];
}

/// A view over the three [`Macros`] counters, backed by the cohort's common
/// [`KvDriver`].
pub struct MacroBarrier<Common> {
	common: Common,
}

impl<Common: KvDriver> MacroBarrier<Common> {
	/// Wrap the common layer's driver.
	pub fn new(common: Common) -> Self {
		MacroBarrier { common }
	}

	/// Atomically increment `name` and return the new value.
	pub fn incr(&self, name: &str) -> std::io::Result<i64> {
		log::trace!("incrementing macro {}", name);
		self.common.incrby(name)
	}

	/// Read `name`, treating an absent counter as `-1`.
	pub fn read(&self, name: &str) -> std::io::Result<i64> {
		match self.common.get(name)? {
			Some(raw) => decode_counter(&raw),
			None => Ok(-1),
		}
	}

	/// Set all three counters to `0`.
	pub fn reset_all(&self) -> std::io::Result<()> {
		for name in Macros::ALL.iter() {
			self.common.set(name, encode_counter(0))?;
		}
		Ok(())
	}
}
