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

//! The states a [`crate::CrCache`] moves through over one epoch.

/// One CR-Cache's position in its per-epoch lifecycle.
///
/// `Clean` is both the start and end state: a cache is created once and
/// cycles `Clean -> ... -> Clean` for as many epochs as the pool keeps it
/// alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
	/// Idle, holding no bag. The only state from which `set_bag` may fire.
	Clean,
	/// A bag has been assigned; ready to execute.
	BagSet,
	/// The bag's first pass ran against the master layer.
	Executed,
	/// This cache's conflict-resolution turn has arrived and is in progress.
	CrStarted,
	/// Conflicts resolved (or none found); ready to deliver `SBData` and commit.
	ReadyToCommit,
	/// Overlay writes landed in the common layer; waiting for every sibling
	/// cache in the cohort to do the same.
	Committed,
	/// Every cache in the cohort has committed; ready for SBB 0 to merge.
	ReadyToMerge,
	/// SBB 0 has promoted common into master (a no-op transition for every
	/// other SBB, which merely waits its turn at this point).
	Merged,
	/// Overlay and bag cleared; waiting for SBB 0's macro reset to land.
	Reset,
	/// Aborted: a result-count mismatch, a commit timeout, or a backing-store
	/// failure. Always routes through `reset` before the cache can be reused.
	Discarded,
}
