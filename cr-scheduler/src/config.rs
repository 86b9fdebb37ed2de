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

use std::time::Duration;

/// Configuration for a [`crate::Scheduler`] and the cohort of caches it drives.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
	/// Size of the cohort: the number of sub-block builders participating in
	/// one epoch, and therefore the number of caches the pool must hold.
	pub num_sbb: usize,

	/// Size of the cache pool. Must equal `num_sbb` today — the scheduler
	/// runs a single cohort at a time rather than multiplexing several, so
	/// every pool slot has a fixed commit-order position. Kept as its own
	/// field (rather than collapsing it into `num_sbb`) so a future
	/// multi-cohort scheduler can grow the pool independently of cohort size
	/// without an incompatible config change.
	pub pool_size: usize,

	/// How long the poll loop sleeps between sweeps over the pool. Shorter
	/// intervals notice a satisfied condition sooner at the cost of more
	/// wasted wake-ups; longer intervals are cheaper but add latency to
	/// every gated transition.
	pub poll_interval: Duration,

	/// How long a cache may sit in `Committed` waiting for every sibling to
	/// commit before the scheduler gives up on it and discards it.
	pub commit_timeout: Duration,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		SchedulerConfig {
			num_sbb: 4,
			pool_size: 4,
			poll_interval: Duration::from_millis(50),
			commit_timeout: Duration::from_secs(5),
		}
	}
}
