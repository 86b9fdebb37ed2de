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

//! Errors produced while building or driving a [`crate::Scheduler`].

use cr_cache::CrCacheError;

/// Anything that can go wrong assembling a pool or driving it through a
/// poll sweep.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum SchedulerError {
	/// `config.pool_size` didn't match the number of caches handed to
	/// [`crate::Scheduler::new`].
	#[display(fmt = "pool size {} does not match the {} caches supplied", configured, supplied)]
	PoolSizeMismatch {
		/// What `config.pool_size` said.
		configured: usize,
		/// How many caches were actually supplied.
		supplied: usize,
	},
	/// Two caches in the supplied pool share an `sbb_idx`.
	#[display(fmt = "sbb_idx {} is held by more than one cache in the pool", _0)]
	DuplicateSbbIdx(usize),
	/// No cache in `0..num_sbb` was built with this `sbb_idx`.
	#[display(fmt = "no cache in the pool has sbb_idx {}", _0)]
	MissingSbbIdx(usize),
	/// A bag was submitted for an `sbb_idx` whose cache isn't `Clean`.
	#[display(fmt = "cache for sbb_idx {} is not clean", _0)]
	CacheBusy(usize),
	/// A transition on a pooled cache failed.
	#[display(fmt = "{}", _0)]
	Cache(CrCacheError),
}
