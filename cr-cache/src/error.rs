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

//! Errors produced while driving a [`crate::CrCache`] through its transitions.

use crate::state::CacheState;

/// A trigger was invoked from a state that does not permit it.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display(fmt = "cannot call `{}` while in state {:?}", trigger, from)]
pub struct TransitionError {
	/// Name of the trigger that was rejected.
	pub trigger: &'static str,
	/// The state the cache was actually in.
	pub from: CacheState,
}

/// Anything that can go wrong while driving a cache through a transition.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum CrCacheError {
	/// The trigger's source state didn't match what it requires.
	#[display(fmt = "{}", _0)]
	Transition(TransitionError),
	/// The backing key-value store returned a genuine I/O failure. The cache
	/// has already been routed to `Discarded` by the time this is returned.
	#[display(fmt = "backing store failure: {}", _0)]
	Kv(std::io::Error),
}
