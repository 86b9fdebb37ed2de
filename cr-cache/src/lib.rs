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

//! The conflict-resolution cache state machine.
//!
//! [`CrCache`] drives one bag of transactions through speculative execution
//! against the master layer, conflict detection and partial rerun against
//! the cohort's common layer, commit, and (for SBB 0) promotion of common
//! into master. [`assembler::assemble`] is the pure function that turns a
//! finished bag's results into the [`cr_primitives::SBData`] its completion
//! sink receives.
//!
//! A cohort of these, driven by a scheduler that enforces commit ordering
//! and polls the gated transitions, is what `cr-scheduler` builds on top of
//! this crate.

#![warn(missing_docs)]

mod assembler;
mod cache;
mod error;
mod state;

pub use assembler::assemble;
pub use cache::CrCache;
pub use error::{CrCacheError, TransitionError};
pub use state::CacheState;
