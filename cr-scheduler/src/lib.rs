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

//! The FSM scheduler: a bounded pool of [`cr_cache::CrCache`]s, a
//! commit-ordering queue, and a single-threaded cooperative poll loop.
//!
//! [`Scheduler`] is the only thing in this workspace that ever calls a
//! gated `poll_*` method on a cache; everything else only ever sees the
//! unconditional triggers (`set_bag`, `execute`, `merge`, `discard`). This
//! mirrors the source's cache/scheduler split, but the cyclic
//! cache-holds-a-reference-to-its-scheduler relationship is replaced by
//! one-way ownership: the scheduler owns the pool outright, and a cache
//! only ever hands the scheduler its own pool index.
//!
//! # Example
//!
//! ```
//! use cr_cache::CrCache;
//! use cr_executor::ClosureExecutor;
//! use cr_kvdb::InMemoryKv;
//! use cr_primitives::{Environment, ExecutionResult, InputHash, Transaction, TransactionBag};
//! use cr_scheduler::{Scheduler, SchedulerConfig};
//! use cr_state_machine::{MacroBarrier, OverlayDriver};
//!
//! let common = InMemoryKv::new();
//! let master = InMemoryKv::new();
//! MacroBarrier::new(common.clone()).reset_all().unwrap();
//!
//! let executor = ClosureExecutor::new(
//!     |tx: &Transaction, _env: &Environment, driver: &mut OverlayDriver<InMemoryKv>| {
//!         driver.set("a", tx.contract.clone()).unwrap();
//!         ExecutionResult { status: 0, response: vec![], stamps: 1 }
//!     },
//! );
//! let pool = vec![CrCache::new(0, 0, 1, common, master.clone(), executor)];
//! let config = SchedulerConfig { num_sbb: 1, pool_size: 1, ..SchedulerConfig::default() };
//! let mut scheduler = Scheduler::new(config, pool).unwrap();
//!
//! let bag = TransactionBag::new(
//!     InputHash::new("a".repeat(64)).unwrap(),
//!     vec![Transaction::new(b"1".to_vec())],
//!     Environment::new(),
//!     |_sb_data| {},
//! );
//! scheduler.submit(0, bag).unwrap();
//! scheduler.run_until_idle(1000).unwrap();
//! assert_eq!(master.get("a").unwrap(), Some(b"1".to_vec()));
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{Scheduler, SchedulerEvent};
