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

//! The contract interpreter/executor boundary.
//!
//! The real interpreter lives outside this pipeline entirely — this crate
//! only pins down the [`Executor`] trait a CR-Cache calls into, plus a
//! [`ClosureExecutor`] reference implementation used by this workspace's own
//! tests and by anyone wiring up the pipeline before a real interpreter is
//! ready, the way `sc-basic-authorship`'s doctest stands up a mock client
//! rather than a real one.

#![warn(missing_docs)]

use std::collections::BTreeMap;

use cr_kvdb::KvDriver;
use cr_primitives::{Environment, ExecutionResult, Transaction, TxIdx};
use cr_state_machine::OverlayDriver;

/// Executes a slice of transactions against an overlay driver, returning one
/// [`ExecutionResult`] per transaction, keyed by its `tx_idx` in the bag.
///
/// Implementations are expected to call [`OverlayDriver::begin_contract`]
/// with each transaction's `tx_idx` before running it, so that the overlay
/// attributes reads and writes to the right contract.
pub trait Executor<Below: KvDriver> {
	/// Run `transactions` against `driver`, with `environment` passed to each
	/// invocation verbatim.
	fn execute(
		&self,
		transactions: &[(TxIdx, &Transaction)],
		environment: &Environment,
		driver: &mut OverlayDriver<Below>,
	) -> BTreeMap<TxIdx, ExecutionResult>;
}

/// A reference [`Executor`] that runs a user-supplied closure per transaction.
///
/// `status = 0` is success; the closure is responsible for calling
/// [`OverlayDriver::get`] / [`OverlayDriver::set`] to perform whatever reads
/// and writes the contract payload implies.
pub struct ClosureExecutor<F> {
	run_one: F,
}

impl<F, Below> ClosureExecutor<F>
where
	Below: KvDriver,
	F: Fn(&Transaction, &Environment, &mut OverlayDriver<Below>) -> ExecutionResult,
{
	/// Wrap `run_one`, called once per transaction in bag order.
	pub fn new(run_one: F) -> Self {
		ClosureExecutor { run_one }
	}
}

impl<F, Below> Executor<Below> for ClosureExecutor<F>
where
	Below: KvDriver,
	F: Fn(&Transaction, &Environment, &mut OverlayDriver<Below>) -> ExecutionResult,
{
	fn execute(
		&self,
		transactions: &[(TxIdx, &Transaction)],
		environment: &Environment,
		driver: &mut OverlayDriver<Below>,
	) -> BTreeMap<TxIdx, ExecutionResult> {
		let mut results = BTreeMap::new();
		for (tx_idx, tx) in transactions {
			driver.begin_contract(*tx_idx);
			let result = (self.run_one)(tx, environment, driver);
			results.insert(*tx_idx, result);
		}
		results
	}
}
