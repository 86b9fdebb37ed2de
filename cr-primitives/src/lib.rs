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

//! Shared data types for the conflict-resolution cache (CR-Cache) pipeline.
//!
//! This crate has no knowledge of storage, execution or scheduling; it only
//! defines the wire-level shapes that flow between those components: a
//! [`Transaction`] carried inside a [`TransactionBag`], the per-transaction
//! [`ExecutionResult`] produced by an executor, and the [`SBData`] assembled
//! once a cache has finished a bag.

#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a transaction within its bag. Stable for the lifetime of the bag.
pub type TxIdx = usize;

/// Index of a contract invocation within the sequence of *successfully executed*
/// transactions seen so far. Used to key [`crate::ContractModifications`]-style
/// per-contract write sets kept by the overlay driver.
pub type ContractIdx = usize;

/// An opaque contract invocation payload. The CR-Cache pipeline never
/// interprets this; it is handed verbatim to the executor and echoed back in
/// [`ExecutionData::contract`].
pub type ContractPayload = Vec<u8>;

/// Status code of an executed transaction. `0` means success.
pub type StatusCode = i32;

/// Environment values (timestamps, chain metadata, …) passed verbatim to the executor.
pub type Environment = BTreeMap<String, serde_json::Value>;

/// A 64-character hex string identifying a [`TransactionBag`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputHash(String);

/// An input hash was not 64 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "input hash must be 64 hex characters, got {:?}", _0)]
pub struct InvalidInputHash(String);

impl InputHash {
	/// Validate and wrap a hex string as an [`InputHash`].
	pub fn new(hash: impl Into<String>) -> Result<Self, InvalidInputHash> {
		let hash = hash.into();
		let is_valid = hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit());
		if is_valid {
			Ok(InputHash(hash))
		} else {
			Err(InvalidInputHash(hash))
		}
	}

	/// The underlying hex string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for InputHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A single transaction inside a bag.
///
/// The executor is solely responsible for interpreting [`Transaction::contract`];
/// the pipeline only ever threads it through unopened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	/// The contract invocation payload.
	pub contract: ContractPayload,
}

impl Transaction {
	/// Wrap a contract payload as a transaction.
	pub fn new(contract: ContractPayload) -> Self {
		Transaction { contract }
	}
}

/// The outcome of executing a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
	/// `0` on success, non-zero on failure.
	pub status: StatusCode,
	/// Opaque response payload returned by the executor.
	pub response: Vec<u8>,
	/// Stamps (resource units) consumed by this transaction.
	pub stamps: u64,
}

impl ExecutionResult {
	/// True when [`ExecutionResult::status`] is `0`.
	pub fn is_success(&self) -> bool {
		self.status == 0
	}
}

/// An ordered batch of transactions executed atomically by one CR-Cache.
///
/// Immutable apart from the completion sink, which is consumed exactly once
/// when the owning cache reaches `Committed`.
pub struct TransactionBag {
	/// 64-char hex identifier of this bag.
	pub input_hash: InputHash,
	/// The transactions, in execution order.
	pub transactions: Vec<Transaction>,
	/// Environment values (timestamps, chain metadata) passed to the executor verbatim.
	pub environment: Environment,
	completion_handler: Option<Box<dyn FnOnce(SBData) + Send>>,
}

impl fmt::Debug for TransactionBag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TransactionBag")
			.field("input_hash", &self.input_hash)
			.field("transactions", &self.transactions)
			.field("environment", &self.environment)
			.field("completion_handler", &self.completion_handler.is_some())
			.finish()
	}
}

impl TransactionBag {
	/// Construct a bag with the given completion sink.
	pub fn new(
		input_hash: InputHash,
		transactions: Vec<Transaction>,
		environment: Environment,
		completion_handler: impl FnOnce(SBData) + Send + 'static,
	) -> Self {
		TransactionBag {
			input_hash,
			transactions,
			environment,
			completion_handler: Some(Box::new(completion_handler)),
		}
	}

	/// The suffix of transactions starting at `idx`, used to drive a partial rerun.
	pub fn yield_from(&self, idx: TxIdx) -> &[Transaction] {
		if idx >= self.transactions.len() {
			&[]
		} else {
			&self.transactions[idx..]
		}
	}

	/// Deliver the assembled [`SBData`] to whoever is waiting on this bag.
	///
	/// A no-op if called more than once; only the first call is delivered, matching
	/// a bag being completed at most once per epoch.
	pub fn complete(&mut self, data: SBData) {
		if let Some(handler) = self.completion_handler.take() {
			handler(data);
		}
	}
}

/// Per-transaction record assembled into a [`SBData`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionData {
	/// The original contract invocation payload.
	pub contract: ContractPayload,
	/// `0` on success, non-zero on failure.
	pub status: StatusCode,
	/// Opaque response payload.
	pub response: Vec<u8>,
	/// JSON-encoded `{key: value, …}` of this contract's committed writes.
	/// Empty when `status != 0`.
	pub state_json: String,
	/// Stamps consumed.
	pub stamps: u64,
}

/// The assembled result of one CR-Cache finishing one bag, handed to the bag's
/// completion handler so the surrounding system can build a sub-block contender.
#[derive(Debug, Clone, Serialize)]
pub struct SBData {
	/// The bag this result belongs to.
	pub input_hash: InputHash,
	/// Per-transaction execution records, ordered by `tx_idx`.
	pub tx_data: Vec<ExecutionData>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn input_hash_rejects_wrong_length() {
		assert!(InputHash::new("abc").is_err());
	}

	#[test]
	fn input_hash_rejects_non_hex() {
		let bad = "z".repeat(64);
		assert!(InputHash::new(bad).is_err());
	}

	#[test]
	fn input_hash_accepts_64_hex_chars() {
		let good = "a".repeat(64);
		assert!(InputHash::new(good).is_ok());
	}

	#[test]
	fn yield_from_returns_suffix() {
		let bag = TransactionBag::new(
			InputHash::new("a".repeat(64)).unwrap(),
			vec![Transaction::new(vec![1]), Transaction::new(vec![2]), Transaction::new(vec![3])],
			Environment::new(),
			|_| {},
		);
		assert_eq!(bag.yield_from(1).len(), 2);
		assert_eq!(bag.yield_from(0).len(), 3);
		assert_eq!(bag.yield_from(10).len(), 0);
	}

	#[test]
	fn complete_only_delivers_once() {
		use std::sync::atomic::{AtomicUsize, Ordering};
		use std::sync::Arc;

		let calls = Arc::new(AtomicUsize::new(0));
		let calls_clone = calls.clone();
		let mut bag = TransactionBag::new(
			InputHash::new("a".repeat(64)).unwrap(),
			vec![],
			Environment::new(),
			move |_| {
				calls_clone.fetch_add(1, Ordering::SeqCst);
			},
		);

		bag.complete(SBData { input_hash: InputHash::new("a".repeat(64)).unwrap(), tx_data: vec![] });
		bag.complete(SBData { input_hash: InputHash::new("a".repeat(64)).unwrap(), tx_data: vec![] });

		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
