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

//! Turns a finished bag's results into the [`SBData`] handed to its
//! completion sink.
//!
//! A pure function of `(bag, results, contract_modifications)`: no I/O, no
//! state, so a cache can call it from `commit` without risking a partial
//! side effect if assembly itself turns out to be impossible.

use std::collections::BTreeMap;

use cr_primitives::{ExecutionData, ExecutionResult, SBData, TransactionBag, TxIdx};

/// Assemble `SBData` from a finished bag's per-transaction results.
///
/// `contract_modifications[tx_idx]` is the write set attributable to the
/// transaction at that position — the overlay pads one slot per contract
/// position it begins, whether or not that contract ends up succeeding, so
/// the lookup is by `tx_idx` directly rather than by a running count of
/// successes (a failed transaction ahead of a successful one must not shift
/// the successful one onto the wrong slot). A successful transaction with no
/// entry (e.g. past the end of a pre-rerun `contract_modifications`) is
/// treated as having made no writes. Returns `None` when `results` does not
/// contain exactly one entry per transaction in `bag`; the caller treats
/// that as a hard failure and discards the cache rather than emitting a
/// partial result.
pub fn assemble(
	bag: &TransactionBag,
	results: &BTreeMap<TxIdx, ExecutionResult>,
	contract_modifications: &[BTreeMap<String, Vec<u8>>],
) -> Option<SBData> {
	if results.len() != bag.transactions.len() {
		return None;
	}

	let mut tx_data = Vec::with_capacity(results.len());

	for (&tx_idx, result) in results.iter() {
		let state_json = if result.is_success() {
			let delta = contract_modifications.get(tx_idx).cloned().unwrap_or_default();
			encode_state_json(&delta)
		} else {
			String::new()
		};

		tx_data.push(ExecutionData {
			contract: bag.transactions[tx_idx].contract.clone(),
			status: result.status,
			response: result.response.clone(),
			state_json,
			stamps: result.stamps,
		});
	}

	Some(SBData { input_hash: bag.input_hash.clone(), tx_data })
}

/// Hex-encode values so the delta round-trips through JSON regardless of
/// what bytes a contract wrote, the same way this codebase hex-encodes
/// opaque key material rather than assuming it's valid UTF-8.
fn encode_state_json(delta: &BTreeMap<String, Vec<u8>>) -> String {
	let encoded: BTreeMap<&String, String> = delta.iter().map(|(k, v)| (k, hex::encode(v))).collect();
	serde_json::to_string(&encoded).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;
	use cr_primitives::{InputHash, Transaction};

	fn bag(n: usize) -> TransactionBag {
		TransactionBag::new(
			InputHash::new("a".repeat(64)).unwrap(),
			(0..n).map(|i| Transaction::new(vec![i as u8])).collect(),
			Default::default(),
			|_| {},
		)
	}

	#[test]
	fn mismatched_result_count_yields_none() {
		let b = bag(3);
		let mut results = BTreeMap::new();
		results.insert(0, ExecutionResult { status: 0, response: vec![], stamps: 1 });
		assert!(assemble(&b, &results, &[]).is_none());
	}

	#[test]
	fn successful_tx_gets_its_state_delta_in_order() {
		let b = bag(2);
		let mut results = BTreeMap::new();
		results.insert(0, ExecutionResult { status: 0, response: vec![], stamps: 1 });
		results.insert(1, ExecutionResult { status: 0, response: vec![], stamps: 2 });
		let mut delta0 = BTreeMap::new();
		delta0.insert("a".to_owned(), b"1".to_vec());
		let mut delta1 = BTreeMap::new();
		delta1.insert("b".to_owned(), b"2".to_vec());
		let mods = vec![delta0, delta1];

		let sb = assemble(&b, &results, &mods).unwrap();

		assert_eq!(sb.tx_data.len(), 2);
		assert!(sb.tx_data[0].state_json.contains(&hex::encode(b"1")));
		assert!(sb.tx_data[1].state_json.contains(&hex::encode(b"2")));
	}

	#[test]
	fn failed_tx_gets_empty_state_and_does_not_shift_a_later_success_onto_its_slot() {
		let b = bag(2);
		let mut results = BTreeMap::new();
		results.insert(0, ExecutionResult { status: 1, response: vec![], stamps: 0 });
		results.insert(1, ExecutionResult { status: 0, response: vec![], stamps: 1 });
		let mut delta = BTreeMap::new();
		delta.insert("a".to_owned(), b"1".to_vec());
		// contract_modifications is positional: index 0 belongs to the failed
		// tx (empty, since it never wrote) and index 1 to the successful one.
		let mods = vec![BTreeMap::new(), delta];

		let sb = assemble(&b, &results, &mods).unwrap();

		assert_eq!(sb.tx_data[0].state_json, "");
		assert!(sb.tx_data[1].state_json.contains(&hex::encode(b"1")));
	}

	#[test]
	fn successful_tx_past_the_end_of_a_truncated_modification_list_gets_an_empty_delta() {
		let b = bag(2);
		let mut results = BTreeMap::new();
		results.insert(0, ExecutionResult { status: 0, response: vec![], stamps: 1 });
		results.insert(1, ExecutionResult { status: 0, response: vec![], stamps: 1 });
		let mut delta0 = BTreeMap::new();
		delta0.insert("a".to_owned(), b"1".to_vec());
		let mods = vec![delta0];

		let sb = assemble(&b, &results, &mods).unwrap();

		assert!(sb.tx_data[0].state_json.contains(&hex::encode(b"1")));
		assert_eq!(sb.tx_data[1].state_json, "{}");
	}
}
