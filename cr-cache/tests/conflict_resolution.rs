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

//! Multi-cache cohort scenarios: a conflicting pair of sibling caches must
//! rerun the loser against fresher state, and only the contracts downstream
//! of the earliest conflicting write are redone.

use cr_cache::{CacheState, CrCache};
use cr_executor::{ClosureExecutor, Executor};
use cr_kvdb::{InMemoryKv, KvDriver};
use cr_primitives::{Environment, ExecutionResult, InputHash, Transaction, TransactionBag};
use cr_state_machine::{MacroBarrier, OverlayDriver};

/// Contract payload `"key:delta"`: add `delta` to the integer stored at
/// `key` (treating a missing key as `0`).
fn balance_executor(
) -> ClosureExecutor<impl Fn(&Transaction, &Environment, &mut OverlayDriver<InMemoryKv>) -> ExecutionResult> {
	ClosureExecutor::new(|tx: &Transaction, _env, driver: &mut OverlayDriver<InMemoryKv>| {
		let text = String::from_utf8(tx.contract.clone()).unwrap();
		let mut parts = text.splitn(2, ':');
		let key = parts.next().unwrap();
		let delta: i64 = parts.next().unwrap().parse().unwrap();
		let current: i64 = driver
			.get(key)
			.unwrap()
			.map(|raw| String::from_utf8(raw).unwrap().parse().unwrap())
			.unwrap_or(0);
		driver.set(key, (current + delta).to_string().into_bytes()).unwrap();
		ExecutionResult { status: 0, response: vec![], stamps: 1 }
	})
}

fn hash(tag: &str) -> InputHash {
	InputHash::new(tag.repeat(64)).unwrap()
}

fn bootstrap_cohort(num_sbb: usize) -> (InMemoryKv, InMemoryKv) {
	let master = InMemoryKv::new();
	let common = InMemoryKv::new();
	MacroBarrier::new(common.clone()).reset_all().unwrap();
	let _ = num_sbb;
	(common, master)
}

#[test]
fn conflicting_writes_trigger_a_rerun_for_the_second_committer() {
	let (common, master) = bootstrap_cohort(2);
	master.set("bal", b"100".to_vec()).unwrap();

	let mut cache0 = CrCache::new(0, 0, 2, common.clone(), master.clone(), balance_executor());
	let mut cache1 = CrCache::new(1, 1, 2, common.clone(), master.clone(), balance_executor());

	let bag0 =
		TransactionBag::new(hash("a"), vec![Transaction::new(b"bal:-10".to_vec())], Environment::new(), |_| {});
	let bag1 =
		TransactionBag::new(hash("b"), vec![Transaction::new(b"bal:-5".to_vec())], Environment::new(), |_| {});

	cache0.set_bag(bag0).unwrap();
	cache1.set_bag(bag1).unwrap();
	cache0.execute().unwrap();
	cache1.execute().unwrap();

	// Cache 0 is first in commit order: its turn is available immediately.
	assert!(cache0.poll_sync_execution(true).unwrap());
	assert_eq!(cache0.state(), CacheState::Committed);
	assert!(cache0.rerun_idx().is_none());
	assert_eq!(common.get("bal").unwrap(), Some(b"90".to_vec()));

	// Cache 1 observes common's "90", which disagrees with the "100" it read
	// during its own first pass, so it reruns from contract 0.
	assert!(cache1.poll_sync_execution(true).unwrap());
	assert_eq!(cache1.state(), CacheState::Committed);
	assert_eq!(cache1.rerun_idx(), Some(0));
	assert_eq!(common.get("bal").unwrap(), Some(b"85".to_vec()));

	assert!(cache0.poll_sync_merge_ready().unwrap());
	assert!(cache1.poll_sync_merge_ready().unwrap());
	assert_eq!(cache0.state(), CacheState::ReadyToMerge);
	assert_eq!(cache1.state(), CacheState::ReadyToMerge);

	cache0.merge().unwrap();
	cache1.merge().unwrap();

	assert_eq!(master.get("bal").unwrap(), Some(b"85".to_vec()));
}

#[test]
fn only_contracts_downstream_of_the_conflict_are_rerun() {
	let (common, master) = bootstrap_cohort(2);

	// Cache 0 writes "shared" first, then "untouched" and "b" - a conflict
	// only on "shared" must still re-run "untouched" and "b" (everything at
	// or after the conflicting contract's index), but never touch contract
	// 0's already-committed write to a key no one else wrote.
	let mut cache0 = CrCache::new(0, 0, 2, common.clone(), master.clone(), balance_executor());
	let mut cache1 = CrCache::new(1, 1, 2, common.clone(), master.clone(), balance_executor());

	let bag0 = TransactionBag::new(
		hash("a"),
		vec![Transaction::new(b"shared:1".to_vec())],
		Environment::new(),
		|_| {},
	);
	let bag1 = TransactionBag::new(
		hash("b"),
		vec![
			Transaction::new(b"untouched:1".to_vec()),
			Transaction::new(b"shared:1".to_vec()),
			Transaction::new(b"b:1".to_vec()),
		],
		Environment::new(),
		|_| {},
	);

	cache0.set_bag(bag0).unwrap();
	cache1.set_bag(bag1).unwrap();
	cache0.execute().unwrap();
	cache1.execute().unwrap();

	assert!(cache0.poll_sync_execution(true).unwrap());
	assert_eq!(common.get("shared").unwrap(), Some(b"1".to_vec()));

	assert!(cache1.poll_sync_execution(true).unwrap());
	// cache1's first pass read "shared" as absent (master had nothing);
	// common now has "1", so the conflict is on contract index 1.
	assert_eq!(cache1.rerun_idx(), Some(1));
	assert_eq!(common.get("untouched").unwrap(), Some(b"1".to_vec()));
	assert_eq!(common.get("shared").unwrap(), Some(b"2".to_vec()));
	assert_eq!(common.get("b").unwrap(), Some(b"1".to_vec()));
}
