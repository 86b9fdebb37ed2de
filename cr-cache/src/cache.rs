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

//! The [`CrCache`] state machine itself.

use std::collections::BTreeMap;

use cr_executor::Executor;
use cr_kvdb::KvDriver;
use cr_primitives::{Transaction, TransactionBag, TxIdx, ExecutionResult};
use cr_state_machine::{MacroBarrier, Macros, OverlayDriver};

use crate::assembler;
use crate::error::{CrCacheError, TransitionError};
use crate::state::CacheState;

/// One participant's speculative-execution-through-merge state machine.
///
/// `Common` and `Master` are both cheap-to-clone handles (in practice
/// `Arc`-backed, as [`cr_kvdb::InMemoryKv`] is) onto the cohort's shared
/// common layer and the node's master layer respectively; `Exec` is whatever
/// contract interpreter the surrounding system wires in.
///
/// A cache is built once per pool slot and driven by a scheduler through many
/// epochs: each epoch runs `Clean -> ... -> Clean`.
pub struct CrCache<Common, Master, Exec> {
	idx: usize,
	sbb_idx: usize,
	num_sbb: usize,
	state: CacheState,
	bag: Option<TransactionBag>,
	rerun_idx: Option<TxIdx>,
	results: BTreeMap<TxIdx, ExecutionResult>,
	master_pass: OverlayDriver<Master>,
	overlay: OverlayDriver<Common>,
	macros: MacroBarrier<Common>,
	executor: Exec,
}

impl<Common, Master, Exec> CrCache<Common, Master, Exec>
where
	Common: KvDriver + Clone,
	Master: KvDriver + Clone,
	Exec: Executor<Master> + Executor<Common>,
{
	/// Build a cache at pool slot `idx`, committing in cohort position
	/// `sbb_idx` out of `num_sbb` siblings, sharing `common` and `master`
	/// with the rest of the cohort.
	pub fn new(idx: usize, sbb_idx: usize, num_sbb: usize, common: Common, master: Master, executor: Exec) -> Self {
		CrCache {
			idx,
			sbb_idx,
			num_sbb,
			state: CacheState::Clean,
			bag: None,
			rerun_idx: None,
			results: BTreeMap::new(),
			master_pass: OverlayDriver::new(master),
			overlay: OverlayDriver::new(common.clone()),
			macros: MacroBarrier::new(common),
			executor,
		}
	}

	/// This cache's pool slot.
	pub fn idx(&self) -> usize {
		self.idx
	}

	/// This cache's position in the cohort's commit order.
	pub fn sbb_idx(&self) -> usize {
		self.sbb_idx
	}

	/// The current FSM state.
	pub fn state(&self) -> CacheState {
		self.state
	}

	/// The earliest contract index this epoch had to re-execute, if any.
	pub fn rerun_idx(&self) -> Option<TxIdx> {
		self.rerun_idx
	}

	/// Per-transaction results produced so far this epoch.
	pub fn results(&self) -> &BTreeMap<TxIdx, ExecutionResult> {
		&self.results
	}

	/// The cohort's shared common layer.
	pub fn common(&self) -> &Common {
		self.overlay.below()
	}

	/// The node's master layer.
	pub fn master(&self) -> &Master {
		self.master_pass.below()
	}

	fn require(&self, expected: CacheState, trigger: &'static str) -> Result<(), TransitionError> {
		if self.state == expected {
			Ok(())
		} else {
			Err(TransitionError { trigger, from: self.state })
		}
	}

	/// Record a KV failure, route the cache to `Discarded` and best-effort
	/// reset it, matching the propagation policy that no transition ever
	/// leaves a cache half-finished.
	fn fail_to_discard(&mut self, err: std::io::Error) -> CrCacheError {
		log::error!("cache {} hit a backing-store failure: {}", self.idx, err);
		self.state = CacheState::Discarded;
		if let Err(reset_err) = self.reset() {
			log::error!("cache {} failed to reset after a backing-store failure: {}", self.idx, reset_err);
		}
		CrCacheError::Kv(err)
	}

	/// `Clean -> BagSet`. Only SBB 0 bumps the `RESET` macro, seeding the
	/// predicate that the epoch's `sync_reset` waits on.
	pub fn set_bag(&mut self, bag: TransactionBag) -> Result<(), CrCacheError> {
		self.require(CacheState::Clean, "set_bag")?;
		if self.sbb_idx == 0 {
			self.macros.incr(Macros::RESET).map_err(|e| self.fail_to_discard(e))?;
		}
		self.bag = Some(bag);
		self.state = CacheState::BagSet;
		log::debug!("cache {} (sbb {}) armed with a new bag", self.idx, self.sbb_idx);
		Ok(())
	}

	/// `BagSet -> Executed`. Runs the bag's first pass against the master
	/// layer, then transplants what it captured into the per-cache overlay
	/// so conflict resolution and rerun work against the common layer
	/// instead.
	pub fn execute(&mut self) -> Result<(), CrCacheError> {
		self.require(CacheState::BagSet, "execute")?;
		let bag = self.bag.as_ref().expect("BagSet implies a bag is set");
		let transactions: Vec<(TxIdx, &Transaction)> = bag.transactions.iter().enumerate().collect();
		let results = self.executor.execute(&transactions, &bag.environment, &mut self.master_pass);
		log::debug!("cache {} (sbb {}) executed {} transactions against master", self.idx, self.sbb_idx, results.len());
		self.results = results;

		self.overlay.reset_cache_from(
			self.master_pass.modified_keys().clone(),
			self.master_pass.contract_modifications().clone(),
			self.master_pass.original_values().clone(),
		);
		self.master_pass.reset_cache();

		self.macros.incr(Macros::EXECUTION).map_err(|e| self.fail_to_discard(e))?;
		self.state = CacheState::Executed;
		Ok(())
	}

	/// Poll the `sync_execution` condition: fires `start_cr` (and everything
	/// it chains into, up through `commit`) once this cache's conflict-
	/// resolution turn has arrived and the scheduler reports it at the head
	/// of the commit-ordering stack.
	///
	/// Returns `Ok(true)` once the cache has left `Executed` (whether via
	/// this call or some other path), `Ok(false)` if the condition isn't met
	/// yet and the caller should poll again later.
	pub fn poll_sync_execution(&mut self, is_top_of_stack: bool) -> Result<bool, CrCacheError> {
		if self.state != CacheState::Executed {
			return Ok(true);
		}
		let turn = self.macros.read(Macros::CONFLICT_RESOLUTION).map_err(|e| self.fail_to_discard(e))?;
		if turn != self.sbb_idx as i64 || !is_top_of_stack {
			return Ok(false);
		}
		log::debug!("cache {} (sbb {}) starting conflict resolution", self.idx, self.sbb_idx);
		self.state = CacheState::CrStarted;
		self.start_cr()?;
		Ok(true)
	}

	/// `CrStarted -> ReadyToCommit`, then immediately `commit`: neither step
	/// has a gating condition of its own once `sync_execution` has fired.
	fn start_cr(&mut self) -> Result<(), CrCacheError> {
		debug_assert_eq!(self.state, CacheState::CrStarted);
		self.resolve_conflicts()?;
		self.state = CacheState::ReadyToCommit;
		self.commit()
	}

	/// Compare every key this bag read against the common and master layers,
	/// and re-execute the suffix starting at the earliest contract whose
	/// read has since gone stale.
	fn resolve_conflicts(&mut self) -> Result<(), CrCacheError> {
		let snapshot = self.overlay.original_values().clone();
		let mut conflicted = Vec::new();

		for (key, original) in snapshot {
			let common_value = self.overlay.get_direct(&key).map_err(|e| self.fail_to_discard(e))?;
			let is_conflicted = if common_value.is_some() && common_value != original {
				true
			} else {
				let master_value = self.master_pass.below().get(&key).map_err(|e| self.fail_to_discard(e))?;
				master_value != original
			};
			if is_conflicted {
				log::trace!("cache {} (sbb {}) saw a conflict on key {:?}", self.idx, self.sbb_idx, key);
				conflicted.push(key);
			}
		}

		let rerun_idx =
			conflicted.iter().filter_map(|k| self.overlay.modified_keys().get(k).map(|(idx, _)| *idx)).min();
		self.rerun_idx = rerun_idx;

		if let Some(idx) = rerun_idx {
			log::debug!("cache {} (sbb {}) reruns from contract {}", self.idx, self.sbb_idx, idx);
			self.overlay.revert(idx);
			let environment = self.bag.as_ref().expect("ReadyToCommit implies a bag is set").environment.clone();
			let bag = self.bag.as_ref().expect("ReadyToCommit implies a bag is set");
			let suffix = bag.yield_from(idx);
			let transactions: Vec<(TxIdx, &Transaction)> =
				suffix.iter().enumerate().map(|(offset, tx)| (idx + offset, tx)).collect();
			let rerun_results = self.executor.execute(&transactions, &environment, &mut self.overlay);
			self.results.extend(rerun_results);
		} else {
			log::trace!("cache {} (sbb {}) saw no conflicts", self.idx, self.sbb_idx);
		}

		Ok(())
	}

	/// `ReadyToCommit -> Committed`, or `Discarded` on a result-count
	/// mismatch. Delivers `SBData` to the bag's completion sink before
	/// touching the common layer, matching the source's delivery-before-
	/// turn-advance ordering (SBB `k` must deliver before SBB `k+1` may
	/// start conflict resolution).
	fn commit(&mut self) -> Result<(), CrCacheError> {
		debug_assert_eq!(self.state, CacheState::ReadyToCommit);
		let sb_data = {
			let bag = self.bag.as_ref().expect("ReadyToCommit implies a bag is set");
			assembler::assemble(bag, &self.results, self.overlay.contract_modifications())
		};

		match sb_data {
			Some(sb_data) => {
				self.bag.as_mut().expect("bag is set").complete(sb_data);
				self.overlay.commit().map_err(|e| self.fail_to_discard(e))?;
				self.macros.incr(Macros::CONFLICT_RESOLUTION).map_err(|e| self.fail_to_discard(e))?;
				self.state = CacheState::Committed;
				log::debug!("cache {} (sbb {}) committed", self.idx, self.sbb_idx);
				Ok(())
			}
			None => {
				let expected = self.bag.as_ref().map(|b| b.transactions.len()).unwrap_or(0);
				log::error!(
					"cache {} (sbb {}) got {} results for {} transactions; discarding",
					self.idx,
					self.sbb_idx,
					self.results.len(),
					expected,
				);
				self.discard()
			}
		}
	}

	/// Poll the `sync_merge_ready` condition: `Committed -> ReadyToMerge`
	/// once every sibling in the cohort has committed.
	pub fn poll_sync_merge_ready(&mut self) -> Result<bool, CrCacheError> {
		if self.state != CacheState::Committed {
			return Ok(true);
		}
		let turn = self.macros.read(Macros::CONFLICT_RESOLUTION).map_err(|e| self.fail_to_discard(e))?;
		if turn != self.num_sbb as i64 {
			return Ok(false);
		}
		self.state = CacheState::ReadyToMerge;
		log::debug!("cache {} (sbb {}) ready to merge", self.idx, self.sbb_idx);
		Ok(true)
	}

	/// `ReadyToMerge -> Merged`, then immediately `reset`. Only SBB 0 has any
	/// work to do here: promote every non-macro key from common into master.
	pub fn merge(&mut self) -> Result<(), CrCacheError> {
		self.require(CacheState::ReadyToMerge, "merge")?;
		if self.sbb_idx == 0 {
			let snapshot = self.overlay.below().snapshot().map_err(|e| self.fail_to_discard(e))?;
			for (key, value) in snapshot {
				if Macros::ALL.contains(&key.as_str()) {
					continue;
				}
				self.master_pass.below().set(&key, value).map_err(|e| self.fail_to_discard(e))?;
			}
			self.master_pass.below().commit().map_err(|e| self.fail_to_discard(e))?;
			log::debug!("cache {} (sbb 0) promoted common to master", self.idx);
		}
		self.state = CacheState::Merged;
		self.reset()
	}

	/// `Merged | Discarded -> Reset`. Only SBB 0 flushes the common layer
	/// and resets the macros, since they're shared across the whole cohort.
	fn reset(&mut self) -> Result<(), CrCacheError> {
		debug_assert!(matches!(self.state, CacheState::Merged | CacheState::Discarded));
		self.overlay.reset_cache();
		self.master_pass.reset_cache();
		self.bag = None;
		self.rerun_idx = None;
		self.results.clear();

		if self.sbb_idx == 0 {
			self.overlay.flush().map_err(CrCacheError::Kv)?;
			self.macros.reset_all().map_err(CrCacheError::Kv)?;
		}

		self.state = CacheState::Reset;
		log::debug!("cache {} (sbb {}) reset", self.idx, self.sbb_idx);
		Ok(())
	}

	/// Poll the `sync_reset` condition: `Reset -> Clean` once SBB 0's macro
	/// reset has landed. The caller (the scheduler) is responsible for
	/// calling `mark_clean` once this returns `Ok(true)`.
	pub fn poll_sync_reset(&mut self) -> Result<bool, CrCacheError> {
		if self.state != CacheState::Reset {
			return Ok(true);
		}
		let turn = self.macros.read(Macros::RESET).map_err(|e| self.fail_to_discard(e))?;
		if turn != 0 {
			return Ok(false);
		}
		self.state = CacheState::Clean;
		log::debug!("cache {} (sbb {}) clean and ready for reuse", self.idx, self.sbb_idx);
		Ok(true)
	}

	/// Abort from any in-progress state, routing through `reset` for
	/// cleanup. A no-op once the cache is already `Clean`, `Reset` or
	/// `Discarded`.
	pub fn discard(&mut self) -> Result<(), CrCacheError> {
		if matches!(self.state, CacheState::Clean | CacheState::Reset | CacheState::Discarded) {
			return Ok(());
		}
		log::warn!("cache {} (sbb {}) discarded from state {:?}", self.idx, self.sbb_idx, self.state);
		self.state = CacheState::Discarded;
		self.reset()
	}
}
