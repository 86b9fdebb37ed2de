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

//! The pool of caches, the commit-ordering queue, and the single-threaded
//! cooperative poll loop that drives every gated transition.

use std::collections::BTreeSet;
use std::time::Instant;

use cr_cache::{CacheState, CrCache};
use cr_kvdb::KvDriver;
use cr_primitives::TransactionBag;

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

/// What happened to a pooled cache during one [`Scheduler::poll`] sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
	/// The cache at this pool index committed to the common layer.
	Committed(usize),
	/// The cache at this pool index timed out waiting for its siblings and
	/// was discarded.
	TimedOut(usize),
	/// Every cache in the cohort reached `ReadyToMerge`; the scheduler fired
	/// `merge` on all of them, SBB 0 first.
	Merged,
	/// The cache at this pool index is `Clean` again and back in the free set.
	Cleaned(usize),
}

/// Owns a cohort-sized pool of [`CrCache`]s: assigns bags to `Clean` slots,
/// tracks which cache is at the head of the commit-ordering queue, and polls
/// every gated transition on each sweep.
///
/// Mirrors the source's scheduler in spirit — no trigger ever blocks, every
/// wait is expressed as "call me again next sweep" — but is type-checked: the
/// pool index doubles as the stable id a cache would otherwise need a cyclic
/// back-reference to the scheduler for.
pub struct Scheduler<Common, Master, Exec> {
	config: SchedulerConfig,
	pool: Vec<CrCache<Common, Master, Exec>>,
	/// Pool indices of `Clean` caches, available for `submit`.
	free: BTreeSet<usize>,
	/// Pool indices of caches that have finished `execute` and are waiting
	/// for their conflict-resolution turn. Unordered by insertion — "top of
	/// stack" is derived from the lowest `sbb_idx` still pending, not from
	/// submission order, since the `CONFLICT_RESOLUTION` turn token always
	/// advances sbb_idx 0, 1, 2, … regardless of which cache finished
	/// executing first.
	execution_queue: BTreeSet<usize>,
	/// When each `Committed` cache entered that state, for the commit timeout.
	committed_since: Vec<Option<Instant>>,
}

impl<Common, Master, Exec> Scheduler<Common, Master, Exec>
where
	Common: KvDriver + Clone,
	Master: KvDriver + Clone,
	Exec: cr_executor::Executor<Common> + cr_executor::Executor<Master>,
{
	/// Build a scheduler over `pool`, a cache per `sbb_idx` in `0..config.num_sbb`.
	///
	/// `pool` must contain exactly `config.pool_size` caches, one per
	/// `sbb_idx` in `0..config.num_sbb`, with no duplicates or gaps. Every
	/// cache must start `Clean`.
	pub fn new(config: SchedulerConfig, pool: Vec<CrCache<Common, Master, Exec>>) -> Result<Self, SchedulerError> {
		if pool.len() != config.pool_size {
			return Err(SchedulerError::PoolSizeMismatch { configured: config.pool_size, supplied: pool.len() });
		}

		let mut seen = vec![false; config.num_sbb];
		for cache in &pool {
			let sbb_idx = cache.sbb_idx();
			if sbb_idx >= config.num_sbb {
				return Err(SchedulerError::MissingSbbIdx(sbb_idx));
			}
			if seen[sbb_idx] {
				return Err(SchedulerError::DuplicateSbbIdx(sbb_idx));
			}
			seen[sbb_idx] = true;
		}
		if let Some(missing) = seen.iter().position(|&s| !s) {
			return Err(SchedulerError::MissingSbbIdx(missing));
		}

		let free = pool.iter().map(|c| c.idx()).collect();
		let committed_since = vec![None; pool.len()];

		log::debug!("scheduler built with a {}-cache cohort", pool.len());
		Ok(Scheduler { config, pool, free, execution_queue: BTreeSet::new(), committed_since })
	}

	/// The scheduler's configuration.
	pub fn config(&self) -> &SchedulerConfig {
		&self.config
	}

	/// The pool, indexed by pool slot (not necessarily `sbb_idx` order).
	pub fn pool(&self) -> &[CrCache<Common, Master, Exec>] {
		&self.pool
	}

	/// True iff every cache in the pool is `Clean`.
	pub fn is_idle(&self) -> bool {
		self.pool.iter().all(|c| c.state() == CacheState::Clean)
	}

	/// `check_top_of_stack`: true iff `idx` holds the lowest `sbb_idx` among
	/// every cache still waiting for its conflict-resolution turn — i.e. the
	/// next cache the `CONFLICT_RESOLUTION` turn token will unblock,
	/// regardless of the order bags were submitted in.
	pub fn check_top_of_stack(&self, idx: usize) -> bool {
		let sbb_idx = self.pool[idx].sbb_idx();
		self.execution_queue.iter().map(|&i| self.pool[i].sbb_idx()).min() == Some(sbb_idx)
	}

	/// Assign `bag` to the `Clean` cache whose commit-order position is
	/// `sbb_idx`, then run it through `set_bag` and `execute` and enqueue it
	/// for its conflict-resolution turn.
	pub fn submit(&mut self, sbb_idx: usize, bag: TransactionBag) -> Result<(), SchedulerError> {
		let idx = self
			.pool
			.iter()
			.position(|c| c.sbb_idx() == sbb_idx && c.state() == CacheState::Clean)
			.ok_or(SchedulerError::CacheBusy(sbb_idx))?;

		self.free.remove(&idx);
		self.pool[idx].set_bag(bag)?;
		self.pool[idx].execute()?;
		self.execution_queue.insert(idx);
		log::debug!("cache {} (sbb {}) queued for conflict resolution", idx, sbb_idx);
		Ok(())
	}

	/// `mark_clean`: return a cache to the free set and drop any bookkeeping
	/// left over from the epoch it just finished.
	fn mark_clean(&mut self, idx: usize) {
		self.free.insert(idx);
		self.execution_queue.remove(&idx);
		self.committed_since[idx] = None;
	}

	/// One sweep over the pool: poll every gated transition, fire `merge`
	/// once the whole cohort is ready, and report what changed.
	///
	/// No call in here blocks; a condition that isn't satisfied yet simply
	/// produces no event for that cache and is retried on the next sweep.
	pub fn poll(&mut self) -> Result<Vec<SchedulerEvent>, SchedulerError> {
		let mut events = Vec::new();

		for idx in 0..self.pool.len() {
			match self.pool[idx].state() {
				CacheState::Executed => {
					let is_top = self.check_top_of_stack(idx);
					if self.pool[idx].poll_sync_execution(is_top)? {
						self.execution_queue.remove(&idx);
						events.push(SchedulerEvent::Committed(idx));
					}
				}
				CacheState::Committed => {
					let since = *self.committed_since[idx].get_or_insert_with(Instant::now);
					if since.elapsed() > self.config.commit_timeout {
						log::warn!("cache {} timed out waiting for its siblings to commit", idx);
						self.pool[idx].discard()?;
						self.committed_since[idx] = None;
						events.push(SchedulerEvent::TimedOut(idx));
					} else if self.pool[idx].poll_sync_merge_ready()? {
						self.committed_since[idx] = None;
					}
				}
				CacheState::Reset => {
					if self.pool[idx].poll_sync_reset()? {
						self.mark_clean(idx);
						events.push(SchedulerEvent::Cleaned(idx));
					}
				}
				CacheState::Discarded => {
					// Defensive: every path already routes through `reset`
					// before leaving a transition, so this is normally
					// transient, but `discard` is idempotent if not.
					self.pool[idx].discard()?;
				}
				CacheState::Clean
				| CacheState::BagSet
				| CacheState::CrStarted
				| CacheState::ReadyToCommit
				| CacheState::ReadyToMerge
				| CacheState::Merged => {}
			}
		}

		if !self.pool.is_empty() && self.pool.iter().all(|c| c.state() == CacheState::ReadyToMerge) {
			log::debug!("cohort fully committed; firing merge");
			let mut order: Vec<usize> = (0..self.pool.len()).collect();
			order.sort_by_key(|&idx| self.pool[idx].sbb_idx());
			for idx in order {
				self.pool[idx].merge()?;
			}
			events.push(SchedulerEvent::Merged);
		}

		Ok(events)
	}

	/// Poll repeatedly, sleeping [`SchedulerConfig::poll_interval`] between
	/// sweeps, until every cache is `Clean` or `max_sweeps` is reached.
	///
	/// Intended for tests and the bundled demo, which have no network layer
	/// driving the poll loop on a real event reactor.
	pub fn run_until_idle(&mut self, max_sweeps: usize) -> Result<Vec<SchedulerEvent>, SchedulerError> {
		let mut all_events = Vec::new();
		for _ in 0..max_sweeps {
			if self.is_idle() {
				break;
			}
			all_events.extend(self.poll()?);
			if !self.is_idle() {
				std::thread::sleep(self.config.poll_interval);
			}
		}
		Ok(all_events)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cr_executor::ClosureExecutor;
	use cr_kvdb::InMemoryKv;
	use cr_primitives::{Environment, ExecutionResult, InputHash, Transaction};
	use cr_state_machine::{MacroBarrier, OverlayDriver};
	use std::time::Duration;

	fn set_executor(
	) -> ClosureExecutor<impl Fn(&Transaction, &Environment, &mut OverlayDriver<InMemoryKv>) -> ExecutionResult> {
		ClosureExecutor::new(|tx: &Transaction, _env, driver: &mut OverlayDriver<InMemoryKv>| {
			let text = String::from_utf8(tx.contract.clone()).unwrap();
			let mut parts = text.splitn(2, '=');
			let key = parts.next().unwrap();
			let value = parts.next().unwrap().as_bytes().to_vec();
			driver.set(key, value).unwrap();
			ExecutionResult { status: 0, response: vec![], stamps: 1 }
		})
	}

	fn hash(tag: &str) -> InputHash {
		InputHash::new(tag.repeat(64)).unwrap()
	}

	fn config(num_sbb: usize) -> SchedulerConfig {
		SchedulerConfig {
			num_sbb,
			pool_size: num_sbb,
			poll_interval: Duration::from_millis(1),
			commit_timeout: Duration::from_secs(5),
		}
	}

	#[test]
	fn rejects_a_pool_of_the_wrong_size() {
		let common = InMemoryKv::new();
		let master = InMemoryKv::new();
		let pool = vec![CrCache::new(0, 0, 2, common, master, set_executor())];
		let err = Scheduler::new(config(2), pool).unwrap_err();
		assert!(matches!(err, SchedulerError::PoolSizeMismatch { configured: 2, supplied: 1 }));
	}

	#[test]
	fn rejects_duplicate_sbb_indices() {
		let common = InMemoryKv::new();
		let master = InMemoryKv::new();
		let pool = vec![
			CrCache::new(0, 0, 2, common.clone(), master.clone(), set_executor()),
			CrCache::new(1, 0, 2, common, master, set_executor()),
		];
		let err = Scheduler::new(config(2), pool).unwrap_err();
		assert!(matches!(err, SchedulerError::DuplicateSbbIdx(0)));
	}

	#[test]
	fn single_cache_cohort_reaches_clean_through_full_epoch() {
		let common = InMemoryKv::new();
		let master = InMemoryKv::new();
		MacroBarrier::new(common.clone()).reset_all().unwrap();
		let pool = vec![CrCache::new(0, 0, 1, common, master.clone(), set_executor())];
		let mut scheduler = Scheduler::new(config(1), pool).unwrap();

		let bag = TransactionBag::new(hash("a"), vec![Transaction::new(b"a=1".to_vec())], Environment::new(), |_| {});
		scheduler.submit(0, bag).unwrap();

		let events = scheduler.run_until_idle(100).unwrap();

		assert!(scheduler.is_idle());
		assert!(events.contains(&SchedulerEvent::Committed(0)));
		assert!(events.contains(&SchedulerEvent::Merged));
		assert!(events.contains(&SchedulerEvent::Cleaned(0)));
		assert_eq!(master.get("a").unwrap(), Some(b"1".to_vec()));
	}

	#[test]
	fn three_cache_cohort_commits_in_sbb_order_even_when_submitted_out_of_order() {
		let common = InMemoryKv::new();
		let master = InMemoryKv::new();
		MacroBarrier::new(common.clone()).reset_all().unwrap();
		let pool = vec![
			CrCache::new(0, 0, 3, common.clone(), master.clone(), set_executor()),
			CrCache::new(1, 1, 3, common.clone(), master.clone(), set_executor()),
			CrCache::new(2, 2, 3, common.clone(), master.clone(), set_executor()),
		];
		let mut scheduler = Scheduler::new(config(3), pool).unwrap();

		// Submit (and therefore execute, and enqueue) sbb 2 first, then 0,
		// then 1 - the scheduler must still serialize commits 0, 1, 2.
		scheduler
			.submit(2, TransactionBag::new(hash("c"), vec![Transaction::new(b"c=3".to_vec())], Environment::new(), |_| {}))
			.unwrap();
		scheduler
			.submit(0, TransactionBag::new(hash("a"), vec![Transaction::new(b"a=1".to_vec())], Environment::new(), |_| {}))
			.unwrap();
		scheduler
			.submit(1, TransactionBag::new(hash("b"), vec![Transaction::new(b"b=2".to_vec())], Environment::new(), |_| {}))
			.unwrap();

		let events = scheduler.run_until_idle(1000).unwrap();

		let commit_order: Vec<usize> = events
			.iter()
			.filter_map(|e| match e {
				SchedulerEvent::Committed(idx) => Some(*idx),
				_ => None,
			})
			.collect();
		assert_eq!(commit_order, vec![0, 1, 2]);
		assert!(scheduler.is_idle());
		assert_eq!(master.get("a").unwrap(), Some(b"1".to_vec()));
		assert_eq!(master.get("b").unwrap(), Some(b"2".to_vec()));
		assert_eq!(master.get("c").unwrap(), Some(b"3".to_vec()));
	}

	#[test]
	fn submitting_to_a_busy_sbb_slot_is_rejected() {
		let common = InMemoryKv::new();
		let master = InMemoryKv::new();
		MacroBarrier::new(common.clone()).reset_all().unwrap();
		let pool = vec![CrCache::new(0, 0, 1, common, master, set_executor())];
		let mut scheduler = Scheduler::new(config(1), pool).unwrap();

		scheduler
			.submit(0, TransactionBag::new(hash("a"), vec![Transaction::new(b"a=1".to_vec())], Environment::new(), |_| {}))
			.unwrap();
		let err = scheduler
			.submit(0, TransactionBag::new(hash("b"), vec![Transaction::new(b"b=1".to_vec())], Environment::new(), |_| {}))
			.unwrap_err();
		assert!(matches!(err, SchedulerError::CacheBusy(0)));
	}

	#[test]
	fn epoch_reuse_frees_the_slot_for_a_second_bag() {
		let common = InMemoryKv::new();
		let master = InMemoryKv::new();
		MacroBarrier::new(common.clone()).reset_all().unwrap();
		let pool = vec![CrCache::new(0, 0, 1, common, master.clone(), set_executor())];
		let mut scheduler = Scheduler::new(config(1), pool).unwrap();

		scheduler
			.submit(0, TransactionBag::new(hash("a"), vec![Transaction::new(b"a=1".to_vec())], Environment::new(), |_| {}))
			.unwrap();
		scheduler.run_until_idle(100).unwrap();

		scheduler
			.submit(0, TransactionBag::new(hash("b"), vec![Transaction::new(b"b=2".to_vec())], Environment::new(), |_| {}))
			.unwrap();
		scheduler.run_until_idle(100).unwrap();

		assert!(scheduler.is_idle());
		assert_eq!(master.get("a").unwrap(), Some(b"1".to_vec()));
		assert_eq!(master.get("b").unwrap(), Some(b"2".to_vec()));
	}
}
