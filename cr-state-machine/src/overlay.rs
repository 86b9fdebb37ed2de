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

use std::collections::BTreeMap;

use cr_kvdb::KvDriver;

/// Index of the contract (transaction position) currently being executed.
pub type ContractIdx = usize;

/// A storage key.
pub type StorageKey = String;

/// A storage value. `None` means the key did not exist when observed.
pub type StorageValue = Option<Vec<u8>>;

/// Per-key write, with the lowest contract index that wrote it during this bag.
///
/// The index is kept at the *lowest* writer, not the latest one: if a key's
/// original read later turns out to be stale, every contract from that first
/// write onward must be redone, since a later write to the same key may itself
/// depend on state only that earlier contract produced.
pub type ModifiedKeys = BTreeMap<StorageKey, (ContractIdx, Vec<u8>)>;

/// The value observed at the first read of each key this bag has touched.
pub type OriginalValues = BTreeMap<StorageKey, StorageValue>;

/// Per-contract breakdown of key → value writes, indexed by contract position.
pub type ContractModifications = Vec<BTreeMap<StorageKey, Vec<u8>>>;

/// The overlayed changes to state, layered on top of a single backing
/// [`KvDriver`] (`Below`).
///
/// A CR-Cache keeps two of these: one layered directly over the master store,
/// used only for a bag's first execution pass, and one layered over the
/// common store, used for conflict resolution, partial reruns and commit. The
/// "bypasses overlay" accessors ([`OverlayDriver::get_direct`] /
/// [`OverlayDriver::set_direct`]) read and write `Below` without touching any
/// of the bookkeeping below, which is how conflict detection inspects the
/// common and master layers without perturbing what a cache believes it read.
pub struct OverlayDriver<Below> {
	below: Below,
	/// Pending writes, flushed into `Below` on [`OverlayDriver::commit`].
	cache: BTreeMap<StorageKey, Vec<u8>>,
	modified_keys: ModifiedKeys,
	original_values: OriginalValues,
	contract_modifications: ContractModifications,
	current_contract: ContractIdx,
}

impl<Below: KvDriver> OverlayDriver<Below> {
	/// Wrap `below` with an empty overlay.
	pub fn new(below: Below) -> Self {
		OverlayDriver {
			below,
			cache: BTreeMap::new(),
			modified_keys: BTreeMap::new(),
			original_values: BTreeMap::new(),
			contract_modifications: Vec::new(),
			current_contract: 0,
		}
	}

	/// The wrapped backing store.
	pub fn below(&self) -> &Below {
		&self.below
	}

	/// Values observed at first read, keyed by storage key.
	pub fn original_values(&self) -> &OriginalValues {
		&self.original_values
	}

	/// Latest value and earliest writing contract index, keyed by storage key.
	pub fn modified_keys(&self) -> &ModifiedKeys {
		&self.modified_keys
	}

	/// Per-contract write sets, in contract (transaction) order.
	pub fn contract_modifications(&self) -> &ContractModifications {
		&self.contract_modifications
	}

	/// Mark `idx` as the contract whose writes should now be attributed.
	/// Called by the executor before running transaction `idx`.
	pub fn begin_contract(&mut self, idx: ContractIdx) {
		self.current_contract = idx;
		while self.contract_modifications.len() <= idx {
			self.contract_modifications.push(BTreeMap::new());
		}
	}

	/// Read `key`, checking the pending write buffer before falling through to
	/// `Below`. Records the observed value in `original_values` on first read.
	pub fn get(&mut self, key: &str) -> std::io::Result<StorageValue> {
		let value = match self.cache.get(key) {
			Some(v) => Some(v.clone()),
			None => self.below.get(key)?,
		};
		self.original_values.entry(key.to_owned()).or_insert_with(|| value.clone());
		Ok(value)
	}

	/// Write `value` for `key`, attributing it to the contract currently set by
	/// [`OverlayDriver::begin_contract`].
	pub fn set(&mut self, key: &str, value: Vec<u8>) -> std::io::Result<()> {
		let idx = match self.modified_keys.get(key) {
			Some((existing, _)) => (*existing).min(self.current_contract),
			None => self.current_contract,
		};
		self.modified_keys.insert(key.to_owned(), (idx, value.clone()));
		if self.contract_modifications.len() <= self.current_contract {
			self.contract_modifications.push(BTreeMap::new());
		}
		self.contract_modifications[self.current_contract].insert(key.to_owned(), value.clone());
		self.cache.insert(key.to_owned(), value);
		Ok(())
	}

	/// Read `key` straight from `Below`, bypassing the pending write buffer.
	pub fn get_direct(&self, key: &str) -> std::io::Result<StorageValue> {
		self.below.get(key)
	}

	/// Write `key` straight to `Below`, bypassing the pending write buffer.
	pub fn set_direct(&self, key: &str, value: Vec<u8>) -> std::io::Result<()> {
		self.below.set(key, value)
	}

	/// Discard every overlay entry whose originating contract index is `>= idx`,
	/// and truncate `contract_modifications` to length `idx`. `original_values`
	/// is left untouched, so a replayed read during rerun still observes the
	/// snapshot taken before any sibling committed.
	pub fn revert(&mut self, idx: ContractIdx) {
		let stale: Vec<StorageKey> = self
			.modified_keys
			.iter()
			.filter(|(_, (cidx, _))| *cidx >= idx)
			.map(|(k, _)| k.clone())
			.collect();
		for key in &stale {
			self.cache.remove(key);
			self.modified_keys.remove(key);
		}
		self.contract_modifications.truncate(idx);
		self.current_contract = idx;
	}

	/// Replace `modified_keys`, `contract_modifications` and `original_values`
	/// wholesale, and rebuild the pending write buffer from the incoming
	/// `modified_keys` so that a later [`OverlayDriver::commit`] actually
	/// flushes those writes downstream.
	///
	/// Used to transplant the captures a bag's first execution pass made
	/// against the master-only driver into the per-cache common-layer overlay.
	pub fn reset_cache_from(
		&mut self,
		modified_keys: ModifiedKeys,
		contract_modifications: ContractModifications,
		original_values: OriginalValues,
	) {
		self.cache = modified_keys.iter().map(|(k, (_, v))| (k.clone(), v.clone())).collect();
		self.modified_keys = modified_keys;
		self.contract_modifications = contract_modifications;
		self.original_values = original_values;
		self.current_contract = 0;
	}

	/// Discard the pending write buffer and all bookkeeping: `modified_keys`,
	/// `original_values`, `contract_modifications`.
	pub fn reset_cache(&mut self) {
		self.cache.clear();
		self.modified_keys.clear();
		self.original_values.clear();
		self.contract_modifications.clear();
		self.current_contract = 0;
	}

	/// Flush the pending write buffer into `Below`, then clear it. Bookkeeping
	/// (`modified_keys`, `original_values`, `contract_modifications`) survives
	/// a commit — it is still needed to assemble this bag's `SBData`.
	pub fn commit(&mut self) -> std::io::Result<()> {
		for (key, value) in self.cache.iter() {
			self.below.set(key, value.clone())?;
		}
		self.cache.clear();
		self.below.commit()
	}

	/// Drop every key in `Below`.
	pub fn flush(&self) -> std::io::Result<()> {
		self.below.flush()
	}
}
