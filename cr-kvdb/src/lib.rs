// Copyright 2015-2020 Parity Technologies (UK) Ltd.
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

//! Key-value store abstraction consumed by the CR-Cache pipeline.
//!
//! This crate deliberately knows nothing about overlays, conflict detection or
//! reruns — it is the single-layer raw backend trait that `cr-state-machine`
//! layers its overlay semantics on top of, the same way `sp-state-machine`
//! layers `OverlayedChanges` on top of a plain backend in this codebase.

#![warn(missing_docs)]

mod memory;

pub use memory::InMemoryKv;

use std::collections::BTreeMap;

/// A key in the store.
pub type Key = String;

/// A raw, already-encoded value.
pub type Value = Vec<u8>;

/// Raw key-value store abstraction.
///
/// Implementations need not be fast or durable — the pipeline only ever holds
/// one epoch's worth of state live at a time — but they must be safe to share
/// across the cache pool, since the common and master layers are visible to
/// every cache in a cohort.
pub trait KvDriver: Send + Sync {
	/// Read a value. A missing key yields `Ok(None)`, never an error.
	fn get(&self, key: &str) -> std::io::Result<Option<Value>>;

	/// Write a value, replacing any existing one.
	fn set(&self, key: &str, value: Value) -> std::io::Result<()>;

	/// Atomically increment the integer stored at `key` (treating a missing key
	/// as `0`) and return the new value.
	fn incrby(&self, key: &str) -> std::io::Result<i64>;

	/// Enumerate all keys currently in the store.
	fn keys(&self) -> std::io::Result<Vec<Key>>;

	/// Flush pending writes. A no-op for backends with no internal buffering.
	fn commit(&self) -> std::io::Result<()>;

	/// Drop every key in the store.
	fn flush(&self) -> std::io::Result<()>;

	/// Read every key and value currently in the store. Used by `merge` to
	/// promote the common layer into master.
	fn snapshot(&self) -> std::io::Result<BTreeMap<Key, Value>> {
		let mut out = BTreeMap::new();
		for key in self.keys()? {
			if let Some(value) = self.get(&key)? {
				out.insert(key, value);
			}
		}
		Ok(out)
	}
}

/// Parse the big-endian decimal counter previously written by [`KvDriver::incrby`].
pub fn decode_counter(raw: &[u8]) -> std::io::Result<i64> {
	std::str::from_utf8(raw)
		.ok()
		.and_then(|s| s.parse::<i64>().ok())
		.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt counter value"))
}

/// Encode a counter value the way [`decode_counter`] expects to read it back.
pub fn encode_counter(value: i64) -> Value {
	value.to_string().into_bytes()
}
