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

//! An in-memory [`KvDriver`], handy for tests and for driving the scheduler
//! without a real backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{decode_counter, encode_counter, Key, KvDriver, Value};

/// A `BTreeMap`-backed [`KvDriver`], shareable across threads via `Arc`.
#[derive(Clone, Default)]
pub struct InMemoryKv {
	data: Arc<RwLock<BTreeMap<Key, Value>>>,
}

impl InMemoryKv {
	/// An empty store.
	pub fn new() -> Self {
		InMemoryKv { data: Arc::new(RwLock::new(BTreeMap::new())) }
	}
}

impl KvDriver for InMemoryKv {
	fn get(&self, key: &str) -> std::io::Result<Option<Value>> {
		Ok(self.data.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: Value) -> std::io::Result<()> {
		self.data.write().insert(key.to_owned(), value);
		Ok(())
	}

	fn incrby(&self, key: &str) -> std::io::Result<i64> {
		let mut data = self.data.write();
		let current = data.get(key).map(|raw| decode_counter(raw)).transpose()?.unwrap_or(0);
		let next = current + 1;
		data.insert(key.to_owned(), encode_counter(next));
		Ok(next)
	}

	fn keys(&self) -> std::io::Result<Vec<Key>> {
		Ok(self.data.read().keys().cloned().collect())
	}

	fn commit(&self) -> std::io::Result<()> {
		Ok(())
	}

	fn flush(&self) -> std::io::Result<()> {
		self.data.write().clear();
		Ok(())
	}
}
