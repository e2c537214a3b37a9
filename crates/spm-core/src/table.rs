use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::process::Process;
use crate::project::Project;

/// Name-keyed map of shared entities. Holds no business logic.
pub struct Registry<T> {
	table: RwLock<HashMap<String, Arc<T>>>,
}

pub type ProcTable = Registry<Process>;
pub type ProjectTable = Registry<Project>;

impl<T> Default for Registry<T> {
	fn default() -> Self {
		Self {
			table: RwLock::new(HashMap::new()),
		}
	}
}

impl<T> Registry<T> {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn get(&self, name: &str) -> Option<Arc<T>> {
		self.table.read().await.get(name).cloned()
	}

	/// Insert unless the name is taken. Never overwrites.
	pub async fn add(&self, name: &str, entity: Arc<T>) -> bool {
		let mut table = self.table.write().await;
		if table.contains_key(name) {
			return false;
		}
		table.insert(name.to_string(), entity);
		true
	}

	/// Snapshot sorted by name; callers never hold the lock while they work.
	pub async fn iter(&self) -> Vec<(String, Arc<T>)> {
		let table = self.table.read().await;
		let mut entries: Vec<(String, Arc<T>)> =
			table.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect();
		entries.sort_by(|a, b| a.0.cmp(&b.0));
		entries
	}

	pub async fn names(&self) -> Vec<String> {
		self.iter().await.into_iter().map(|(k, _)| k).collect()
	}

	pub async fn len(&self) -> usize {
		self.table.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.table.read().await.is_empty()
	}
}

impl Registry<Process> {
	/// Remove a process, flushing its output first.
	pub async fn del(&self, name: &str) -> bool {
		let mut table = self.table.write().await;
		let Some(process) = table.get(name) else {
			return false;
		};
		if let Err(e) = process.flush().await {
			tracing::warn!("failed to flush output of {}: {}", name, e);
		}
		table.remove(name);
		true
	}
}

impl Registry<Project> {
	/// Register a project that isn't known yet.
	pub async fn set(&self, name: &str, project: Arc<Project>) -> bool {
		self.add(name, project).await
	}

	pub async fn del(&self, name: &str) -> bool {
		self.table.write().await.remove(name).is_some()
	}
}
