//! Resource listing helpers shared by host implementations.

use locator_types::{Pattern, ResourceRef};
use std::collections::BTreeSet;

/// Whether `name` passes the optional entry filter.
pub fn matches_pattern(name: &str, pattern: Option<&Pattern>) -> bool {
	pattern.is_none_or(|pattern| pattern.matches(name))
}

/// Normalises a namespace path to `a/b/` form, or the empty string for the root.
pub fn namespace_prefix(path: &str) -> String {
	let trimmed = path.trim_matches('/');
	if trimmed.is_empty() {
		String::new()
	} else {
		format!("{}/", trimmed)
	}
}

/// Lists entries under `path` from a flat set of resource paths.
///
/// Intermediate directories are reported as namespace entries with a trailing
/// `/`. Without `recursive` only direct children are returned.
pub fn list_entries<'a>(
	resources: impl IntoIterator<Item = &'a str>,
	path: &str,
	pattern: Option<&Pattern>,
	recursive: bool,
) -> Vec<ResourceRef> {
	let prefix = namespace_prefix(path);
	let mut entries = BTreeSet::new();

	for resource in resources {
		let Some(rest) = resource.strip_prefix(prefix.as_str()) else {
			continue;
		};
		let segments: Vec<&str> = rest.split('/').collect();
		let depth = if recursive { segments.len() } else { 1 };

		let mut current = prefix.clone();
		for (index, segment) in segments.iter().enumerate().take(depth) {
			if segment.is_empty() {
				break;
			}
			let is_leaf = index + 1 == segments.len();
			let entry = if is_leaf {
				format!("{}{}", current, segment)
			} else {
				format!("{}{}/", current, segment)
			};
			if matches_pattern(segment, pattern) {
				entries.insert(entry.clone());
			}
			current = entry;
		}
	}

	entries.into_iter().map(ResourceRef::new).collect()
}
