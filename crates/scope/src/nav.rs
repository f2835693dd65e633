use serde::{Deserialize, Serialize};

use crate::role::Role;
use crate::selection::ScopeLevel;

/// Navigation entry gated by role and scope level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
	pub id: String,
	pub label: String,
	#[serde(default)]
	pub required_role: Role,
	/// Levels at which the entry is shown. Empty means every level.
	#[serde(default)]
	pub levels: Vec<ScopeLevel>,
}

impl NavItem {
	pub fn is_visible(&self, role: Role, level: ScopeLevel) -> bool {
		role.satisfies(self.required_role) && (self.levels.is_empty() || self.levels.contains(&level))
	}
}

/// Entries visible to `role` at `level`, in their original order.
pub fn visible_items(items: &[NavItem], role: Role, level: ScopeLevel) -> Vec<&NavItem> {
	items.iter().filter(|item| item.is_visible(role, level)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn item(id: &str, required_role: Role, levels: &[ScopeLevel]) -> NavItem {
		NavItem {
			id: id.to_string(),
			label: id.to_string(),
			required_role,
			levels: levels.to_vec(),
		}
	}

	#[test]
	fn filters_by_role_and_level() {
		let items = [
			item("dashboard", Role::Read, &[]),
			item("inventory", Role::Write, &[ScopeLevel::Store]),
			item("brands", Role::Manager, &[ScopeLevel::Company, ScopeLevel::Brand]),
			item("settings", Role::Admin, &[]),
		];

		let ids = |role, level| visible_items(&items, role, level).into_iter().map(|i| i.id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids(Role::Read, ScopeLevel::Store), ["dashboard"]);
		assert_eq!(ids(Role::Write, ScopeLevel::Store), ["dashboard", "inventory"]);
		assert_eq!(ids(Role::Manager, ScopeLevel::Brand), ["dashboard", "brands"]);
		assert_eq!(ids(Role::SuperAdmin, ScopeLevel::Company), ["dashboard", "brands", "settings"]);
	}

	#[test]
	fn missing_role_in_config_means_everyone() {
		let item: NavItem = serde_json::from_str(r#"{"id":"home","label":"Home"}"#).unwrap();
		assert!(item.is_visible(Role::Read, ScopeLevel::Company));
	}
}
