use serde::{Deserialize, Deserializer, Serialize};

/// Actor role, totally ordered by privilege.
///
/// `Read < Write < Manager < Admin < SuperAdmin`. Unknown role names parse
/// as [`Role::Read`] so that a missing or legacy role degrades to minimum
/// privilege instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	#[default]
	Read,
	Write,
	Manager,
	Admin,
	SuperAdmin,
}

impl Role {
	pub const ALL: [Role; 5] = [Role::Read, Role::Write, Role::Manager, Role::Admin, Role::SuperAdmin];

	/// Numeric rank; higher means more privileged.
	pub const fn rank(self) -> u8 {
		match self {
			Self::Read => 0,
			Self::Write => 1,
			Self::Manager => 2,
			Self::Admin => 3,
			Self::SuperAdmin => 4,
		}
	}

	/// Returns true when this role is at least as privileged as `required`.
	pub const fn satisfies(self, required: Role) -> bool {
		self.rank() >= required.rank()
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::Manager => "manager",
			Self::Admin => "admin",
			Self::SuperAdmin => "super_admin",
		}
	}

	/// Parses a role name, falling back to [`Role::Read`] for anything unknown.
	pub fn from_name(name: &str) -> Self {
		match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
			"read" => Self::Read,
			"write" => Self::Write,
			"manager" => Self::Manager,
			"admin" => Self::Admin,
			"super_admin" | "superadmin" => Self::SuperAdmin,
			other => {
				tracing::debug!(role = other, "scope.role.unknown");
				Self::Read
			}
		}
	}
}

impl std::fmt::Display for Role {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<&str> for Role {
	fn from(name: &str) -> Self {
		Self::from_name(name)
	}
}

impl<'de> Deserialize<'de> for Role {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let name = String::deserialize(deserializer)?;
		Ok(Self::from_name(&name))
	}
}

/// Role check on raw role names, as delivered by identity payloads.
pub fn satisfies(actor: &str, required: &str) -> bool {
	Role::from_name(actor).satisfies(Role::from_name(required))
}
