//! Role flags and permission checks.
//!
//! DESIGN
//! ======
//! Roles are stored as integer flags with power-of-two values, but the
//! permission test is ordinal: a higher flag value passes every check for a
//! lower one. `role_name` reads the same field bitwise, picking the highest
//! tier whose bit is set. Both readings are relied on by stored data and
//! clients, so neither is normalized into the other.

pub const ROLE_VIEWER: i32 = 1;
pub const ROLE_EDITOR: i32 = 2;
pub const ROLE_ADMIN: i32 = 4;
pub const ROLE_OWNER: i32 = 8;

/// Ordinal permission check: `user_flags >= required_flags`.
#[must_use]
pub fn has_permission(user_flags: i32, required_flags: i32) -> bool {
    user_flags >= required_flags
}

/// Display name of the highest tier whose bit is set. Falls back to `Viewer`.
#[must_use]
pub fn role_name(flags: i32) -> &'static str {
    if flags & ROLE_OWNER != 0 {
        "Owner"
    } else if flags & ROLE_ADMIN != 0 {
        "Admin"
    } else if flags & ROLE_EDITOR != 0 {
        "Editor"
    } else {
        "Viewer"
    }
}

/// Whether `flags` is exactly one of the four assignable tiers.
#[must_use]
pub fn is_assignable(flags: i32) -> bool {
    matches!(flags, ROLE_VIEWER | ROLE_EDITOR | ROLE_ADMIN | ROLE_OWNER)
}

#[cfg(test)]
#[path = "roles_test.rs"]
mod tests;
