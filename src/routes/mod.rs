/// Router Module Index
///
/// Organizes the routing surface into access-tiered modules. Access control
/// itself lives in the extractor guards each handler declares (`AuthUser`,
/// `AdminUser`, `OptionalUser`), so the split below is about keeping the
/// surface readable, not about where enforcement happens.

/// Routes accessible without a token: health, registration, login.
pub mod public;

/// Routes for any authenticated user. Also hosts the legacy `/api/locations`
/// alias of the `/api/clients` surface.
pub mod authenticated;

/// Routes restricted to the admin role: account management, invite codes,
/// and schedule writes.
pub mod admin;
