//! License acquisition, validation and expiry.
//!
//! The [`LicenseManager`] owns the only writable copy of [`LicenseState`].
//! Keys are checked against a remote [`LicenseAuthority`]; keys that pass are
//! persisted through the [`ConfigStore`](crate::plugin_config::ConfigStore)
//! so a restart can re-validate without operator intervention.

pub mod authority;
pub mod machine;
pub mod manager;

pub use authority::{
    AuthorityError, AuthorityVerdict, HttpLicenseAuthority, LicenseAuthority, ValidationRequest,
};
pub use machine::machine_id;
pub use manager::{
    spawn_revalidation, LicenseManager, LicenseSnapshot, LicenseState, LicenseStatus,
    ValidationOutcome, REVALIDATION_INTERVAL, VALIDATION_TIMEOUT,
};
