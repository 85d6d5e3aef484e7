//! Canonical country-group constants used by [`crate::filter::country`] and
//! [`crate::filter::continent`].
//!
//! ISO 3166-1 alpha-2 codes throughout.

/// The 27 member states of the European Union.
pub const EU27: &[&str] = &[
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT", "LV",
    "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
];

/// The European Economic Area: the EU plus Iceland, Liechtenstein, and
/// Norway.
pub const EEA_EXTRA: &[&str] = &["IS", "LI", "NO"];

/// Countries treated as "no Russia / no Belarus" for the built-in `NR`
/// placement: Russia and Belarus themselves.
pub const NR_EXCLUDED: &[&str] = &["RU", "BY"];

/// Returns the full EEA list (EU-27 plus [`EEA_EXTRA`]).
pub fn eea_codes() -> Vec<&'static str> {
    EU27.iter().copied().chain(EEA_EXTRA.iter().copied()).collect()
}
