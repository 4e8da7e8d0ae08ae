//! Test-only crate. See `tests/` for the end-to-end suites.
