//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `rfuse` exit codes.
//! Scripts rely on them, so treat them as part of the shell contract.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 60-69   | fuse             | Fusion run / config / identifier codes   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable config file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Fuse (60-69)
// =============================================================================

/// Config failed to parse or validate.
pub const EXIT_FUSE_INVALID_CONFIG: u8 = 60;

/// Fatal run error: unreadable or malformed boundaries, duplicate boundary
/// ids, duplicate regions under the reject policy, output write failure.
pub const EXIT_FUSE_RUNTIME: u8 = 61;

/// Run completed but some extracts failed, rows were skipped, or attribute
/// records were orphaned. Only returned with `--strict`.
pub const EXIT_FUSE_PARTIAL: u8 = 62;

/// `rfuse canonicalize` was given at least one invalid identifier.
pub const EXIT_FUSE_INVALID_ID: u8 = 63;
