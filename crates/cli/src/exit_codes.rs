//! CLI Exit Code Registry
//!
//! Single source of truth for `aedsync` exit codes. Schedulers and shell
//! wrappers key off these values.
//!
//! # Exit Code Ranges
//!
//! | Range | Domain     | Description                                   |
//! |-------|------------|-----------------------------------------------|
//! | 0     | Universal  | Success                                       |
//! | 1     | Universal  | General error (unspecified)                   |
//! | 2     | Universal  | CLI usage error (bad args, missing file)      |
//! | 3-9   | config     | Config, boundary and secret problems          |
//! | 10-19 | run        | Run aborted by a safety guard or bad input    |
//! | 20-29 | upstream   | External collaborator failures                |

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - run completed (dry-run or live).
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Config (3-9)
// =============================================================================

/// Config file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Boundary GeoJSON missing or malformed.
pub const EXIT_BOUNDARY: u8 = 4;

/// A required secret environment variable is not set.
pub const EXIT_MISSING_SECRET: u8 = 5;

// =============================================================================
// Run (10-19)
// =============================================================================

/// Planned deletes exceeded `max_delete_fraction`; nothing was written.
pub const EXIT_MASS_DELETION: u8 = 10;

/// The map query returned no AED nodes.
pub const EXIT_EMPTY_SNAPSHOT: u8 = 11;

/// A node planned for live submission disappeared upstream.
pub const EXIT_NODE_VANISHED: u8 = 12;

/// Writing review files or run records failed.
pub const EXIT_OUTPUT: u8 = 13;

// =============================================================================
// Upstream (20-29)
// =============================================================================

/// Map query (Overpass) failed after retries.
pub const EXIT_UPSTREAM_MAP: u8 = 20;

/// Registry API failed after retries, or rejected credentials.
pub const EXIT_UPSTREAM_REGISTRY: u8 = 21;

/// OSM API read or changeset upload failed.
pub const EXIT_UPSTREAM_OSM: u8 = 22;

/// Run store could not be read or written.
pub const EXIT_RUN_STORE: u8 = 23;
