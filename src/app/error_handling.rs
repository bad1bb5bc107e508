//! Error handling utilities
//!
//! This module provides centralized error handling for the application.

use tracing::error;

/// Exit code for configuration documents with the wrong shape.
pub const EXIT_STRUCTURAL: i32 = 2;
/// Exit code for every other failure.
pub const EXIT_GENERAL: i32 = 1;

/// Exit code for an application error.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<crate::Error>() {
        Some(e) if e.is_structural() => EXIT_STRUCTURAL,
        _ => EXIT_GENERAL,
    }
}

/// Handle fatal errors and exit with appropriate status code
///
/// # Verbose Mode Behavior
/// - `verbose = 0`: Error message only
/// - `verbose >= 1`: Includes the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    eprintln!("Error: {error:#}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}
