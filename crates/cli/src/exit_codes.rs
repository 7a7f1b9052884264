//! CLI Exit Code Registry
//!
//! Single source of truth for `courier` exit codes. Scripts and schedulers
//! branch on these, so a code never changes meaning once released.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | Quality gate failed (`--strict` and an `error` check)    |
//! | 2    | Usage error (bad arguments, no input configured)         |
//! | 3    | Config error (unparseable or invalid TOML config)        |
//! | 4    | Structural error (a feed is not a list of flat records)  |
//! | 5    | I/O error (cannot read an input or write an output)      |

use courier_recon::ReconError;

/// Success - run completed; quality findings are in the report.
pub const EXIT_SUCCESS: u8 = 0;

/// The quality report contains at least one `error` check and `--strict`
/// was given.
pub const EXIT_QUALITY_GATE: u8 = 1;

/// Usage error - bad arguments, missing input path, unknown feed extension.
pub const EXIT_USAGE: u8 = 2;

/// Config could not be parsed or failed validation. Nothing was processed.
pub const EXIT_CONFIG: u8 = 3;

/// An input feed is malformed as a whole. Nothing was processed.
pub const EXIT_STRUCTURAL: u8 = 4;

/// Reading an input or writing an output failed.
pub const EXIT_IO: u8 = 5;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_CONFIG,
        ReconError::Structural { .. } => EXIT_STRUCTURAL,
    }
}
