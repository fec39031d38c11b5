//! Map reset: destroy every row and file that belongs to one map scope.
//!
//! A reset runs in three phases:
//!
//! 1. **Discovery** ([`discovery`]) resolves the POIs, grid squares, comments and
//!    images the scope owns and the file URLs behind them. Read-only.
//! 2. **Files** ([`files`]) removes each file independently. Failures are recorded
//!    and never stop the reset.
//! 3. **Rows** ([`rows`]) deletes rows leaves-first, so no step leaves a dangling
//!    reference. Runs inside a savepoint unless `reset.transactional` is off.
//!
//! Nothing destructive happens until the request passes [`command::ResetCommand`]
//! validation.

pub mod command;
pub mod discovery;
pub mod files;
pub mod rows;
pub mod scope;
pub mod service;

pub use command::{confirmation_phrase, ParsedReset, ResetCommand, ValidationError};
pub use discovery::{discover, ResetPlan};
pub use scope::{MapScope, MapType};
pub use service::{
    MapResetService, ResetError, ResetOptions, ResetOutcome, ResetReport, HEALTH_CHECK_MESSAGE,
};
