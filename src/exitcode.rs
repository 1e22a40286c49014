//! Process exit codes, following sysexits.h

/// Command line usage error
pub const USAGE: i32 = 64;

/// Data format error (invalid structure, rejected edit)
pub const DATAERR: i32 = 65;

/// Store unreachable or refused the change
pub const UNAVAILABLE: i32 = 69;

/// Temporary failure, retry later
pub const TEMPFAIL: i32 = 75;

/// Input/output error
pub const IOERR: i32 = 74;

/// Configuration error
pub const CONFIG: i32 = 78;
