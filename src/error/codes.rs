/// Process exit code registry for tier-engine
///
/// Automation branches on these values, so they are stable:
/// - 0: success
/// - 1: unexpected failure (I/O, internal)
/// - 2-6: deployment preconditions
/// - 7-8: blue/green promotion invariants
/// - 9-10: environment and configuration errors
/// - 11: command line rejected by the argument parser
#[allow(dead_code)]
pub struct ExitCode;

impl ExitCode {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC: i32 = 1;

    // Deployment (2-6)
    pub const MAMBA_MISSING: i32 = 2;
    pub const BAD_TARGET: i32 = 3;
    pub const PRODUCTION_COLLISION: i32 = 4;
    pub const INSUFFICIENT_DISK_SPACE: i32 = 5;
    pub const PATH_TRAVERSAL: i32 = 6;

    // Promotion (7-8)
    pub const INVALID_SYMLINK: i32 = 7;
    pub const SAME_COLOR: i32 = 8;

    // Environment and configuration (9-10)
    pub const MISSING_ENV_VAR: i32 = 9;
    pub const INVALID_CONFIG: i32 = 10;

    /// Replaces clap's own usage exit code, which would read as `MAMBA_MISSING`
    pub const USAGE: i32 = 11;
}

/// Get a human-readable description for an exit code
pub fn describe_exit_code(code: i32) -> &'static str {
    match code {
        0 => "Success",
        1 => "Unexpected failure",
        2 => "Package manager binary is missing",
        3 => "Invalid target directory or tier name",
        4 => "Requested tier resolves to production",
        5 => "Insufficient disk space",
        6 => "Tier path escapes the target directory",
        7 => "Tier symlink is missing, broken, or points to an invalid color",
        8 => "Staging and production point to the same color",
        9 => "Required environment variable is not set",
        10 => "Invalid configuration file",
        11 => "Invalid command-line usage",
        _ => "Unknown exit code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ExitCode::GENERIC,
            ExitCode::MAMBA_MISSING,
            ExitCode::BAD_TARGET,
            ExitCode::PRODUCTION_COLLISION,
            ExitCode::INSUFFICIENT_DISK_SPACE,
            ExitCode::PATH_TRAVERSAL,
            ExitCode::INVALID_SYMLINK,
            ExitCode::SAME_COLOR,
            ExitCode::MISSING_ENV_VAR,
            ExitCode::INVALID_CONFIG,
            ExitCode::USAGE,
        ];
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
        assert!(codes.iter().all(|code| *code > 0));
    }

    #[test]
    fn test_every_code_has_a_description() {
        for code in 0..=11 {
            assert_ne!(describe_exit_code(code), "Unknown exit code");
        }
        assert_eq!(describe_exit_code(99), "Unknown exit code");
    }
}
