//! CLI-specific type definitions.

/// Exit codes for the CLI application.
///
/// - 0: the command completed
/// - 1: the command could not run (bad input, resolution failure)
/// - 2: the command ran but a required check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,

    /// Configuration, role assumption or AWS call error
    Error,

    /// `smoke-test` reached the account but the CloudFormation check did not pass
    CheckFailed,
}

impl ExitCode {
    /// Convert to the integer exit code for process::exit()
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::CheckFailed => 2,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(exit_code: ExitCode) -> Self {
        exit_code.code()
    }
}
