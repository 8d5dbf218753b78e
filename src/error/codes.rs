/// Error code registry for pexec
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 4000-4999: Execution errors
/// - 5000-5999: Scheduling errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_TOML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_PATH_ERROR: u16 = 1006;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4005;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;
    pub const EXEC_OUTPUT_ERROR: u16 = 4008;
    pub const EXEC_STDIN_ERROR: u16 = 4009;
    pub const EXEC_INVALID_COMMAND: u16 = 4011;

    // Scheduling errors (5000-5999)
    pub const SCHED_GENERIC: u16 = 5000;
    pub const SCHED_DUPLICATE_KEY: u16 = 5001;
    pub const SCHED_KEY_ALREADY_SET: u16 = 5002;
    pub const SCHED_CALL_FAILED: u16 = 5003;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_UNEXPECTED: u16 = 9001;
    pub const OTHER_INTERNAL_ERROR: u16 = 9004;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Configuration errors
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid TOML syntax in configuration",
        1005 => "Invalid value in configuration",
        1006 => "Configuration path error",

        // Execution errors
        4000 => "Generic execution error",
        4001 => "Command not found",
        4002 => "Command execution timeout",
        4003 => "Subprocess failed",
        4005 => "Command received signal",
        4007 => "Failed to spawn subprocess",
        4008 => "Command output error",
        4009 => "Command stdin error",
        4011 => "Command line could not be parsed",

        // Scheduling errors
        5000 => "Generic scheduling error",
        5001 => "Future key is already enrolled in this iterator",
        5002 => "Future key has already been assigned",
        5003 => "Deferred call failed",

        // Other errors
        9000 => "Generic error",
        9001 => "Unexpected error",
        9004 => "Internal error",

        _ => "Unknown error code",
    }
}
