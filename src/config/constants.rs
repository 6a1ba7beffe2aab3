pub const LOG_FILE_PATH: &str = "/tmp/chatsync.log";

pub const API_URL: &str = "http://localhost:3000/api";

/// Keep N latest errors for the session error history
pub const ERROR_HISTORY: usize = 10;

/// Length of the id prefix used when a user has no display name
pub const USER_ID_PREFIX_LEN: usize = 8;
