use super::constants::*;

pub(crate) fn log_level() -> Option<String> {
    Some("info".to_string())
}

pub(crate) fn log_file_path() -> String {
    LOG_FILE_PATH.to_string()
}

pub(crate) fn api_url() -> String {
    API_URL.to_string()
}

pub(crate) fn error_history() -> usize {
    ERROR_HISTORY
}
