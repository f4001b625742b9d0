//! Environment overrides shared by the binaries

const ADMIN_TOKEN: &str = "INFRAMIRROR_ADMIN_TOKEN";

/// Admin token from the environment, ignoring an empty value
pub fn get_admin_token() -> Option<String> {
    non_empty_var(ADMIN_TOKEN)
}

const AGENT_API_KEY: &str = "INFRAMIRROR_API_KEY";

/// Bootstrap key of the agent from the environment
pub fn get_agent_api_key() -> Option<String> {
    non_empty_var(AGENT_API_KEY)
}

const AGENT_STATE_FILE: &str = "INFRAMIRROR_STATE_FILE";

pub fn get_state_file() -> Option<String> {
    non_empty_var(AGENT_STATE_FILE)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
