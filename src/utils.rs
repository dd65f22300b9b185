use std::env::var;

/// Get the value of ENV var, or a default
///
/// Only when:
/// - It is set
/// - It is not empty
pub fn env_var_or_else(var_name: &'static str, or_else: fn() -> String) -> String {
    optional_env_var(var_name).unwrap_or_else(or_else)
}

/// Get the value of ENV var, `None` when it is not set or empty
pub fn optional_env_var(var_name: &'static str) -> Option<String> {
    var(var_name).ok().filter(|value| !value.trim().is_empty())
}

/// Interpret a flag value, `None` when it is neither on nor off
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
