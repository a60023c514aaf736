// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The vault-autocert Authors

//! Variable expansion for settings values.

use crate::error::Result;

/// Expand `${VARIABLE_NAME}` references from the environment.
///
/// `${HOSTNAME}` falls back to the system hostname when the variable is not
/// exported, which is the usual case in non-login shells.
/// Unknown variables and unclosed braces are left unchanged.
///
/// # Examples
///
/// ```
/// use vault_autocert::settings::expand_variables;
///
/// let result = expand_variables("${HOSTNAME}.svc.example.com").unwrap();
/// // Returns something like "web-7f9c.svc.example.com"
/// # let _ = result;
/// ```
pub fn expand_variables(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let absolute_start = start + var_start;

        if let Some(var_end) = result[absolute_start..].find('}') {
            let absolute_end = absolute_start + var_end;
            let var_name = &result[absolute_start + 2..absolute_end];

            if let Some(value) = get_variable_value(var_name) {
                result.replace_range(absolute_start..absolute_end + 1, &value);
                start = absolute_start + value.len();
            } else {
                start = absolute_end + 1;
            }
        } else {
            start = absolute_start + 2;
        }
    }

    Ok(result)
}

fn get_variable_value(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }

    match std::env::var(name) {
        Ok(value) => Some(value),
        Err(_) if name == "HOSTNAME" => get_hostname(),
        Err(_) => None,
    }
}

fn get_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|s| !s.is_empty())
}
