// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! Operational counters, exposed in Prometheus format at `/metrics`.

use metrics::counter;

pub fn record_authorization_request(result: &'static str) {
    counter!("auth_authorization_requests_total", "result" => result).increment(1);
}

pub fn record_token_request(grant_type: &str, result: &'static str) {
    // Unknown grant types collapse into one label value to keep
    // cardinality bounded.
    let grant = match grant_type {
        "authorization_code" | "refresh_token" => grant_type.to_string(),
        _ => "other".to_string(),
    };
    counter!("auth_token_requests_total", "grant_type" => grant, "result" => result).increment(1);
}

pub fn record_token_issued(token_type: &'static str) {
    counter!("auth_tokens_issued_total", "token_type" => token_type).increment(1);
}

pub fn record_introspection_request(outcome: &'static str) {
    counter!("auth_introspection_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_key_rotation(result: &'static str) {
    counter!("auth_key_rotations_total", "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        // The macros must not panic when no global recorder is installed.
        record_authorization_request("success");
        record_token_request("authorization_code", "error");
        record_token_request("password", "error");
        record_token_issued("access_token");
        record_introspection_request("inactive");
        record_key_rotation("success");
    }
}
