// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use axum::extract::State;

use crate::state::AppState;

/// Prometheus exposition endpoint.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    responses((status = 200, description = "Metrics in Prometheus text format"))
)]
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn render_does_not_panic_without_traffic() {
        let state = AppState::for_tests();
        let _ = metrics(State(state)).await;
    }
}
