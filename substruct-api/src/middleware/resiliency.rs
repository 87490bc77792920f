use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed { failures: usize },
    /// Failing fast until the cool-down has passed.
    Open { since: Instant },
    /// One trial charge is out. Others are refused until it settles, or until the
    /// cool-down passes again without an answer.
    HalfOpen { trial_started: Instant },
}

/// Stops hammering the card gateway after repeated upstream failures.
pub struct CircuitBreaker {
    pub name: String,
    failure_threshold: usize,
    cool_down: Duration,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: usize, cool_down: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold,
            cool_down,
            state: Mutex::new(CircuitState::Closed { failures: 0 }),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.lock().await
    }

    /// Whether a request may go through. An open breaker past its cool-down turns half-open
    /// and lets exactly one trial request through.
    pub async fn allow(&self) -> bool {
        let mut state = self.state.lock().await;
        match *state {
            CircuitState::Closed { .. } => true,
            CircuitState::Open { since: started } | CircuitState::HalfOpen { trial_started: started }
                if started.elapsed() >= self.cool_down =>
            {
                *state = CircuitState::HalfOpen { trial_started: Instant::now() };
                tracing::info!("Circuit breaker [{}] half-open, allowing a trial request", self.name);
                true
            }
            CircuitState::Open { .. } | CircuitState::HalfOpen { .. } => false,
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, CircuitState::HalfOpen { .. }) {
            tracing::info!("Circuit breaker [{}] closed again", self.name);
        }
        *state = CircuitState::Closed { failures: 0 };
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        let next = match *state {
            CircuitState::Closed { failures } if failures + 1 < self.failure_threshold => {
                CircuitState::Closed { failures: failures + 1 }
            }
            CircuitState::Open { since } => CircuitState::Open { since },
            _ => {
                tracing::error!("Circuit breaker [{}] opened", self.name);
                CircuitState::Open { since: Instant::now() }
            }
        };
        *state = next;
    }
}

/// Guards the checkout payment endpoint. Gateway outages come back as 502 and count
/// against the breaker; declined cards and validation errors do not.
pub async fn circuit_breaker_middleware(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> impl IntoResponse {
    if !req.uri().path().ends_with("/pay") {
        return next.run(req).await.into_response();
    }

    let breaker = &state.resiliency.payment_cb;
    if !breaker.allow().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Payments are temporarily unavailable, please try again shortly" })),
        )
            .into_response();
    }

    let response = next.run(req).await;
    if response.status() == StatusCode::BAD_GATEWAY {
        breaker.record_failure().await;
    } else if !response.status().is_server_error() {
        breaker.record_success().await;
    }

    response.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_opens_after_threshold_then_recovers() {
        let breaker = CircuitBreaker::new("payment", 2, Duration::from_millis(20));

        breaker.record_failure().await;
        assert!(breaker.allow().await);
        breaker.record_failure().await;
        assert!(!breaker.allow().await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.allow().await);
        assert!(matches!(breaker.state().await, CircuitState::HalfOpen { .. }));

        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed { failures: 0 });
    }

    #[tokio::test]
    async fn test_failed_trial_reopens() {
        let breaker = CircuitBreaker::new("payment", 1, Duration::from_millis(10));
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.allow().await);

        breaker.record_failure().await;
        assert!(!breaker.allow().await);
    }

    #[tokio::test]
    async fn test_half_open_admits_one_trial() {
        let breaker = CircuitBreaker::new("payment", 1, Duration::from_millis(50));
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(breaker.allow().await);
        assert!(!breaker.allow().await);
        assert!(!breaker.allow().await);

        breaker.record_success().await;
        assert!(breaker.allow().await);
        assert!(breaker.allow().await);
    }

    #[tokio::test]
    async fn test_unanswered_trial_is_replaced_after_cool_down() {
        let breaker = CircuitBreaker::new("payment", 1, Duration::from_millis(20));
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.allow().await);
        assert!(!breaker.allow().await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.allow().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new("payment", 2, Duration::from_secs(30));
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        assert!(breaker.allow().await);
    }
}
