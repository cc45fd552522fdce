use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Breaker type shared by every NAV transport clone.
pub type NavCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates the circuit breaker that guards calls to the NAV SOAP endpoints.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive transport failures open the circuit.
/// - **Backoff**: exponential, from 10s up to 60s, before a trial call is let through.
///
/// While the circuit is open every call is rejected without touching the
/// network; the transport reports that as a transport failure, so a handoff
/// aborts exactly as it would on a timeout.
///
/// Clones share state, so one breaker covers all three NAV pages.
pub fn create_nav_circuit_breaker() -> NavCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NavError;
    use failsafe::Error;

    #[test]
    fn test_circuit_opens_after_five_failures() {
        use failsafe::CircuitBreaker;

        let cb = create_nav_circuit_breaker();

        for _ in 0..5 {
            let result: Result<(), Error<&str>> = cb.call(|| Err::<(), &str>("connection refused"));
            assert!(result.is_err());
        }

        let result: Result<(), Error<&str>> = cb.call(|| Ok::<(), &str>(()));
        match result {
            Err(Error::Rejected) => {}
            _ => panic!("Expected circuit to be open and reject requests"),
        }
    }

    #[test]
    fn test_clones_share_state() {
        use failsafe::CircuitBreaker;

        let cb = create_nav_circuit_breaker();
        let other = cb.clone();

        for _ in 0..5 {
            let _: Result<(), Error<&str>> = cb.call(|| Err::<(), &str>("timeout"));
        }

        assert!(!other.is_call_permitted());
    }

    #[tokio::test]
    async fn test_async_predicate_ignores_shape_failures() {
        use failsafe::futures::CircuitBreaker;

        let cb = create_nav_circuit_breaker();
        let only_transport = |err: &NavError| matches!(err, NavError::Transport(_));

        for _ in 0..10 {
            let result = cb
                .call_with(only_transport, async {
                    Err::<(), NavError>(NavError::UnexpectedResponse("no CustomerList".into()))
                })
                .await;
            assert!(matches!(result, Err(Error::Inner(_))));
        }

        let result = cb
            .call_with(only_transport, async { Ok::<u8, NavError>(1) })
            .await;
        assert!(matches!(result, Ok(1)));
    }
}
