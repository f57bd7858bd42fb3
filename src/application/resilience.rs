//! Bounded retry and circuit breaking for the payments gateway.

use crate::config::ResilienceConfig;
use crate::domain::amount::Amount;
use crate::domain::ports::{GatewayPayee, GatewayPayeeRequest, PaymentGateway, PaymentGatewayBox};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// Consecutive-failure circuit breaker.
///
/// Opens after `failure_threshold` failures in a row, rejects calls until
/// `cooldown` has elapsed, then lets a single probe through.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        *self.lock()
    }

    /// Whether a call may proceed; moves Open to HalfOpen once cooled down.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } if Instant::now() >= until => {
                *state = BreakerState::HalfOpen;
                true
            }
            BreakerState::Open { .. } | BreakerState::HalfOpen => false,
        }
    }

    pub fn record_success(&self) {
        *self.lock() = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        let failures = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => consecutive_failures + 1,
            BreakerState::HalfOpen | BreakerState::Open { .. } => self.failure_threshold,
        };
        *state = if failures >= self.failure_threshold {
            warn!(failures, "Gateway circuit opened");
            BreakerState::Open {
                until: Instant::now() + self.cooldown,
            }
        } else {
            BreakerState::Closed {
                consecutive_failures: failures,
            }
        };
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // state is plain data, a poisoned lock still holds a usable value
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exponential backoff: `base_delay`, `2 * base_delay`, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Which failures a call may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Transient,
    /// Only when the request provably never reached the gateway.
    ConnectOnly,
}

/// Decorates a gateway with retry and circuit breaking.
pub struct ResilientGateway {
    inner: PaymentGatewayBox,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientGateway {
    pub fn new(inner: PaymentGatewayBox, config: &ResilienceConfig) -> Self {
        Self {
            inner,
            retry: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                base_delay: Duration::from_millis(config.base_delay_ms),
            },
            breaker: CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_secs(config.cooldown_secs),
            ),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn call<T, F, Fut>(&self, operation: &str, retry: Retry, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            if !self.breaker.try_acquire() {
                return Err(PaymentError::CircuitOpen);
            }

            match f().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    // a rejection still proves the gateway is reachable
                    if err.is_transient() {
                        self.breaker.record_failure();
                    } else {
                        self.breaker.record_success();
                    }
                    let retryable = match retry {
                        Retry::Transient => err.is_transient(),
                        Retry::ConnectOnly => matches!(err, PaymentError::GatewayConnect(_)),
                    };
                    if !retryable || attempt >= self.retry.max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(operation, attempt, ?delay, error = %err, "Retrying gateway call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for ResilientGateway {
    async fn create_payee(&self, request: &GatewayPayeeRequest) -> Result<String> {
        self.call("create_payee", Retry::ConnectOnly, || {
            self.inner.create_payee(request)
        })
        .await
    }

    async fn send_payment(
        &self,
        external_id: &str,
        amount: Amount,
        memo: Option<&str>,
    ) -> Result<String> {
        self.call("send_payment", Retry::ConnectOnly, || {
            self.inner.send_payment(external_id, amount, memo)
        })
        .await
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal> {
        self.call("get_balance", Retry::Transient, || {
            self.inner.get_balance(currency)
        })
        .await
    }

    async fn search_payees(&self) -> Result<Vec<GatewayPayee>> {
        self.call("search_payees", Retry::Transient, || self.inner.search_payees())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the queued errors, then succeeds.
    struct FlakyGateway {
        failures: Mutex<VecDeque<PaymentError>>,
        calls: Arc<AtomicUsize>,
    }

    impl FlakyGateway {
        fn new(failures: Vec<PaymentError>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let gateway = Self {
                failures: Mutex::new(failures.into()),
                calls: calls.clone(),
            };
            (gateway, calls)
        }

        fn next(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FlakyGateway {
        async fn create_payee(&self, _request: &GatewayPayeeRequest) -> Result<String> {
            self.next().map(|_| "pd-1".to_string())
        }

        async fn send_payment(&self, _id: &str, _amount: Amount, _memo: Option<&str>) -> Result<String> {
            self.next().map(|_| "tx-1".to_string())
        }

        async fn get_balance(&self, _currency: &str) -> Result<Decimal> {
            self.next().map(|_| dec!(250.5))
        }

        async fn search_payees(&self) -> Result<Vec<GatewayPayee>> {
            self.next().map(|_| Vec::new())
        }
    }

    fn config(max_attempts: u32, failure_threshold: u32) -> ResilienceConfig {
        ResilienceConfig {
            max_attempts,
            base_delay_ms: 100,
            failure_threshold,
            cooldown_secs: 30,
        }
    }

    fn unavailable() -> PaymentError {
        PaymentError::GatewayUnavailable("503".to_string())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_retry_transient_errors() {
        let (inner, calls) = FlakyGateway::new(vec![unavailable(), unavailable()]);
        let gateway = ResilientGateway::new(Box::new(inner), &config(3, 10));

        let balance = gateway.get_balance("USD").await.unwrap();
        assert_eq!(balance, dec!(250.5));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (inner, calls) =
            FlakyGateway::new(vec![unavailable(), unavailable(), unavailable(), unavailable()]);
        let gateway = ResilientGateway::new(Box::new(inner), &config(3, 10));

        let result = gateway.search_payees().await;
        assert!(matches!(result, Err(PaymentError::GatewayUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_payment_not_retried_on_ambiguous_failure() {
        let (inner, calls) = FlakyGateway::new(vec![unavailable()]);
        let gateway = ResilientGateway::new(Box::new(inner), &config(3, 10));
        let amount = Amount::new(dec!(10)).unwrap();

        let result = gateway.send_payment("pd-1", amount, None).await;
        assert!(matches!(result, Err(PaymentError::GatewayUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_payment_retried_on_connect_failure() {
        let (inner, calls) =
            FlakyGateway::new(vec![PaymentError::GatewayConnect("refused".to_string())]);
        let gateway = ResilientGateway::new(Box::new(inner), &config(3, 10));
        let amount = Amount::new(dec!(10)).unwrap();

        let reference = gateway.send_payment("pd-1", amount, None).await.unwrap();
        assert_eq!(reference, "tx-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_not_retried_and_do_not_trip_breaker() {
        let (inner, calls) =
            FlakyGateway::new(vec![PaymentError::GatewayRejected("bad payee".to_string())]);
        let gateway = ResilientGateway::new(Box::new(inner), &config(3, 1));

        assert!(gateway.get_balance("USD").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            gateway.breaker().state(),
            BreakerState::Closed {
                consecutive_failures: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_and_recovers() {
        let (inner, calls) = FlakyGateway::new(vec![unavailable(), unavailable()]);
        let gateway = ResilientGateway::new(Box::new(inner), &config(1, 2));

        assert!(gateway.get_balance("USD").await.is_err());
        assert!(gateway.get_balance("USD").await.is_err());
        assert!(matches!(gateway.breaker().state(), BreakerState::Open { .. }));

        // rejected without reaching the gateway
        assert!(matches!(
            gateway.get_balance("USD").await,
            Err(PaymentError::CircuitOpen)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(gateway.get_balance("USD").await.is_ok());
        assert_eq!(
            gateway.breaker().state(),
            BreakerState::Closed {
                consecutive_failures: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure();
        assert!(!breaker.try_acquire());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // a second caller waits for the probe
        assert!(!breaker.try_acquire());

        breaker.record_failure();
        assert!(matches!(breaker.state(), BreakerState::Open { .. }));
    }
}
