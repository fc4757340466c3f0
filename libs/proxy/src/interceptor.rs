//! Call interception and fault recovery.
//!
//! Every call made through a [`ServiceProxy`] runs the same cycle:
//!
//! ```text
//! Invoking → Succeeded
//!          → Classifying → Propagating            (terminal fault)
//!                        → notify subscriber → Retrying → Invoking
//!                                            → Propagating
//! ```
//!
//! Transient faults are reported to the proxy's fault handler through a
//! [`FaultNotification`]. The handler repairs whatever it owns and sets
//! `retry`; the proxy then re-acquires a channel from its handle and calls
//! again, within the bounds of its [`RetryPolicy`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use switchboard_core::{
    classify, CallError, ContractDescriptor, ContractId, FromValue, OperationDescriptor, Value,
};

use crate::handle::ChannelHandle;

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a proxy instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(u64);

impl ProxyId {
    fn next() -> Self {
        Self(NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy-{}", self.0)
    }
}

/// Transient fault reported to a proxy's subscriber
#[derive(Debug, Clone)]
pub struct FaultNotification {
    pub contract: ContractId,
    pub proxy: ProxyId,
    pub error: CallError,
    /// Attempts made so far for this call, including the failed one
    pub attempt: u32,
    /// Set by the subscriber to ask the proxy to call again
    pub retry: bool,
}

/// Consumer of a proxy's transient faults
///
/// Invoked synchronously on the calling task; the proxy reads `retry`
/// once `on_fault` returns.
pub trait FaultHandler: Send + Sync {
    fn on_fault(&self, notification: &mut FaultNotification);
}

impl<F> FaultHandler for F
where
    F: Fn(&mut FaultNotification) + Send + Sync,
{
    fn on_fault(&self, notification: &mut FaultNotification) {
        self(notification)
    }
}

/// Bounds the retry loop of a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt; `None` never gives up
    pub max_retries: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Retry for as long as the subscriber asks to
    pub fn unbounded() -> Self {
        Self {
            max_retries: None,
            ..Self::default()
        }
    }

    /// Retry immediately, at most `max_retries` times
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Whether another attempt may follow `attempt` failed attempts
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries.map_or(true, |max| attempt <= max)
    }

    /// Delay before the retry that follows `attempt` failed attempts
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

/// Result of a successful call
///
/// `args` mirrors the operation's parameter list: output and by-reference
/// slots carry the values written by the remote side, every other slot is
/// [`Value::Null`]. `returned` counts the output and by-reference slots so a
/// caller can tell "no outputs" from "outputs that happen to be null".
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub value: Value,
    pub args: Vec<Value>,
    pub returned: usize,
}

impl CallOutcome {
    fn collect(operation: &OperationDescriptor, value: Value, args: Vec<Value>) -> Self {
        let mut returned = 0;
        let args = operation
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                if param.direction.is_returned() {
                    returned += 1;
                    arg
                } else {
                    Value::Null
                }
            })
            .collect();

        Self {
            value,
            args,
            returned,
        }
    }

    /// Take the value written to slot `index`, leaving `Null` behind
    pub fn take_arg(&mut self, index: usize) -> Value {
        self.args
            .get_mut(index)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn decode<T: FromValue>(self) -> Result<T, CallError> {
        self.value.decode()
    }
}

/// Call interceptor for one contract
///
/// Presents the contract's operations by name and mediates every call:
/// transient faults are reported to the subscribed [`FaultHandler`], which
/// decides whether the call is retried on a fresh channel. Terminal faults
/// reach the caller unchanged and never notify anyone.
pub struct ServiceProxy {
    id: ProxyId,
    descriptor: Arc<ContractDescriptor>,
    handle: ChannelHandle,
    retry: RetryPolicy,
    subscriber: RwLock<Option<Arc<dyn FaultHandler>>>,
}

impl ServiceProxy {
    pub fn new(descriptor: Arc<ContractDescriptor>, handle: ChannelHandle) -> Self {
        Self {
            id: ProxyId::next(),
            descriptor,
            handle,
            retry: RetryPolicy::default(),
            subscriber: RwLock::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fault_handler(self, handler: Arc<dyn FaultHandler>) -> Self {
        *self.subscriber.write() = Some(handler);
        self
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub fn contract(&self) -> &ContractId {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }

    pub fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Replace the fault subscriber
    pub fn subscribe(&self, handler: Arc<dyn FaultHandler>) {
        *self.subscriber.write() = Some(handler);
    }

    pub fn unsubscribe(&self) -> Option<Arc<dyn FaultHandler>> {
        self.subscriber.write().take()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscriber.read().is_some()
    }

    /// Drop the current channel; the next call opens a new one
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Close the current channel gracefully
    pub async fn release(&self) {
        self.handle.release().await;
    }

    /// Call `operation` and decode its return value
    pub async fn call<R: FromValue>(&self, operation: &str, args: Vec<Value>) -> Result<R, CallError> {
        self.invoke(operation, args).await?.decode()
    }

    /// Call `operation` with `args` laid out as its parameter list
    ///
    /// Output slots may be passed as `Null`. Each attempt starts from the
    /// original arguments, so values written by a failed attempt never leak
    /// into a retry. The subscriber in place when the call starts hears every
    /// fault of that call, even if it is unsubscribed along the way.
    pub async fn invoke(&self, operation: &str, args: Vec<Value>) -> Result<CallOutcome, CallError> {
        let op = self
            .descriptor
            .find(operation)
            .ok_or_else(|| CallError::UnknownOperation {
                contract: self.contract().to_string(),
                operation: operation.to_string(),
            })?;

        if args.len() != op.params.len() {
            return Err(CallError::ArgumentCount {
                operation: op.name.clone(),
                expected: op.params.len(),
                actual: args.len(),
            });
        }

        let subscriber = self.subscriber.read().clone();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut working = args.clone();

            let result = match self.handle.acquire().await {
                Ok(channel) => channel.invoke(op, &mut working).await,
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(value) => return Ok(CallOutcome::collect(op, value, working)),
                Err(error) => error,
            };

            if !classify(&error).is_transient() {
                return Err(error);
            }

            if !self.notify(subscriber.as_deref(), &error, attempt) {
                return Err(error);
            }

            if !self.retry.allows(attempt) {
                tracing::warn!(
                    contract = %self.contract(),
                    operation = %op.name,
                    attempt,
                    error = %error,
                    "Retry limit reached"
                );
                return Err(error);
            }

            let delay = self.retry.backoff(attempt);
            tracing::debug!(
                contract = %self.contract(),
                operation = %op.name,
                attempt,
                ?delay,
                error = %error,
                "Retrying call after transient fault"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Report a transient fault; returns the subscriber's retry decision
    fn notify(&self, subscriber: Option<&dyn FaultHandler>, error: &CallError, attempt: u32) -> bool {
        let Some(handler) = subscriber else {
            return false;
        };

        let mut notification = FaultNotification {
            contract: self.contract().clone(),
            proxy: self.id,
            error: error.clone(),
            attempt,
            retry: false,
        };
        handler.on_fault(&mut notification);
        notification.retry
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("id", &self.id)
            .field("contract", self.contract())
            .field("handle", &self.handle)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
