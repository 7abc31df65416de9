use std::sync::Arc;

use sweep_core::{Message, Reply};
use sweep_logging::{sweep_debug, sweep_error, sweep_info, sweep_warn};
use thiserror::Error;

use crate::host::{ContextHost, DeliveryError, HostError};
use crate::{ContextId, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("not running inside a host that provides page contexts")]
    UnsupportedEnvironment,
    #[error(
        "context {target} did not accept {message} ({cause}) even after re-injecting its script; \
         reload the page and try again"
    )]
    RecipientUnavailable {
        target: ContextId,
        message: &'static str,
        cause: DeliveryError,
    },
    #[error("could not install the page script into context {target}: {source}")]
    InjectionFailed {
        target: ContextId,
        #[source]
        source: HostError,
    },
}

/// Name-addressed delivery between contexts.
///
/// Each send is one best-effort attempt. When the recipient is not ready
/// (no handler, or no reply within the window) the router re-installs the
/// recipient's script once and retries the same message once.
#[derive(Clone)]
pub struct MessageRouter {
    host: Arc<dyn ContextHost>,
    policy: RetryPolicy,
}

impl MessageRouter {
    pub fn new(host: Arc<dyn ContextHost>, policy: RetryPolicy) -> Self {
        Self { host, policy }
    }

    pub async fn send(&self, target: ContextId, message: Message) -> Result<Reply, RouterError> {
        if !self.host.supports_contexts() {
            return Err(RouterError::UnsupportedEnvironment);
        }
        let name = message.name();

        let cause = match self.attempt(target, message.clone()).await {
            Ok(reply) => return Ok(reply),
            Err(DeliveryError::Unsupported) => return Err(RouterError::UnsupportedEnvironment),
            Err(cause) if cause.is_recoverable() => cause,
            Err(cause) => {
                sweep_error!("{} to context {} failed: {}", name, target, cause);
                return Err(RouterError::RecipientUnavailable {
                    target,
                    message: name,
                    cause,
                });
            }
        };

        sweep_warn!(
            "{} to context {} failed ({}); re-injecting and retrying once",
            name,
            target,
            cause
        );
        self.host
            .inject(target)
            .await
            .map_err(|source| match source {
                HostError::Unsupported => RouterError::UnsupportedEnvironment,
                source => RouterError::InjectionFailed { target, source },
            })?;
        tokio::time::sleep(self.policy.retry_delay).await;

        match self.attempt(target, message).await {
            Ok(reply) => {
                sweep_info!("{} to context {} delivered after re-injection", name, target);
                Ok(reply)
            }
            Err(DeliveryError::Unsupported) => Err(RouterError::UnsupportedEnvironment),
            Err(cause) => {
                sweep_error!("{} to context {} failed after retry: {}", name, target, cause);
                Err(RouterError::RecipientUnavailable {
                    target,
                    message: name,
                    cause,
                })
            }
        }
    }

    async fn attempt(&self, target: ContextId, message: Message) -> Result<Reply, DeliveryError> {
        sweep_debug!("delivering {} to context {}", message.name(), target);
        match tokio::time::timeout(self.policy.reply_timeout, self.host.deliver(target, message)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut),
        }
    }
}
