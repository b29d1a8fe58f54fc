//! Actor handles for external invocations
//!
//! TigerStyle: Identity-addressed references with explicit error handling.

use crate::activation::ActivationState;
use crate::dispatcher::DispatcherHandle;
use bytes::Bytes;
use std::time::Duration;
use warren_core::{ActorId, Error, Result};

/// Handle to invoke an actor
///
/// Addresses an actor by identity; whether an instance currently exists is
/// invisible to the caller. The handle can be cloned and shared across tasks.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    /// The actor's identity
    actor_id: ActorId,
    /// Dispatcher handle for routing
    dispatcher: DispatcherHandle,
    /// Caller-side timeout for invocations
    default_timeout: Option<Duration>,
}

impl ActorHandle {
    /// Create a new actor handle
    pub fn new(actor_id: ActorId, dispatcher: DispatcherHandle) -> Self {
        Self {
            actor_id,
            dispatcher,
            default_timeout: None,
        }
    }

    /// Create a handle with a default timeout
    ///
    /// The timeout only bounds how long the caller waits. A turn that has
    /// started keeps running to completion.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Get the actor's ID
    pub fn id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Invoke a method with a raw payload
    pub async fn invoke(&self, method: &str, payload: Bytes) -> Result<Bytes> {
        let call = self.dispatcher.invoke(&self.actor_id, method, payload);
        match self.default_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| Error::OperationTimedOut {
                    operation: format!("{}.{}", self.actor_id, method),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => call.await,
        }
    }

    /// Invoke with a typed request and response
    ///
    /// Serializes the request to JSON, invokes the actor, and deserializes the
    /// response. An empty response decodes as JSON `null`.
    pub async fn request<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let payload = serde_json::to_vec(request).map_err(|e| Error::SerializationFailed {
            reason: format!("request for {}: {}", method, e),
        })?;

        let response = self.invoke(method, Bytes::from(payload)).await?;
        let body: &[u8] = if response.is_empty() {
            b"null"
        } else {
            &response
        };

        serde_json::from_slice(body).map_err(|e| Error::DeserializationFailed {
            reason: format!("response of {}: {}", method, e),
        })
    }

    /// Invoke and discard the response
    pub async fn send(&self, method: &str, payload: Bytes) -> Result<()> {
        self.invoke(method, payload).await?;
        Ok(())
    }

    /// Deactivate the actor
    ///
    /// The actor will be reactivated on the next invocation.
    pub async fn deactivate(&self) -> Result<()> {
        self.dispatcher.deactivate(&self.actor_id).await
    }

    /// Current lifecycle state
    pub fn activation_state(&self) -> ActivationState {
        self.dispatcher.activation_state(&self.actor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use crate::context::ActorContext;
    use crate::dispatcher::{Dispatcher, DispatcherConfig};
    use crate::registry::ActorTypeRegistry;
    use crate::reminders::ReminderScheduler;
    use async_trait::async_trait;
    use std::sync::Arc;
    use warren_core::WallClockTime;
    use warren_storage::MemoryStore;

    #[derive(Clone)]
    struct EchoActor;

    #[async_trait]
    impl Actor for EchoActor {
        fn methods() -> &'static [&'static str] {
            &["echo", "upper", "slow", "nothing"]
        }

        async fn invoke(
            &mut self,
            _ctx: &mut ActorContext,
            method: &str,
            payload: Bytes,
        ) -> Result<Bytes> {
            match method {
                "echo" => Ok(payload),
                "upper" => {
                    let text = String::from_utf8_lossy(&payload);
                    Ok(Bytes::from(text.to_uppercase()))
                }
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(Bytes::new())
                }
                _ => Ok(Bytes::new()),
            }
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = ActorTypeRegistry::new();
        registry.register_clone("Echo", EchoActor).unwrap();
        let store = MemoryStore::new();
        let time = WallClockTime::shared();
        let reminders = ReminderScheduler::new(Arc::new(store.clone()), time.clone());
        Dispatcher::new(
            registry,
            Arc::new(store),
            reminders,
            time,
            DispatcherConfig::default(),
        )
    }

    fn echo(dispatcher: &Dispatcher, id: &str) -> ActorHandle {
        ActorHandle::new(ActorId::new("Echo", id).unwrap(), dispatcher.handle())
    }

    #[tokio::test]
    async fn test_actor_handle_basic() {
        let dispatcher = dispatcher();
        let actor = echo(&dispatcher, "echo-1");
        assert_eq!(actor.id().id(), "echo-1");

        let result = actor.invoke("echo", Bytes::from("hello")).await.unwrap();
        assert_eq!(result, Bytes::from("hello"));

        let result = actor.invoke("upper", Bytes::from("hello")).await.unwrap();
        assert_eq!(result, Bytes::from("HELLO"));
        assert_eq!(actor.activation_state(), ActivationState::Active);

        actor.deactivate().await.unwrap();
        assert_eq!(actor.activation_state(), ActivationState::Inactive);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_actor_handle_typed_request() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Ping {
            seq: u32,
        }

        let dispatcher = dispatcher();
        let actor = echo(&dispatcher, "echo-2");

        let pong: Ping = actor.request("echo", &Ping { seq: 7 }).await.unwrap();
        assert_eq!(pong, Ping { seq: 7 });

        let unit: Option<Ping> = actor.request("nothing", &()).await.unwrap();
        assert!(unit.is_none());

        dispatcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_actor_handle_timeout() {
        let dispatcher = dispatcher();
        let actor = echo(&dispatcher, "echo-3").with_timeout(Duration::from_secs(1));

        let result = actor.invoke("slow", Bytes::new()).await;
        assert!(matches!(result, Err(Error::OperationTimedOut { .. })));

        // The slow turn still runs to completion; the next call queues behind it
        let result = actor.invoke("echo", Bytes::from("after")).await;
        assert!(matches!(result, Err(Error::OperationTimedOut { .. })));

        let patient = echo(&dispatcher, "echo-3");
        let result = patient.invoke("echo", Bytes::from("later")).await.unwrap();
        assert_eq!(result, Bytes::from("later"));

        dispatcher.shutdown().await;
    }
}
