use rivian_keys::{SignedCommand, validate_params};
use rivian_monitor::{Callback, Connector, SubscriptionHandle, Supervisor, WsConnector};
use serde_json::{Map, Value};

use crate::{ClientConfig, Error, connection_init_payload};

/// A signed-in session against the Rivian gateway.
///
/// Owns one [`Supervisor`]; every subscription made through it shares a
/// single WebSocket that is reconnected and replayed as needed.
pub struct Rivian {
    config: ClientConfig,
    monitor: Supervisor,
}

impl Rivian {
    /// Connect to the gateway named in `config.monitor`
    pub fn new(config: ClientConfig, user_session_token: impl Into<String>) -> Self {
        let connector = WsConnector::new(&config.monitor);
        Self::with_connector(config, user_session_token, connector)
    }

    /// As [`Rivian::new`], over a caller-supplied transport
    pub fn with_connector<C: Connector>(
        config: ClientConfig,
        user_session_token: impl Into<String>,
        connector: C,
    ) -> Self {
        let token = user_session_token.into();
        let identity = config.clone();
        let monitor = Supervisor::new(
            connector,
            move || connection_init_payload(&identity, &token),
            config.monitor.clone(),
        );
        Self { config, monitor }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Supervisor {
        &self.monitor
    }

    /// Subscribe, connecting first if this is the first subscription
    pub async fn subscribe(&self, payload: Value, callback: Callback) -> Result<SubscriptionHandle, Error> {
        self.monitor.connect().await?;
        let handle = self.monitor.subscribe(payload, callback).await?;
        log::debug!("Subscription {} active", handle.id());
        Ok(handle)
    }

    /// Close the connection for good; subscriptions are dropped
    pub async fn close(&self) {
        log::debug!("Closing session with {}", self.config.monitor.url);
        self.monitor.close().await;
    }
}

/// Validate `params` for `command` and sign it at the current time.
///
/// `params` may be normalised in place, and must be sent alongside the
/// returned command exactly as left here.
pub fn signed_command(
    command: &str,
    params: Option<&mut Map<String, Value>>,
    vehicle_key: &str,
    private_key: &str,
) -> Result<SignedCommand, Error> {
    validate_params(command, params)?;
    Ok(SignedCommand::new(command, vehicle_key, private_key)?)
}
