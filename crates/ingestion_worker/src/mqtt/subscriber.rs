use crate::domain::{DispatchOutcome, HandlerRegistry, MqttSubscriberConfig};
use anyhow::{anyhow, Context};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

/// How long shutdown waits for in-flight dispatches to finish
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the MQTT subscriber until cancelled
///
/// Every received message is dispatched on its own task; at most
/// `max_in_flight` dispatches run at once; further messages wait for a slot.
/// Connection errors are retried until `max_retry_attempts` consecutive
/// failures, after which the subscriber returns an error.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(
        broker_url = %config.broker_url,
        subscribe_filter = %config.subscribe_filter,
    )
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    registry: Arc<HandlerRegistry>,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    info!(client_id = %config.client_id, "starting MQTT subscriber");

    let max_in_flight = config.max_in_flight.max(1);
    let in_flight = Arc::new(Semaphore::new(max_in_flight));
    let mut retry_count = 0;

    let result = loop {
        if ctx.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break Ok(());
        }

        match run_mqtt_connection(&config, &registry, &in_flight, &ctx, &mut retry_count).await {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break Ok(());
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                retry_count += 1;
                if retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    break Err(e.context("MQTT subscriber gave up reconnecting"));
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => break Ok(()),
                    _ = tokio::time::sleep(config.retry_delay()) => {}
                }
            }
        }
    };

    drain_in_flight(&in_flight, max_in_flight).await;

    let counts = registry.stats().snapshot();
    info!(
        handled = counts.handled,
        malformed = counts.malformed,
        unhandled = counts.unhandled,
        failed = counts.failed,
        "MQTT subscriber stopped"
    );

    result
}

/// Run a single MQTT connection session
#[instrument(name = "mqtt_connection", skip_all)]
async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    registry: &Arc<HandlerRegistry>,
    in_flight: &Arc<Semaphore>,
    ctx: &CancellationToken,
    retry_count: &mut u32,
) -> anyhow::Result<()> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(config.keep_alive());
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    client
        .subscribe(&config.subscribe_filter, QoS::AtLeastOnce)
        .await
        .context("Failed to subscribe")?;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // Wait for a free slot; stop reading while the pipeline is saturated
                        let permit = tokio::select! {
                            _ = ctx.cancelled() => {
                                let _ = client.disconnect().await;
                                return Ok(());
                            }
                            permit = Arc::clone(in_flight).acquire_owned() => {
                                permit.map_err(|e| anyhow!("in-flight limiter closed: {}", e))?
                            }
                        };

                        let registry = Arc::clone(registry);
                        tokio::spawn(async move {
                            handle_mqtt_message(&registry, &publish.topic, &publish.payload).await;
                            drop(permit);
                        });
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %config.subscribe_filter, "subscription acknowledged");
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                        *retry_count = 0;
                    }
                    Ok(Event::Incoming(Packet::PingResp)) => {
                        // Ping response - connection is healthy
                    }
                    Ok(_) => {
                        // Other events (outgoing, etc.)
                    }
                    Err(e) => {
                        return Err(anyhow!("MQTT event loop error: {}", e));
                    }
                }
            }
        }
    }
}

/// Dispatch one inbound message
///
/// Creates a new independent trace for each message.
pub(crate) async fn handle_mqtt_message(
    registry: &HandlerRegistry,
    topic: &str,
    payload: &[u8],
) -> DispatchOutcome {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
        device_id = tracing::field::Empty,
    );

    registry.dispatch(topic, payload).instrument(span).await
}

async fn drain_in_flight(in_flight: &Semaphore, max_in_flight: usize) {
    let permits = u32::try_from(max_in_flight).unwrap_or(u32::MAX);
    match tokio::time::timeout(DRAIN_TIMEOUT, in_flight.acquire_many(permits)).await {
        Ok(_) => debug!("in-flight dispatches drained"),
        Err(_) => warn!(
            in_flight = max_in_flight - in_flight.available_permits(),
            "timed out waiting for in-flight dispatches"
        ),
    }
}

/// Parse broker URL in format mqtt://host:port or tcp://host:port or host:port
fn parse_broker_url(url: &str) -> anyhow::Result<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, 1883)),
        [host, port] if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| anyhow!("Invalid port in broker URL: {}", port))?;
            Ok((*host, port))
        }
        _ => Err(anyhow!("Invalid broker URL format: {}", url)),
    }
}
