use crate::domain::{
    HandlerRegistry, MqttSubscriberConfig, SensorRegistrationHandler, SensorSharingHandler,
    SignalPhaseHandler, TopicParser, TrafficSituationHandler, SENSOR_REGISTRATION_MESSAGE_TYPE,
    SENSOR_SHARING_MESSAGE_TYPE, SIGNAL_PHASE_MESSAGE_TYPE, TRAFFIC_SITUATION_MESSAGE_TYPE,
};
use crate::mqtt::run_mqtt_subscriber;
use common::domain::{PersistenceGateway, RealtimeCache};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct IngestionWorkerConfig {
    pub topic_delimiter: char,
    pub topic_prefix: Option<String>,
    pub mqtt: MqttSubscriberConfig,
}

/// Build the registry with every built-in message type
pub fn default_handler_registry(
    parser: TopicParser,
    gateway: Arc<dyn PersistenceGateway>,
    cache: Arc<dyn RealtimeCache>,
) -> HandlerRegistry {
    HandlerRegistry::builder(parser, gateway)
        .register(SENSOR_SHARING_MESSAGE_TYPE, Arc::new(SensorSharingHandler::new()))
        .register(SIGNAL_PHASE_MESSAGE_TYPE, Arc::new(SignalPhaseHandler::new()))
        .register(
            TRAFFIC_SITUATION_MESSAGE_TYPE,
            Arc::new(TrafficSituationHandler::new(cache)),
        )
        .register(
            SENSOR_REGISTRATION_MESSAGE_TYPE,
            Arc::new(SensorRegistrationHandler::new()),
        )
        .build()
}

pub struct IngestionWorker {
    registry: Arc<HandlerRegistry>,
    mqtt: MqttSubscriberConfig,
}

impl IngestionWorker {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        cache: Arc<dyn RealtimeCache>,
        config: IngestionWorkerConfig,
    ) -> Self {
        debug!("initializing ingestion worker");

        let parser = TopicParser::new(config.topic_delimiter, config.topic_prefix);
        let registry = Arc::new(default_handler_registry(parser, gateway, cache));

        Self {
            registry,
            mqtt: config.mqtt,
        }
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new({
            let registry = self.registry;
            let mqtt = self.mqtt;
            move |ctx| Box::pin(async move { run_mqtt_subscriber(mqtt, registry, ctx).await })
        })
    }
}
