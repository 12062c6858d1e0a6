//! Bridge context: owns the shared state and routes transport events.
//!
//! One instance per process. The session slot, waiter registry and reader
//! state live here and are handed to the services as `Arc`s.

use crate::domain::config::{BridgeConfig, ConfigError};
use crate::domain::session::{Session, SessionSlot};
use crate::domain::state::{ReaderSnapshot, ReaderState};
use crate::domain::topics;
use crate::ipc::waiters::WaiterRegistry;
use crate::ports::outbound::{Clock, SystemClock};
use crate::ports::transport::{InboundMessage, Transport, TransportError, TransportEvent};
use crate::service::command::CommandEngine;
use crate::service::login::{LoginState, LoginStateMachine};
use crate::service::program::ProgramOrchestrator;
use crate::service::query::QueryService;
use crate::service::reader::ReaderEventProcessor;
use crate::service::smartphone::SmartphoneService;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Bridge {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    waiters: Arc<WaiterRegistry>,
    session: Arc<SessionSlot>,
    reader_state: Arc<ReaderState>,
    login: Arc<LoginStateMachine>,
    queries: Arc<QueryService>,
    commands: Arc<CommandEngine>,
    smartphone: SmartphoneService,
    reader: ReaderEventProcessor,
    program: ProgramOrchestrator,
}

impl Bridge {
    pub fn new(config: BridgeConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    /// Build the bridge with an explicit wall clock
    pub fn with_clock(
        config: BridgeConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let waiters = Arc::new(WaiterRegistry::new());
        let session = Arc::new(SessionSlot::new());
        let reader_state = Arc::new(ReaderState::new());

        let login = Arc::new(LoginStateMachine::new(
            Arc::clone(&transport),
            Arc::clone(&session),
            config.credentials.clone(),
            config.timeouts.login_fallback,
        ));
        let queries = Arc::new(QueryService::new(
            Arc::clone(&transport),
            Arc::clone(&waiters),
            Arc::clone(&session),
            config.timeouts.query,
        ));
        let commands = Arc::new(CommandEngine::new(
            Arc::clone(&transport),
            Arc::clone(&waiters),
            Arc::clone(&session),
            Arc::clone(&reader_state),
            Arc::clone(&queries),
            config.timeouts.clone(),
            config.confirm.clone(),
        ));
        let smartphone = SmartphoneService::new(
            Arc::clone(&transport),
            Arc::clone(&waiters),
            Arc::clone(&session),
            Arc::clone(&commands),
            config.timeouts.clone(),
        );
        let reader = ReaderEventProcessor::new(
            config.station_id.clone(),
            Arc::clone(&reader_state),
            Arc::clone(&queries),
        );
        let program = ProgramOrchestrator::new(
            Arc::clone(&commands),
            Arc::clone(&queries),
            Arc::clone(&session),
            clock,
        );

        Ok(Self {
            config,
            transport,
            waiters,
            session,
            reader_state,
            login,
            queries,
            commands,
            smartphone,
            reader,
            program,
        })
    }

    /// Route one transport event. Never blocks on network I/O.
    pub fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                let bridge = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = bridge.on_connected().await {
                        error!(error = %e, "Connection setup failed");
                    }
                });
            }
            TransportEvent::Message(message) => self.on_message(&message),
            TransportEvent::Disconnected(reason) => {
                warn!(reason = %reason, "Transport disconnected");
                self.login.on_disconnected();
            }
        }
    }

    /// Re-issue every long-lived subscription, then log in if needed
    pub async fn on_connected(&self) -> Result<(), TransportError> {
        info!(host = %self.config.mqtt.host, "Connected to broker");
        for pattern in topics::long_lived_subscriptions() {
            self.transport.subscribe(pattern).await?;
        }
        self.login.on_connected().await
    }

    fn on_message(&self, message: &InboundMessage) {
        if self.login.handle_message(message) {
            return;
        }
        let resolved = self.waiters.dispatch(message);
        if resolved > 0 {
            debug!(topic = %message.topic, resolved, "Resolved waiters");
        }
        // Dropping the outcome detaches any background lookup.
        let _ = self.reader.handle(message);
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn queries(&self) -> &Arc<QueryService> {
        &self.queries
    }

    pub fn commands(&self) -> &Arc<CommandEngine> {
        &self.commands
    }

    pub fn smartphone(&self) -> &SmartphoneService {
        &self.smartphone
    }

    pub fn program(&self) -> &ProgramOrchestrator {
        &self.program
    }

    pub fn waiters(&self) -> &Arc<WaiterRegistry> {
        &self.waiters
    }

    pub fn session(&self) -> Option<Session> {
        self.session.current()
    }

    pub fn login_state(&self) -> LoginState {
        self.login.state()
    }

    pub fn reader_snapshot(&self) -> ReaderSnapshot {
        self.reader_state.snapshot()
    }
}
