//! Orquestrador da ingestão.
//!
//! Uma única task é dona do dispositivo e roda, em ordem, montagem de frame →
//! decodificação → validação → alarmes para cada frame. Entrega e broadcast são
//! despachados sem esperar um pelo outro e sem segurar a próxima leitura.
//!
//! ```text
//! Disconnected → Connecting → Streaming ⇄ Reconnecting
//!                          ↘ SimulatedFallback → Streaming
//! ```

use crate::broadcast::{Broadcaster, DEFAULT_TOPIC};
use crate::delivery::{CollectorTransport, DeliveryClient, DeliveryOutcome, DeliveryPayload};
use crate::device::DeviceTransport;
use crate::simulator::Simulator;
use crate::snapshot::CurrentReading;
use crate::stats::Stats;
use factory_core::config::{AppConfig, PayloadFormat};
use factory_core::{AlarmEngine, Frame, FrameAssembler, Reading, RecordDecoder, validate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Disconnected,
    Connecting,
    Streaming,
    Reconnecting,
    SimulatedFallback,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Disconnected => "desconectado",
            PipelineState::Connecting => "conectando",
            PipelineState::Streaming => "recebendo",
            PipelineState::Reconnecting => "reconectando",
            PipelineState::SimulatedFallback => "simulação",
        };
        f.write_str(name)
    }
}

/// Parâmetros do pipeline extraídos da configuração.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub read_timeout: Duration,
    pub reconnect_delay: Duration,
    pub read_buffer_size: usize,
    pub simulation_enabled: bool,
    pub simulation_interval: Duration,
    /// Não toca no dispositivo; só simulação
    pub force_simulation: bool,
    pub forward_invalid: bool,
    pub payload_format: PayloadFormat,
    pub max_in_flight: usize,
    pub show_sensor_data: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig, force_simulation: bool) -> Self {
        Self {
            read_timeout: Duration::from_millis(config.device.read_timeout_ms.max(1)),
            reconnect_delay: Duration::from_millis(config.device.reconnect_delay_ms),
            read_buffer_size: config.device.read_buffer_size.max(1),
            simulation_enabled: config.simulation.enabled || force_simulation,
            simulation_interval: Duration::from_millis(config.simulation.interval_ms.max(1)),
            force_simulation,
            forward_invalid: config.validation.forward_invalid,
            payload_format: config.collector.payload_format,
            max_in_flight: config.collector.max_in_flight.max(1),
            show_sensor_data: config.logging.show_sensor_data,
        }
    }
}

/// Comandos aguardando o dispositivo.
const COMMAND_QUEUE: usize = 8;

/// Destinos compartilhados com o resto do processo.
#[derive(Clone)]
pub struct PipelineSinks {
    pub broadcaster: Arc<Broadcaster>,
    pub current: Arc<CurrentReading>,
    pub stats: Arc<Stats>,
}

pub struct IngestionPipeline<D, C> {
    device: D,
    delivery: Option<Arc<DeliveryClient<C>>>,
    sinks: PipelineSinks,
    engine: AlarmEngine,
    settings: PipelineSettings,
    assembler: FrameAssembler,
    decoder: RecordDecoder,
    simulator: Simulator,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    state: watch::Sender<PipelineState>,
    commands_tx: mpsc::Sender<String>,
    commands: mpsc::Receiver<String>,
    /// Anomalias do assembler já repassadas às estatísticas
    framing_reported: u64,
}

impl<D: DeviceTransport, C: CollectorTransport> IngestionPipeline<D, C> {
    pub fn new(
        device: D,
        delivery: Option<DeliveryClient<C>>,
        sinks: PipelineSinks,
        engine: AlarmEngine,
        settings: PipelineSettings,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Disconnected);
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        Self {
            device,
            delivery: delivery.map(Arc::new),
            sinks,
            engine,
            permits: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            settings,
            assembler: FrameAssembler::new(),
            decoder: RecordDecoder::new(),
            simulator: Simulator::new(),
            tracker: TaskTracker::new(),
            state,
            commands_tx,
            commands,
            framing_reported: 0,
        }
    }

    #[cfg(test)]
    fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn state_receiver(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Fila de comandos escritos no dispositivo enquanto ele estiver aberto.
    pub fn command_sender(&self) -> mpsc::Sender<String> {
        self.commands_tx.clone()
    }

    fn set_state(&self, next: PipelineState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!("Pipeline: {prev} → {next}");
        }
    }

    /// Roda até o token ser cancelado. Encerra liberando o dispositivo e
    /// aguardando as entregas em voo.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut state = if self.settings.force_simulation {
            PipelineState::SimulatedFallback
        } else {
            self.set_state(PipelineState::Connecting);
            match self.open_device(&cancel).await {
                Some(Ok(())) => PipelineState::Streaming,
                Some(Err(())) if self.settings.simulation_enabled => PipelineState::SimulatedFallback,
                Some(Err(())) => PipelineState::Reconnecting,
                None => PipelineState::Disconnected,
            }
        };

        while state != PipelineState::Disconnected && !cancel.is_cancelled() {
            self.set_state(state);
            state = match state {
                PipelineState::Streaming => self.stream(&cancel).await,
                PipelineState::Reconnecting => self.reconnect(&cancel).await,
                PipelineState::SimulatedFallback => self.simulate(&cancel).await,
                PipelineState::Connecting | PipelineState::Disconnected => {
                    PipelineState::Disconnected
                }
            };
        }

        self.shutdown().await;
    }

    /// `None` = cancelado durante a abertura.
    async fn open_device(&mut self, cancel: &CancellationToken) -> Option<Result<(), ()>> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            r = self.device.open() => r,
        };
        match result {
            Ok(()) => {
                info!("Dispositivo aberto: {}", self.device.describe());
                self.assembler.reset();
                Some(Ok(()))
            }
            Err(e) => {
                warn!("Falha ao abrir dispositivo: {e}");
                Some(Err(()))
            }
        }
    }

    async fn stream(&mut self, cancel: &CancellationToken) -> PipelineState {
        let mut buf = vec![0u8; self.settings.read_buffer_size];

        // Comandos enfileirados sem dispositivo aberto não são reenviados
        let mut stale = 0;
        while self.commands.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            warn!("{stale} comando(s) descartado(s) enquanto o dispositivo estava fechado");
        }

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PipelineState::Disconnected,
                Some(command) = self.commands.recv() => {
                    match self.device.write(command.as_bytes()).await {
                        Ok(()) => {
                            debug!("Comando enviado ao dispositivo: {command:?}");
                            continue;
                        }
                        Err(e) => {
                            warn!("Falha ao enviar comando: {e}");
                            break;
                        }
                    }
                }
                r = timeout(self.settings.read_timeout, self.device.read(&mut buf)) => r,
            };

            match read {
                // Sem dados no prazo: tick ocioso
                Err(_) => continue,
                Ok(Ok(0)) => {
                    warn!("Dispositivo encerrou o stream");
                    break;
                }
                Ok(Ok(n)) => {
                    let frames = self.assembler.feed(&buf[..n]);
                    self.report_framing_anomalies();
                    for frame in frames {
                        self.process(frame, cancel);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Erro de leitura do dispositivo: {e}");
                    break;
                }
            }
        }

        self.device.close().await;
        self.assembler.reset();
        PipelineState::Reconnecting
    }

    async fn reconnect(&mut self, cancel: &CancellationToken) -> PipelineState {
        info!(
            "Nova tentativa de conexão em {} ms",
            self.settings.reconnect_delay.as_millis()
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PipelineState::Disconnected,
            _ = sleep(self.settings.reconnect_delay) => {}
        }

        match self.open_device(cancel).await {
            Some(Ok(())) => PipelineState::Streaming,
            Some(Err(())) => PipelineState::Reconnecting,
            None => PipelineState::Disconnected,
        }
    }

    async fn simulate(&mut self, cancel: &CancellationToken) -> PipelineState {
        info!(
            "Gerando telemetria simulada a cada {} ms",
            self.settings.simulation_interval.as_millis()
        );
        let mut ticker = tokio::time::interval(self.settings.simulation_interval);
        let mut next_probe = Instant::now() + self.settings.reconnect_delay;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PipelineState::Disconnected,
                _ = ticker.tick() => {}
            }

            let frame = self.simulator.next_frame();
            self.process(frame, cancel);

            if !self.settings.force_simulation && Instant::now() >= next_probe {
                match self.open_device(cancel).await {
                    Some(Ok(())) => return PipelineState::Streaming,
                    Some(Err(())) => {
                        debug!("Dispositivo ainda indisponível, mantendo simulação");
                        next_probe = Instant::now() + self.settings.reconnect_delay;
                    }
                    None => return PipelineState::Disconnected,
                }
            }
        }
    }

    /// Cadeia síncrona por frame; despacha entrega e broadcast.
    fn process(&mut self, frame: Frame, cancel: &CancellationToken) {
        let stats = &self.sinks.stats;

        let decoded = match self.decoder.decode(&frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("{e}");
                stats.record_error();
                return;
            }
        };
        stats.record_received();
        if !decoded.anomalies.is_empty() {
            stats.record_anomalies(decoded.anomalies.len() as u64);
        }

        if let Err(e) = validate(&decoded.reading) {
            stats.record_error();
            if !self.settings.forward_invalid {
                warn!("{e} (descartada)");
                return;
            }
            warn!("{e}");
        }

        let reading = self.engine.evaluate(decoded.reading);
        for alarm in &reading.active_alarms {
            warn!("ALARME: {alarm}");
        }
        if self.settings.show_sensor_data {
            info!("{reading}");
        } else {
            debug!("{reading}");
        }

        let payload = self.payload_for(&reading);
        let shared = self.sinks.current.replace(reading);
        let report = self
            .sinks
            .broadcaster
            .publish(DEFAULT_TOPIC, Reading::clone(&shared));
        if report.dropped > 0 {
            debug!(
                "Broadcast: {} entregues, {} descartados",
                report.delivered, report.dropped
            );
        }

        self.dispatch(payload, cancel);
    }

    fn report_framing_anomalies(&mut self) {
        let total = self.assembler.anomalies();
        if total > self.framing_reported {
            self.sinks
                .stats
                .record_anomalies(total - self.framing_reported);
            self.framing_reported = total;
        }
    }

    fn payload_for(&self, reading: &Reading) -> DeliveryPayload {
        match self.settings.payload_format {
            PayloadFormat::Raw => DeliveryPayload::Raw(reading.raw_data.clone()),
            PayloadFormat::Structured => DeliveryPayload::Structured(reading.raw_data.clone()),
        }
    }

    fn dispatch(&self, payload: DeliveryPayload, cancel: &CancellationToken) {
        let Some(delivery) = &self.delivery else {
            return;
        };
        // Sem vaga: o frame não entra na fila de entrega
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            warn!(
                "{} entregas em andamento, frame não enviado ao collector",
                self.settings.max_in_flight
            );
            self.sinks.stats.record_error();
            return;
        };
        let delivery = Arc::clone(delivery);
        let stats = Arc::clone(&self.sinks.stats);
        let cancel = cancel.clone();

        self.tracker.spawn(async move {
            let _permit = permit;
            match delivery.deliver(&payload, &cancel).await {
                DeliveryOutcome::Success => stats.record_sent(),
                // Interrompida pelo encerramento, não conta como falha
                _ if cancel.is_cancelled() => {}
                DeliveryOutcome::TerminalFailure(_) | DeliveryOutcome::RetryableFailure(_) => {
                    stats.record_error()
                }
            }
        });
    }

    /// Leituras já pararam; drena as entregas e só então libera o dispositivo.
    async fn shutdown(&mut self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.device.close().await;
        self.set_state(PipelineState::Disconnected);
        info!("Pipeline encerrado");
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
