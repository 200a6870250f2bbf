//! # Smart Factory Bridge
//!
//! Lê a telemetria serial da fábrica, entrega cada frame ao collector HTTP e
//! transmite as leituras para dashboards via WebSocket. Sem dispositivo,
//! gera telemetria simulada.
//!
//! ## Uso
//! ```bash
//! factory_bridge                        # config.toml ao lado do executável
//! factory_bridge --config /etc/factory.toml
//! factory_bridge --simulate             # não toca no dispositivo
//! ```

mod broadcast;
mod delivery;
mod device;
mod pipeline;
mod server;
mod simulator;
mod snapshot;
mod stats;

use anyhow::Context;
use broadcast::Broadcaster;
use clap::Parser;
use delivery::{DeliveryClient, HttpCollector};
use device::SerialDevice;
use factory_core::config::AppConfig;
use factory_core::AlarmEngine;
use pipeline::{IngestionPipeline, PipelineSettings, PipelineSinks};
use snapshot::CurrentReading;
use stats::Stats;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "factory_bridge", version, about = "Ponte de telemetria Smart Factory")]
struct Cli {
    /// Caminho do config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Força o modo simulado sem abrir o dispositivo
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Carregar config ──
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .init();

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("Configuração: {problem}");
    }

    // ── Componentes ──
    let cancel = CancellationToken::new();
    let sinks = PipelineSinks {
        broadcaster: Arc::new(Broadcaster::new(config.broadcast.subscriber_buffer)),
        current: Arc::new(CurrentReading::new()),
        stats: Arc::new(Stats::new()),
    };

    let delivery = if config.collector.enabled {
        let collector =
            HttpCollector::new(&config.collector).context("Falha ao criar cliente HTTP")?;
        Some(DeliveryClient::new(collector, &config.collector))
    } else {
        info!("Entrega ao collector desabilitada");
        None
    };

    let device = SerialDevice::new(config.device.address.clone(), config.device.baud_rate);
    let settings = PipelineSettings::from_config(&config, cli.simulate);
    let engine = AlarmEngine::new(config.alarms.clone());
    let pipeline = IngestionPipeline::new(device, delivery, sinks.clone(), engine.clone(), settings);

    let listener = tokio::net::TcpListener::bind(&config.broadcast.bind_addr)
        .await
        .with_context(|| format!("Falha ao abrir {}", config.broadcast.bind_addr))?;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🏭 SMART FACTORY BRIDGE – ATIVO");
    println!("══════════════════════════════════════════════");
    if cli.simulate {
        println!("  Dispositivo: (simulação forçada)");
    } else {
        println!(
            "  Dispositivo: {} @ {} baud",
            config.device.address, config.device.baud_rate
        );
    }
    if config.collector.enabled {
        println!(
            "  Collector:   {} ({:?})",
            config.collector.base_url, config.collector.payload_format
        );
    }
    println!("  Assinantes:  ws://{}/ws", config.broadcast.bind_addr);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Teste de conectividade ──
    if config.collector.enabled {
        match HttpCollector::new(&config.collector) {
            Ok(probe) => {
                tokio::spawn(async move {
                    match probe.probe().await {
                        Ok(status) if (200..300).contains(&status) => {
                            info!("Collector acessível (HTTP {status})")
                        }
                        Ok(status) => warn!("Collector respondeu HTTP {status}"),
                        Err(e) => warn!("Collector inacessível: {e}"),
                    }
                });
            }
            Err(e) => warn!("Teste de conectividade indisponível: {e}"),
        }
    }

    // ── Ctrl-C ──
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C recebido, encerrando...");
                    cancel.cancel();
                }
                Err(e) => warn!("Não foi possível escutar Ctrl-C: {e}"),
            }
        });
    }

    // ── Servidor ──
    let server_state = server::AppState {
        broadcaster: Arc::clone(&sinks.broadcaster),
        current: Arc::clone(&sinks.current),
        stats: Arc::clone(&sinks.stats),
        pipeline_state: pipeline.state_receiver(),
        engine: Arc::new(engine),
        commands: pipeline.command_sender(),
        cancel: cancel.clone(),
    };
    let server_task = tokio::spawn(server::serve(listener, server_state));

    // ── Loop principal ──
    pipeline.run(cancel.clone()).await;
    cancel.cancel();

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Servidor HTTP falhou: {e}"),
        Err(e) => error!("Task do servidor abortada: {e}"),
    }

    // ── Estatísticas finais ──
    let snap = sinks.stats.snapshot(pipeline::PipelineState::Disconnected);
    info!(
        "Estatísticas: uptime {}s | recebidos {} | enviados {} | erros {} | anomalias {} | sucesso {:.1}%",
        snap.uptime_secs, snap.received, snap.sent, snap.errors, snap.anomalies, snap.success_rate
    );

    Ok(())
}
