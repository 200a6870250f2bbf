//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável. Carregado uma vez na
//! inicialização; o pipeline trabalha com um snapshot imutável.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Falhas ao ler ou gravar o `config.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Erro ao parsear {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Dispositivo serial (ou ponte serial-TCP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Caminho do tty (`/dev/ttyUSB0`) ou `tcp://host:porta`
    pub address: String,
    /// Baud rate informado ao operador; aplicado externamente no tty
    pub baud_rate: u32,
    /// Leitura sem dados dentro deste prazo é só um tick ocioso
    pub read_timeout_ms: u64,
    /// Espera fixa entre tentativas de reconexão
    pub reconnect_delay_ms: u64,
    pub read_buffer_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "/dev/ttyUSB0".into(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            reconnect_delay_ms: 3000,
            read_buffer_size: 1024,
        }
    }
}

/// Formato do payload entregue ao collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Texto bruto de duas linhas (`text/plain`)
    #[default]
    Raw,
    /// JSON `{"sensorString": ...}`
    Structured,
}

/// Collector HTTP remoto.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub enabled: bool,
    pub base_url: String,
    pub raw_endpoint: String,
    pub structured_endpoint: String,
    pub payload_format: PayloadFormat,
    /// Tentativas por frame (0 é tratado como 1)
    pub max_attempts: u32,
    /// Backoff linear: `base_delay_ms × tentativa`
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Entregas simultâneas em voo
    pub max_in_flight: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:5000/api".into(),
            raw_endpoint: "/sensor/raw".into(),
            structured_endpoint: "/sensor/data".into(),
            payload_format: PayloadFormat::Raw,
            max_attempts: 3,
            base_delay_ms: 1000,
            request_timeout_secs: 30,
            user_agent: "SmartFactoryClient/1.0".into(),
            max_in_flight: 16,
        }
    }
}

/// Superfície HTTP/WebSocket para assinantes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub bind_addr: String,
    /// Fila por assinante; cheia = mensagem descartada só para ele
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            subscriber_buffer: 32,
        }
    }
}

/// Telemetria simulada quando o dispositivo não abre.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2000,
        }
    }
}

/// Política para leituras fora da faixa legal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// `true`: conta como erro mas entrega/transmite mesmo assim
    pub forward_invalid: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            forward_invalid: true,
        }
    }
}

/// Tetos de alarme/aviso. Valores estritamente acima disparam a regra.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmThresholds {
    pub gas_methane_max: f64,
    pub gas_co_max: f64,
    pub tank_pressure_max: f64,
    pub furnace_temp_max: f64,
    pub water_leak_max: f64,
    pub main_current_max: f64,
    pub engine_vibe_max: f64,
    pub machine_sound_max: f64,
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self {
            gas_methane_max: 700.0,
            gas_co_max: 650.0,
            tank_pressure_max: 90.0,
            furnace_temp_max: 1000.0,
            water_leak_max: 600.0,
            main_current_max: 150.0,
            engine_vibe_max: 50.0,
            machine_sound_max: 600.0,
        }
    }
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filtro usado quando `RUST_LOG` não está definido
    pub level: String,
    /// Resumo de cada leitura em `info` em vez de `debug`
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            show_sensor_data: false,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub collector: CollectorConfig,
    pub broadcast: BroadcastConfig,
    pub simulation: SimulationConfig,
    pub validation: ValidationConfig,
    pub alarms: AlarmThresholds,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Lê e parseia o arquivo, sem fallback.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Carrega o arquivo; ausente ou inválido cai nos padrões.
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(config) => {
                info!("Configuração carregada de {}", path.display());
                config
            }
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!("{} não encontrado, usando configuração padrão", path.display());
                AppConfig::default()
            }
            Err(e) => {
                warn!("{e}; usando configuração padrão");
                AppConfig::default()
            }
        }
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.device.address.trim().is_empty() {
            errors.push("Endereço do dispositivo não pode ser vazio".into());
        }
        if self.device.read_buffer_size == 0 {
            errors.push("Buffer de leitura do dispositivo não pode ser 0".into());
        }
        if self.collector.enabled && self.collector.base_url.trim().is_empty() {
            errors.push("URL base do collector não pode ser vazia".into());
        }
        if self.collector.max_attempts == 0 {
            errors.push("Tentativas de entrega não podem ser 0 (usando 1)".into());
        }
        if self.collector.max_in_flight == 0 {
            errors.push("Entregas simultâneas não podem ser 0".into());
        }
        if self.broadcast.subscriber_buffer == 0 {
            errors.push("Fila por assinante não pode ser 0".into());
        }
        if self.simulation.interval_ms == 0 || self.simulation.interval_ms > 60_000 {
            errors.push(format!(
                "Intervalo da simulação inválido: {} ms (1–60000)",
                self.simulation.interval_ms
            ));
        }

        errors
    }
}
