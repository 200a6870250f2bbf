//! Tipos centrais da telemetria da fábrica.
//!
//! Uma [`Reading`] é o snapshot de todos os canais num instante. Um [`Frame`]
//! é o par (cabeçalho, dados) extraído do stream serial, consumido na hora
//! pelo decoder e nunca persistido.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Modo e status
// ──────────────────────────────────────────────

/// Modo de operação reportado no cabeçalho do frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[default]
    Automatic,
    Manual,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Automatic => f.write_str("AUTOMATIC"),
            Mode::Manual => f.write_str("MANUAL"),
        }
    }
}

/// Status do sistema reportado no cabeçalho do frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    #[default]
    Online,
    Offline,
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemStatus::Online => f.write_str("ONLINE"),
            SystemStatus::Offline => f.write_str("OFFLINE"),
        }
    }
}

// ──────────────────────────────────────────────
// Frame
// ──────────────────────────────────────────────

/// Par cabeçalho + linha de dados extraído do stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: String,
    pub data: String,
}

impl Frame {
    pub fn new(header: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            data: data.into(),
        }
    }

    /// Forma canônica de duas linhas aceita pelo collector.
    pub fn raw(&self) -> String {
        format!("{}\n{}", self.header, self.data)
    }
}

// ──────────────────────────────────────────────
// Reading
// ──────────────────────────────────────────────

/// Snapshot de todos os canais do dispositivo.
///
/// As listas de avisos/alarmes e as duas flags são sempre recalculadas por
/// completo pelo [`AlarmEngine`](crate::alerts::AlarmEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Momento da captura (UTC)
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    pub status: SystemStatus,
    /// Texto bruto de duas linhas que originou a leitura
    pub raw_data: String,

    // Temperatura e ambiente
    /// Temperatura do forno (°C)
    pub furnace_temp: f64,
    /// Umidade do ambiente (%)
    pub env_humid: f64,
    /// Nível de luz (lux)
    pub light_level: i32,

    // Gases
    /// Metano (ppm)
    pub gas_methane: i32,
    /// Monóxido de carbono (ppm)
    pub gas_co: i32,

    // Máquinas
    pub machine_sound: i32,
    /// Pressão do tanque (PSI)
    pub tank_pressure: i32,
    /// Corrente principal (A)
    pub main_current: i32,
    pub engine_vibe: i32,
    /// Tensão de entrada (V)
    pub input_voltage: i32,

    // Linha de produção
    pub conveyor_dist: i32,
    pub water_leak: i32,
    pub flame_status: i32,
    pub gate_status: i32,

    // Controle
    pub e_stop_button: i32,
    /// Abertura da válvula de refrigeração (%)
    pub coolant_valve: i32,

    // Derivados
    pub active_warnings: Vec<String>,
    pub active_alarms: Vec<String>,
    pub warning_active: bool,
    pub alarm_active: bool,
}

impl Default for Reading {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            mode: Mode::default(),
            status: SystemStatus::default(),
            raw_data: String::new(),
            furnace_temp: 0.0,
            env_humid: 0.0,
            light_level: 0,
            gas_methane: 0,
            gas_co: 0,
            machine_sound: 0,
            tank_pressure: 0,
            main_current: 0,
            engine_vibe: 0,
            input_voltage: 0,
            conveyor_dist: 0,
            water_leak: 0,
            flame_status: 0,
            gate_status: 0,
            e_stop_button: 0,
            coolant_valve: 0,
            active_warnings: Vec::new(),
            active_alarms: Vec::new(),
            warning_active: false,
            alarm_active: false,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Forno {:.1}°C | Pressão {} PSI | CO {} ppm | {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.furnace_temp,
            self.tank_pressure,
            self.gas_co,
            self.mode,
            self.status
        )
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
