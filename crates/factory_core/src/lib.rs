//! # Factory Core
//!
//! Crate compartilhada, síncrona e sem I/O: montagem de frames, decodificação,
//! validação, regras de alarme e configuração TOML da ponte Smart Factory.
//!
//! ## Módulos
//! - [`types`] – Reading, Frame, modo e status
//! - [`channels`] – Tabela estática de canais e catálogo de sensores
//! - [`frame`] – Remontagem de frames a partir do stream serial
//! - [`protocol`] – Decoder, validação e renderização de frames
//! - [`alerts`] – Regras de alarme/aviso
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod channels;
pub mod frame;
pub mod protocol;
pub mod alerts;
pub mod config;

// Re-exports convenientes
pub use types::{Frame, Mode, Reading, SystemStatus};
pub use frame::FrameAssembler;
pub use protocol::{DecodeError, Decoded, RecordDecoder, ValidationError, render_frame, validate};
pub use alerts::AlarmEngine;
pub use config::{AlarmThresholds, AppConfig, ConfigError, PayloadFormat};
