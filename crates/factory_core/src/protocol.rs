//! Decodificação e validação dos frames de texto do dispositivo.
//!
//! Formato da linha de dados:
//!
//! ```text
//! Furnace_Temp:892.00,Env_Humid:45.50,Light_Level:210,...,Coolant_Valve:90
//! ```
//!
//! Campos individuais ruins nunca derrubam o frame inteiro: viram
//! [`DecodeAnomaly`] e o canal fica no valor padrão. Só um frame sem linha de
//! dados é fatal ([`DecodeError::MalformedFrame`]).

use crate::channels::{self, CHANNELS, ChannelKind};
use crate::frame::HEADER_MARKER;
use crate::types::{Frame, Mode, Reading, SystemStatus};
use chrono::Utc;
use std::fmt;
use tracing::warn;

/// Erros fatais de decodificação.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame malformado: {0}")]
    MalformedFrame(String),
}

/// Campo ignorado durante a decodificação.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeAnomaly {
    /// Par sem `:` ou com chave/valor vazio
    MalformedPair(String),
    /// Chave fora da tabela de canais
    UnknownKey(String),
    /// Valor que não converte para o tipo do canal
    BadValue { key: String, value: String },
}

impl fmt::Display for DecodeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeAnomaly::MalformedPair(pair) => write!(f, "par malformado {pair:?}"),
            DecodeAnomaly::UnknownKey(key) => write!(f, "chave desconhecida {key:?}"),
            DecodeAnomaly::BadValue { key, value } => {
                write!(f, "valor inválido {value:?} para {key}")
            }
        }
    }
}

/// Resultado de [`RecordDecoder::decode`].
#[derive(Debug, Clone)]
pub struct Decoded {
    pub reading: Reading,
    pub anomalies: Vec<DecodeAnomaly>,
}

/// Canais fora da faixa legal.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Leitura fora da faixa: {}", .violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

// ──────────────────────────────────────────────
// Decoder
// ──────────────────────────────────────────────

/// Decoder de frames. Lembra o último modo/status vistos para cabeçalhos
/// que não trazem essas palavras.
#[derive(Debug, Clone, Default)]
pub struct RecordDecoder {
    last_mode: Mode,
    last_status: SystemStatus,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converte um [`Frame`] em [`Reading`] (sem alarmes calculados).
    pub fn decode(&mut self, frame: &Frame) -> Result<Decoded, DecodeError> {
        let data = frame.data.trim();
        if data.is_empty() {
            return Err(DecodeError::MalformedFrame("linha de dados vazia".into()));
        }

        if frame.header.contains("AUTOMATIC MODE") {
            self.last_mode = Mode::Automatic;
        } else if frame.header.contains("MANUAL MODE") {
            self.last_mode = Mode::Manual;
        }

        if frame.header.contains("OFFLINE") {
            self.last_status = SystemStatus::Offline;
        } else if frame.header.contains("ONLINE") {
            self.last_status = SystemStatus::Online;
        }

        let mut reading = Reading {
            timestamp: Utc::now(),
            mode: self.last_mode,
            status: self.last_status,
            raw_data: frame.raw(),
            ..Default::default()
        };
        let mut anomalies = Vec::new();

        for pair in data.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }

            let Some((key, value)) = pair.split_once(':') else {
                anomalies.push(DecodeAnomaly::MalformedPair(pair.to_string()));
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                anomalies.push(DecodeAnomaly::MalformedPair(pair.to_string()));
                continue;
            }

            let Some(spec) = channels::lookup(key) else {
                anomalies.push(DecodeAnomaly::UnknownKey(key.to_string()));
                continue;
            };

            match spec.parse(value) {
                Some(parsed) => spec.set(&mut reading, parsed),
                None => anomalies.push(DecodeAnomaly::BadValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
        }

        for anomaly in &anomalies {
            warn!("Campo ignorado no frame: {anomaly}");
        }

        Ok(Decoded { reading, anomalies })
    }
}

impl Frame {
    /// Reconstrói um frame a partir da forma bruta de duas linhas.
    pub fn from_raw(text: &str) -> Result<Frame, DecodeError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        match (lines.next(), lines.next()) {
            (Some(header), Some(data)) => Ok(Frame::new(header, data)),
            _ => Err(DecodeError::MalformedFrame(
                "esperado cabeçalho e linha de dados".into(),
            )),
        }
    }
}

// ──────────────────────────────────────────────
// Validação
// ──────────────────────────────────────────────

/// Confere cada canal contra a faixa legal e lista todas as violações.
pub fn validate(reading: &Reading) -> Result<(), ValidationError> {
    let violations: Vec<String> = CHANNELS
        .iter()
        .filter_map(|spec| {
            let value = spec.get(reading);
            if spec.in_range(value) {
                return None;
            }
            let range = match spec.max {
                Some(max) => format!("[{}, {}]", spec.min, max),
                None => format!(">= {}", spec.min),
            };
            Some(format!("{} = {} fora de {}", spec.key, value, range))
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

// ──────────────────────────────────────────────
// Renderização
// ──────────────────────────────────────────────

/// Gera o texto canônico de duas linhas para uma leitura.
pub fn render_frame(reading: &Reading) -> String {
    let data: Vec<String> = CHANNELS
        .iter()
        .map(|spec| {
            let value = spec.get(reading);
            match spec.kind {
                ChannelKind::Float => format!("{}:{:.2}", spec.key, value),
                ChannelKind::Int => format!("{}:{}", spec.key, value as i64),
            }
        })
        .collect();

    format!(
        "{HEADER_MARKER} - {} MODE - {}\n{}",
        reading.mode,
        reading.status,
        data.join(",")
    )
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Smart Factory Monitoring System - AUTOMATIC MODE - ONLINE";
    const SAMPLE: &str = "Furnace_Temp:892.00,Env_Humid:45.50,Light_Level:210,Gas_Methane:15,Gas_CO:61,Machine_Sound:512,Tank_Pressure:72,Main_Current:123,Engine_Vibe:25,Input_Voltage:230,Conveyor_Dist:150,Water_Leak:100,Flame_Status:0,Gate_Status:0,E_Stop_Button:0,Coolant_Valve:90";

    fn decode(header: &str, data: &str) -> Decoded {
        RecordDecoder::new()
            .decode(&Frame::new(header, data))
            .unwrap()
    }

    #[test]
    fn sample_frame_decodes_every_channel() {
        let decoded = decode(HEADER, SAMPLE);
        assert!(decoded.anomalies.is_empty());

        let r = &decoded.reading;
        assert_eq!(r.furnace_temp, 892.0);
        assert_eq!(r.env_humid, 45.5);
        assert_eq!(r.gas_co, 61);
        assert_eq!(r.tank_pressure, 72);
        assert_eq!(r.coolant_valve, 90);
        assert_eq!(r.mode, Mode::Automatic);
        assert_eq!(r.status, SystemStatus::Online);
        assert_eq!(r.raw_data, format!("{HEADER}\n{SAMPLE}"));
        assert!(validate(r).is_ok());
    }

    #[test]
    fn only_listed_channels_are_set() {
        let r = decode(HEADER, "Furnace_Temp:10.00,Gas_CO:5").reading;
        for spec in &CHANNELS {
            let expected = match spec.key {
                "Furnace_Temp" => 10.0,
                "Gas_CO" => 5.0,
                _ => 0.0,
            };
            assert_eq!(spec.get(&r), expected, "canal {}", spec.key);
        }
    }

    #[test]
    fn unknown_keys_are_counted_not_fatal() {
        let decoded = decode(HEADER, "Furnace_Temp:1.00,Laser_Power:9,Gas_CO:3");
        assert_eq!(
            decoded.anomalies,
            vec![DecodeAnomaly::UnknownKey("Laser_Power".into())]
        );
        assert_eq!(decoded.reading.gas_co, 3);
    }

    #[test]
    fn bad_value_keeps_default() {
        let decoded = decode(HEADER, "Furnace_Temp:hot,Gas_CO:6.5,Tank_Pressure:70");
        assert_eq!(decoded.anomalies.len(), 2);
        assert_eq!(decoded.reading.furnace_temp, 0.0);
        assert_eq!(decoded.reading.gas_co, 0);
        assert_eq!(decoded.reading.tank_pressure, 70);
    }

    #[test]
    fn malformed_pairs_are_skipped() {
        let decoded = decode(HEADER, "Furnace_Temp:1.00,garbage,:5,Gas_CO:,,Gas_CO:2");
        assert_eq!(decoded.anomalies.len(), 3);
        assert!(matches!(decoded.anomalies[0], DecodeAnomaly::MalformedPair(_)));
        assert_eq!(decoded.reading.gas_co, 2);
    }

    #[test]
    fn value_with_colon_splits_on_first_only() {
        let decoded = decode(HEADER, "Furnace_Temp:1.00,Gas_CO:1:2");
        assert_eq!(
            decoded.anomalies,
            vec![DecodeAnomaly::BadValue {
                key: "Gas_CO".into(),
                value: "1:2".into()
            }]
        );
    }

    #[test]
    fn duplicate_key_last_wins() {
        let r = decode(HEADER, "Furnace_Temp:1.00,Gas_CO:1,Gas_CO:9").reading;
        assert_eq!(r.gas_co, 9);
    }

    #[test]
    fn empty_data_line_is_malformed() {
        let mut decoder = RecordDecoder::new();
        let err = decoder.decode(&Frame::new(HEADER, "  ")).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedFrame(_)));
    }

    #[test]
    fn header_without_keywords_keeps_prior_mode_and_status() {
        let mut decoder = RecordDecoder::new();
        decoder
            .decode(&Frame::new(
                "Smart Factory Monitoring System - MANUAL MODE - OFFLINE",
                "Furnace_Temp:1.00",
            ))
            .unwrap();
        let r = decoder
            .decode(&Frame::new("Smart Factory Monitoring System", "Furnace_Temp:2.00"))
            .unwrap()
            .reading;
        assert_eq!(r.mode, Mode::Manual);
        assert_eq!(r.status, SystemStatus::Offline);
    }

    #[test]
    fn validation_lists_every_violation() {
        let r = Reading {
            furnace_temp: 2500.0,
            env_humid: 101.0,
            flame_status: 2,
            water_leak: -1,
            ..Default::default()
        };
        let err = validate(&r).unwrap_err();
        assert_eq!(err.violations.len(), 4);
        assert!(err.violations[0].starts_with("Furnace_Temp"));
    }

    #[test]
    fn rendered_frame_decodes_back() {
        let original = decode(HEADER, SAMPLE).reading;
        let frame = Frame::from_raw(&render_frame(&original)).unwrap();
        assert_eq!(frame.header, HEADER);
        assert_eq!(frame.data, SAMPLE);
    }

    #[test]
    fn from_raw_needs_two_lines() {
        assert!(Frame::from_raw("").is_err());
        assert!(Frame::from_raw(HEADER).is_err());
        let frame = Frame::from_raw(&format!("{HEADER}\r\n{SAMPLE}\r\n")).unwrap();
        assert_eq!(frame.data, SAMPLE);
    }
}
