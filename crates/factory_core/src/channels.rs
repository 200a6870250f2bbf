//! Tabela estática de canais do dispositivo.
//!
//! Cada entrada associa a chave do firmware (`Furnace_Temp`, `Gas_CO`…) ao
//! tipo numérico declarado, à faixa legal e ao setter/getter na [`Reading`].
//! O decoder, a validação e o catálogo de sensores leem desta mesma tabela.

use crate::types::Reading;
use serde::Serialize;

/// Tipo numérico declarado de um canal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Float,
    Int,
}

/// Valor já convertido para o tipo do canal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    Float(f64),
    Int(i32),
}

impl ChannelValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ChannelValue::Float(v) => v,
            ChannelValue::Int(v) => v as f64,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            ChannelValue::Float(v) => v as i32,
            ChannelValue::Int(v) => v,
        }
    }
}

/// Entrada da tabela de canais.
pub struct ChannelSpec {
    /// Chave no frame (ex: "Furnace_Temp")
    pub key: &'static str,
    pub kind: ChannelKind,
    /// Limite inferior legal (inclusivo)
    pub min: f64,
    /// Limite superior legal (inclusivo); `None` = sem teto
    pub max: Option<f64>,
    pub label: &'static str,
    pub unit: &'static str,
    pub area: &'static str,
    pub category: &'static str,
    pub safe_min: Option<f64>,
    pub safe_max: Option<f64>,
    set: fn(&mut Reading, ChannelValue),
    get: fn(&Reading) -> f64,
}

impl ChannelSpec {
    /// Converte o texto bruto para o tipo declarado (ponto decimal invariante).
    pub fn parse(&self, raw: &str) -> Option<ChannelValue> {
        match self.kind {
            ChannelKind::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ChannelValue::Float),
            ChannelKind::Int => raw.parse::<i32>().ok().map(ChannelValue::Int),
        }
    }

    pub fn set(&self, reading: &mut Reading, value: ChannelValue) {
        (self.set)(reading, value);
    }

    pub fn get(&self, reading: &Reading) -> f64 {
        (self.get)(reading)
    }

    /// `true` se o valor está dentro da faixa legal do canal.
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.min && self.max.is_none_or(|max| value <= max)
    }

    /// Visão serializável para o catálogo de sensores.
    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            key: self.key,
            label: self.label,
            unit: self.unit,
            area: self.area,
            category: self.category,
            kind: self.kind,
            legal_min: self.min,
            legal_max: self.max,
            safe_min: self.safe_min,
            safe_max: self.safe_max,
        }
    }
}

/// Entrada do catálogo exposta aos consumidores.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub area: &'static str,
    pub category: &'static str,
    pub kind: ChannelKind,
    pub legal_min: f64,
    pub legal_max: Option<f64>,
    pub safe_min: Option<f64>,
    pub safe_max: Option<f64>,
}

/// Todos os canais, na ordem em que o firmware os envia.
pub static CHANNELS: [ChannelSpec; 16] = [
    ChannelSpec {
        key: "Furnace_Temp",
        kind: ChannelKind::Float,
        min: 0.0,
        max: Some(2000.0),
        label: "Temperatura do forno",
        unit: "°C",
        area: "Sala do forno",
        category: "Temperature",
        safe_min: None,
        safe_max: Some(1000.0),
        set: |r, v| r.furnace_temp = v.as_f64(),
        get: |r| r.furnace_temp,
    },
    ChannelSpec {
        key: "Env_Humid",
        kind: ChannelKind::Float,
        min: 0.0,
        max: Some(100.0),
        label: "Umidade do ambiente",
        unit: "%",
        area: "Ambiente geral",
        category: "Environment",
        safe_min: None,
        safe_max: Some(80.0),
        set: |r, v| r.env_humid = v.as_f64(),
        get: |r| r.env_humid,
    },
    ChannelSpec {
        key: "Light_Level",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Nível de luz",
        unit: "lux",
        area: "Ambiente geral",
        category: "Environment",
        safe_min: Some(100.0),
        safe_max: None,
        set: |r, v| r.light_level = v.as_i32(),
        get: |r| r.light_level as f64,
    },
    ChannelSpec {
        key: "Gas_Methane",
        kind: ChannelKind::Int,
        min: 0.0,
        max: Some(1000.0),
        label: "Gás metano",
        unit: "ppm",
        area: "Depósito de químicos",
        category: "Safety",
        safe_min: None,
        safe_max: Some(300.0),
        set: |r, v| r.gas_methane = v.as_i32(),
        get: |r| r.gas_methane as f64,
    },
    ChannelSpec {
        key: "Gas_CO",
        kind: ChannelKind::Int,
        min: 0.0,
        max: Some(1000.0),
        label: "Monóxido de carbono",
        unit: "ppm",
        area: "Sala do gerador",
        category: "Safety",
        safe_min: None,
        safe_max: Some(100.0),
        set: |r, v| r.gas_co = v.as_i32(),
        get: |r| r.gas_co as f64,
    },
    ChannelSpec {
        key: "Machine_Sound",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Som das máquinas",
        unit: "dB",
        area: "Linha de produção",
        category: "Production",
        safe_min: None,
        safe_max: Some(600.0),
        set: |r, v| r.machine_sound = v.as_i32(),
        get: |r| r.machine_sound as f64,
    },
    ChannelSpec {
        key: "Tank_Pressure",
        kind: ChannelKind::Int,
        min: 0.0,
        max: Some(200.0),
        label: "Pressão do tanque",
        unit: "PSI",
        area: "Tanque pressurizado",
        category: "Safety",
        safe_min: None,
        safe_max: Some(90.0),
        set: |r, v| r.tank_pressure = v.as_i32(),
        get: |r| r.tank_pressure as f64,
    },
    ChannelSpec {
        key: "Main_Current",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Corrente principal",
        unit: "A",
        area: "Quadro elétrico principal",
        category: "Electrical",
        safe_min: None,
        safe_max: Some(150.0),
        set: |r, v| r.main_current = v.as_i32(),
        get: |r| r.main_current as f64,
    },
    ChannelSpec {
        key: "Engine_Vibe",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Vibração do motor",
        unit: "Hz",
        area: "Motor principal",
        category: "Mechanical",
        safe_min: None,
        safe_max: Some(50.0),
        set: |r, v| r.engine_vibe = v.as_i32(),
        get: |r| r.engine_vibe as f64,
    },
    ChannelSpec {
        key: "Input_Voltage",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Tensão de entrada",
        unit: "V",
        area: "Entrada de energia",
        category: "Electrical",
        safe_min: Some(220.0),
        safe_max: Some(240.0),
        set: |r, v| r.input_voltage = v.as_i32(),
        get: |r| r.input_voltage as f64,
    },
    ChannelSpec {
        key: "Conveyor_Dist",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Distância na esteira",
        unit: "cm",
        area: "Esteira transportadora",
        category: "Production",
        safe_min: None,
        safe_max: None,
        set: |r, v| r.conveyor_dist = v.as_i32(),
        get: |r| r.conveyor_dist as f64,
    },
    ChannelSpec {
        key: "Water_Leak",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Vazamento de água",
        unit: "level",
        area: "Instalações",
        category: "Safety",
        safe_min: None,
        safe_max: Some(400.0),
        set: |r, v| r.water_leak = v.as_i32(),
        get: |r| r.water_leak as f64,
    },
    ChannelSpec {
        key: "Flame_Status",
        kind: ChannelKind::Int,
        min: 0.0,
        max: Some(1.0),
        label: "Detecção de chama",
        unit: "status",
        area: "Depósito de matéria-prima",
        category: "Safety",
        safe_min: None,
        safe_max: Some(0.0),
        set: |r, v| r.flame_status = v.as_i32(),
        get: |r| r.flame_status as f64,
    },
    ChannelSpec {
        key: "Gate_Status",
        kind: ChannelKind::Int,
        min: 0.0,
        max: Some(1.0),
        label: "Estado do portão",
        unit: "status",
        area: "Portão de entrada principal",
        category: "Security",
        safe_min: None,
        safe_max: None,
        set: |r, v| r.gate_status = v.as_i32(),
        get: |r| r.gate_status as f64,
    },
    ChannelSpec {
        key: "E_Stop_Button",
        kind: ChannelKind::Int,
        min: 0.0,
        max: Some(1.0),
        label: "Parada de emergência",
        unit: "status",
        area: "Quadro elétrico principal",
        category: "Safety",
        safe_min: None,
        safe_max: None,
        set: |r, v| r.e_stop_button = v.as_i32(),
        get: |r| r.e_stop_button as f64,
    },
    ChannelSpec {
        key: "Coolant_Valve",
        kind: ChannelKind::Int,
        min: 0.0,
        max: None,
        label: "Válvula de refrigeração",
        unit: "%",
        area: "Refrigeração do forno",
        category: "Control",
        safe_min: None,
        safe_max: None,
        set: |r, v| r.coolant_valve = v.as_i32(),
        get: |r| r.coolant_valve as f64,
    },
];

/// Busca um canal pela chave do firmware.
pub fn lookup(key: &str) -> Option<&'static ChannelSpec> {
    CHANNELS.iter().find(|c| c.key == key)
}

/// Catálogo completo para o endpoint de localizações.
pub fn catalog() -> Vec<ChannelInfo> {
    CHANNELS.iter().map(ChannelSpec::info).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_is_unique() {
        for (i, a) in CHANNELS.iter().enumerate() {
            for b in &CHANNELS[i + 1..] {
                assert_ne!(a.key, b.key);
            }
        }
    }

    #[test]
    fn setter_and_getter_agree_for_every_channel() {
        for spec in &CHANNELS {
            let mut reading = Reading::default();
            let value = match spec.kind {
                ChannelKind::Float => ChannelValue::Float(12.5),
                ChannelKind::Int => ChannelValue::Int(7),
            };
            spec.set(&mut reading, value);
            assert_eq!(spec.get(&reading), value.as_f64(), "canal {}", spec.key);
        }
    }

    #[test]
    fn int_channels_reject_decimals() {
        let spec = lookup("Gas_CO").unwrap();
        assert_eq!(spec.parse("61"), Some(ChannelValue::Int(61)));
        assert_eq!(spec.parse("61.5"), None);
        assert_eq!(spec.parse("abc"), None);
    }

    #[test]
    fn float_channels_use_invariant_decimal_point() {
        let spec = lookup("Furnace_Temp").unwrap();
        assert_eq!(spec.parse("892.00"), Some(ChannelValue::Float(892.0)));
        assert_eq!(spec.parse("892,00"), None);
        assert_eq!(spec.parse("NaN"), None);
        assert_eq!(spec.parse("inf"), None);
    }

    #[test]
    fn binary_flags_have_zero_one_range() {
        let spec = lookup("Flame_Status").unwrap();
        assert!(spec.in_range(0.0));
        assert!(spec.in_range(1.0));
        assert!(!spec.in_range(2.0));
        assert!(!spec.in_range(-1.0));
    }

    #[test]
    fn unbounded_channels_only_reject_negatives() {
        let spec = lookup("Water_Leak").unwrap();
        assert!(spec.in_range(1_000_000.0));
        assert!(!spec.in_range(-1.0));
    }

    #[test]
    fn catalog_lists_all_channels_in_order() {
        let catalog = catalog();
        assert_eq!(catalog.len(), CHANNELS.len());
        assert_eq!(catalog[0].key, "Furnace_Temp");
        assert_eq!(catalog[15].key, "Coolant_Valve");
    }
}
