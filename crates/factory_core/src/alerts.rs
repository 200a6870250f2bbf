//! Sistema de alarmes – regras de threshold sobre uma [`Reading`].
//!
//! Avisos e alarmes são sempre recalculados do zero a partir dos valores
//! atuais; nada é acumulado entre chamadas.

use crate::config::AlarmThresholds;
use crate::types::Reading;
use serde::{Deserialize, Serialize};

/// Severidade de uma regra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Aviso: acende `warningActive`
    Advisory,
    /// Alarme: acende `alarmActive`
    Critical,
}

/// Um alerta disparado.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub metric: &'static str,
    pub message: &'static str,
    pub value: f64,
    pub severity: Severity,
}

struct Rule {
    metric: &'static str,
    message: &'static str,
    severity: Severity,
    value: fn(&Reading) -> f64,
    ceiling: fn(&AlarmThresholds) -> f64,
}

/// Flags binárias disparam com qualquer valor acima de zero.
fn flag(_: &AlarmThresholds) -> f64 {
    0.0
}

/// Regras na ordem em que as mensagens aparecem.
static RULES: [Rule; 11] = [
    // Alarmes críticos
    Rule {
        metric: "Flame_Status",
        message: "🔥 Incêndio detectado!",
        severity: Severity::Critical,
        value: |r| r.flame_status as f64,
        ceiling: flag,
    },
    Rule {
        metric: "Gas_Methane",
        message: "⚠️ Vazamento perigoso de gás metano!",
        severity: Severity::Critical,
        value: |r| r.gas_methane as f64,
        ceiling: |t| t.gas_methane_max,
    },
    Rule {
        metric: "Gas_CO",
        message: "☠️ Nível crítico de monóxido de carbono!",
        severity: Severity::Critical,
        value: |r| r.gas_co as f64,
        ceiling: |t| t.gas_co_max,
    },
    Rule {
        metric: "Tank_Pressure",
        message: "💥 Pressão do tanque em nível perigoso!",
        severity: Severity::Critical,
        value: |r| r.tank_pressure as f64,
        ceiling: |t| t.tank_pressure_max,
    },
    Rule {
        metric: "Furnace_Temp",
        message: "🌡️ Temperatura do forno acima do permitido!",
        severity: Severity::Critical,
        value: |r| r.furnace_temp,
        ceiling: |t| t.furnace_temp_max,
    },
    Rule {
        metric: "E_Stop_Button",
        message: "🛑 Botão de parada de emergência acionado!",
        severity: Severity::Critical,
        value: |r| r.e_stop_button as f64,
        ceiling: flag,
    },
    // Avisos
    Rule {
        metric: "Gate_Status",
        message: "🚪 Portão de entrada principal aberto",
        severity: Severity::Advisory,
        value: |r| r.gate_status as f64,
        ceiling: flag,
    },
    Rule {
        metric: "Water_Leak",
        message: "💧 Vazamento de água nas instalações",
        severity: Severity::Advisory,
        value: |r| r.water_leak as f64,
        ceiling: |t| t.water_leak_max,
    },
    Rule {
        metric: "Main_Current",
        message: "⚡ Corrente de consumo elevada",
        severity: Severity::Advisory,
        value: |r| r.main_current as f64,
        ceiling: |t| t.main_current_max,
    },
    Rule {
        metric: "Engine_Vibe",
        message: "📳 Vibração anormal do motor",
        severity: Severity::Advisory,
        value: |r| r.engine_vibe as f64,
        ceiling: |t| t.engine_vibe_max,
    },
    Rule {
        metric: "Machine_Sound",
        message: "🔊 Som anormal na linha de produção",
        severity: Severity::Advisory,
        value: |r| r.machine_sound as f64,
        ceiling: |t| t.machine_sound_max,
    },
];

/// Avalia leituras contra os thresholds configurados.
#[derive(Debug, Clone, Default)]
pub struct AlarmEngine {
    thresholds: AlarmThresholds,
}

impl AlarmEngine {
    pub fn new(thresholds: AlarmThresholds) -> Self {
        Self { thresholds }
    }

    /// Regras disparadas, na ordem da tabela.
    pub fn fired(&self, reading: &Reading) -> Vec<Alert> {
        RULES
            .iter()
            .filter_map(|rule| {
                let value = (rule.value)(reading);
                (value > (rule.ceiling)(&self.thresholds)).then_some(Alert {
                    metric: rule.metric,
                    message: rule.message,
                    value,
                    severity: rule.severity,
                })
            })
            .collect()
    }

    /// Recalcula listas e flags da leitura.
    pub fn evaluate(&self, mut reading: Reading) -> Reading {
        reading.active_alarms.clear();
        reading.active_warnings.clear();

        for alert in self.fired(&reading) {
            match alert.severity {
                Severity::Critical => reading.active_alarms.push(alert.message.to_string()),
                Severity::Advisory => reading.active_warnings.push(alert.message.to_string()),
            }
        }

        reading.alarm_active = !reading.active_alarms.is_empty();
        reading.warning_active = !reading.active_warnings.is_empty();
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RecordDecoder;
    use crate::types::Frame;

    const HEADER: &str = "Smart Factory Monitoring System - AUTOMATIC MODE - ONLINE";
    const SAMPLE: &str = "Furnace_Temp:892.00,Env_Humid:45.50,Light_Level:210,Gas_Methane:15,Gas_CO:61,Machine_Sound:512,Tank_Pressure:72,Main_Current:123,Engine_Vibe:25,Input_Voltage:230,Conveyor_Dist:150,Water_Leak:100,Flame_Status:0,Gate_Status:0,E_Stop_Button:0,Coolant_Valve:90";

    fn decoded(data: &str) -> Reading {
        RecordDecoder::new()
            .decode(&Frame::new(HEADER, data))
            .unwrap()
            .reading
    }

    #[test]
    fn no_alarms_for_normal_frame() {
        let r = AlarmEngine::default().evaluate(decoded(SAMPLE));
        assert!(!r.alarm_active);
        assert!(!r.warning_active);
        assert!(r.active_alarms.is_empty());
        assert!(r.active_warnings.is_empty());
    }

    #[test]
    fn flame_raises_only_flame_alarm() {
        let data = SAMPLE.replace("Flame_Status:0", "Flame_Status:1");
        let r = AlarmEngine::default().evaluate(decoded(&data));
        assert!(r.alarm_active);
        assert!(!r.warning_active);
        assert_eq!(r.active_alarms, vec!["🔥 Incêndio detectado!".to_string()]);
    }

    #[test]
    fn evaluate_is_idempotent() {
        let engine = AlarmEngine::default();
        let data = SAMPLE
            .replace("Gate_Status:0", "Gate_Status:1")
            .replace("Gas_CO:61", "Gas_CO:900");
        let once = engine.evaluate(decoded(&data));
        let twice = engine.evaluate(once.clone());
        assert_eq!(once.active_alarms, twice.active_alarms);
        assert_eq!(once.active_warnings, twice.active_warnings);
        assert_eq!(once.alarm_active, twice.alarm_active);
        assert_eq!(once.warning_active, twice.warning_active);
    }

    #[test]
    fn stale_lists_are_replaced() {
        let stale = Reading {
            active_alarms: vec!["antigo".into()],
            alarm_active: true,
            warning_active: true,
            ..Default::default()
        };
        let r = AlarmEngine::default().evaluate(stale);
        assert!(r.active_alarms.is_empty());
        assert!(!r.alarm_active);
        assert!(!r.warning_active);
    }

    #[test]
    fn multiple_rules_fire_in_table_order() {
        let r = Reading {
            e_stop_button: 1,
            flame_status: 1,
            machine_sound: 700,
            gate_status: 1,
            ..Default::default()
        };
        let fired = AlarmEngine::default().fired(&r);
        let metrics: Vec<_> = fired.iter().map(|a| a.metric).collect();
        assert_eq!(
            metrics,
            vec!["Flame_Status", "E_Stop_Button", "Gate_Status", "Machine_Sound"]
        );
        assert_eq!(fired[3].value, 700.0);
    }

    #[test]
    fn ceilings_come_from_configuration() {
        let thresholds = AlarmThresholds {
            furnace_temp_max: 500.0,
            ..Default::default()
        };
        let r = AlarmEngine::new(thresholds).evaluate(decoded(SAMPLE));
        assert!(r.alarm_active);
        assert_eq!(r.active_alarms.len(), 1);
    }

    #[test]
    fn value_equal_to_ceiling_does_not_fire() {
        let r = Reading {
            main_current: 150,
            ..Default::default()
        };
        assert!(AlarmEngine::default().fired(&r).is_empty());
    }
}
