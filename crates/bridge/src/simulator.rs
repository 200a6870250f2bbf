//! Telemetria sintética para quando o dispositivo não está disponível.
//!
//! Valores oscilam em torno de uma linha de base com jitter limitado; os
//! eventos binários (chama, portão, parada de emergência) são raros.

use factory_core::{DecodeError, Frame, Mode, Reading, SystemStatus, render_frame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;

// ──────────────────────────────────────────────
// Cenários fixos para testar dashboards
// ──────────────────────────────────────────────

const NORMAL_FRAME: &str = "Smart Factory Monitoring System - AUTOMATIC MODE - ONLINE\n\
    Furnace_Temp:892.00,Env_Humid:45.50,Light_Level:210,Gas_Methane:15,Gas_CO:61,\
    Machine_Sound:512,Tank_Pressure:72,Main_Current:123,Engine_Vibe:25,Input_Voltage:230,\
    Conveyor_Dist:150,Water_Leak:100,Flame_Status:0,Gate_Status:0,E_Stop_Button:0,Coolant_Valve:90";

const WARNING_FRAME: &str = "Smart Factory Monitoring System - AUTOMATIC MODE - ONLINE\n\
    Furnace_Temp:950.00,Env_Humid:85.00,Light_Level:50,Gas_Methane:250,Gas_CO:85,\
    Machine_Sound:650,Tank_Pressure:85,Main_Current:160,Engine_Vibe:60,Input_Voltage:200,\
    Conveyor_Dist:0,Water_Leak:450,Flame_Status:0,Gate_Status:1,E_Stop_Button:0,Coolant_Valve:95";

const EMERGENCY_FRAME: &str = "Smart Factory Monitoring System - AUTOMATIC MODE - ONLINE\n\
    Furnace_Temp:1050.00,Env_Humid:90.00,Light_Level:30,Gas_Methane:400,Gas_CO:120,\
    Machine_Sound:700,Tank_Pressure:95,Main_Current:180,Engine_Vibe:80,Input_Voltage:180,\
    Conveyor_Dist:0,Water_Leak:500,Flame_Status:1,Gate_Status:1,E_Stop_Button:1,Coolant_Valve:100";

/// Frame pré-definido injetado pela API de teste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Normal,
    Warning,
    Emergency,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Normal, Scenario::Warning, Scenario::Emergency];

    pub fn frame(self) -> Result<Frame, DecodeError> {
        let text = match self {
            Scenario::Normal => NORMAL_FRAME,
            Scenario::Warning => WARNING_FRAME,
            Scenario::Emergency => EMERGENCY_FRAME,
        };
        Frame::from_raw(text)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Normal => "normal",
            Scenario::Warning => "aviso",
            Scenario::Emergency => "emergência",
        };
        f.write_str(name)
    }
}

// ──────────────────────────────────────────────
// Gerador aleatório
// ──────────────────────────────────────────────

pub struct Simulator {
    rng: StdRng,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn jitter(&mut self, base: i32, low: i32, high: i32) -> i32 {
        (base + self.rng.random_range(low..high)).max(0)
    }

    pub fn next_reading(&mut self) -> Reading {
        let furnace_temp = 850.0 + self.rng.random_range(-50.0..50.0);
        let env_humid = (50.0 + self.rng.random_range(-10.0..10.0_f64)).clamp(0.0, 100.0);

        Reading {
            mode: Mode::Automatic,
            status: SystemStatus::Online,
            furnace_temp,
            env_humid,
            light_level: self.jitter(200, -100, 100),
            gas_methane: self.jitter(20, -10, 30),
            gas_co: self.jitter(50, -20, 40),
            machine_sound: self.jitter(500, -200, 300),
            tank_pressure: self.jitter(70, -20, 30).min(100),
            main_current: self.jitter(120, -40, 80),
            engine_vibe: self.jitter(20, -10, 30),
            input_voltage: self.jitter(230, -40, 40),
            conveyor_dist: self.jitter(150, -100, 100),
            water_leak: self.jitter(100, -50, 200),
            flame_status: self.rng.random_bool(0.02) as i32,
            gate_status: self.rng.random_bool(0.1) as i32,
            e_stop_button: self.rng.random_bool(0.005) as i32,
            coolant_valve: self.jitter(85, -20, 30).min(100),
            ..Default::default()
        }
    }

    /// Próximo frame sintético, no mesmo formato do dispositivo.
    pub fn next_frame(&mut self) -> Frame {
        let text = render_frame(&self.next_reading());
        match text.split_once('\n') {
            Some((header, data)) => Frame::new(header, data),
            None => Frame::new(text, ""),
        }
    }
}
