//! Remontagem de frames a partir do stream serial.
//!
//! O meio não tem delimitador nem prefixo de tamanho confiável. Um frame só
//! está completo quando uma linha com [`HEADER_MARKER`] é seguida
//! imediatamente por uma linha com [`DATA_MARKER`]:
//!
//! ```text
//! Smart Factory Monitoring System - AUTOMATIC MODE - ONLINE\r\n
//! Furnace_Temp:892.00,Env_Humid:45.50,...,Coolant_Valve:90\r\n
//! ```
//!
//! O buffer guarda bytes; as linhas só viram texto quando completas, então um
//! caractere multibyte cortado entre dois chunks sobrevive.

use crate::types::Frame;
use tracing::{debug, warn};

/// Marcador da linha de cabeçalho.
pub const HEADER_MARKER: &str = "Smart Factory Monitoring System";

/// Marcador da linha de dados.
pub const DATA_MARKER: &str = "Furnace_Temp:";

/// Teto do buffer sem produzir frame. Acima disso o buffer é descartado.
pub const MAX_BUFFER_LEN: usize = 1000;

/// Converte chunks arbitrários em [`Frame`]s.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    anomalies: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acrescenta um chunk e retorna os frames completados por ele.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;

        loop {
            let rest = &self.buffer[consumed..];
            let Some(first_end) = find_newline(rest) else {
                break;
            };
            let first = clean_line(&rest[..first_end]);

            if !first.contains(HEADER_MARKER) {
                self.discard(&first);
                consumed += first_end + 1;
                continue;
            }

            // Cabeçalho completo: a linha de dados precisa estar completa também
            let after = &rest[first_end + 1..];
            let Some(second_end) = find_newline(after) else {
                break;
            };
            let second = clean_line(&after[..second_end]);

            if second.contains(DATA_MARKER) {
                consumed += first_end + 1 + second_end + 1;
                frames.push(Frame::new(first, second));
            } else {
                // Só o cabeçalho sai; a linha seguinte ainda pode ser um cabeçalho
                self.discard(&first);
                consumed += first_end + 1;
            }
        }

        self.buffer.drain(..consumed);

        if self.buffer.len() > MAX_BUFFER_LEN {
            warn!(
                "Buffer serial excedeu {MAX_BUFFER_LEN} bytes sem frame ({} bytes), descartando",
                self.buffer.len()
            );
            self.buffer.clear();
            self.anomalies += 1;
        }

        frames
    }

    /// Bytes ainda aguardando completar uma linha ou um par.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total de anomalias de framing (linhas de ruído + estouros de buffer).
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// Descarta o conteúdo pendente (ex: após reconexão do dispositivo).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn discard(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.anomalies += 1;
        debug!("Linha fora de frame descartada: {line:?}");
    }
}

fn find_newline(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n')
}

fn clean_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Smart Factory Monitoring System - AUTOMATIC MODE - ONLINE";
    const DATA: &str = "Furnace_Temp:892.00,Env_Humid:45.50,Light_Level:210";

    fn framed(header: &str, data: &str) -> String {
        format!("{header}\r\n{data}\r\n")
    }

    fn sample_stream() -> Vec<u8> {
        let mut s = String::new();
        s.push_str("garbage before\n");
        s.push_str(&framed(HEADER, DATA));
        s.push_str("#noise#\n");
        s.push_str(&framed(
            "Smart Factory Monitoring System - MANUAL MODE - OFFLINE",
            "Furnace_Temp:10.00,Gas_CO:5",
        ));
        s.push_str(&framed(HEADER, "Furnace_Temp:1.50,Gas_Methane:2"));
        s.into_bytes()
    }

    fn feed_in_chunks(stream: &[u8], sizes: &[usize]) -> Vec<Frame> {
        let mut asm = FrameAssembler::new();
        let mut frames = Vec::new();
        let mut pos = 0;
        let mut i = 0;
        while pos < stream.len() {
            let size = sizes[i % sizes.len()].max(1);
            let end = (pos + size).min(stream.len());
            frames.extend(asm.feed(&stream[pos..end]));
            pos = end;
            i += 1;
        }
        frames
    }

    #[test]
    fn single_frame_in_one_chunk() {
        let mut asm = FrameAssembler::new();
        let frames = asm.feed(framed(HEADER, DATA).as_bytes());
        assert_eq!(frames, vec![Frame::new(HEADER, DATA)]);
        assert_eq!(asm.buffered_len(), 0);
    }

    #[test]
    fn empty_feed_is_noop() {
        let mut asm = FrameAssembler::new();
        asm.feed(b"partial");
        assert!(asm.feed(b"").is_empty());
        assert_eq!(asm.buffered_len(), 7);
    }

    #[test]
    fn output_is_independent_of_chunking() {
        let stream = sample_stream();
        let whole = feed_in_chunks(&stream, &[stream.len()]);
        assert_eq!(whole.len(), 3);

        for split in 1..stream.len() {
            let mut asm = FrameAssembler::new();
            let mut frames = asm.feed(&stream[..split]);
            frames.extend(asm.feed(&stream[split..]));
            assert_eq!(frames, whole, "split em {split}");
        }

        assert_eq!(feed_in_chunks(&stream, &[1]), whole);
        assert_eq!(feed_in_chunks(&stream, &[3, 7, 1, 64]), whole);
    }

    #[test]
    fn noise_between_frames_is_counted_not_fatal() {
        let mut asm = FrameAssembler::new();
        let frames = asm.feed(&sample_stream());
        assert_eq!(frames.len(), 3);
        assert_eq!(asm.anomalies(), 2);
    }

    #[test]
    fn header_waits_for_complete_data_line() {
        let mut asm = FrameAssembler::new();
        assert!(asm.feed(format!("{HEADER}\n").as_bytes()).is_empty());
        assert!(asm.feed(b"Furnace_Temp:1").is_empty());
        let frames = asm.feed(b".00\n");
        assert_eq!(frames, vec![Frame::new(HEADER, "Furnace_Temp:1.00")]);
        assert_eq!(asm.buffered_len(), 0);
    }

    #[test]
    fn header_followed_by_other_line_is_dropped() {
        let mut asm = FrameAssembler::new();
        let input = format!("{HEADER}\nnot data\n{HEADER}\n{DATA}\n");
        let frames = asm.feed(input.as_bytes());
        assert_eq!(frames, vec![Frame::new(HEADER, DATA)]);
        assert_eq!(asm.anomalies(), 2);
    }

    #[test]
    fn repeated_header_keeps_the_latest() {
        let mut asm = FrameAssembler::new();
        let input = format!("{HEADER} A\n{HEADER} B\n{DATA}\n");
        let frames = asm.feed(input.as_bytes());
        assert_eq!(frames.len(), 1);
        assert!(frames[0].header.ends_with('B'));
    }

    #[test]
    fn trailing_partial_line_is_retained() {
        let mut asm = FrameAssembler::new();
        let input = format!("{}Smart Fac", framed(HEADER, DATA));
        assert_eq!(asm.feed(input.as_bytes()).len(), 1);
        assert_eq!(asm.buffered_len(), "Smart Fac".len());
    }

    #[test]
    fn pure_noise_over_ceiling_clears_buffer() {
        let mut asm = FrameAssembler::new();
        let noise = vec![b'x'; MAX_BUFFER_LEN + 1];
        assert!(asm.feed(&noise).is_empty());
        assert_eq!(asm.buffered_len(), 0);
        assert_eq!(asm.anomalies(), 1);
    }

    #[test]
    fn noise_in_small_chunks_never_exceeds_ceiling() {
        let mut asm = FrameAssembler::new();
        for _ in 0..50 {
            asm.feed(&[b'z'; 100]);
            assert!(asm.buffered_len() <= MAX_BUFFER_LEN);
        }
        // Depois de se auto-curar volta a montar frames normalmente
        let tail = format!("\n{}", framed(HEADER, DATA));
        assert_eq!(asm.feed(tail.as_bytes()).len(), 1);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let header = "Smart Factory Monitoring System - Forno 25°C - AUTOMATIC MODE";
        let stream = framed(header, DATA).into_bytes();
        let degree = stream.iter().position(|&b| b == 0xC2).unwrap();
        let mut asm = FrameAssembler::new();
        let mut frames = asm.feed(&stream[..degree + 1]);
        frames.extend(asm.feed(&stream[degree + 1..]));
        assert_eq!(frames, vec![Frame::new(header, DATA)]);
    }

    #[test]
    fn crlf_is_stripped() {
        let mut asm = FrameAssembler::new();
        let frames = asm.feed(framed(HEADER, DATA).as_bytes());
        assert!(!frames[0].header.ends_with('\r'));
        assert!(!frames[0].data.ends_with('\r'));
    }
}
