use std::io::{BufRead, Write};

use tracing::{debug, warn};

use crate::engine::bridge::EngineBridge;
use crate::model::outcome::{Outcome, CODE_GIVE_UP, CODE_READY};
use crate::parsers::request_line;
use crate::services::convert;

/// Aberturas de documento que podem falhar em sequência antes do
/// processo se entregar. Protege contra um engine travado queimando uma
/// fila inteira de requisições em silêncio.
pub const MAX_CONSECUTIVE_OPEN_FAILURES: u32 = 10;

/// Estado vivo do worker entre requisições.
///
/// A ponte é criada uma vez no startup; o contador de falhas de abertura
/// é o único estado mutável que atravessa requisições.
pub struct Worker {
    bridge: EngineBridge,
    debug_mode: bool,
    consecutive_open_failures: u32,
}

/// Por que o loop de escuta terminou.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// stdin fechou; fim normal.
    Eof,
    /// O limite de falhas consecutivas de abertura foi atingido.
    OpenFailureLimit,
}

impl Worker {
    pub fn new(bridge: EngineBridge, debug_mode: bool) -> Worker {
        Worker {
            bridge,
            debug_mode,
            consecutive_open_failures: 0,
        }
    }

    /// Loop read-eval: uma linha, uma conversão, uma resposta. Nunca há
    /// duas requisições em voo; cada resposta sai antes da próxima
    /// leitura.
    pub fn listen<R: BufRead, W: Write>(
        &mut self,
        reader: R,
        writer: &mut W,
    ) -> std::io::Result<LoopEnd> {
        for line in reader.lines() {
            let line = line?;

            if line.trim().is_empty() {
                // O host usa linha vazia como ping em modo debug.
                if self.debug_mode {
                    send(writer, CODE_READY)?;
                }
                continue;
            }

            let outcome = self.handle_line(&line);

            match outcome {
                Outcome::LoadError => {
                    self.consecutive_open_failures += 1;
                    debug!(
                        failures = self.consecutive_open_failures,
                        max = MAX_CONSECUTIVE_OPEN_FAILURES,
                        "consecutive open failure"
                    );
                    if self.consecutive_open_failures >= MAX_CONSECUTIVE_OPEN_FAILURES {
                        if self.debug_mode {
                            send(writer, CODE_GIVE_UP)?;
                        }
                        return Ok(LoopEnd::OpenFailureLimit);
                    }
                }
                Outcome::Success { .. } | Outcome::ExportError => {
                    // Abertura funcionou: zera a sequência.
                    self.consecutive_open_failures = 0;
                }
                Outcome::ParseError => {}
            }

            send(writer, &outcome.wire(self.debug_mode))?;
        }

        Ok(LoopEnd::Eof)
    }

    fn handle_line(&mut self, line: &str) -> Outcome {
        let request = match request_line::parse(line) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "rejected request line");
                return Outcome::ParseError;
            }
        };

        debug!(
            input = %request.input,
            output = %request.output,
            format = %request.format,
            "converting"
        );
        convert::convert(&mut self.bridge, &request, self.debug_mode)
    }
}

/// Resposta crua, sem newline, flush imediato: o host lê o chunk inteiro
/// como uma resposta por requisição, em ordem.
pub fn send<W: Write>(writer: &mut W, message: &str) -> std::io::Result<()> {
    writer.write_all(message.as_bytes())?;
    writer.flush()
}
