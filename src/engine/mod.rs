pub mod bridge;
pub mod handshake;

#[cfg(test)]
pub mod fake;

use serde::Deserialize;
use thiserror::Error;

/// Falha numa chamada ao engine depois do handshake.
///
/// A classificação em código de resposta (400/401) é do pipeline: aqui só
/// importa distinguir transporte quebrado de falha reportada pelo engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine connection closed")]
    Disconnected,
    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed engine frame: {0}")]
    Protocol(String),
    #[error("engine fault ({kind}): {message}")]
    Fault { kind: String, message: String },
}

/// Capacidades opcionais que um documento carregado pode reportar.
///
/// Ausência não é erro: cada passo de refresh é pulado em silêncio quando
/// o documento não expõe a capacidade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CalculateAll,
    UpdateLinks,
    DocumentIndexes,
}
