use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

/// Códigos do protocolo de resposta. O host mapeia cada código para um
/// erro conhecido; qualquer outra coisa é tratada como resposta JSON.
pub const CODE_OK: &str = "200";
pub const CODE_READY: &str = "204";
pub const CODE_OPEN_FAILED: &str = "400";
pub const CODE_EXPORT_FAILED: &str = "401";
pub const CODE_GIVE_UP: &str = "999";

/// Imagem auxiliar gerada pelo engine durante o export, já codificada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub data: String,
    pub mime: String,
}

/// Resultado terminal de uma requisição.
///
/// Falhas de handshake não aparecem aqui: acontecem antes de qualquer
/// requisição ser atendida e derrubam o processo.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Success {
        /// Presente só em modo debug; pode ser vazio.
        images: Option<BTreeMap<String, ImageRecord>>,
    },
    ParseError,
    LoadError,
    ExportError,
}

impl Outcome {
    /// Codifica o resultado no formato de fio.
    ///
    /// Em modo debug o sucesso vira um objeto JSON com as imagens
    /// capturadas; nos outros casos a resposta é o código cru.
    pub fn wire(&self, debug_mode: bool) -> String {
        match self {
            Outcome::Success { images } => {
                if debug_mode {
                    let images = images.clone().unwrap_or_default();
                    json!({ "status": CODE_OK, "images": images }).to_string()
                } else {
                    CODE_OK.to_string()
                }
            }
            Outcome::ParseError | Outcome::LoadError => CODE_OPEN_FAILED.to_string(),
            Outcome::ExportError => CODE_EXPORT_FAILED.to_string(),
        }
    }
}
