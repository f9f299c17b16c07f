use std::io;

use tracing::{debug, warn};
use url::Url;

use crate::engine::bridge::{DocumentHandle, EngineBridge};
use crate::engine::{Capability, EngineError};
use crate::model::outcome::Outcome;
use crate::model::request::ConversionRequest;
use crate::services::artifacts;

/// Executa o ciclo de vida de uma conversão: load → refresh → export →
/// dispose. Todo caminho de saída libera o documento antes de devolver o
/// resultado; o contador de falhas consecutivas fica com o chamador.
pub fn convert(
    bridge: &mut EngineBridge,
    request: &ConversionRequest,
    capture_artifacts: bool,
) -> Outcome {
    let (input_url, output_url) = match (file_url(&request.input), file_url(&request.output)) {
        (Ok(input), Ok(output)) => (input, output),
        (Err(err), _) | (_, Err(err)) => {
            warn!(error = %err, "failed to resolve request paths");
            return Outcome::LoadError;
        }
    };

    let mut document = match bridge.load_document(input_url.as_str()) {
        Ok(Some(document)) => document,
        Ok(None) => {
            debug!(input = %request.input, "engine produced no document");
            return Outcome::LoadError;
        }
        Err(err) => {
            debug!(input = %request.input, error = %err, "failed to open document");
            return Outcome::LoadError;
        }
    };

    refresh_derived_content(bridge, &document);

    // Fotografa o diretório antes do export: o engine pode soltar
    // imagens auxiliares lá e só o diff diz o que é novo.
    let before = capture_artifacts.then(|| artifacts::snapshot(&request.output));

    let filter_options = request
        .format_options
        .as_deref()
        .filter(|options| !options.is_empty());

    if let Err(err) = bridge.store_to_url(
        &document,
        output_url.as_str(),
        &request.format,
        filter_options,
    ) {
        debug!(output = %request.output, format = %request.format, error = %err, "export failed");
        release(bridge, &mut document);
        return Outcome::ExportError;
    }

    let images = before.map(|before| artifacts::harvest(&request.output, &before));

    release(bridge, &mut document);
    Outcome::Success { images }
}

/// Passos de atualização de conteúdo derivado, todos best-effort:
/// capacidade ausente é pulada em silêncio; falha num passo suportado é
/// logada e engolida, a conversão continua.
fn refresh_derived_content(bridge: &mut EngineBridge, document: &DocumentHandle) {
    if document.supports(Capability::CalculateAll) {
        if let Err(err) = bridge.calculate_all(document) {
            warn!(error = %err, "calculate_all failed, skipping");
        }
    }

    if document.supports(Capability::UpdateLinks) {
        if let Err(err) = bridge.update_links(document) {
            warn!(error = %err, "update_links failed, skipping");
        }
    }

    if document.supports(Capability::DocumentIndexes) {
        if let Err(err) = update_indexes(bridge, document) {
            warn!(error = %err, "index refresh failed, skipping");
        }
    }
}

/// Índices (sumários etc.) são refrescados um a um, na ordem da coleção.
fn update_indexes(bridge: &mut EngineBridge, document: &DocumentHandle) -> Result<(), EngineError> {
    bridge.refresh(document)?;
    let count = bridge.index_count(document)?;
    for index in 0..count {
        bridge.update_index(document, index)?;
    }
    Ok(())
}

fn release(bridge: &mut EngineBridge, document: &mut DocumentHandle) {
    if let Err(err) = bridge.release(document) {
        // Não muda o código de resposta: o resultado da conversão já
        // está decidido quando chegamos aqui.
        warn!(doc = document.id(), error = %err, "failed to release document");
    }
}

fn file_url(path: &str) -> io::Result<Url> {
    let absolute = std::env::current_dir()?.join(path);
    Url::from_file_path(&absolute)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("unusable path: {path}")))
}
