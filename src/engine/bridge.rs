use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

use serde_json::{json, Value};
use tracing::debug;

use super::{Capability, EngineError};

/// Conexão viva com o service manager do engine.
///
/// Criada uma única vez pelo handshake e reutilizada por todas as
/// requisições; o loop é single-thread, então nunca há duas chamadas em
/// voo. Uma ponte quebrada aparece como erro por requisição, nunca é
/// revalidada aqui.
#[derive(Debug)]
pub struct EngineBridge {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
}

/// Documento carregado no engine, exclusivo da requisição atual.
///
/// Guarda o id remoto e o conjunto de capacidades reportado no load.
/// Deve ser liberado (dispose + close) em todo caminho de saída do
/// pipeline; `release` é idempotente.
#[derive(Debug)]
pub struct DocumentHandle {
    id: u64,
    capabilities: HashSet<Capability>,
    released: bool,
}

impl DocumentHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

impl EngineBridge {
    pub(crate) fn new(stream: UnixStream) -> Result<Self, EngineError> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(EngineBridge { stream, reader })
    }

    /// Um frame de requisição, uma linha de resposta.
    fn call(&mut self, request: Value) -> Result<Value, EngineError> {
        let mut frame = request.to_string();
        frame.push('\n');
        self.stream.write_all(frame.as_bytes())?;
        self.stream.flush()?;

        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            return Err(EngineError::Disconnected);
        }

        let reply: Value = serde_json::from_str(line.trim_end())
            .map_err(|err| EngineError::Protocol(err.to_string()))?;

        if let Some(fault) = reply.get("err") {
            let kind = fault
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = fault
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(EngineError::Fault { kind, message });
        }

        match reply.get("ok") {
            Some(ok) => Ok(ok.clone()),
            None => Err(EngineError::Protocol("frame without ok/err".to_string())),
        }
    }

    pub(crate) fn resolve(&mut self) -> Result<Option<String>, EngineError> {
        let reply = self.call(json!({ "op": "resolve" }))?;
        Ok(reply
            .get("context")
            .and_then(Value::as_str)
            .filter(|context| !context.is_empty())
            .map(str::to_string))
    }

    /// Abre o documento escondido, read-only e com atualização silenciosa
    /// (sem diálogos interativos de update de link).
    ///
    /// `Ok(None)` cobre o caso do engine aceitar a chamada e mesmo assim
    /// não produzir documento.
    pub fn load_document(&mut self, url: &str) -> Result<Option<DocumentHandle>, EngineError> {
        let reply = self.call(json!({
            "op": "load",
            "url": url,
            "hidden": true,
            "read_only": true,
            "update_mode": "quiet",
        }))?;

        let id = match reply.get("doc").and_then(Value::as_u64) {
            Some(id) => id,
            None => return Ok(None),
        };

        // Capacidades desconhecidas são ignoradas: o engine pode crescer.
        let capabilities = reply
            .get("capabilities")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| serde_json::from_value::<Capability>(value.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        debug!(doc = id, ?capabilities, "document loaded");
        Ok(Some(DocumentHandle {
            id,
            capabilities,
            released: false,
        }))
    }

    pub fn calculate_all(&mut self, document: &DocumentHandle) -> Result<(), EngineError> {
        self.call(json!({ "op": "calculate_all", "doc": document.id }))
            .map(|_| ())
    }

    pub fn update_links(&mut self, document: &DocumentHandle) -> Result<(), EngineError> {
        self.call(json!({ "op": "update_links", "doc": document.id }))
            .map(|_| ())
    }

    pub fn refresh(&mut self, document: &DocumentHandle) -> Result<(), EngineError> {
        self.call(json!({ "op": "refresh", "doc": document.id }))
            .map(|_| ())
    }

    pub fn index_count(&mut self, document: &DocumentHandle) -> Result<u64, EngineError> {
        let reply = self.call(json!({ "op": "index_count", "doc": document.id }))?;
        reply
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::Protocol("index_count without count".to_string()))
    }

    pub fn update_index(&mut self, document: &DocumentHandle, index: u64) -> Result<(), EngineError> {
        self.call(json!({ "op": "update_index", "doc": document.id, "index": index }))
            .map(|_| ())
    }

    /// Exporta com overwrite sempre ligado; `FilterOptions` só entra no
    /// frame quando veio não-vazio na requisição.
    pub fn store_to_url(
        &mut self,
        document: &DocumentHandle,
        url: &str,
        filter: &str,
        filter_options: Option<&str>,
    ) -> Result<(), EngineError> {
        let mut frame = json!({
            "op": "store",
            "doc": document.id,
            "url": url,
            "filter": filter,
            "overwrite": true,
        });
        if let Some(options) = filter_options {
            frame["filter_options"] = json!(options);
        }
        self.call(frame).map(|_| ())
    }

    /// Dispose + close, uma vez só por documento.
    pub fn release(&mut self, document: &mut DocumentHandle) -> Result<(), EngineError> {
        if document.released {
            return Ok(());
        }
        document.released = true;
        self.call(json!({ "op": "dispose", "doc": document.id }))?;
        self.call(json!({ "op": "close", "doc": document.id, "deliver_ownership": true }))?;
        Ok(())
    }
}
