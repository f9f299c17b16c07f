//! Engine de mentira para os testes: serve o contrato de fio numa
//! thread própria, com comportamento roteirizável por requisição.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};

/// O que o próximo `load` deve responder. Script vazio → sempre `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReply {
    Ok,
    Null,
    Fail,
}

pub struct FakeEngineState {
    pub context: String,
    pub capabilities: Vec<String>,
    pub load_script: Vec<LoadReply>,
    pub fail_store: bool,
    pub fail_calculate: bool,
    pub index_count: u64,
    /// Escreve de verdade o arquivo de saída (e os extras) no store.
    pub create_on_store: bool,
    pub extra_store_files: Vec<(String, Vec<u8>)>,
    pub open_docs: HashSet<u64>,
    pub next_doc: u64,
    pub calls: Vec<String>,
    /// Frames de `store` como chegaram, para inspecionar nos testes.
    pub store_frames: Vec<Value>,
}

impl Default for FakeEngineState {
    fn default() -> Self {
        FakeEngineState {
            context: "StarOffice.ComponentContext".to_string(),
            capabilities: Vec::new(),
            load_script: Vec::new(),
            fail_store: false,
            fail_calculate: false,
            index_count: 0,
            create_on_store: false,
            extra_store_files: Vec::new(),
            open_docs: HashSet::new(),
            next_doc: 0,
            calls: Vec::new(),
            store_frames: Vec::new(),
        }
    }
}

pub struct FakeEngine {
    pub state: Arc<Mutex<FakeEngineState>>,
    pub endpoint: PathBuf,
}

impl FakeEngine {
    /// Escuta no caminho dado e serve conexões numa thread desanexada.
    /// A thread sobrevive ao drop do handle; morre com o processo de teste.
    pub fn spawn(endpoint: &Path) -> FakeEngine {
        let listener = UnixListener::bind(endpoint).expect("bind fake engine socket");
        let state = Arc::new(Mutex::new(FakeEngineState::default()));

        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => serve(stream, &shared),
                    Err(_) => break,
                }
            }
        });

        FakeEngine {
            state,
            endpoint: endpoint.to_path_buf(),
        }
    }
}

fn serve(stream: UnixStream, state: &Arc<Mutex<FakeEngineState>>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone fake engine stream"));
    let mut writer = stream;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let request: Value = match serde_json::from_str(line.trim_end()) {
            Ok(value) => value,
            Err(_) => return,
        };

        let mut frame = handle(&request, state).to_string();
        frame.push('\n');
        if writer.write_all(frame.as_bytes()).is_err() {
            return;
        }
    }
}

fn handle(request: &Value, state: &Arc<Mutex<FakeEngineState>>) -> Value {
    let mut state = state.lock().expect("fake engine state");
    let op = request["op"].as_str().unwrap_or("");
    state.calls.push(op.to_string());

    match op {
        "resolve" => {
            if state.context.is_empty() {
                json!({ "ok": { "context": null } })
            } else {
                json!({ "ok": { "context": state.context } })
            }
        }
        "load" => {
            let reply = if state.load_script.is_empty() {
                LoadReply::Ok
            } else {
                state.load_script.remove(0)
            };
            match reply {
                LoadReply::Fail => {
                    json!({ "err": { "kind": "cannot_load", "message": "document is unreadable" } })
                }
                LoadReply::Null => json!({ "ok": { "doc": null } }),
                LoadReply::Ok => {
                    state.next_doc += 1;
                    let id = state.next_doc;
                    state.open_docs.insert(id);
                    json!({ "ok": { "doc": id, "capabilities": state.capabilities } })
                }
            }
        }
        "calculate_all" => {
            if state.fail_calculate {
                json!({ "err": { "kind": "runtime", "message": "recalculation failed" } })
            } else {
                json!({ "ok": {} })
            }
        }
        "update_links" | "refresh" | "update_index" => json!({ "ok": {} }),
        "index_count" => json!({ "ok": { "count": state.index_count } }),
        "store" => {
            state.store_frames.push(request.clone());
            if state.fail_store {
                json!({ "err": { "kind": "io", "message": "no filter for requested format" } })
            } else {
                if state.create_on_store {
                    write_store_files(request, &state);
                }
                json!({ "ok": {} })
            }
        }
        "dispose" => json!({ "ok": {} }),
        "close" => {
            if let Some(id) = request["doc"].as_u64() {
                state.open_docs.remove(&id);
            }
            json!({ "ok": {} })
        }
        _ => json!({ "err": { "kind": "protocol", "message": format!("unknown op {op}") } }),
    }
}

fn write_store_files(request: &Value, state: &FakeEngineState) {
    let Some(path) = request["url"]
        .as_str()
        .and_then(|raw| url::Url::parse(raw).ok())
        .and_then(|parsed| parsed.to_file_path().ok())
    else {
        return;
    };

    std::fs::write(&path, b"converted").expect("write fake output file");
    if let Some(dir) = path.parent() {
        for (name, bytes) in &state.extra_store_files {
            std::fs::write(dir.join(name), bytes).expect("write fake store side-effect");
        }
    }
}
