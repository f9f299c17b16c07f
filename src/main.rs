use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

mod engine;
mod model;
mod parsers;
mod protocol;
mod services;

use engine::handshake::{self, HandshakeError, RetryPolicy};
use model::outcome::CODE_READY;
use protocol::{LoopEnd, Worker};

/// Worker de conversão de documentos: fala com o engine de escritório
/// por um pipe local e atende o host por stdin/stdout, uma requisição
/// por linha.
#[derive(Parser, Debug)]
#[command(name = "docbridge-core", version)]
struct Args {
    /// Nome do pipe local onde o engine escuta
    #[arg(short, long)]
    pipe: String,

    /// Diretório onde os sockets de pipe são criados
    #[arg(long, default_value = "/tmp")]
    socket_dir: PathBuf,

    /// Modo debug: responde sucesso em JSON com as imagens capturadas
    /// no export e reconhece linha vazia como ping
    #[arg(long)]
    debug: bool,
}

// Códigos de saída reservados; o host distingue cada um para decidir
// entre reiniciar o engine e desistir do job.
const EXIT_RETRIES_EXHAUSTED: u8 = 253;
const EXIT_OPEN_FAILURE_LIMIT: u8 = 254;
const EXIT_NO_CONTEXT: u8 = 255;

extern "C" fn handle_sigint(_: libc::c_int) {
    // Interrupção é fim normal, como EOF.
    unsafe { libc::_exit(0) }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // stdout é canal de protocolo; todo log vai para stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
    }

    let endpoint = handshake::socket_path(&args.socket_dir, &args.pipe);
    info!(pipe = %args.pipe, endpoint = %endpoint.display(), "connecting to engine");

    let bridge = match handshake::connect(&endpoint, &RetryPolicy::default()) {
        Ok(bridge) => bridge,
        Err(HandshakeError::RetriesExhausted { attempts }) => {
            error!(attempts, "engine endpoint never became available");
            return ExitCode::from(EXIT_RETRIES_EXHAUSTED);
        }
        Err(HandshakeError::NoContext) => {
            error!("engine resolved no usable service context");
            return ExitCode::from(EXIT_NO_CONTEXT);
        }
        Err(err) => {
            error!(error = %err, "handshake failed");
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    if protocol::send(&mut stdout, CODE_READY).is_err() {
        return ExitCode::FAILURE;
    }
    info!("ready, listening for conversion requests");

    let mut worker = Worker::new(bridge, args.debug);
    let stdin = io::stdin();
    match worker.listen(stdin.lock(), &mut stdout) {
        Ok(LoopEnd::Eof) => ExitCode::SUCCESS,
        Ok(LoopEnd::OpenFailureLimit) => {
            error!(
                max = protocol::MAX_CONSECUTIVE_OPEN_FAILURES,
                "too many consecutive open failures, giving up"
            );
            ExitCode::from(EXIT_OPEN_FAILURE_LIMIT)
        }
        Err(err) => {
            error!(error = %err, "stdio failure");
            ExitCode::FAILURE
        }
    }
}
