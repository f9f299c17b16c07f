use std::io;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use super::bridge::EngineBridge;
use super::EngineError;

/// Limites de uma tentativa de handshake. O supervisor deixa o engine
/// subindo em paralelo; 60 tentativas com 1s de intervalo cobrem o boot
/// mais lento que aceitamos antes de desistir.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 60,
            timeout: Duration::from_secs(60),
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("engine endpoint never became available ({attempts} attempts)")]
    RetriesExhausted { attempts: u32 },
    #[error("engine resolved no usable service context")]
    NoContext,
    #[error("handshake failed: {0}")]
    Fatal(#[source] EngineError),
}

/// Caminho do socket do pipe local, no padrão do engine:
/// `<dir>/OSL_PIPE_<uid>_<nome>`.
pub fn socket_path(dir: &Path, pipe_name: &str) -> PathBuf {
    let uid = unsafe { libc::getuid() };
    dir.join(format!("OSL_PIPE_{uid}_{pipe_name}"))
}

/// "Endpoint ainda não existe" é a única condição com retry: o socket
/// ainda não foi criado ou ninguém está escutando nele.
fn endpoint_not_ready(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

/// Conecta e resolve o service manager do engine, com retry limitado por
/// tentativas e por relógio de parede, o que estourar primeiro.
///
/// Qualquer falha fora de "endpoint ainda não existe" é fatal na hora.
pub fn connect(endpoint: &Path, policy: &RetryPolicy) -> Result<EngineBridge, HandshakeError> {
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match UnixStream::connect(endpoint) {
            Ok(stream) => {
                debug!(attempts, "engine endpoint reachable");
                return resolve(stream);
            }
            Err(err) if endpoint_not_ready(&err) => {
                if attempts >= policy.max_attempts || start.elapsed() >= policy.timeout {
                    return Err(HandshakeError::RetriesExhausted { attempts });
                }
                thread::sleep(policy.delay);
            }
            Err(err) => return Err(HandshakeError::Fatal(EngineError::Io(err))),
        }
    }
}

fn resolve(stream: UnixStream) -> Result<EngineBridge, HandshakeError> {
    let mut bridge = EngineBridge::new(stream).map_err(HandshakeError::Fatal)?;
    match bridge.resolve().map_err(HandshakeError::Fatal)? {
        Some(context) => {
            info!(context, "engine service manager resolved");
            Ok(bridge)
        }
        None => Err(HandshakeError::NoContext),
    }
}
