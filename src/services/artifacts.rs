use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use tracing::warn;

use crate::model::outcome::ImageRecord;

/// Marcador que o engine usa ao nomear imagens soltas junto do export
/// HTML: `<base do output>_html_<resto>.<ext>`.
const MARKER: &str = "_html_";

/// Fotografa os nomes presentes no diretório de saída antes do export.
/// Diretório inexistente → conjunto vazio (o diff fica vazio também).
pub fn snapshot(output_path: &str) -> HashSet<String> {
    list_names(&output_dir(output_path))
}

/// Compara o diretório de saída com a fotografia anterior e recolhe as
/// imagens novas que seguem o padrão de nome do engine.
///
/// O export pode soltar arquivos auxiliares (gráficos embutidos virando
/// imagem, por exemplo) que não são endereçáveis pelo caminho de saída;
/// inliná-los na resposta poupa o host de uma segunda rodada no disco.
pub fn harvest(output_path: &str, before: &HashSet<String>) -> BTreeMap<String, ImageRecord> {
    let dir = output_dir(output_path);
    let base = Path::new(output_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("");

    // Só a extensão é case-insensitive; o prefixo segue o nome do output.
    let pattern = Regex::new(&format!(
        r"^{}{}.*\.(?i:png|jpe?g|gif|svg)$",
        regex::escape(base),
        MARKER
    ))
    .unwrap();

    let mut images = BTreeMap::new();
    for name in list_names(&dir) {
        if before.contains(&name) || !pattern.is_match(&name) {
            continue;
        }

        let path = dir.join(&name);
        match fs::read(&path) {
            Ok(bytes) => {
                images.insert(
                    name.clone(),
                    ImageRecord {
                        data: STANDARD.encode(&bytes),
                        mime: mime_for(&name).to_string(),
                    },
                );
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed to read generated image");
            }
        }
    }
    images
}

fn output_dir(output_path: &str) -> PathBuf {
    match Path::new(output_path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn list_names(dir: &Path) -> HashSet<String> {
    let mut names = HashSet::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            }
        }
    }
    names
}

fn mime_for(name: &str) -> &'static str {
    let ext = name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "image/png",
    }
}
