use thiserror::Error;

use crate::model::request::ConversionRequest;

/// Falha ao interpretar uma linha de requisição. Nunca sobe além do
/// loop de escuta: vira sempre uma resposta codificada.
#[derive(Debug, Error)]
pub enum RequestLineError {
    #[error("invalid quoting: {0}")]
    Tokenize(#[from] shell_words::ParseError),
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
    #[error("flag {0} is missing a value")]
    MissingValue(String),
    #[error("duplicate flag: {0}")]
    DuplicateFlag(String),
    #[error("missing required flag: {0}")]
    MissingRequired(&'static str),
}

/// Interpreta uma linha do host respeitando quoting de shell.
///
/// O host escreve `--flag="valor"`; aceitamos também `--flag valor` e as
/// formas curtas (`-p`, `-i`, `-o`, `-f`, `-fo`).
pub fn parse(line: &str) -> Result<ConversionRequest, RequestLineError> {
    let tokens = shell_words::split(line)?;

    let mut pipe: Option<String> = None;
    let mut input: Option<String> = None;
    let mut output: Option<String> = None;
    let mut format: Option<String> = None;
    let mut format_options: Option<String> = None;

    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        // `--flag=valor` chega como um token só depois do unquoting.
        let (flag, inline_value) = match token.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (token, None),
        };

        let slot = match flag.as_str() {
            "-p" | "--pipe" => &mut pipe,
            "-i" | "--input" => &mut input,
            "-o" | "--output" => &mut output,
            "-f" | "--format" => &mut format,
            "-fo" | "--formatOptions" => &mut format_options,
            _ => return Err(RequestLineError::UnknownFlag(flag)),
        };

        let value = match inline_value {
            Some(value) => value,
            None => match tokens.next() {
                Some(value) => value,
                None => return Err(RequestLineError::MissingValue(flag)),
            },
        };

        if slot.replace(value).is_some() {
            return Err(RequestLineError::DuplicateFlag(flag));
        }
    }

    Ok(ConversionRequest {
        pipe,
        input: input.ok_or(RequestLineError::MissingRequired("--input"))?,
        output: output.ok_or(RequestLineError::MissingRequired("--output"))?,
        format: format.ok_or(RequestLineError::MissingRequired("--format"))?,
        format_options,
    })
}
