/// Uma requisição de conversão, montada a partir de uma linha do host.
///
/// `pipe` é aceito por linha porque o host repete a flag, mas só o pipe
/// passado no startup importa para a conexão.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub pipe: Option<String>,
    pub input: String,
    pub output: String,
    pub format: String,
    pub format_options: Option<String>,
}
