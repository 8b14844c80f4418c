use crate::error::GenerationError;
use crate::traits::Summarizer;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

/// Titles the generated one-pager must carry, in order.
pub const REQUIRED_SECTIONS: [&str; 8] = [
    "🏷 Tipo de comunicación",
    "✨ Nombre de la funcionalidad",
    "👥 ¿A quién está dirigido?",
    "🎯 ¿Qué problema resuelve?",
    "💡 Beneficio principal",
    "⚙️ ¿En qué consiste la funcionalidad?",
    "🧩 Características clave",
    "🔎 ¿Cómo se usa y dónde se encuentra?",
];

const SECTION_HINTS: [&str; 8] = [
    "Identifica si es un lanzamiento, una mejora o una profundización de funcionalidad existente.",
    "Nombre claro y directo (ejemplo: \"Gestión de Inconsistencias en Uniones\")",
    "Describe el público objetivo (equipos, roles, casos de uso).",
    "Explica la necesidad o fricción que se resuelve con lenguaje del cliente.",
    "El valor más claro y tangible (ahorro de tiempo, automatización, reducción de errores, etc.).",
    "Descripción simple de cómo funciona, con ejemplos si ayuda.",
    "Lista (bullets) de los aspectos más diferenciadores o útiles.",
    "Pasos para acceder y utilizar la funcionalidad.",
];

/// Editorial prompt combining the guide and the reference document.
pub fn build_prompt(dod: &str, guide: &str) -> String {
    let sections = REQUIRED_SECTIONS
        .iter()
        .zip(SECTION_HINTS)
        .enumerate()
        .map(|(index, (title, hint))| format!("   ### {}. {title}\n   {hint}\n", index + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Eres un experto en comunicación de producto para Simetrik, una plataforma de conciliación financiera. \n\
\n\
Tu tarea es crear un ONE PAGER educativo basado en el Definition of Done (DoD) de una funcionalidad.\n\
\n\
## GUÍA DE REFERENCIA:\n\
\n\
{guide}\n\
\n\
## CONTENIDO TÉCNICO A PROCESAR (Definition of Done):\n\
\n\
{dod}\n\
\n\
## INSTRUCCIONES ESPECÍFICAS:\n\
\n\
1. **Tono**: Profesional, claro, cercano y confiable. Usa lenguaje del cliente, evita tecnicismos innecesarios.\n\
\n\
2. **Estructura**: Genera EXACTAMENTE las siguientes 8 secciones:\n\
\n\
{sections}\n\
3. **Formato de salida**: Markdown claro con headings, bullets y párrafos bien estructurados.\n\
\n\
4. **Longitud**: Conciso pero completo. Cada sección debe tener información útil sin ser exhaustiva.\n\
\n\
5. **Basándote en el DoD**: Extrae la información técnica del Definition of Done y transfórmala en lenguaje educativo y accesible.\n\
\n\
## GENERA EL ONE PAGER:\n"
    )
}

/// Section titles absent from `markdown`. The model output varies between runs, so this is
/// the check applied to it instead of an exact comparison.
pub fn missing_sections(markdown: &str) -> Vec<&'static str> {
    REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|title| {
            let label = title.split_once(' ').map_or(*title, |(_, label)| label);
            !markdown.contains(label)
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn response_text(response: GenerateResponse) -> Result<String, GenerationError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

pub struct GeminiSummarizer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiSummarizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> Result<Url, url::ParseError> {
        let base = Url::parse(self.base_url.trim_end_matches('/'))?;
        let mut endpoint = base.join(&format!("/v1beta/models/{}:generateContent", self.model))?;
        endpoint.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(endpoint)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, GenerationError> {
        let endpoint = self.endpoint()?;
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        info!(model = %self.model, prompt_chars = prompt.chars().count(), "sending prompt to Gemini");
        let response = self.client.post(endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let details = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, details });
        }

        let payload: GenerateResponse = response.json().await?;
        let text = response_text(payload)?;
        info!(response_chars = text.chars().count(), "Gemini response received");
        Ok(text)
    }
}
