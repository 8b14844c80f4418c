use crate::error::RenderError;
use crate::traits::DocumentRenderer;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const CM: f32 = 28.3465;
const MARGIN: f32 = 2.0 * CM;
const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FIGURE_WIDTH: f32 = 15.0 * CM;
const FIGURE_HEIGHT: f32 = 10.0 * CM;
const FIGURE_GAP: f32 = 0.3 * CM;
const FIGURE_SLOTS: usize = 2;

pub const DEFAULT_FOOTER: &str = "Simetrik - Plataforma de Conciliación Financiera";

#[derive(Debug, Clone)]
pub struct RenderReport {
    pub path: PathBuf,
    pub pages: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Heading { level: u8, text: String },
    Bullet(Vec<Run>),
    Numbered(Vec<Run>),
    Body(Vec<Run>),
}

/// Drops a ```` ```markdown ```` wrapper that models sometimes put around their answer.
pub fn strip_markdown_fence(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```markdown") {
        Some(rest) => rest.replace("```", "").trim().to_string(),
        None => trimmed.to_string(),
    }
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| line.chars().all(|c| c == *marker))
}

struct MarkdownReader {
    bold: Regex,
    numbered: Regex,
}

impl MarkdownReader {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bold: Regex::new(r"\*\*(.*?)\*\*")?,
            numbered: Regex::new(r"^\d+\.\s*")?,
        })
    }

    /// Splits `**bold**` spans out of a line.
    fn runs(&self, text: &str) -> Vec<Run> {
        let mut runs = Vec::new();
        let mut cursor = 0;

        for captures in self.bold.captures_iter(text) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > cursor {
                runs.push(Run::plain(&text[cursor..whole.start()]));
            }
            if !inner.as_str().is_empty() {
                runs.push(Run::bold(inner.as_str()));
            }
            cursor = whole.end();
        }
        if cursor < text.len() {
            runs.push(Run::plain(&text[cursor..]));
        }

        runs
    }

    fn elements(&self, text: &str) -> Vec<Element> {
        let mut elements = Vec::new();

        for line in text.lines().map(str::trim) {
            if line.is_empty() || is_rule(line) {
                continue;
            }

            if line.starts_with('#') {
                let hashes = line.chars().take_while(|c| *c == '#').count();
                let title = self
                    .runs(line[hashes..].trim())
                    .into_iter()
                    .map(|run| run.text)
                    .collect::<String>();
                if !title.trim().is_empty() {
                    elements.push(Element::Heading {
                        level: hashes.min(3) as u8,
                        text: title.trim().to_string(),
                    });
                }
            } else if let Some(item) = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("• "))
            {
                elements.push(Element::Bullet(self.runs(item.trim())));
            } else if let Some(found) = self.numbered.find(line) {
                elements.push(Element::Numbered(self.runs(&line[found.end()..])));
            } else {
                elements.push(Element::Body(self.runs(line)));
            }
        }

        elements
    }
}

/// Line-oriented Markdown reading; anything that is not a heading or list item is body text.
pub fn parse_markdown(text: &str) -> Result<Vec<Element>, RenderError> {
    Ok(MarkdownReader::new()?.elements(text))
}

/// WinAnsi code for `c`, or `None` when the built-in fonts cannot show it.
fn win_ansi(c: char) -> Option<u8> {
    match c {
        ' '..='~' => Some(c as u8),
        '\u{a0}'..='\u{ff}' => Some(c as u32 as u8),
        '€' => Some(0x80),
        '…' => Some(0x85),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        _ => None,
    }
}

fn encode(text: &str) -> Vec<u8> {
    text.chars().filter_map(win_ansi).collect()
}

fn printable(text: &str) -> String {
    text.chars().filter(|c| win_ansi(*c).is_some()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    fn resource(self) -> &'static [u8] {
        match self {
            Font::Regular => b"F1",
            Font::Bold => b"F2",
            Font::Italic => b"F3",
        }
    }
}

// Helvetica advance widths for ' '..='~', in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            ' '..='~' => u32::from(HELVETICA_WIDTHS[(c as usize) - 32]),
            _ => 556,
        })
        .sum();
    let scale = if font == Font::Bold { 1.06 } else { 1.0 };
    units as f32 * scale * size / 1000.0
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    font: Font,
    size: f32,
    leading: f32,
    color: u32,
    indent: f32,
    space_before: f32,
    space_after: f32,
}

impl TextStyle {
    const fn new(font: Font, size: f32, leading: f32, color: u32) -> Self {
        Self {
            font,
            size,
            leading,
            color,
            indent: 0.0,
            space_before: 0.0,
            space_after: 0.0,
        }
    }

    const fn spaced(mut self, before: f32, after: f32) -> Self {
        self.space_before = before;
        self.space_after = after;
        self
    }

    const fn indented(mut self, indent: f32) -> Self {
        self.indent = indent;
        self
    }

    fn font_for(&self, run: &Run) -> Font {
        match self.font {
            Font::Italic => Font::Italic,
            _ if run.bold => Font::Bold,
            font => font,
        }
    }

    fn rgb(&self) -> [f32; 3] {
        let channel = |shift: u32| ((self.color >> shift) & 0xff) as f32 / 255.0;
        [channel(16), channel(8), channel(0)]
    }
}

const TITLE: TextStyle = TextStyle::new(Font::Bold, 24.0, 29.0, 0x3498db).spaced(0.0, 30.0);
const SUBTITLE: TextStyle = TextStyle::new(Font::Regular, 12.0, 14.5, 0x7f8c8d).spaced(0.0, 20.0);
const FOOTER: TextStyle = TextStyle::new(Font::Italic, 12.0, 14.5, 0x7f8c8d).spaced(CM, 0.0);
const HEADING_1: TextStyle = TextStyle::new(Font::Bold, 18.0, 22.0, 0x2c3e50).spaced(18.0, 12.0);
const HEADING_2: TextStyle = TextStyle::new(Font::Bold, 16.0, 19.0, 0x2c3e50).spaced(16.0, 10.0);
const SECTION: TextStyle =
    TextStyle::new(Font::Bold, 14.0, 17.0, 0x2c3e50).spaced(15.0, 10.0 + 0.2 * CM);
const BODY: TextStyle = TextStyle::new(Font::Regular, 11.0, 16.0, 0x000000).spaced(0.0, 12.0);
const BULLET: TextStyle = TextStyle::new(Font::Regular, 10.0, 14.0, 0x000000)
    .spaced(0.0, 8.0)
    .indented(20.0);

#[derive(Debug, Clone)]
struct Segment {
    font: Font,
    text: String,
}

/// Greedy word wrap; a word wider than the line gets a line of its own.
fn wrap(runs: &[Run], style: &TextStyle, width: f32) -> Vec<Vec<Segment>> {
    let mut lines = Vec::new();
    let mut line: Vec<Segment> = Vec::new();
    let mut line_width = 0.0;

    for run in runs {
        let font = style.font_for(run);
        for word in printable(&run.text).split_whitespace() {
            let word_width = text_width(word, font, style.size);
            let mut gap = if line.is_empty() { 0.0 } else { text_width(" ", font, style.size) };
            if !line.is_empty() && line_width + gap + word_width > width {
                lines.push(std::mem::take(&mut line));
                line_width = 0.0;
                gap = 0.0;
            }

            let spaced = if line.is_empty() { word.to_string() } else { format!(" {word}") };
            match line.last_mut() {
                Some(segment) if segment.font == font => segment.text.push_str(&spaced),
                _ => line.push(Segment { font, text: spaced }),
            }
            line_width += gap + word_width;
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Which cached image goes under a section heading: the first after section 6, the second
/// after section 8.
fn figure_slot(title: &str) -> Option<usize> {
    if title.contains("6.") && title.to_lowercase().contains("consiste") {
        Some(0)
    } else if title.contains("8.") {
        Some(1)
    } else {
        None
    }
}

struct Figure {
    name: String,
    stream: Stream,
    width: f32,
    height: f32,
    placed: bool,
}

impl Figure {
    fn load(path: &Path, name: String) -> Option<Self> {
        let stream = match lopdf::xobject::image(path) {
            Ok(stream) => stream,
            Err(error) => {
                warn!(path = %path.display(), %error, "image could not be loaded, skipped");
                return None;
            }
        };
        let dimension = |key: &[u8]| {
            stream
                .dict
                .get(key)
                .and_then(Object::as_i64)
                .ok()
                .filter(|value| *value > 0)
        };
        let (Some(width), Some(height)) = (dimension(b"Width"), dimension(b"Height")) else {
            warn!(path = %path.display(), "image has no usable dimensions, skipped");
            return None;
        };

        let scale = (FIGURE_WIDTH / width as f32).min(FIGURE_HEIGHT / height as f32);
        Some(Self {
            name,
            width: width as f32 * scale,
            height: height as f32 * scale,
            stream,
            placed: false,
        })
    }
}

struct Layout {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn space(&mut self, amount: f32) {
        self.y -= amount;
    }

    fn next_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn block(&mut self, runs: &[Run], style: &TextStyle) {
        let lines = wrap(runs, style, TEXT_WIDTH - style.indent);
        if lines.is_empty() {
            return;
        }

        self.space(style.space_before);
        for line in lines {
            if self.y - style.leading < MARGIN && !self.current.is_empty() {
                self.next_page();
            }
            self.y -= style.leading;
            self.line(&line, style);
        }
        self.space(style.space_after);
    }

    fn figure(&mut self, figure: &Figure) {
        self.space(FIGURE_GAP);
        if self.y - figure.height < MARGIN && !self.current.is_empty() {
            self.next_page();
        }
        self.y -= figure.height;

        let x = MARGIN + (TEXT_WIDTH - figure.width) / 2.0;
        self.current.push(Operation::new("q", vec![]));
        self.current.push(Operation::new(
            "cm",
            vec![
                Object::Real(figure.width),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(figure.height),
                Object::Real(x),
                Object::Real(self.y),
            ],
        ));
        self.current.push(Operation::new(
            "Do",
            vec![Object::Name(figure.name.as_bytes().to_vec())],
        ));
        self.current.push(Operation::new("Q", vec![]));
        self.space(FIGURE_GAP);
    }

    fn line(&mut self, segments: &[Segment], style: &TextStyle) {
        let [r, g, b] = style.rgb();
        self.current.push(Operation::new("BT", vec![]));
        self.current.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        self.current.push(Operation::new(
            "Td",
            vec![Object::Real(MARGIN + style.indent), Object::Real(self.y)],
        ));
        for segment in segments {
            self.current.push(Operation::new(
                "Tf",
                vec![Object::Name(segment.font.resource().to_vec()), Object::Real(style.size)],
            ));
            self.current.push(Operation::new(
                "Tj",
                vec![Object::String(encode(&segment.text), StringFormat::Literal)],
            ));
        }
        self.current.push(Operation::new("ET", vec![]));
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.next_page();
        }
        self.pages
    }
}

fn font_dictionary(base_font: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn build_document(pages: Vec<Vec<Operation>>, figures: Vec<Figure>) -> Result<Document, RenderError> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let regular = document.add_object(font_dictionary("Helvetica"));
    let bold = document.add_object(font_dictionary("Helvetica-Bold"));
    let italic = document.add_object(font_dictionary("Helvetica-Oblique"));
    let mut resources = dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => italic,
        },
    };
    if !figures.is_empty() {
        let mut xobjects = lopdf::Dictionary::new();
        for figure in figures {
            let image_id = document.add_object(figure.stream);
            xobjects.set(figure.name, image_id);
        }
        resources.set("XObject", xobjects);
    }
    let resources_id = document.add_object(resources);

    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }.encode()?;
        let content_id = document.add_object(Stream::new(dictionary! {}, content));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document.compress();

    Ok(document)
}

/// A4 one-pager with a fixed header and footer around the generated text.
pub struct PdfRenderer {
    title: String,
    footer: String,
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self {
            title: "One Pager".to_string(),
            footer: DEFAULT_FOOTER.to_string(),
        }
    }
}

impl PdfRenderer {
    fn layout(
        &self,
        elements: &[Element],
        subtitle: &str,
        figures: &mut [Option<Figure>],
    ) -> Vec<Vec<Operation>> {
        let mut layout = Layout::new();
        layout.block(&[Run::plain(self.title.as_str())], &TITLE);
        layout.block(&[Run::plain(subtitle)], &SUBTITLE);
        layout.space(0.5 * CM);

        for element in elements {
            match element {
                Element::Heading { level, text } => {
                    let style = match level {
                        1 => &HEADING_1,
                        2 => &HEADING_2,
                        _ => &SECTION,
                    };
                    layout.block(&[Run::plain(text.as_str())], style);

                    if let Some(slot) = figure_slot(text).filter(|_| *level >= 3) {
                        if let Some(Some(figure)) = figures.get_mut(slot) {
                            layout.figure(figure);
                            figure.placed = true;
                            debug!(image = %figure.name, section = %text, "image placed");
                        }
                    }
                }
                Element::Bullet(runs) => {
                    let mut marked = Vec::with_capacity(runs.len() + 1);
                    marked.push(Run::plain("•"));
                    marked.extend(runs.iter().cloned());
                    layout.block(&marked, &BULLET);
                }
                Element::Numbered(runs) => layout.block(runs, &BULLET),
                Element::Body(runs) => layout.block(runs, &BODY),
            }
        }

        layout.block(&[Run::plain(self.footer.as_str())], &FOOTER);
        layout.finish()
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(
        &self,
        markdown: &str,
        subtitle: &str,
        images: &[PathBuf],
        path: &Path,
    ) -> Result<RenderReport, RenderError> {
        let body = strip_markdown_fence(markdown);
        let elements = parse_markdown(&body)?;
        if elements.is_empty() {
            return Err(RenderError::EmptyDocument);
        }
        debug!(elements = elements.len(), "markdown parsed");

        if images.len() > FIGURE_SLOTS {
            debug!(images = images.len(), "only the first two images have a place in the one-pager");
        }
        let mut figures = images
            .iter()
            .take(FIGURE_SLOTS)
            .enumerate()
            .map(|(index, path)| Figure::load(path, format!("Im{}", index + 1)))
            .collect::<Vec<_>>();

        let pages = self.layout(&elements, subtitle, &mut figures);
        let page_count = pages.len();
        let placed = figures
            .into_iter()
            .flatten()
            .filter(|figure| figure.placed)
            .collect::<Vec<_>>();
        let figure_count = placed.len();
        let mut document = build_document(pages, placed)?;

        let mut buffer = Vec::new();
        document.save_to(&mut buffer)?;

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &buffer)?;

        info!(
            path = %path.display(),
            pages = page_count,
            images = figure_count,
            kib = %format!("{:.2}", buffer.len() as f64 / 1024.0),
            "pdf rendered"
        );

        Ok(RenderReport {
            path: path.to_path_buf(),
            pages: page_count,
            bytes: buffer.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fence_wrapper_is_removed() {
        assert_eq!(strip_markdown_fence("```markdown\n# Title\nBody\n```\n"), "# Title\nBody");
        assert_eq!(strip_markdown_fence("  # Plain\n"), "# Plain");
    }

    #[test]
    fn bold_spans_become_runs() -> Result<(), regex::Error> {
        let reader = MarkdownReader::new()?;
        assert_eq!(
            reader.runs("**Tono**: claro y **directo**."),
            vec![
                Run::bold("Tono"),
                Run::plain(": claro y "),
                Run::bold("directo"),
                Run::plain("."),
            ]
        );
        assert_eq!(reader.runs("sin formato"), vec![Run::plain("sin formato")]);
        Ok(())
    }

    #[test]
    fn lines_map_to_elements() -> Result<(), RenderError> {
        let markdown = "# One Pager\n\n## Resumen\n### 1. 🏷 Tipo de comunicación\nLanzamiento de **Uniones**.\n\n- **Clave**: valor\n* otra\n2. Paso dos\n---\n**Tono**: no es una viñeta";

        let elements = parse_markdown(markdown)?;

        assert_eq!(
            elements,
            vec![
                Element::Heading { level: 1, text: "One Pager".to_string() },
                Element::Heading { level: 2, text: "Resumen".to_string() },
                Element::Heading { level: 3, text: "1. 🏷 Tipo de comunicación".to_string() },
                Element::Body(vec![
                    Run::plain("Lanzamiento de "),
                    Run::bold("Uniones"),
                    Run::plain("."),
                ]),
                Element::Bullet(vec![Run::bold("Clave"), Run::plain(": valor")]),
                Element::Bullet(vec![Run::plain("otra")]),
                Element::Numbered(vec![Run::plain("Paso dos")]),
                Element::Body(vec![Run::bold("Tono"), Run::plain(": no es una viñeta")]),
            ]
        );
        Ok(())
    }

    #[test]
    fn text_outside_latin1_is_dropped() {
        assert_eq!(encode("Conciliación • 🏷 ok"), b"Conciliaci\xf3n \x95  ok".to_vec());
    }

    #[test]
    fn long_text_wraps_within_the_line_width() {
        let runs = vec![Run::plain("palabra ".repeat(120))];

        let lines = wrap(&runs, &BODY, TEXT_WIDTH);

        assert!(lines.len() > 1);
        for line in &lines {
            let width: f32 = line
                .iter()
                .map(|segment| text_width(&segment.text, segment.font, BODY.size))
                .sum();
            assert!(width <= TEXT_WIDTH + 0.01);
        }
    }

    #[test]
    fn renders_a_loadable_pdf() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("output").join("E137_OnePager.pdf");
        let markdown = "```markdown\n### 1. 🏷 Tipo de comunicación\nLanzamiento.\n- **Clave**: valor\n```";

        let report = PdfRenderer::default().render(markdown, "E137 - Data Normalization", &[], &path)?;

        assert_eq!(report.pages, 1);
        assert_eq!(report.bytes as u64, std::fs::metadata(&path)?.len());
        let loaded = Document::load(&path)?;
        assert_eq!(loaded.get_pages().len(), 1);
        Ok(())
    }

    #[test]
    fn long_documents_flow_onto_more_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("long.pdf");
        let markdown = (1..=120)
            .map(|index| format!("Párrafo {index} con texto suficiente para ocupar una línea."))
            .collect::<Vec<_>>()
            .join("\n\n");

        let report = PdfRenderer::default().render(&markdown, "E137", &[], &path)?;

        assert!(report.pages > 1);
        assert_eq!(Document::load(&path)?.get_pages().len(), report.pages);
        Ok(())
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xffff_ffffu32;
        for byte in bytes {
            crc ^= u32::from(*byte);
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xedb8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    fn push_chunk(png: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        png.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let start = png.len();
        png.extend_from_slice(kind);
        png.extend_from_slice(data);
        let crc = crc32(&png[start..]);
        png.extend_from_slice(&crc.to_be_bytes());
    }

    /// Single-colour RGB PNG with a stored (uncompressed) deflate stream.
    fn solid_png(width: u32, height: u32) -> Vec<u8> {
        let mut raw = Vec::new();
        for _ in 0..height {
            raw.push(0);
            for _ in 0..width {
                raw.extend_from_slice(&[0x34, 0x98, 0xdb]);
            }
        }

        let (mut a, mut b) = (1u32, 0u32);
        for byte in &raw {
            a = (a + u32::from(*byte)) % 65521;
            b = (b + a) % 65521;
        }
        let len = raw.len() as u16;
        let mut zlib = vec![0x78, 0x01, 0x01];
        zlib.extend_from_slice(&len.to_le_bytes());
        zlib.extend_from_slice(&(!len).to_le_bytes());
        zlib.extend_from_slice(&raw);
        zlib.extend_from_slice(&((b << 16) | a).to_be_bytes());

        let mut header = Vec::new();
        header.extend_from_slice(&width.to_be_bytes());
        header.extend_from_slice(&height.to_be_bytes());
        header.extend_from_slice(&[8, 2, 0, 0, 0]);

        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        push_chunk(&mut png, b"IHDR", &header);
        push_chunk(&mut png, b"IDAT", &zlib);
        push_chunk(&mut png, b"IEND", &[]);
        png
    }

    fn image_count(document: &Document) -> usize {
        document
            .objects
            .values()
            .filter(|object| match object {
                Object::Stream(stream) => matches!(
                    stream.dict.get(b"Subtype").and_then(Object::as_name),
                    Ok(name) if name == b"Image"
                ),
                _ => false,
            })
            .count()
    }

    const SECTIONED: &str = "### 5. 💡 Beneficio principal\nMenos trabajo manual.\n### 6. ⚙️ ¿En qué consiste la funcionalidad?\nNormaliza uniones.\n### 7. 🧩 Características clave\n- Rápida\n### 8. 🔎 ¿Cómo se usa y dónde se encuentra?\nDesde el módulo de uniones.";

    #[test]
    fn dod_images_follow_sections_six_and_eight() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("dod_image_1.png");
        let second = dir.path().join("dod_image_2.png");
        std::fs::write(&first, solid_png(4, 3))?;
        std::fs::write(&second, solid_png(2, 5))?;
        let path = dir.path().join("out.pdf");

        PdfRenderer::default().render(SECTIONED, "E137", &[first, second], &path)?;

        assert_eq!(image_count(&Document::load(&path)?), 2);
        Ok(())
    }

    #[test]
    fn unusable_images_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let garbage = dir.path().join("broken.png");
        std::fs::write(&garbage, b"not an image")?;
        let path = dir.path().join("out.pdf");

        let report = PdfRenderer::default().render(
            SECTIONED,
            "E137",
            &[dir.path().join("missing.png"), garbage],
            &path,
        )?;

        assert_eq!(report.pages, Document::load(&path)?.get_pages().len());
        assert_eq!(image_count(&Document::load(&path)?), 0);
        Ok(())
    }

    #[test]
    fn images_need_their_sections() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let image = dir.path().join("dod_image_1.png");
        std::fs::write(&image, solid_png(4, 3))?;
        let path = dir.path().join("out.pdf");

        PdfRenderer::default().render("### 1. 🏷 Tipo de comunicación\nLanzamiento.", "E137", &[image], &path)?;

        assert_eq!(image_count(&Document::load(&path)?), 0);
        assert_eq!(figure_slot("6. ⚙️ ¿En qué consiste la funcionalidad?"), Some(0));
        assert_eq!(figure_slot("8. 🔎 ¿Cómo se usa y dónde se encuentra?"), Some(1));
        assert_eq!(figure_slot("6. Otro título"), None);
        Ok(())
    }

    #[test]
    fn empty_markdown_is_rejected() -> Result<(), std::io::Error> {
        let dir = tempdir()?;
        let result = PdfRenderer::default().render("```markdown\n\n```", "E137", &[], &dir.path().join("x.pdf"));

        assert!(matches!(result, Err(RenderError::EmptyDocument)));
        Ok(())
    }
}
