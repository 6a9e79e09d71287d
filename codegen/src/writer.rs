//! Line-tagged source assembly.
//!
//! Generated files are built as a vector of [`TaggedLine`]s. Each line
//! carries the [`Zone`]s it belongs to and where inside each zone it sits
//! ([`Edge`]). Two passes run over the same vector: [`FileWriter::render`]
//! drops the tags to produce clean text, and [`FileWriter::file_map`]
//! reads them back into line ranges. Since both passes see identical
//! lines, the recorded ranges always match the written file.

use serde::{Deserialize, Serialize};

const DEFAULT_INDENT: usize = 4;

/// Section kind a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Header,
    Import,
    Class,
    Decorator,
    Property,
    Method,
}

/// Position of a line within a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Start,
    Inside,
    Stop,
}

/// One output line and its zone tags.
///
/// A line opening and closing the same zone carries both a `Start` and a
/// `Stop` tag for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedLine {
    pub text: String,
    pub tags: Vec<(Zone, Edge)>,
}

impl TaggedLine {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Vec::new(),
        }
    }

    fn tagged(text: impl Into<String>, zone: Zone, edge: Edge) -> Self {
        Self {
            text: text.into(),
            tags: vec![(zone, edge)],
        }
    }

    fn has(&self, zone: Zone, edge: Edge) -> bool {
        self.tags.contains(&(zone, edge))
    }
}

/// Inclusive, zero-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    fn contains(&self, other: &LineRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Line ranges of one generated struct and its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    pub name: String,
    pub span: LineRange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<LineRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<LineRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<LineRange>,
}

/// Structure of a generated file, as recorded in its sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMap {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<LineRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<LineRange>,
    #[serde(default)]
    pub classes: Vec<ClassMap>,
}

/// Tags a run of lines as one section of `zone`.
fn section(lines: &[String], zone: Zone) -> Vec<TaggedLine> {
    let last = lines.len().saturating_sub(1);
    lines
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let mut tags = Vec::with_capacity(2);
            if i == 0 {
                tags.push((zone, Edge::Start));
            }
            if i == last {
                tags.push((zone, Edge::Stop));
            }
            if tags.is_empty() {
                tags.push((zone, Edge::Inside));
            }
            TaggedLine {
                text: text.clone(),
                tags,
            }
        })
        .collect()
}

/// Collects the `Start`..`Stop` ranges of a zone.
fn spans(lines: &[TaggedLine], zone: Zone) -> Vec<LineRange> {
    let mut ranges = Vec::new();
    let mut open = None;
    for (i, line) in lines.iter().enumerate() {
        if line.has(zone, Edge::Start) {
            open = Some(i);
        }
        if line.has(zone, Edge::Stop) {
            if let Some(start) = open.take() {
                ranges.push(LineRange { start, end: i });
            }
        }
    }
    ranges
}

/// An `impl` block attached to a generated struct.
#[derive(Debug, Clone)]
pub struct ImplBlock {
    header: String,
    indent: usize,
    lines: Vec<String>,
}

impl ImplBlock {
    /// Adds a line at the given indentation level (1 = method level).
    pub fn add_line(&mut self, line: impl AsRef<str>, level: usize) -> &mut Self {
        let line = line.as_ref();
        if line.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines
                .push(format!("{}{line}", " ".repeat(self.indent * level)));
        }
        self
    }
}

/// Builds one struct definition with optional attributes and `impl` blocks.
#[derive(Debug, Clone)]
pub struct ClassWriter {
    name: String,
    indent: usize,
    decorators: Vec<String>,
    properties: Vec<String>,
    impls: Vec<ImplBlock>,
}

impl ClassWriter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indent: DEFAULT_INDENT,
            decorators: Vec::new(),
            properties: Vec::new(),
            impls: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an attribute line above the struct, e.g. `#[derive(Debug)]`.
    pub fn add_decorator(&mut self, line: impl Into<String>) -> &mut Self {
        self.decorators.push(line.into());
        self
    }

    /// Adds a `pub name: ty` field.
    pub fn add_property(&mut self, name: &str, ty: &str) -> &mut Self {
        self.properties
            .push(format!("{}pub {name}: {ty},", " ".repeat(self.indent)));
        self
    }

    /// Opens an inherent `impl` block, or a trait impl when `trait_name` is given.
    pub fn add_impl(&mut self, trait_name: Option<&str>) -> &mut ImplBlock {
        let header = match trait_name {
            Some(t) => format!("impl {t} for {} {{", self.name),
            None => format!("impl {} {{", self.name),
        };
        self.impls.push(ImplBlock {
            header,
            indent: self.indent,
            lines: Vec::new(),
        });
        let last = self.impls.len() - 1;
        &mut self.impls[last]
    }

    pub fn tagged_lines(&self) -> Vec<TaggedLine> {
        let mut lines = section(&self.decorators, Zone::Decorator);

        lines.push(TaggedLine::tagged(
            format!("pub struct {} {{", self.name),
            Zone::Class,
            Edge::Start,
        ));
        lines.extend(section(&self.properties, Zone::Property));
        lines.push(TaggedLine::plain("}"));

        for block in &self.impls {
            lines.push(TaggedLine::plain(""));
            let mut body = Vec::with_capacity(block.lines.len() + 2);
            body.push(block.header.clone());
            body.extend(block.lines.iter().cloned());
            body.push("}".to_string());
            lines.extend(section(&body, Zone::Method));
        }

        if let Some(last) = lines.last_mut() {
            last.tags.push((Zone::Class, Edge::Stop));
        }
        lines
    }
}

/// Assembles a generated source file.
///
/// # Examples
///
/// ```
/// use entity_schema_codegen::FileWriter;
///
/// let mut fw = FileWriter::new("DTOs");
/// fw.add_header_comment("Generated.");
/// fw.add_import("use serde::Serialize;");
/// fw.add_class("AuthorDto")
///     .add_decorator("#[derive(Serialize)]")
///     .add_property("name", "String");
///
/// let text = fw.render();
/// assert!(text.starts_with("// Generated.\n\nuse serde::Serialize;\n"));
/// assert!(text.contains("pub struct AuthorDto {\n    pub name: String,\n}\n"));
///
/// let map = fw.file_map();
/// assert_eq!(map.classes[0].name, "AuthorDto");
/// assert_eq!(map.classes[0].span.start, 5);
/// ```
#[derive(Debug, Clone)]
pub struct FileWriter {
    name: String,
    headers: Vec<String>,
    imports: Vec<String>,
    classes: Vec<ClassWriter>,
}

impl FileWriter {
    /// Creates an empty file; `name` only appears in log output.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
            imports: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a `//` comment line to the file header.
    pub fn add_header_comment(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            self.headers.push("//".to_string());
        } else {
            self.headers.push(format!("// {text}"));
        }
        self
    }

    pub fn add_import(&mut self, line: impl Into<String>) -> &mut Self {
        self.imports.push(line.into());
        self
    }

    pub fn add_class(&mut self, name: impl Into<String>) -> &mut ClassWriter {
        self.classes.push(ClassWriter::new(name));
        let last = self.classes.len() - 1;
        &mut self.classes[last]
    }

    pub fn classes(&self) -> &[ClassWriter] {
        &self.classes
    }

    /// Builds every line of the file with its zone tags.
    pub fn tagged_lines(&self) -> Vec<TaggedLine> {
        let mut blocks = Vec::new();
        if !self.headers.is_empty() {
            blocks.push(section(&self.headers, Zone::Header));
        }
        if !self.imports.is_empty() {
            blocks.push(section(&self.imports, Zone::Import));
        }
        blocks.extend(self.classes.iter().map(ClassWriter::tagged_lines));

        let mut lines = Vec::new();
        for (i, block) in blocks.into_iter().enumerate() {
            if i > 0 {
                lines.push(TaggedLine::plain(""));
            }
            lines.extend(block);
        }
        lines
    }

    /// Renders the file as clean text.
    pub fn render(&self) -> String {
        strip(&self.tagged_lines())
    }

    /// Derives the line ranges recorded in the file's sidecar.
    pub fn file_map(&self) -> FileMap {
        map_lines(&self.tagged_lines(), &self.classes)
    }
}

/// Removes zone tags and trailing whitespace.
fn strip(lines: &[TaggedLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.text.trim_end());
        out.push('\n');
    }
    out
}

fn map_lines(lines: &[TaggedLine], classes: &[ClassWriter]) -> FileMap {
    let decorators = spans(lines, Zone::Decorator);
    let properties = spans(lines, Zone::Property);
    let methods = spans(lines, Zone::Method);

    let mut previous_end = None;
    let class_maps = spans(lines, Zone::Class)
        .into_iter()
        .zip(classes)
        .map(|(span, class)| {
            let decorators = decorators
                .iter()
                .filter(|d| d.end < span.start && previous_end.is_none_or(|p| d.start > p))
                .copied()
                .collect();
            previous_end = Some(span.end);
            ClassMap {
                name: class.name().to_string(),
                span,
                decorators,
                properties: properties.iter().filter(|p| span.contains(p)).copied().collect(),
                methods: methods.iter().filter(|m| span.contains(m)).copied().collect(),
            }
        })
        .collect();

    FileMap {
        headers: spans(lines, Zone::Header),
        imports: spans(lines, Zone::Import),
        classes: class_maps,
    }
}
