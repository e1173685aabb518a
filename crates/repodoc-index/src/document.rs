//! Turns parsed source files into retrievable chunks.
//!
//! Each file yields one file-level chunk (its summary, or a structural outline
//! when no summary exists) followed by one chunk per code element.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::{IndexError, Result};

/// A structural element found by the parser: function, class, method and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

/// Parser output for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file_path: String,
    pub language: String,
    #[serde(default)]
    pub elements: Vec<CodeElement>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub raw_content: String,
    #[serde(default)]
    pub line_count: usize,
}

/// Optional natural-language summary of a file, paired to its analysis by `file_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_path: String,
    pub language: String,
    pub high_level_summary: String,
    #[serde(default)]
    pub main_functionalities: Vec<String>,
    #[serde(default)]
    pub key_elements: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub files_seen: usize,
    pub files_skipped: usize,
    pub file_chunks: usize,
    pub element_chunks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub chunks: Vec<Chunk>,
    pub report: BuildReport,
}

/// Exclusion globs applied when no others are configured.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] =
    &["node_modules", "venv", ".git", "__pycache__", "*.pyc"];

#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    /// Code bodies longer than this many characters are cut.
    pub max_body_chars: usize,
    /// Files whose raw content exceeds this many bytes are skipped.
    pub max_file_bytes: usize,
    exclude: Vec<Pattern>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self {
            max_body_chars: 1500,
            max_file_bytes: 5 * 1024 * 1024,
            exclude: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .filter_map(|p| Pattern::new(p).ok())
                .collect(),
        }
    }
}

impl DocumentBuilder {
    /// Builder with the given limits and [`DEFAULT_EXCLUDE_PATTERNS`].
    #[must_use]
    pub fn new(max_body_chars: usize, max_file_bytes: usize) -> Self {
        Self {
            max_body_chars,
            max_file_bytes,
            ..Self::default()
        }
    }

    /// Replace the exclusion globs. Each pattern is tried against the whole
    /// path and against every path component, so `node_modules` skips any file
    /// below such a directory and `build/*` skips files directly under `build`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a pattern is not a valid glob.
    pub fn with_exclude_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        self.exclude = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|e| {
                    IndexError::Validation(format!("invalid exclude pattern {p:?}: {e}"))
                })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(Pattern::as_str)
    }

    /// Whether `analysis` is dropped before chunking.
    #[must_use]
    pub fn is_excluded(&self, analysis: &FileAnalysis) -> bool {
        if analysis.raw_content.len() > self.max_file_bytes {
            return true;
        }
        let path = Path::new(&analysis.file_path);
        self.exclude.iter().any(|pattern| {
            pattern.matches(&analysis.file_path)
                || path
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .any(|c| pattern.matches(c))
        })
    }

    /// Chunk every kept analysis. Chunk ids number kept files in order.
    #[must_use]
    pub fn build(&self, analyses: &[FileAnalysis], summaries: &[FileSummary]) -> BuildOutput {
        let by_path: HashMap<&str, &FileSummary> = summaries
            .iter()
            .map(|s| (s.file_path.as_str(), s))
            .collect();

        let mut report = BuildReport {
            files_seen: analyses.len(),
            ..BuildReport::default()
        };
        let mut chunks = Vec::new();

        let kept = analyses.iter().filter(|a| {
            let excluded = self.is_excluded(a);
            if excluded {
                tracing::debug!(path = %a.file_path, "file excluded from index");
            }
            !excluded
        });

        for (i, analysis) in kept.enumerate() {
            let summary = by_path.get(analysis.file_path.as_str()).copied();
            chunks.push(file_chunk(i, analysis, summary));
            report.file_chunks += 1;
            for (j, element) in analysis.elements.iter().enumerate() {
                chunks.push(self.element_chunk(i, j, analysis, element));
                report.element_chunks += 1;
            }
        }
        report.files_skipped = report.files_seen - report.file_chunks;

        tracing::info!(
            files = report.file_chunks,
            skipped = report.files_skipped,
            elements = report.element_chunks,
            "built chunks from analyses"
        );
        BuildOutput { chunks, report }
    }

    fn element_chunk(
        &self,
        file_index: usize,
        element_index: usize,
        analysis: &FileAnalysis,
        element: &CodeElement,
    ) -> Chunk {
        let mut parts = Vec::with_capacity(6);

        let mut header = format!("{}: {}", element.kind.to_uppercase(), element.name);
        if let Some(parent) = &element.parent {
            let _ = write!(header, " (in class {parent})");
        }
        parts.push(header);
        parts.push(format!("File: {}", analysis.file_path));
        parts.push(format!("Lines: {}-{}", element.start_line, element.end_line));
        if let Some(signature) = element.signature.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("Signature: {signature}"));
        }
        if let Some(doc) = element.docstring.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("Documentation: {doc}"));
        }
        if let Some(body) = element.body.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("\nCode:\n{}", truncate_body(body, self.max_body_chars)));
        }

        let mut chunk = Chunk::new(
            format!("file_{file_index}_code_{element_index}"),
            parts.join("\n"),
        )
        .with_metadata("file_path", &analysis.file_path)
        .with_metadata("language", &analysis.language)
        .with_metadata("element_type", &element.kind)
        .with_metadata("element_name", &element.name)
        .with_metadata(
            "line_range",
            format!("{}-{}", element.start_line, element.end_line),
        );
        if let Some(parent) = &element.parent {
            chunk = chunk.with_metadata("parent", parent);
        }
        chunk
    }
}

fn file_chunk(index: usize, analysis: &FileAnalysis, summary: Option<&FileSummary>) -> Chunk {
    let content = match summary {
        Some(s) => {
            let mut content = format!("{}\n\nFunctionalities:", s.high_level_summary);
            for f in &s.main_functionalities {
                let _ = write!(content, "\n- {f}");
            }
            content
        }
        None => outline(analysis),
    };
    Chunk::new(format!("file_{index}"), content)
        .with_metadata("file_path", &analysis.file_path)
        .with_metadata("language", &analysis.language)
        .with_metadata("element_type", "file_summary")
}

fn outline(analysis: &FileAnalysis) -> String {
    let mut out = format!(
        "{} file {} ({} lines)",
        analysis.language.to_uppercase(),
        analysis.file_path,
        analysis.line_count
    );
    if !analysis.imports.is_empty() {
        out.push_str("\n\nImports:");
        for import in &analysis.imports {
            let _ = write!(out, "\n- {import}");
        }
    }
    if !analysis.elements.is_empty() {
        out.push_str("\n\nElements:");
        for e in &analysis.elements {
            let _ = write!(out, "\n- {} {}", e.kind, e.name);
        }
    }
    out
}

fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... (truncated)", &body[..cut]),
        None => body.to_owned(),
    }
}
