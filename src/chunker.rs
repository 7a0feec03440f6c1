//! Troceado recursivo de ficheros en chunks solapados.
//!
//! El texto se corta probando separadores por orden de prioridad (párrafo,
//! línea, espacio, carácter) hasta que cada trozo cabe en `chunk_size`
//! caracteres; después los trozos se agrupan en chunks que comparten hasta
//! `chunk_overlap` caracteres con el anterior. El troceado trabaja con rangos
//! sobre el texto original, así que ningún carácter se pierde: cada chunk es
//! un fragmento contiguo del fichero y los chunks consecutivos se tocan o se
//! solapan.

use std::collections::VecDeque;
use std::ops::Range;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::models::{Chunk, ChunkMetadata, SourceContent, SourceFile};

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Tamaño máximo de un chunk, en caracteres.
    pub chunk_size: usize,
    /// Solape entre chunks consecutivos, en caracteres.
    pub chunk_overlap: usize,
    /// Ficheros por encima de este tamaño se indexan como marcador.
    pub max_file_bytes: u64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 300,
            max_file_bytes: 1024 * 1024,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk_size debe ser mayor que 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(anyhow!(
                "chunk_overlap ({}) debe ser menor que chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            ));
        }
        Ok(())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Divisor recursivo basado en rangos de bytes sobre el texto original.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.split_spans(text)
            .into_iter()
            .map(|span| &text[span])
            .collect()
    }

    /// Rangos (en bytes) de cada chunk dentro de `text`, en orden.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        if !text.is_empty() {
            self.split_span(text, 0..text.len(), &self.separators, &mut out);
        }
        out
    }

    fn split_span(
        &self,
        text: &str,
        span: Range<usize>,
        separators: &[&'static str],
        out: &mut Vec<Range<usize>>,
    ) {
        let slice = &text[span.clone()];
        let idx = separators
            .iter()
            .position(|sep| sep.is_empty() || slice.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let sep = separators.get(idx).copied().unwrap_or("");
        let rest = separators.get(idx + 1..).unwrap_or(&[]);

        let mut pending = Vec::new();
        for piece in pieces(text, span, sep) {
            let len = char_len(&text[piece.clone()]);
            if len <= self.chunk_size {
                pending.push((piece, len));
                continue;
            }
            if !pending.is_empty() {
                self.merge(std::mem::take(&mut pending), out);
            }
            if rest.is_empty() {
                out.push(piece);
            } else {
                self.split_span(text, piece, rest, out);
            }
        }
        if !pending.is_empty() {
            self.merge(pending, out);
        }
    }

    /// Agrupa trozos contiguos en chunks de hasta `chunk_size` caracteres,
    /// conservando al inicio de cada chunk la cola del anterior.
    fn merge(&self, pieces: Vec<(Range<usize>, usize)>, out: &mut Vec<Range<usize>>) {
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for (piece, len) in pieces {
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(span) = window_span(&window) {
                    out.push(span);
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            total += len;
            window.push_back((piece, len));
        }

        if let Some(span) = window_span(&window) {
            out.push(span);
        }
    }
}

fn window_span(window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    let first = window.front()?;
    let last = window.back()?;
    Some(first.0.start..last.0.end)
}

/// Corta `span` por `sep`, dejando el separador pegado al trozo anterior.
/// Con separador vacío se corta carácter a carácter.
fn pieces(text: &str, span: Range<usize>, sep: &str) -> Vec<Range<usize>> {
    let base = span.start;
    let slice = &text[span.clone()];

    if sep.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }

    let mut out = Vec::new();
    let mut start = 0;
    for (idx, _) in slice.match_indices(sep) {
        let end = idx + sep.len();
        out.push(base + start..base + end);
        start = end;
    }
    if start < slice.len() {
        out.push(base + start..span.end);
    }
    out
}

/// Convierte ficheros en chunks listos para indexar.
#[derive(Debug, Clone)]
pub struct Chunker {
    splitter: RecursiveSplitter,
    max_file_bytes: u64,
}

impl Chunker {
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            splitter: RecursiveSplitter::new(config.chunk_size, config.chunk_overlap),
            max_file_bytes: config.max_file_bytes,
        })
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Trocea los ficheros respetando el orden de entrada. Los ficheros vacíos
    /// se descartan; los binarios o demasiado grandes producen un único chunk
    /// marcador para que consten como presentes.
    pub fn chunk_files(&self, files: &[SourceFile]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for file in files {
            let text: &str;
            let placeholder: String;
            match &file.content {
                SourceContent::Text(t) if t.trim().is_empty() => {
                    debug!("Fichero vacío, se omite: {}", file.path);
                    continue;
                }
                SourceContent::Text(t) if t.len() as u64 > self.max_file_bytes => {
                    placeholder = oversized_placeholder(t.len() as u64);
                    text = &placeholder;
                }
                SourceContent::Text(t) if t.contains('\0') => {
                    placeholder = binary_placeholder(&file.filename);
                    text = &placeholder;
                }
                SourceContent::Text(t) => text = t,
                SourceContent::Binary => {
                    placeholder = binary_placeholder(&file.filename);
                    text = &placeholder;
                }
                SourceContent::Oversized { bytes } => {
                    placeholder = oversized_placeholder(*bytes);
                    text = &placeholder;
                }
            }

            // El fichero ya no está en blanco: se conservan todos los trozos,
            // también los de sólo espacios, para no dejar huecos.
            let size = char_len(text);
            for piece in self.splitter.split(text) {
                chunks.push(Chunk {
                    content: piece.to_string(),
                    metadata: ChunkMetadata {
                        filename: file.filename.clone(),
                        path: file.path.clone(),
                        language: file.language.clone(),
                        namespace: String::new(),
                        size,
                    },
                });
            }
        }

        chunks
    }
}

pub fn binary_placeholder(filename: &str) -> String {
    format!("// Binary file: {filename}")
}

pub fn oversized_placeholder(bytes: u64) -> String {
    let mb = (bytes as f64 / (1024.0 * 1024.0)).round() as u64;
    format!("// File too large to process ({mb}MB)")
}
