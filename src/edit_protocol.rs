//! Formato de bloques de edición en las respuestas del modelo:
//!
//! ```text
//! ###edit:src/a.js
//! ...contenido completo del fichero...
//! ###edit
//! ```
//!
//! Los marcadores sólo cuentan si ocupan una línea entera. Una línea del
//! contenido que empiece por `\###edit` pierde una barra al leerla, de modo
//! que el contenido puede llevar líneas de marcador literales.

use serde::Serialize;

use crate::models::EditBlock;

const MARKER: &str = "###edit";
const OPEN_PREFIX: &str = "###edit:";

/// Respuesta separada en texto explicativo y bloques de edición.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedResponse {
    pub explanation: String,
    pub edits: Vec<EditBlock>,
}

enum Marker<'a> {
    Open(&'a str),
    Close,
}

fn marker(line: &str) -> Option<Marker<'_>> {
    let trimmed = line.trim_matches(|c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n');
    if trimmed == MARKER {
        return Some(Marker::Close);
    }
    let filename = trimmed.strip_prefix(OPEN_PREFIX)?.trim();
    (!filename.is_empty()).then_some(Marker::Open(filename))
}

/// Sangría y número de barras invertidas que preceden a un `###edit` al
/// principio de la línea.
fn marker_like(line: &str) -> Option<(usize, usize)> {
    let rest = line.trim_start_matches([' ', '\t']);
    let indent = line.len() - rest.len();
    let after = rest.trim_start_matches('\\');
    let slashes = rest.len() - after.len();
    after.starts_with(MARKER).then_some((indent, slashes))
}

fn unescape_line(line: &str) -> String {
    match marker_like(line) {
        Some((indent, slashes)) if slashes > 0 => {
            let mut out = String::with_capacity(line.len() - 1);
            out.push_str(&line[..indent]);
            out.push_str(&line[indent + 1..]);
            out
        }
        _ => line.to_string(),
    }
}

fn escape_line(line: &str) -> String {
    match marker_like(line) {
        Some((indent, _)) => format!("{}\\{}", &line[..indent], &line[indent..]),
        None => line.to_string(),
    }
}

/// Separa la respuesta en explicación y ediciones. Nunca falla: un marcador
/// de apertura sin cierre se queda tal cual en la explicación.
pub fn parse(raw: &str) -> ParsedResponse {
    let lines: Vec<&str> = raw.split_inclusive('\n').collect();
    let mut explanation = String::new();
    let mut edits = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some(Marker::Open(filename)) = marker(lines[i]) else {
            explanation.push_str(lines[i]);
            i += 1;
            continue;
        };

        // El bloque termina en el primer cierre; otra apertura antes invalida esta.
        let close = lines[i + 1..]
            .iter()
            .position(|l| marker(l).is_some())
            .map(|offset| i + 1 + offset)
            .filter(|&j| matches!(marker(lines[j]), Some(Marker::Close)));

        match close {
            Some(j) => {
                let body: String = lines[i + 1..j].iter().map(|l| unescape_line(l)).collect();
                edits.push(EditBlock::new(filename, body.trim()));
                i = j + 1;
            }
            None => {
                explanation.push_str(lines[i]);
                i += 1;
            }
        }
    }

    ParsedResponse {
        explanation: explanation.trim().to_string(),
        edits,
    }
}

/// Forma en la que viaja una edición, con las líneas de marcador escapadas.
pub fn render_edit(filename: &str, content: &str) -> String {
    let body: String = content.split_inclusive('\n').map(escape_line).collect();
    let newline = if body.is_empty() || body.ends_with('\n') { "" } else { "\n" };
    format!("{OPEN_PREFIX}{filename}\n{body}{newline}{MARKER}\n")
}
