//! Construcción del prompt que se envía al modelo de chat.

use std::fmt;

use crate::models::Chunk;

/// Instrucción de sistema fija del asistente, incluida la convención de
/// bloques de edición que interpreta `edit_protocol`.
pub const SYSTEM_INSTRUCTION: &str = r#"You are an AI-powered code editor assistant with access to the complete codebase context. Your role is to analyze code, understand requirements, and provide intelligent responses.

INSTRUCTIONS:
1. Analyze the user's query and the provided code context thoroughly
2. If the query requires code changes/edits to any file:
   - Provide the complete edited file content
   - Wrap the edited file with ###edit tags at the start and end
   - Format: ###edit:filename.ext on its own line at the beginning and ###edit on its own line at the end
   - Include the ENTIRE file content, not just the changed parts
   - Ensure all imports, dependencies, and existing functionality remain intact
   - If a line of the file itself starts with ###edit, write it as \###edit
3. Always provide a human-readable explanation of what was done or analyzed
4. If no code changes are needed, provide only the text response
5. Be precise and ensure code changes are syntactically correct
6. Consider the relationships between files when making changes
7. If the user mentions a specific filename that is currently open, prioritize that file for edits
8. Maintain code formatting, comments, and structure

RESPONSE FORMAT:
- If editing is required:
  ###edit:filename.ext
  [complete file content with all imports, functions, and existing code]
  ###edit

  [Human readable explanation of changes made]

- If no editing is required:
  [Human readable explanation only]

IMPORTANT: When editing files, always include the complete file content to ensure nothing is lost or broken.

Remember: You have access to the complete codebase context, so consider file dependencies and relationships when making changes."#;

/// Texto del bloque de contexto cuando la recuperación no devuelve nada.
pub const NO_CONTEXT: &str = "(no relevant context found)";

/// Prompt ensamblado: la instrucción de sistema va como preámbulo del agente
/// y el resto como mensaje de usuario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub system: String,
    pub body: String,
}

impl fmt::Display for AssembledPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.system, self.body)
    }
}

/// Función pura: mismas entradas, mismo prompt.
pub fn assemble(
    system_instruction: &str,
    chunks: &[Chunk],
    current_file: Option<&str>,
    question: &str,
) -> AssembledPrompt {
    let context = if chunks.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        chunks
            .iter()
            .map(|c| format!("File: {} ({})\n{}", c.metadata.filename, c.metadata.path, c.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    };

    let mut body = format!("Context from codebase:\n{context}\n\n");
    if let Some(file) = current_file.map(str::trim).filter(|f| !f.is_empty()) {
        body.push_str(&format!("Currently opened file: {file}\n\n"));
    }
    body.push_str(&format!("User Query: {}\n\nResponse:", question.trim()));

    AssembledPrompt {
        system: system_instruction.to_string(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::chunk;

    #[test]
    fn sections_appear_in_order() {
        let chunks = vec![chunk("a.js", "const a = 1;"), chunk("b.js", "const b = 2;")];
        let prompt = assemble(SYSTEM_INSTRUCTION, &chunks, Some("a.js"), "¿qué hace a?").to_string();

        let system = prompt.find("You are an AI-powered code editor").unwrap();
        let context = prompt.find("Context from codebase:").unwrap();
        let first = prompt.find("const a = 1;").unwrap();
        let second = prompt.find("const b = 2;").unwrap();
        let opened = prompt.find("Currently opened file: a.js").unwrap();
        let query = prompt.find("User Query: ¿qué hace a?").unwrap();
        assert!(system < context && context < first && first < second);
        assert!(second < opened && opened < query);
        assert!(prompt.ends_with("Response:"));
    }

    #[test]
    fn empty_context_and_no_open_file() {
        let prompt = assemble(SYSTEM_INSTRUCTION, &[], None, "hola");
        assert!(prompt.body.contains(NO_CONTEXT));
        assert!(!prompt.body.contains("Currently opened file"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let chunks = vec![chunk("a.js", "x")];
        assert_eq!(
            assemble("sys", &chunks, Some("a.js"), "q"),
            assemble("sys", &chunks, Some("a.js"), "q")
        );
    }

    #[test]
    fn instruction_documents_the_edit_markers() {
        assert!(SYSTEM_INSTRUCTION.contains("###edit:filename.ext"));
        assert!(SYSTEM_INSTRUCTION.contains(r"\###edit"));
    }
}
