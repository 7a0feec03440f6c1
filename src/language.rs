//! Detección de lenguaje y de ficheros de texto a partir del nombre.

use mime_guess::MimeGuess;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "js", "jsx", "ts", "tsx", "html", "css", "json", "xml", "yaml", "yml", "py",
    "java", "c", "cpp", "h", "hpp", "cs", "php", "rb", "go", "rs", "swift", "kt", "scala", "r",
    "sql", "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd", "dockerfile", "makefile",
    "gitignore", "gitattributes", "editorconfig", "eslintrc", "prettierrc", "babelrc",
    "tsconfig", "package", "lock", "config", "env", "ini", "toml", "cfg", "conf", "properties",
    "log", "vue", "svelte", "scss", "sass", "less", "styl", "stylus", "mjs", "cjs",
];

fn extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Lenguaje asociado a la extensión del fichero (`text` si no se reconoce).
pub fn language_for(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "cpp" | "hpp" => "cpp",
        "c" | "h" => "c",
        "cs" => "csharp",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "json" => "json",
        "xml" => "xml",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "sh" | "bash" => "bash",
        "sql" => "sql",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => "text",
    }
}

/// Indica si el fichero debe tratarse como texto. Primero se mira la lista de
/// extensiones conocidas y los nombres habituales (README, LICENSE...), y como
/// último recurso el tipo MIME.
pub fn is_text_file(filename: &str) -> bool {
    let ext = extension(filename);
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return true;
    }

    let lower = filename.to_lowercase();
    if ["readme", "license", "changelog"]
        .iter()
        .any(|n| lower.contains(n))
    {
        return true;
    }

    MimeGuess::from_path(filename)
        .first()
        .map(|m| m.type_().as_str() == "text")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_languages_by_extension() {
        assert_eq!(language_for("App.tsx"), "typescript");
        assert_eq!(language_for("main.RS"), "rust");
        assert_eq!(language_for("Makefile"), "text");
    }

    #[test]
    fn text_detection() {
        assert!(is_text_file("index.js"));
        assert!(is_text_file("Dockerfile"));
        assert!(is_text_file("README"));
        assert!(is_text_file("notas.csv"));
        assert!(!is_text_file("logo.png"));
        assert!(!is_text_file("app.exe"));
    }
}
