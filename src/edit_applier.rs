//! Aplicación de bloques de edición sobre el árbol virtual.

use serde::Serialize;
use tracing::{info, warn};

use crate::models::{EditBlock, NodeId};
use crate::vfs::VirtualFileTree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ApplyOutcome {
    Applied { filename: String, path: String },
    /// La edición ya se había aplicado; no se toca el árbol.
    AlreadyApplied { filename: String },
    NotFound { filename: String },
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ApplyOutcome::NotFound { .. })
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub outcomes: Vec<ApplyOutcome>,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ApplyOutcome::Applied { .. }))
            .count()
    }

    pub fn not_found(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }
}

/// `./src/a.js`, `/src/a.js` y ` src/a.js ` apuntan todos a `src/a.js`.
pub fn normalize_target(filename: &str) -> &str {
    let mut target = filename.trim();
    loop {
        if let Some(rest) = target.strip_prefix("./") {
            target = rest;
        } else if let Some(rest) = target.strip_prefix('/') {
            target = rest;
        } else {
            return target;
        }
    }
}

/// Sustituye el contenido del fichero destino por el de la edición.
pub fn apply(tree: &mut VirtualFileTree, edit: &mut EditBlock) -> ApplyOutcome {
    if edit.is_applied() {
        return ApplyOutcome::AlreadyApplied {
            filename: edit.filename.clone(),
        };
    }

    let target = normalize_target(&edit.filename);
    let found: Option<(NodeId, String)> = tree
        .find_file(target)
        .map(|node| (node.id().clone(), node.path().to_string()));

    let Some((id, path)) = found else {
        warn!("Edición sin destino: '{}' no está en el árbol", edit.filename);
        return ApplyOutcome::NotFound {
            filename: edit.filename.clone(),
        };
    };

    if let Err(err) = tree.set_content(&id, edit.content.clone()) {
        warn!("No se pudo aplicar la edición sobre '{}': {}", path, err);
        return ApplyOutcome::NotFound {
            filename: edit.filename.clone(),
        };
    }
    edit.mark_applied();
    info!("Edición aplicada sobre '{}'", path);
    ApplyOutcome::Applied {
        filename: edit.filename.clone(),
        path,
    }
}

/// Aplica las ediciones en orden; un fallo no impide aplicar las siguientes.
pub fn apply_all<'a, I>(tree: &mut VirtualFileTree, edits: I) -> BatchReport
where
    I: IntoIterator<Item = &'a mut EditBlock>,
{
    BatchReport {
        outcomes: edits.into_iter().map(|edit| apply(tree, edit)).collect(),
    }
}
