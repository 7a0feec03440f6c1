//! Sesión de trabajo: árbol abierto, fichero activo y conversación.
//!
//! Cada pregunta al asistente sigue un protocolo de ticket: `begin_turn`
//! reserva el turno y registra el mensaje del usuario, la llamada al modelo
//! se hace fuera de la sesión, y `complete_turn` sólo acepta el ticket vigente.
//! Así no hay dos consultas en vuelo y una respuesta tardía de un turno
//! cancelado se descarta.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::edit_applier::{apply_all, BatchReport};
use crate::edit_protocol::parse;
use crate::error::{PipelineError, TreeError};
use crate::models::{Chunk, FileTreeNode, Message, Namespace, NodeId, Role};
use crate::vfs::VirtualFileTree;

/// Reserva de un turno de conversación. El id es único en todo el proceso,
/// también entre sesiones distintas.
#[derive(Debug, Clone)]
pub struct TurnTicket {
    id: Uuid,
    pub question: String,
    pub namespace: Namespace,
    /// Nombre del fichero activo al empezar el turno.
    pub current_file: Option<String>,
}

pub struct Session {
    tree: VirtualFileTree,
    namespace: Namespace,
    messages: Vec<Message>,
    active_file: Option<NodeId>,
    in_flight: Option<Uuid>,
}

impl Session {
    pub fn new(tree: VirtualFileTree, namespace: Namespace) -> Self {
        info!("Sesión abierta sobre '{}' ({})", tree.root().name(), namespace);
        Self {
            tree,
            namespace,
            messages: Vec::new(),
            active_file: None,
            in_flight: None,
        }
    }

    pub fn tree(&self) -> &VirtualFileTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut VirtualFileTree {
        &mut self.tree
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn active_file(&self) -> Option<&FileTreeNode> {
        self.active_file.as_ref().and_then(|id| self.tree.find_by_id(id))
    }

    pub fn is_turn_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Carga el contenido del fichero y lo marca como activo.
    pub async fn open_file(&mut self, id: &NodeId) -> Result<String, TreeError> {
        let content = self.tree.load_content(id).await?;
        self.active_file = Some(id.clone());
        Ok(content)
    }

    /// Edición del usuario en el editor.
    pub fn update_file(&mut self, id: &NodeId, text: impl Into<String>) -> Result<(), TreeError> {
        self.tree.set_content(id, text)
    }

    pub async fn delete_node(&mut self, id: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let removed = self.tree.delete_node(id).await?;
        if self
            .active_file
            .as_ref()
            .is_some_and(|active| removed.contains(active))
        {
            debug!("El fichero activo se ha eliminado");
            self.active_file = None;
        }
        Ok(removed)
    }

    pub fn begin_turn(&mut self, question: &str) -> Result<TurnTicket, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::invalid_input("La pregunta no puede estar vacía"));
        }
        if self.in_flight.is_some() {
            return Err(PipelineError::TurnInFlight);
        }

        let id = Uuid::new_v4();
        self.in_flight = Some(id);
        self.messages.push(Message::user(question));

        Ok(TurnTicket {
            id,
            question: question.to_string(),
            namespace: self.namespace.clone(),
            current_file: self.active_file().map(|n| n.name().to_string()),
        })
    }

    /// Registra la respuesta del modelo. Devuelve `None` si el ticket ya no
    /// es el vigente (turno cancelado o sustituido).
    pub fn complete_turn(
        &mut self,
        ticket: &TurnTicket,
        answer: &str,
        sources: Vec<Chunk>,
    ) -> Option<&Message> {
        if self.in_flight != Some(ticket.id) {
            warn!("Descartando respuesta de un turno ya cerrado ({})", ticket.id);
            return None;
        }
        self.in_flight = None;

        let parsed = parse(answer);
        debug!(
            "Respuesta con {} ediciones y {} fuentes",
            parsed.edits.len(),
            sources.len()
        );
        self.messages
            .push(Message::assistant(parsed.explanation, sources, parsed.edits));
        self.messages.last()
    }

    /// Libera el turno del ticket tras un fallo, si sigue siendo el vigente.
    pub fn fail_turn(&mut self, ticket: &TurnTicket) {
        if self.in_flight == Some(ticket.id) {
            self.in_flight = None;
        }
    }

    /// Cancela el turno en curso, si lo hay.
    pub fn cancel_turn(&mut self) -> bool {
        self.in_flight.take().is_some()
    }

    /// Aplica las ediciones de un mensaje del asistente: todas, o sólo la de
    /// la posición `index`.
    pub fn apply_edits(
        &mut self,
        message_id: &str,
        index: Option<usize>,
    ) -> Result<BatchReport, PipelineError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.role == Role::Assistant)
            .ok_or_else(|| {
                PipelineError::invalid_input(format!("Mensaje desconocido: {message_id}"))
            })?;
        let edits = message.edits.as_deref_mut().unwrap_or_default();

        let report = match index {
            Some(i) => {
                let edit = edits.get_mut(i).ok_or_else(|| {
                    PipelineError::invalid_input(format!("El mensaje no tiene la edición {i}"))
                })?;
                apply_all(&mut self.tree, std::iter::once(edit))
            }
            None => apply_all(&mut self.tree, edits.iter_mut()),
        };
        info!(
            "Ediciones aplicadas: {} de {}",
            report.applied(),
            report.outcomes.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit_applier::ApplyOutcome;
    use crate::testing::{chunk, MemoryStorage};
    use crate::vfs::ExclusionPolicy;
    use std::sync::Arc;

    async fn session(files: &[(&str, &str)]) -> Session {
        let tree = VirtualFileTree::load(
            Arc::new(MemoryStorage::with_files(files)),
            MemoryStorage::root_ref(),
            "ana-proyecto",
            &ExclusionPolicy::default(),
        )
        .await
        .unwrap();
        Session::new(tree, Namespace::from_folder_name("ana-proyecto").unwrap())
    }

    fn id_of(session: &Session, path: &str) -> NodeId {
        session.tree().find_by_path(path).unwrap().id().clone()
    }

    #[tokio::test]
    async fn only_one_turn_in_flight() {
        let mut s = session(&[("a.js", "a")]).await;
        let ticket = s.begin_turn("¿qué hace a.js?").unwrap();
        assert!(matches!(s.begin_turn("otra"), Err(PipelineError::TurnInFlight)));

        s.complete_turn(&ticket, "Nada especial.", Vec::new()).unwrap();
        assert!(!s.is_turn_in_flight());
        assert!(s.begin_turn("otra").is_ok());
    }

    #[tokio::test]
    async fn tickets_from_another_session_are_ignored() {
        let mut uno = session(&[("a.js", "a")]).await;
        let mut dos = session(&[("b.js", "b")]).await;
        let stale = uno.begin_turn("¿qué hace a.js?").unwrap();
        let current = dos.begin_turn("¿qué hace b.js?").unwrap();

        assert!(dos.complete_turn(&stale, "respuesta de uno", Vec::new()).is_none());
        dos.fail_turn(&stale);
        assert!(dos.is_turn_in_flight());
        assert_eq!(dos.messages().len(), 1);

        let answer = dos.complete_turn(&current, "respuesta de dos", Vec::new()).unwrap();
        assert_eq!(answer.text, "respuesta de dos");
    }

    #[tokio::test]
    async fn empty_question_is_rejected_without_recording() {
        let mut s = session(&[("a.js", "a")]).await;
        assert!(matches!(s.begin_turn("   "), Err(PipelineError::InvalidInput(_))));
        assert!(s.messages().is_empty());
    }

    #[tokio::test]
    async fn late_answer_of_a_cancelled_turn_is_discarded() {
        let mut s = session(&[("a.js", "a")]).await;
        let old = s.begin_turn("primera").unwrap();
        assert!(s.cancel_turn());
        let new = s.begin_turn("segunda").unwrap();

        assert!(s.complete_turn(&old, "tarde", Vec::new()).is_none());
        assert!(s.is_turn_in_flight());
        s.fail_turn(&old);
        assert!(s.is_turn_in_flight());

        s.complete_turn(&new, "a tiempo", Vec::new()).unwrap();
        let texts: Vec<_> = s.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["primera", "segunda", "a tiempo"]);
    }

    #[tokio::test]
    async fn ticket_carries_the_active_file_name() {
        let mut s = session(&[("src/a.js", "const a = 1;")]).await;
        let a = id_of(&s, "src/a.js");
        assert_eq!(s.open_file(&a).await.unwrap(), "const a = 1;");

        let ticket = s.begin_turn("explica").unwrap();
        assert_eq!(ticket.current_file.as_deref(), Some("a.js"));
        assert_eq!(ticket.namespace.as_str(), "ana-proyecto");
    }

    #[tokio::test]
    async fn assistant_edits_are_recorded_and_applied_on_request() {
        let mut s = session(&[("src/a.js", "const a = 1;"), ("src/b.js", "b")]).await;
        let ticket = s.begin_turn("sube a a 2").unwrap();
        let answer = "###edit:src/a.js\nconst a = 2;\n###edit\nListo.";
        let message_id = {
            let msg = s
                .complete_turn(&ticket, answer, vec![chunk("a.js", "const a = 1;")])
                .unwrap();
            assert_eq!(msg.text, "Listo.");
            assert_eq!(msg.edits.as_ref().unwrap().len(), 1);
            assert_eq!(msg.sources.as_ref().unwrap().len(), 1);
            msg.id.clone()
        };

        let report = s.apply_edits(&message_id, None).unwrap();
        assert_eq!(report.applied(), 1);
        assert_eq!(
            s.tree().find_by_path("src/a.js").unwrap().content(),
            Some("const a = 2;")
        );

        let again = s.apply_edits(&message_id, Some(0)).unwrap();
        assert!(matches!(again.outcomes[0], ApplyOutcome::AlreadyApplied { .. }));
        assert!(s.apply_edits(&message_id, Some(3)).is_err());
        assert!(s.apply_edits("desconocido", None).is_err());
    }

    #[tokio::test]
    async fn deleting_the_active_subtree_clears_the_active_file() {
        let mut s = session(&[("src/a.js", "a"), ("main.js", "m")]).await;
        let a = id_of(&s, "src/a.js");
        s.open_file(&a).await.unwrap();

        let main = id_of(&s, "main.js");
        s.delete_node(&main).await.unwrap();
        assert!(s.active_file().is_some());

        let src = id_of(&s, "src");
        s.delete_node(&src).await.unwrap();
        assert!(s.active_file().is_none());
    }
}
