//! Operator-side reconciliation of face moves and deletions.
//!
//! [`MoveController`] is a small state machine that sits between an operator
//! surface (the CLI, or any UI) and the HTTP API. It owns no rendering; every
//! call returns a list of [`Effect`]s for the surface to apply.
//!
//! ```text
//!  Idle ──begin_move──▶ Selecting ──submit──▶ Submitting ──resolve──▶ Resolved
//!   ▲                      │  ▲                   │
//!   └────────cancel────────┘  └──── failure ──────┘
//! ```
//!
//! The controller never adjusts counts or membership locally. After a
//! success it navigates to the destination person (or to the person list
//! when a delete emptied the person); after a stale-view failure it asks for
//! a refetch. Views are always re-read from the server.
//!
//! A request, once issued, cannot be cancelled. [`MoveController::dismiss`]
//! only closes the dialog; the outcome is still applied when it arrives.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{DeleteFaceResponse, MoveFaceResponse, MoveToNewResponse};
use crate::client::ApiError;
use crate::models::PersonSummary;

/// The API calls the controller issues.
#[async_trait]
pub trait ReassignApi: Send + Sync {
    async fn list_persons(&self) -> Result<Vec<PersonSummary>, ApiError>;

    async fn move_face(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_person_id: Option<&str>,
    ) -> Result<MoveFaceResponse, ApiError>;

    async fn move_face_to_new(
        &self,
        face_id: &str,
        custom_name: Option<&str>,
        expected_person_id: Option<&str>,
    ) -> Result<MoveToNewResponse, ApiError>;

    async fn delete_face(&self, face_id: &str) -> Result<DeleteFaceResponse, ApiError>;
}

/// What the operator is currently looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    PersonList,
    Person(String),
    Image(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Existing { person_id: String },
    New { custom_name: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move(Destination),
    Delete,
}

impl Action {
    fn failure_message(&self) -> &'static str {
        match self {
            Action::Move(Destination::Existing { .. }) => "Failed to move face",
            Action::Move(Destination::New { .. }) => "Failed to move face to new person",
            Action::Delete => "Failed to delete face",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveState {
    Idle,
    Selecting {
        face_id: String,
        current_owner: Option<String>,
        /// Message of the last failed submit, kept so the dialog can show it.
        last_error: Option<String>,
    },
    Submitting {
        face_id: String,
        current_owner: Option<String>,
        action: Action,
        dialog_open: bool,
    },
    Resolved(View),
}

/// Operator-facing message produced by an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    FaceMoved {
        to_person: String,
        deleted_empty_person: Option<String>,
    },
    FaceMovedToNew {
        new_person: String,
        deleted_empty_person: Option<String>,
    },
    FaceDeleted {
        deleted_empty_person: Option<String>,
    },
    Failed {
        message: String,
    },
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Failed { .. })
    }
}

fn write_with_cleanup(
    f: &mut fmt::Formatter<'_>,
    head: &str,
    deleted: &Option<String>,
) -> fmt::Result {
    match deleted {
        Some(name) => write!(
            f,
            "{} Empty person \"{}\" was automatically deleted.",
            head, name
        ),
        None => f.write_str(head),
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::FaceMoved {
                deleted_empty_person,
                ..
            } => write_with_cleanup(f, "Face moved successfully!", deleted_empty_person),
            Notice::FaceMovedToNew {
                deleted_empty_person,
                ..
            } => write_with_cleanup(
                f,
                "Face moved to new person successfully!",
                deleted_empty_person,
            ),
            Notice::FaceDeleted {
                deleted_empty_person,
            } => write_with_cleanup(f, "Face deleted successfully!", deleted_empty_person),
            Notice::Failed { message } => f.write_str(message),
        }
    }
}

/// Instructions for the operator surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CloseDialog,
    Notify(Notice),
    Navigate(View),
    Refetch(View),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("a request for face {face_id} is already in flight")]
    Busy { face_id: String },

    #[error("no face is selected for moving")]
    NotSelecting,

    #[error("a target person must be chosen")]
    MissingTarget,
}

/// Server-confirmed result of one submitted request.
#[derive(Debug, Clone)]
pub enum Outcome {
    Moved(MoveFaceResponse),
    MovedToNew(MoveToNewResponse),
    Deleted(DeleteFaceResponse),
    Failed(ApiError),
}

/// A request that has been issued by the controller but not yet sent.
///
/// Owning its inputs lets the caller await it without holding a borrow of
/// the controller, so [`MoveController::dismiss`] stays callable meanwhile.
pub struct Submission {
    api: Arc<dyn ReassignApi>,
    face_id: String,
    expected_owner: Option<String>,
    action: Action,
}

impl Submission {
    pub fn face_id(&self) -> &str {
        &self.face_id
    }

    pub async fn send(self) -> Outcome {
        let expected = self.expected_owner.as_deref();
        let result = match &self.action {
            Action::Move(Destination::Existing { person_id }) => self
                .api
                .move_face(&self.face_id, person_id, expected)
                .await
                .map(Outcome::Moved),
            Action::Move(Destination::New { custom_name }) => self
                .api
                .move_face_to_new(&self.face_id, custom_name.as_deref(), expected)
                .await
                .map(Outcome::MovedToNew),
            Action::Delete => self
                .api
                .delete_face(&self.face_id)
                .await
                .map(Outcome::Deleted),
        };
        result.unwrap_or_else(Outcome::Failed)
    }
}

pub struct MoveController {
    api: Arc<dyn ReassignApi>,
    view: View,
    state: MoveState,
    persons: Vec<PersonSummary>,
    /// State to restore when a delete fails.
    before_delete: Option<MoveState>,
}

impl MoveController {
    pub fn new(api: Arc<dyn ReassignApi>, view: View) -> Self {
        Self {
            api,
            view,
            state: MoveState::Idle,
            persons: Vec::new(),
            before_delete: None,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn state(&self) -> &MoveState {
        &self.state
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, MoveState::Submitting { .. })
    }

    fn ensure_not_submitting(&self) -> Result<(), ControllerError> {
        match &self.state {
            MoveState::Submitting { face_id, .. } => Err(ControllerError::Busy {
                face_id: face_id.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Open the move dialog for `face_id`.
    ///
    /// The person list is fetched on every open. If the fetch fails the
    /// dialog still opens (moving to a new person needs no list) and a
    /// failure notice is returned.
    pub async fn begin_move(
        &mut self,
        face_id: &str,
        current_owner: Option<&str>,
    ) -> Result<Vec<Effect>, ControllerError> {
        self.ensure_not_submitting()?;

        self.state = MoveState::Selecting {
            face_id: face_id.to_string(),
            current_owner: current_owner.map(str::to_string),
            last_error: None,
        };

        match self.api.list_persons().await {
            Ok(persons) => {
                self.persons = persons;
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "failed to load persons list");
                self.persons.clear();
                Ok(vec![Effect::Notify(Notice::Failed {
                    message: "Failed to load persons list".to_string(),
                })])
            }
        }
    }

    /// Picker candidates: every listed person except the face's current
    /// owner, filtered by a case-insensitive substring of the name.
    pub fn candidates(&self, query: &str) -> Vec<&PersonSummary> {
        let owner = match &self.state {
            MoveState::Selecting { current_owner, .. } => current_owner.as_deref(),
            _ => None,
        };
        let query = query.trim().to_lowercase();
        self.persons
            .iter()
            .filter(|p| Some(p.person_id.as_str()) != owner)
            .filter(|p| query.is_empty() || p.person_name.to_lowercase().contains(&query))
            .collect()
    }

    /// Close the dialog without issuing anything. Only valid while selecting.
    pub fn cancel(&mut self) -> bool {
        if matches!(self.state, MoveState::Selecting { .. }) {
            self.state = MoveState::Idle;
            true
        } else {
            false
        }
    }

    /// Close the dialog. While a request is in flight its outcome is still
    /// applied when it resolves.
    pub fn dismiss(&mut self) {
        if let MoveState::Submitting { dialog_open, .. } = &mut self.state {
            *dialog_open = false;
        } else if matches!(self.state, MoveState::Selecting { .. }) {
            self.state = MoveState::Idle;
        }
    }

    /// Issue the move request for the selected face.
    pub fn submit(&mut self, destination: Destination) -> Result<Submission, ControllerError> {
        self.ensure_not_submitting()?;
        if let Destination::Existing { person_id } = &destination {
            if person_id.trim().is_empty() {
                return Err(ControllerError::MissingTarget);
            }
        }
        let (face_id, current_owner) = match &self.state {
            MoveState::Selecting {
                face_id,
                current_owner,
                ..
            } => (face_id.clone(), current_owner.clone()),
            _ => return Err(ControllerError::NotSelecting),
        };

        let action = Action::Move(destination);
        debug!(%face_id, ?action, "submitting move");
        self.state = MoveState::Submitting {
            face_id: face_id.clone(),
            current_owner: current_owner.clone(),
            action: action.clone(),
            dialog_open: true,
        };
        Ok(Submission {
            api: Arc::clone(&self.api),
            face_id,
            expected_owner: current_owner,
            action,
        })
    }

    /// Issue a delete for `face_id`. Not allowed while a dialog is open or a
    /// request is in flight.
    pub fn submit_delete(&mut self, face_id: &str) -> Result<Submission, ControllerError> {
        self.ensure_not_submitting()?;
        if let MoveState::Selecting { face_id, .. } = &self.state {
            return Err(ControllerError::Busy {
                face_id: face_id.clone(),
            });
        }

        let previous = std::mem::replace(
            &mut self.state,
            MoveState::Submitting {
                face_id: face_id.to_string(),
                current_owner: None,
                action: Action::Delete,
                dialog_open: false,
            },
        );
        self.before_delete = Some(previous);
        Ok(Submission {
            api: Arc::clone(&self.api),
            face_id: face_id.to_string(),
            expected_owner: None,
            action: Action::Delete,
        })
    }

    /// Apply a server-confirmed outcome and return the effects to render.
    pub fn resolve(&mut self, outcome: Outcome) -> Vec<Effect> {
        let (face_id, current_owner, action, dialog_open) =
            match std::mem::replace(&mut self.state, MoveState::Idle) {
                MoveState::Submitting {
                    face_id,
                    current_owner,
                    action,
                    dialog_open,
                } => (face_id, current_owner, action, dialog_open),
                other => {
                    warn!(state = ?other, "outcome arrived with no request in flight");
                    self.state = other;
                    return Vec::new();
                }
            };
        let before_delete = self.before_delete.take();

        let mut effects = Vec::new();
        match outcome {
            Outcome::Moved(moved) => {
                if dialog_open {
                    effects.push(Effect::CloseDialog);
                }
                effects.push(Effect::Notify(Notice::FaceMoved {
                    to_person: moved.to_person,
                    deleted_empty_person: moved.deleted_empty_person,
                }));
                self.navigate(View::Person(moved.target_person_id), &mut effects);
            }
            Outcome::MovedToNew(moved) => {
                if dialog_open {
                    effects.push(Effect::CloseDialog);
                }
                effects.push(Effect::Notify(Notice::FaceMovedToNew {
                    new_person: moved.new_person_name,
                    deleted_empty_person: moved.deleted_empty_person,
                }));
                self.navigate(View::Person(moved.new_person_id), &mut effects);
            }
            Outcome::Deleted(removed) => {
                let emptied = removed.deleted_empty_person.is_some();
                effects.push(Effect::Notify(Notice::FaceDeleted {
                    deleted_empty_person: removed.deleted_empty_person,
                }));
                if emptied {
                    self.navigate(View::PersonList, &mut effects);
                } else {
                    effects.push(Effect::Refetch(self.view.clone()));
                    self.state = MoveState::Resolved(self.view.clone());
                }
            }
            Outcome::Failed(err) => {
                let message = err
                    .server_message()
                    .unwrap_or(action.failure_message())
                    .to_string();
                warn!(%face_id, error = %err, "face action failed");

                effects.push(Effect::Notify(Notice::Failed {
                    message: message.clone(),
                }));
                if err.invalidates_view() {
                    effects.push(Effect::Refetch(self.view.clone()));
                }

                self.state = match action {
                    Action::Delete => before_delete.unwrap_or(MoveState::Idle),
                    Action::Move(_) if dialog_open => MoveState::Selecting {
                        face_id,
                        current_owner,
                        last_error: Some(message),
                    },
                    Action::Move(_) => MoveState::Idle,
                };
            }
        }
        effects
    }

    /// Submit and resolve in one step.
    pub async fn confirm(&mut self, destination: Destination) -> Result<Vec<Effect>, ControllerError> {
        let submission = self.submit(destination)?;
        let outcome = submission.send().await;
        Ok(self.resolve(outcome))
    }

    pub async fn delete_face(&mut self, face_id: &str) -> Result<Vec<Effect>, ControllerError> {
        let submission = self.submit_delete(face_id)?;
        let outcome = submission.send().await;
        Ok(self.resolve(outcome))
    }

    fn navigate(&mut self, target: View, effects: &mut Vec<Effect>) {
        self.persons.clear();
        self.view = target.clone();
        self.state = MoveState::Resolved(target.clone());
        effects.push(Effect::Navigate(target));
    }
}
