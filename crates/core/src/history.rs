//! Replaying a stored transcript as a protocol-valid model history.
//!
//! An assistant message with tool-call requests and the tool responses that
//! follow it form a *group*. A group is only sent to the model when every
//! declared call id has been answered and no stray response is attached;
//! otherwise the assistant message and all of its responses are dropped. A
//! turn that declares the same call id twice never counts as complete.
//! Tool responses with no open group are dropped as orphans.
//!
//! Two passes over the ordered slice:
//! 1. assign each tool message to the group it is anchored to and collect the
//!    declared/observed id sets per group;
//! 2. keep only messages whose group (if any) is complete.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::message::{Message, Role};

#[derive(Debug, Default)]
struct Group {
    declared: HashSet<String>,
    observed: HashSet<String>,
    /// The assistant turn declared the same call id more than once
    repeats_id: bool,
}

impl Group {
    fn opened_by(msg: &Message) -> Self {
        let declared: HashSet<String> = msg.tool_calls.iter().map(|tc| tc.id.clone()).collect();
        Self {
            repeats_id: declared.len() != msg.tool_calls.len(),
            declared,
            observed: HashSet::new(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.declared.is_empty() && !self.repeats_id && self.declared == self.observed
    }
}

/// Where pass 1 placed a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// User, system or tool-free assistant turn
    Plain,
    /// Assistant turn that opens the group at this index
    Opens(usize),
    /// Tool response belonging to the group at this index
    Answers(usize),
    /// Repeat response for a call id already answered in the group
    Duplicate,
    /// Tool response with no open group
    Orphan,
}

fn place(messages: &[Message]) -> (Vec<Placement>, HashMap<usize, Group>) {
    let mut placements = Vec::with_capacity(messages.len());
    let mut groups: HashMap<usize, Group> = HashMap::new();
    let mut pending: Option<usize> = None;

    for (idx, msg) in messages.iter().enumerate() {
        let placement = match msg.role {
            Role::Assistant if !msg.tool_calls.is_empty() => {
                groups.insert(idx, Group::opened_by(msg));
                pending = Some(idx);
                Placement::Opens(idx)
            }
            Role::Tool => match (pending, msg.tool_call_id.as_deref()) {
                (Some(anchor), Some(call_id)) => {
                    let group = groups.entry(anchor).or_default();
                    if group.observed.insert(call_id.to_string()) {
                        Placement::Answers(anchor)
                    } else {
                        Placement::Duplicate
                    }
                }
                _ => Placement::Orphan,
            },
            Role::Assistant | Role::User | Role::System => {
                pending = None;
                Placement::Plain
            }
        };
        placements.push(placement);
    }

    (placements, groups)
}

/// Filter an ordered transcript window down to complete tool-call groups.
pub fn reconstruct_history(messages: &[Message]) -> Vec<Message> {
    let (placements, groups) = place(messages);

    let keep = |anchor: &usize| groups.get(anchor).is_some_and(Group::is_complete);

    let history: Vec<Message> = messages
        .iter()
        .zip(&placements)
        .filter(|(_, placement)| match placement {
            Placement::Plain => true,
            Placement::Opens(anchor) | Placement::Answers(anchor) => keep(anchor),
            Placement::Duplicate | Placement::Orphan => false,
        })
        .map(|(msg, _)| msg.clone())
        .collect();

    let dropped = messages.len() - history.len();
    if dropped > 0 {
        debug!(
            dropped,
            incomplete_groups = groups.values().filter(|g| !g.is_complete()).count(),
            "Dropped incomplete tool-call groups from history"
        );
    }
    history
}
