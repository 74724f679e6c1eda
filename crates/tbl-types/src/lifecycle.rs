use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Kind of state-changing (or access) action recorded against a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Modified,
    Transmitted,
    Paid,
    Voided,
    Viewed,
    Exported,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Created,
        EventKind::Modified,
        EventKind::Transmitted,
        EventKind::Paid,
        EventKind::Voided,
        EventKind::Viewed,
        EventKind::Exported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Transmitted => "transmitted",
            EventKind::Paid => "paid",
            EventKind::Voided => "voided",
            EventKind::Viewed => "viewed",
            EventKind::Exported => "exported",
        }
    }

    /// Events that must attest the document's financial snapshot.
    pub fn attests_state(&self) -> bool {
        matches!(self, EventKind::Created | EventKind::Modified)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TypeError::UnknownVariant {
                what: "event kind",
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of a billing document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Issued,
    Transmitted,
    Paid,
    Overdue,
    Voided,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 6] = [
        DocumentStatus::Draft,
        DocumentStatus::Issued,
        DocumentStatus::Transmitted,
        DocumentStatus::Paid,
        DocumentStatus::Overdue,
        DocumentStatus::Voided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Issued => "issued",
            DocumentStatus::Transmitted => "transmitted",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Overdue => "overdue",
            DocumentStatus::Voided => "voided",
        }
    }

    /// Paid and voided documents accept no further state changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Paid | DocumentStatus::Voided)
    }

    /// Everything past draft carries legal weight.
    pub fn is_finalized(&self) -> bool {
        !matches!(self, DocumentStatus::Draft)
    }

    /// Status of a document after an event of `kind` is applied.
    ///
    /// `requested` selects the target where a kind allows more than one
    /// (`created` → draft/issued, `modified` → issue or mark overdue).
    /// `current` is `None` only for `created`.
    pub fn after(
        current: Option<DocumentStatus>,
        kind: EventKind,
        requested: Option<DocumentStatus>,
    ) -> Result<DocumentStatus, TypeError> {
        use DocumentStatus::*;

        let illegal = || TypeError::IllegalTransition {
            from: current.map_or("nothing", |s| s.as_str()).to_string(),
            kind: match requested {
                Some(target) => format!("{kind} -> {target}"),
                None => kind.to_string(),
            },
        };

        let Some(current) = current else {
            return match (kind, requested) {
                (EventKind::Created, None | Some(Draft)) => Ok(Draft),
                (EventKind::Created, Some(Issued)) => Ok(Issued),
                _ => Err(illegal()),
            };
        };

        let next = match kind {
            EventKind::Created => return Err(illegal()),
            EventKind::Viewed | EventKind::Exported => match requested {
                None => current,
                Some(_) => return Err(illegal()),
            },
            EventKind::Modified => match (current, requested) {
                (c, _) if c.is_terminal() => return Err(illegal()),
                (c, None) => c,
                (c, Some(r)) if r == c => c,
                (Draft, Some(Issued)) => Issued,
                (Issued | Transmitted, Some(Overdue)) => Overdue,
                _ => return Err(illegal()),
            },
            EventKind::Transmitted => match current {
                Draft | Issued | Overdue => Transmitted,
                _ => return Err(illegal()),
            },
            EventKind::Paid => match current {
                Issued | Transmitted | Overdue => Paid,
                _ => return Err(illegal()),
            },
            EventKind::Voided => match current {
                c if c.is_terminal() => return Err(illegal()),
                _ => Voided,
            },
        };

        if let Some(target) = requested {
            if target != next {
                return Err(illegal());
            }
        }
        Ok(next)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TypeError::UnknownVariant {
                what: "document status",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentStatus::*;
    use super::*;

    #[test]
    fn created_starts_draft_or_issued() {
        assert_eq!(DocumentStatus::after(None, EventKind::Created, None).unwrap(), Draft);
        assert_eq!(
            DocumentStatus::after(None, EventKind::Created, Some(Issued)).unwrap(),
            Issued
        );
        assert!(DocumentStatus::after(None, EventKind::Created, Some(Paid)).is_err());
        assert!(DocumentStatus::after(None, EventKind::Paid, None).is_err());
    }

    #[test]
    fn created_only_once() {
        assert!(DocumentStatus::after(Some(Draft), EventKind::Created, None).is_err());
    }

    #[test]
    fn happy_path() {
        let s = DocumentStatus::after(Some(Draft), EventKind::Modified, Some(Issued)).unwrap();
        assert_eq!(s, Issued);
        let s = DocumentStatus::after(Some(s), EventKind::Transmitted, None).unwrap();
        assert_eq!(s, Transmitted);
        let s = DocumentStatus::after(Some(s), EventKind::Modified, Some(Overdue)).unwrap();
        assert_eq!(s, Overdue);
        let s = DocumentStatus::after(Some(s), EventKind::Paid, None).unwrap();
        assert_eq!(s, Paid);
    }

    #[test]
    fn terminal_states_reject_changes() {
        for terminal in [Paid, Voided] {
            assert!(DocumentStatus::after(Some(terminal), EventKind::Modified, None).is_err());
            assert!(DocumentStatus::after(Some(terminal), EventKind::Voided, None).is_err());
            assert!(DocumentStatus::after(Some(terminal), EventKind::Paid, None).is_err());
            // Reads and exports are always recorded.
            assert_eq!(
                DocumentStatus::after(Some(terminal), EventKind::Viewed, None).unwrap(),
                terminal
            );
            assert_eq!(
                DocumentStatus::after(Some(terminal), EventKind::Exported, None).unwrap(),
                terminal
            );
        }
    }

    #[test]
    fn draft_cannot_be_paid() {
        let err = DocumentStatus::after(Some(Draft), EventKind::Paid, None).unwrap_err();
        assert_eq!(
            err,
            TypeError::IllegalTransition {
                from: "draft".into(),
                kind: "paid".into()
            }
        );
    }

    #[test]
    fn requested_status_must_match_outcome() {
        assert!(DocumentStatus::after(Some(Issued), EventKind::Paid, Some(Voided)).is_err());
        assert!(DocumentStatus::after(Some(Issued), EventKind::Viewed, Some(Paid)).is_err());
        assert!(DocumentStatus::after(Some(Draft), EventKind::Modified, Some(Overdue)).is_err());
    }

    #[test]
    fn parse_and_display_agree() {
        for kind in EventKind::ALL {
            assert_eq!(kind.to_string().parse::<EventKind>().unwrap(), kind);
        }
        for status in DocumentStatus::ALL {
            assert_eq!(status.to_string().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<EventKind>().is_err());
    }

    #[test]
    fn serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&EventKind::Transmitted).unwrap(), "\"transmitted\"");
        assert_eq!(serde_json::to_string(&DocumentStatus::Overdue).unwrap(), "\"overdue\"");
    }
}
